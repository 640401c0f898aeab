// 🗳️ Reconciliation Engine - batch-sequential pipeline
// Owns the identity index, per-booth serial ledgers, pending set, and
// conflict log for one reconciliation run. Batches are absorbed one at a
// time; a batch is validated structurally before any index mutation, so a
// rejected batch leaves prior canonical state untouched.

use crate::audit::{RollAudit, RollAuditor};
use crate::conflict::{ConflictLog, ConflictRecord};
use crate::identity::{resolve_identity, PendingIndex, PendingKey, Resolution};
use crate::merge::{merge_candidate, voter_from_record};
use crate::normalize::normalize_candidate;
use crate::records::{
    Batch, BoothConfig, BoothKey, CanonicalVoter, Locator, NormalizedRecord,
};
use crate::serial::{ClaimOutcome, SerialLedger};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ============================================================================
// BATCH-LEVEL ERRORS & RECEIPTS
// ============================================================================

/// A structurally unusable batch. Fatal for that batch only: the whole
/// batch is rejected, prior canonical state is untouched, and the caller
/// learns which batch failed and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRejection {
    pub batch_id: String,
    pub reason: String,
}

impl fmt::Display for BatchRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch '{}' rejected: {}", self.batch_id, self.reason)
    }
}

impl std::error::Error for BatchRejection {}

/// What absorbing one batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub batch_id: String,
    pub fingerprint: String,
    pub candidates: usize,
    /// New canonical voters created.
    pub created: usize,
    /// Records merged into existing voters.
    pub attached: usize,
    /// Identities backlogged for serial assignment at booth close.
    pub deferred: usize,
    /// Identity-less records parked in the holding set.
    pub pending: usize,
    /// Conflicts recorded while absorbing this batch.
    pub conflicts: usize,
}

/// What closing one booth did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoothCloseReport {
    pub ward: u32,
    pub booth: u32,
    pub backlog_assigned: usize,
    pub unplaceable: usize,
    pub gaps: usize,
}

/// Final output of a run: canonical voters per booth, the conflict list
/// for manual review, and the quality audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationOutput {
    pub voters: Vec<CanonicalVoter>,
    pub conflicts: Vec<ConflictRecord>,
    pub audit: RollAudit,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Single-threaded, batch-sequential reconciliation over owned, per-run
/// index state. Safe to parallelize only across engine instances for
/// disjoint booths, never within one.
pub struct ReconciliationEngine {
    configs: HashMap<BoothKey, BoothConfig>,
    /// Identity index and canonical store in one: identity → voter.
    voters: BTreeMap<String, CanonicalVoter>,
    ledgers: HashMap<BoothKey, SerialLedger>,
    pending: PendingIndex,
    conflicts: ConflictLog,
    absorbed: Vec<String>,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            configs: HashMap::new(),
            voters: BTreeMap::new(),
            ledgers: HashMap::new(),
            pending: PendingIndex::new(),
            conflicts: ConflictLog::new(),
            absorbed: Vec::new(),
        }
    }

    /// Register a booth with its authoritative expected count. Must happen
    /// before any batch for that booth is absorbed.
    pub fn add_booth(&mut self, ward: u32, booth: u32, expected_count: u32) {
        let key = BoothKey::new(ward, booth);
        self.configs.insert(key, BoothConfig::new(expected_count));
        self.ledgers
            .entry(key)
            .or_insert_with(|| SerialLedger::new(expected_count));
    }

    pub fn with_configs(configs: HashMap<BoothKey, BoothConfig>) -> Self {
        let mut engine = Self::new();
        for (key, config) in configs {
            engine.add_booth(key.ward, key.booth, config.expected_count);
        }
        engine
    }

    pub fn voters(&self) -> impl Iterator<Item = &CanonicalVoter> {
        self.voters.values()
    }

    pub fn voters_for_booth(&self, key: BoothKey) -> Vec<&CanonicalVoter> {
        self.voters
            .values()
            .filter(|v| v.booth_key() == key)
            .collect()
    }

    pub fn conflicts(&self) -> &ConflictLog {
        &self.conflicts
    }

    pub fn pending_count(&self) -> usize {
        self.pending.unresolved_count()
    }

    pub fn absorbed_batches(&self) -> &[String] {
        &self.absorbed
    }

    // ------------------------------------------------------------------------
    // BATCH ABSORPTION
    // ------------------------------------------------------------------------

    /// Absorb one extraction batch. The batch is first validated
    /// structurally, then every candidate is normalized into a staged list;
    /// only a fully staged batch is applied to the shared indices, so a
    /// failure can never desynchronize the serial index mid-batch.
    /// Record-level conflicts are data, not errors: they land in the
    /// conflict log and the rest of the batch proceeds.
    pub fn absorb_batch(&mut self, batch: &Batch) -> Result<BatchReceipt, BatchRejection> {
        self.validate_batch(batch)?;

        // Stage: normalization is pure and infallible per record.
        let staged: Vec<NormalizedRecord> = batch
            .candidates
            .iter()
            .map(|raw| normalize_candidate(raw, &batch.id, batch.confidence))
            .collect();

        let mut receipt = BatchReceipt {
            batch_id: batch.id.clone(),
            fingerprint: batch.fingerprint(),
            candidates: staged.len(),
            ..BatchReceipt::default()
        };

        let batch_booth = batch.locator.booth_key();
        for record in staged {
            self.apply_record(batch_booth, record, &mut receipt);
        }

        if !self.absorbed.contains(&batch.id) {
            self.absorbed.push(batch.id.clone());
        }
        Ok(receipt)
    }

    fn validate_batch(&self, batch: &Batch) -> Result<(), BatchRejection> {
        let reject = |reason: String| {
            Err(BatchRejection {
                batch_id: batch.id.clone(),
                reason,
            })
        };

        if batch.id.trim().is_empty() {
            return reject("batch id is empty".to_string());
        }
        let key = batch.locator.booth_key();
        match self.ledgers.get(&key) {
            None => {
                return reject(format!(
                    "no expected_count configured for {}",
                    key
                ));
            }
            Some(ledger) if ledger.is_closed() => {
                return reject(format!("{} is already closed", key));
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn apply_record(
        &mut self,
        batch_booth: BoothKey,
        record: NormalizedRecord,
        receipt: &mut BatchReceipt,
    ) {
        match resolve_identity(&self.voters, &record, batch_booth) {
            Resolution::CrossBooth { identity_id, claimed, .. } => {
                // Ambiguous cross-booth duplicate: both claims kept
                // verbatim, neither voter touched.
                let existing = self.voters[&identity_id].clone();
                self.conflicts
                    .push(ConflictRecord::cross_booth(existing, record, claimed));
                receipt.conflicts += 1;
            }
            Resolution::Attach { identity_id } => {
                receipt.attached += 1;
                let voter = self
                    .voters
                    .get_mut(&identity_id)
                    .expect("attach resolution implies a stored voter");
                merge_candidate(voter, &record);
                self.place_serial(&identity_id, &record, receipt);
            }
            Resolution::Create { identity_id } => {
                // A brand-new identity is placed in the batch's booth; a
                // stray own-locator on a first observation has nothing
                // canonical to dispute yet.
                receipt.created += 1;
                let locator = Locator::new(batch_booth.ward, batch_booth.booth);
                let voter = voter_from_record(&identity_id, locator, &record);
                self.voters.insert(identity_id.clone(), voter);
                self.place_serial(&identity_id, &record, receipt);
            }
            Resolution::Pending => self.hold_pending(batch_booth, record, receipt),
        }
    }

    /// Run the serial claim for a just-merged record and fold the outcome
    /// into conflict log / pending promotion. Placement always follows the
    /// voter's booth.
    fn place_serial(
        &mut self,
        identity_id: &str,
        record: &NormalizedRecord,
        receipt: &mut BatchReceipt,
    ) {
        let booth = self.voters[identity_id].booth_key();
        let ledger = self
            .ledgers
            .get_mut(&booth)
            .expect("voters only exist in configured booths");

        match ledger.claim(identity_id, record.claimed_serial) {
            ClaimOutcome::Assigned(serial) => {
                if let Some(voter) = self.voters.get_mut(identity_id) {
                    voter.serial = Some(serial);
                }
                self.promote_pending(identity_id, PendingKey::new(booth, serial));
            }
            ClaimOutcome::AlreadyHeld(serial) => {
                if let Some(voter) = self.voters.get_mut(identity_id) {
                    voter.serial = Some(serial);
                }
            }
            ClaimOutcome::Deferred => {
                receipt.deferred += 1;
            }
            ClaimOutcome::Collision { serial, holder } => {
                let existing = self.voters[&holder].clone();
                self.conflicts.push(ConflictRecord::serial_collision(
                    booth,
                    serial,
                    existing,
                    record.clone(),
                ));
                receipt.conflicts += 1;
            }
        }
    }

    /// An identity just claimed (ward, booth, serial): any identity-less
    /// records held under that key belong to it and merge in, in arrival
    /// order.
    fn promote_pending(&mut self, identity_id: &str, key: PendingKey) {
        let held = self.pending.take(key);
        if held.is_empty() {
            return;
        }
        if let Some(voter) = self.voters.get_mut(identity_id) {
            for record in held {
                merge_candidate(voter, &record);
            }
        }
    }

    /// No identity signal. If the claimed slot already has a holder the
    /// record joins that voter (same key, opposite arrival order);
    /// otherwise it waits. Position on the page is never used.
    fn hold_pending(
        &mut self,
        batch_booth: BoothKey,
        record: NormalizedRecord,
        receipt: &mut BatchReceipt,
    ) {
        let booth = record.claimed_booth(batch_booth);
        match record.claimed_serial {
            Some(serial) => {
                let holder = self
                    .ledgers
                    .get(&booth)
                    .and_then(|l| l.holder_of(serial))
                    .map(|s| s.to_string());
                match holder {
                    Some(identity_id) => {
                        receipt.attached += 1;
                        if let Some(voter) = self.voters.get_mut(&identity_id) {
                            merge_candidate(voter, &record);
                        }
                    }
                    None => {
                        receipt.pending += 1;
                        self.pending.push(PendingKey::new(booth, serial), record);
                    }
                }
            }
            None => {
                receipt.pending += 1;
                self.pending.push_unkeyed(booth, record);
            }
        }
    }

    // ------------------------------------------------------------------------
    // BOOTH CLOSE & FINALIZATION
    // ------------------------------------------------------------------------

    /// Declare a booth closed: all known batches are in, backlog resolution
    /// runs, and remaining gaps / unplaceable identities become conflicts.
    /// This is the explicit synchronization barrier of the pipeline.
    pub fn close_booth(&mut self, key: BoothKey) -> Result<BoothCloseReport> {
        let ledger = match self.ledgers.get_mut(&key) {
            Some(l) => l,
            None => bail!("unknown booth: {}", key),
        };

        let close = ledger.close();

        for (identity_id, serial) in &close.assigned {
            if let Some(voter) = self.voters.get_mut(identity_id) {
                voter.serial = Some(*serial);
            }
        }
        for identity_id in &close.unplaceable {
            if let Some(voter) = self.voters.get(identity_id) {
                self.conflicts
                    .push(ConflictRecord::unplaceable(key, voter.clone()));
            }
        }
        for serial in &close.gaps {
            self.conflicts
                .push(ConflictRecord::structural_gap(key, *serial));
        }

        Ok(BoothCloseReport {
            ward: key.ward,
            booth: key.booth,
            backlog_assigned: close.assigned.len(),
            unplaceable: close.unplaceable.len(),
            gaps: close.gaps.len(),
        })
    }

    /// Close every configured booth that is still open.
    pub fn close_all(&mut self) -> Result<Vec<BoothCloseReport>> {
        let mut keys: Vec<BoothKey> = self.configs.keys().copied().collect();
        keys.sort();

        let mut reports = Vec::new();
        for key in keys {
            if !self.ledgers[&key].is_closed() {
                reports.push(self.close_booth(key)?);
            }
        }
        Ok(reports)
    }

    /// Run the auditor over current state without consuming the engine.
    pub fn audit(&self) -> RollAudit {
        RollAuditor::new().audit(&self.voters, &self.conflicts, &self.pending, &self.configs)
    }

    /// Close all booths and emit the run's output: voters ordered by
    /// (ward, booth, serial), the conflict list, and the audit.
    pub fn finalize(mut self) -> Result<ReconciliationOutput> {
        self.close_all()?;
        let audit = self.audit();

        let mut voters: Vec<CanonicalVoter> = self.voters.into_values().collect();
        voters.sort_by(|a, b| {
            (a.ward, a.booth, a.serial, &a.identity_id).cmp(&(
                b.ward,
                b.booth,
                b.serial,
                &b.identity_id,
            ))
        });

        Ok(ReconciliationOutput {
            voters,
            conflicts: self.conflicts.records().to_vec(),
            audit,
        })
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

// Conflict Reporter - cases the engine refuses to resolve
// Every conflict carries all competing claims verbatim plus the batches
// that produced them, so a reviewer can adjudicate without re-running
// extraction. Conflicts are terminal: the engine never guesses.

use crate::records::{BoothKey, CanonicalVoter, NormalizedRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Same identity claimed by two different (ward, booth) locators.
    CrossBoothIdentity,
    /// Two identities claiming one serial slot.
    SerialCollision,
    /// Identity with no assignable serial after backlog exhaustion.
    UnplaceableIdentity,
    /// Expected serial slot never filled.
    StructuralGap,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::CrossBoothIdentity => "cross_booth_identity",
            ConflictKind::SerialCollision => "serial_collision",
            ConflictKind::UnplaceableIdentity => "unplaceable_identity",
            ConflictKind::StructuralGap => "structural_gap",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cross_booth_identity" => Some(ConflictKind::CrossBoothIdentity),
            "serial_collision" => Some(ConflictKind::SerialCollision),
            "unplaceable_identity" => Some(ConflictKind::UnplaceableIdentity),
            "structural_gap" => Some(ConflictKind::StructuralGap),
            _ => None,
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CONFLICT RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub kind: ConflictKind,
    pub ward: u32,
    pub booth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<u32>,
    /// The canonical claim already held, verbatim at conflict time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing: Option<CanonicalVoter>,
    /// The competing incoming claim, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incoming: Option<NormalizedRecord>,
    /// Batches behind the competing claims.
    pub batches: Vec<String>,
    pub note: String,
}

impl ConflictRecord {
    pub fn cross_booth(
        existing: CanonicalVoter,
        incoming: NormalizedRecord,
        claimed: BoothKey,
    ) -> Self {
        let registered = existing.booth_key();
        let mut batches = existing.provenance.clone();
        if !batches.contains(&incoming.source_batch) {
            batches.push(incoming.source_batch.clone());
        }
        ConflictRecord {
            kind: ConflictKind::CrossBoothIdentity,
            ward: claimed.ward,
            booth: claimed.booth,
            identity_id: Some(existing.identity_id.clone()),
            serial: incoming.claimed_serial,
            note: format!(
                "identity {} is registered in {} but claimed by {}",
                existing.identity_id, registered, claimed
            ),
            existing: Some(existing),
            incoming: Some(incoming),
            batches,
        }
    }

    pub fn serial_collision(
        booth: BoothKey,
        serial: u32,
        existing: CanonicalVoter,
        incoming: NormalizedRecord,
    ) -> Self {
        let mut batches = existing.provenance.clone();
        if !batches.contains(&incoming.source_batch) {
            batches.push(incoming.source_batch.clone());
        }
        ConflictRecord {
            kind: ConflictKind::SerialCollision,
            ward: booth.ward,
            booth: booth.booth,
            identity_id: incoming.identity_id.clone(),
            serial: Some(serial),
            note: format!(
                "serial {} in {} is held by {} but also claimed by {}",
                serial,
                booth,
                existing.identity_id,
                incoming.identity_id.as_deref().unwrap_or("<no identity>"),
            ),
            existing: Some(existing),
            incoming: Some(incoming),
            batches,
        }
    }

    pub fn unplaceable(booth: BoothKey, voter: CanonicalVoter) -> Self {
        ConflictRecord {
            kind: ConflictKind::UnplaceableIdentity,
            ward: booth.ward,
            booth: booth.booth,
            identity_id: Some(voter.identity_id.clone()),
            serial: None,
            batches: voter.provenance.clone(),
            note: format!(
                "identity {} has no assignable serial in {} after backlog exhaustion",
                voter.identity_id, booth
            ),
            existing: Some(voter),
            incoming: None,
        }
    }

    pub fn structural_gap(booth: BoothKey, serial: u32) -> Self {
        ConflictRecord {
            kind: ConflictKind::StructuralGap,
            ward: booth.ward,
            booth: booth.booth,
            identity_id: None,
            serial: Some(serial),
            existing: None,
            incoming: None,
            batches: Vec::new(),
            note: format!("expected serial {} in {} was never filled", serial, booth),
        }
    }

    pub fn booth_key(&self) -> BoothKey {
        BoothKey {
            ward: self.ward,
            booth: self.booth,
        }
    }
}

// ============================================================================
// CONFLICT LOG
// ============================================================================

/// Append-only collection of conflicts for one reconciliation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictLog {
    records: Vec<ConflictRecord>,
}

impl ConflictLog {
    pub fn new() -> Self {
        ConflictLog::default()
    }

    pub fn push(&mut self, record: ConflictRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ConflictRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count_of(&self, kind: ConflictKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    pub fn for_booth(&self, key: BoothKey) -> Vec<&ConflictRecord> {
        self.records
            .iter()
            .filter(|r| r.booth_key() == key)
            .collect()
    }

    /// Structural-gap serials for one booth, for the auditor.
    pub fn gaps_for_booth(&self, key: BoothKey) -> Vec<u32> {
        let mut gaps: Vec<u32> = self
            .records
            .iter()
            .filter(|r| r.kind == ConflictKind::StructuralGap && r.booth_key() == key)
            .filter_map(|r| r.serial)
            .collect();
        gaps.sort_unstable();
        gaps
    }

    pub fn summary(&self) -> String {
        format!(
            "{} conflicts: {} cross-booth, {} serial collisions, {} unplaceable, {} gaps",
            self.len(),
            self.count_of(ConflictKind::CrossBoothIdentity),
            self.count_of(ConflictKind::SerialCollision),
            self.count_of(ConflictKind::UnplaceableIdentity),
            self.count_of(ConflictKind::StructuralGap),
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

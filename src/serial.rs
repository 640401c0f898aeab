// 🔢 Serial Assigner - within-booth ordinal ledger
// One ledger per (ward, booth). Enforces per-booth uniqueness against the
// authoritative expected count; deferred identities queue in first-observed
// order and are placed when the booth closes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Result of one serial claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The claimed slot was free and is now held by this identity.
    Assigned(u32),
    /// The identity already holds a serial in this booth; later claims,
    /// matching or not, never reassign it.
    AlreadyHeld(u32),
    /// No usable claim; the identity joins the booth backlog.
    Deferred,
    /// The slot is held by a different identity. Never overwritten,
    /// never last-write-wins.
    Collision { serial: u32, holder: String },
}

/// What closing a booth produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloseReport {
    /// Backlogged identities placed into free slots, ascending.
    pub assigned: Vec<(String, u32)>,
    /// Identities left over after backlog exhaustion.
    pub unplaceable: Vec<String>,
    /// Expected slots that no identity ever filled.
    pub gaps: Vec<u32>,
}

// ============================================================================
// SERIAL LEDGER
// ============================================================================

/// Per-booth serial index. Exclusively owned by the engine processing the
/// booth; all mutation is serialized through it.
#[derive(Debug, Clone)]
pub struct SerialLedger {
    expected_count: u32,
    /// serial → holding identity
    slots: BTreeMap<u32, String>,
    /// identity → held serial
    by_identity: HashMap<String, u32>,
    /// Identities with no usable claim, in first-observation order.
    backlog: Vec<String>,
    closed: bool,
}

impl SerialLedger {
    pub fn new(expected_count: u32) -> Self {
        SerialLedger {
            expected_count,
            slots: BTreeMap::new(),
            by_identity: HashMap::new(),
            backlog: Vec::new(),
            closed: false,
        }
    }

    pub fn expected_count(&self) -> u32 {
        self.expected_count
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn assigned_count(&self) -> usize {
        self.slots.len()
    }

    pub fn serial_of(&self, identity_id: &str) -> Option<u32> {
        self.by_identity.get(identity_id).copied()
    }

    pub fn holder_of(&self, serial: u32) -> Option<&str> {
        self.slots.get(&serial).map(|s| s.as_str())
    }

    /// Claim a serial for an identity. A claim outside `1..=expected_count`
    /// is treated as no claim at all - the authoritative count bounds the
    /// serial domain, and an implausible ordinal is not a data point.
    pub fn claim(&mut self, identity_id: &str, claimed: Option<u32>) -> ClaimOutcome {
        if let Some(held) = self.by_identity.get(identity_id) {
            return ClaimOutcome::AlreadyHeld(*held);
        }

        match claimed {
            Some(serial) if (1..=self.expected_count).contains(&serial) => {
                match self.slots.get(&serial) {
                    None => {
                        self.slots.insert(serial, identity_id.to_string());
                        self.by_identity.insert(identity_id.to_string(), serial);
                        self.backlog.retain(|id| id != identity_id);
                        ClaimOutcome::Assigned(serial)
                    }
                    Some(holder) => ClaimOutcome::Collision {
                        serial,
                        holder: holder.clone(),
                    },
                }
            }
            _ => {
                if !self.backlog.iter().any(|id| id == identity_id) {
                    self.backlog.push(identity_id.to_string());
                }
                ClaimOutcome::Deferred
            }
        }
    }

    /// Slots in `1..=expected_count` with no holder, ascending.
    pub fn free_slots(&self) -> Vec<u32> {
        (1..=self.expected_count)
            .filter(|s| !self.slots.contains_key(s))
            .collect()
    }

    /// Close the booth: offer free slots, ascending, to the backlog in
    /// first-observed order. What remains on either side is reported, not
    /// papered over. Idempotent; a second close reports nothing new.
    pub fn close(&mut self) -> CloseReport {
        if self.closed {
            return CloseReport::default();
        }
        self.closed = true;

        let mut report = CloseReport::default();
        let mut queue: VecDeque<String> = std::mem::take(&mut self.backlog).into();

        for serial in self.free_slots() {
            match queue.pop_front() {
                Some(identity_id) => {
                    self.slots.insert(serial, identity_id.clone());
                    self.by_identity.insert(identity_id.clone(), serial);
                    report.assigned.push((identity_id, serial));
                }
                None => report.gaps.push(serial),
            }
        }

        report.unplaceable = queue.into_iter().collect();
        report
    }
}

// ============================================================================
// TESTS
// ============================================================================

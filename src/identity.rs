// Identity Resolver - canonical identity per voter
// An identity code either attaches to the voter already holding it, creates
// a new voter, or flags a cross-booth dispute. Records without an identity
// are never fabricated one from page position: they wait in a holding set
// keyed by (ward, booth, claimed serial) until some batch supplies the
// identity for that key.

use crate::records::{BoothKey, CanonicalVoter, NormalizedRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a normalized record resolves against the canonical store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Identity already canonical in the claimed booth.
    Attach { identity_id: String },
    /// Identity unseen anywhere; a new canonical voter is warranted.
    Create { identity_id: String },
    /// Identity canonical in a *different* booth. Ambiguous cross-booth
    /// duplicate - a conflict, never an automatic attach or move.
    CrossBooth {
        identity_id: String,
        registered: BoothKey,
        claimed: BoothKey,
    },
    /// No identity signal. Held, not guessed.
    Pending,
}

/// Resolve one record against the running identity index (the canonical
/// store keyed by identity). Pure lookup; all mutation stays in the engine.
pub fn resolve_identity(
    voters: &BTreeMap<String, CanonicalVoter>,
    record: &NormalizedRecord,
    batch_booth: BoothKey,
) -> Resolution {
    let identity_id = match &record.identity_id {
        Some(id) => id.clone(),
        None => return Resolution::Pending,
    };

    let claimed = record.claimed_booth(batch_booth);
    match voters.get(&identity_id) {
        None => Resolution::Create { identity_id },
        Some(existing) => {
            let registered = existing.booth_key();
            if registered == claimed {
                Resolution::Attach { identity_id }
            } else {
                Resolution::CrossBooth {
                    identity_id,
                    registered,
                    claimed,
                }
            }
        }
    }
}

// ============================================================================
// PENDING-IDENTITY HOLDING SET
// ============================================================================

/// Key for identity-less records that at least carried a claimed serial.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PendingKey {
    pub ward: u32,
    pub booth: u32,
    pub serial: u32,
}

impl PendingKey {
    pub fn new(booth: BoothKey, serial: u32) -> Self {
        PendingKey {
            ward: booth.ward,
            booth: booth.booth,
            serial,
        }
    }

    pub fn booth_key(&self) -> BoothKey {
        BoothKey {
            ward: self.ward,
            booth: self.booth,
        }
    }
}

/// Holding set for records whose identity signal is absent. Keyed entries
/// can be promoted when an identity later claims the same key; unkeyed
/// entries (no identity *and* no serial) can only surface in the audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingIndex {
    keyed: BTreeMap<PendingKey, Vec<NormalizedRecord>>,
    /// Records with neither identity nor serial, tagged with the booth of
    /// the page they came from (nothing else can place them).
    unkeyed: Vec<(BoothKey, NormalizedRecord)>,
}

impl PendingIndex {
    pub fn new() -> Self {
        PendingIndex::default()
    }

    pub fn push(&mut self, key: PendingKey, record: NormalizedRecord) {
        self.keyed.entry(key).or_default().push(record);
    }

    pub fn push_unkeyed(&mut self, booth: BoothKey, record: NormalizedRecord) {
        self.unkeyed.push((booth, record));
    }

    /// Remove and return every record held under a key, in arrival order.
    pub fn take(&mut self, key: PendingKey) -> Vec<NormalizedRecord> {
        self.keyed.remove(&key).unwrap_or_default()
    }

    pub fn unresolved_count(&self) -> usize {
        self.keyed.values().map(Vec::len).sum::<usize>() + self.unkeyed.len()
    }

    pub fn unresolved_for_booth(&self, booth: BoothKey) -> usize {
        let keyed: usize = self
            .keyed
            .iter()
            .filter(|(k, _)| k.booth_key() == booth)
            .map(|(_, v)| v.len())
            .sum();
        let unkeyed = self.unkeyed.iter().filter(|(b, _)| *b == booth).count();
        keyed + unkeyed
    }

    pub fn is_empty(&self) -> bool {
        self.keyed.is_empty() && self.unkeyed.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Locator, SourceConfidence};

    fn record(id: Option<&str>, locator: Option<Locator>) -> NormalizedRecord {
        NormalizedRecord {
            identity_id: id.map(|s| s.to_string()),
            name: None,
            age: None,
            gender: None,
            relation_role: None,
            relation_name: None,
            house_number: None,
            locator,
            claimed_serial: Some(5),
            source_batch: "pass-1".to_string(),
            confidence: SourceConfidence::Extracted,
            line: 1,
        }
    }

    fn store_with(id: &str, ward: u32, booth: u32) -> BTreeMap<String, CanonicalVoter> {
        let mut voters = BTreeMap::new();
        voters.insert(
            id.to_string(),
            CanonicalVoter::new(id, Locator::new(ward, booth)),
        );
        voters
    }

    #[test]
    fn test_resolve_create_when_unknown() {
        let voters = BTreeMap::new();
        let rec = record(Some("XUA1234567"), None);
        assert_eq!(
            resolve_identity(&voters, &rec, BoothKey::new(245, 12)),
            Resolution::Create {
                identity_id: "XUA1234567".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_attach_same_booth() {
        let voters = store_with("XUA1234567", 245, 12);
        let rec = record(Some("XUA1234567"), None);
        assert_eq!(
            resolve_identity(&voters, &rec, BoothKey::new(245, 12)),
            Resolution::Attach {
                identity_id: "XUA1234567".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_cross_booth_is_conflict_not_attach() {
        let voters = store_with("XUA1234567", 245, 12);
        // Same identity, but this candidate's own locator names booth 13
        let rec = record(Some("XUA1234567"), Some(Locator::new(245, 13)));
        assert_eq!(
            resolve_identity(&voters, &rec, BoothKey::new(245, 12)),
            Resolution::CrossBooth {
                identity_id: "XUA1234567".to_string(),
                registered: BoothKey::new(245, 12),
                claimed: BoothKey::new(245, 13),
            }
        );
    }

    #[test]
    fn test_resolve_pending_without_identity() {
        let voters = store_with("XUA1234567", 245, 12);
        let rec = record(None, None);
        assert_eq!(
            resolve_identity(&voters, &rec, BoothKey::new(245, 12)),
            Resolution::Pending
        );
    }

    #[test]
    fn test_pending_take_preserves_arrival_order() {
        let mut pending = PendingIndex::new();
        let key = PendingKey::new(BoothKey::new(245, 12), 5);

        let mut first = record(None, None);
        first.source_batch = "pass-1".to_string();
        let mut second = record(None, None);
        second.source_batch = "pass-2".to_string();

        pending.push(key, first);
        pending.push(key, second);
        assert_eq!(pending.unresolved_count(), 2);

        let taken = pending.take(key);
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].source_batch, "pass-1");
        assert_eq!(taken[1].source_batch, "pass-2");
        assert!(pending.is_empty());
        assert!(pending.take(key).is_empty());
    }

    #[test]
    fn test_unkeyed_records_only_counted() {
        let mut pending = PendingIndex::new();
        let mut rec = record(None, None);
        rec.claimed_serial = None;
        let booth = BoothKey::new(245, 12);
        pending.push_unkeyed(booth, rec);

        assert_eq!(pending.unresolved_count(), 1);
        assert_eq!(pending.unresolved_for_booth(booth), 1);
        assert_eq!(pending.unresolved_for_booth(BoothKey::new(245, 13)), 0);
    }
}

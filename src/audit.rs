// ✅ Data Quality Auditor - completeness and validity statistics
// Read-only pass over the final canonical set per booth. Produces the
// go/no-go summary consulted before a dataset is declared final.

use crate::conflict::ConflictLog;
use crate::identity::PendingIndex;
use crate::records::{BoothConfig, BoothKey, CanonicalVoter, FieldQuality, CORE_FIELDS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// FIELD COVERAGE
// ============================================================================

/// Per-field counts of missing / extracted / verified values in one booth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCoverage {
    pub missing: usize,
    pub extracted: usize,
    pub verified: usize,
}

impl FieldCoverage {
    pub fn total(&self) -> usize {
        self.missing + self.extracted + self.verified
    }

    pub fn present_pct(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        (self.extracted + self.verified) as f64 / self.total() as f64 * 100.0
    }

    fn record(&mut self, quality: FieldQuality) {
        match quality {
            FieldQuality::Missing => self.missing += 1,
            FieldQuality::Extracted => self.extracted += 1,
            FieldQuality::Verified => self.verified += 1,
        }
    }
}

// ============================================================================
// BOOTH AUDIT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoothAudit {
    pub ward: u32,
    pub booth: u32,
    pub expected_count: u32,
    pub voter_count: usize,
    /// Voters with every core field present.
    pub complete_count: usize,
    pub field_coverage: BTreeMap<String, FieldCoverage>,
    /// Expected serial slots never filled, from the serial assigner's
    /// close report (via the conflict log).
    pub gaps: Vec<u32>,
    /// Identity-less records still held for this booth.
    pub unresolved_pending: usize,
    pub conflict_count: usize,
    /// Serial set of placed voters equals exactly 1..=expected_count.
    pub serial_coverage_ok: bool,
}

impl BoothAudit {
    pub fn booth_key(&self) -> BoothKey {
        BoothKey {
            ward: self.ward,
            booth: self.booth,
        }
    }

    pub fn completeness_pct(&self) -> f64 {
        if self.voter_count == 0 {
            return 0.0;
        }
        self.complete_count as f64 / self.voter_count as f64 * 100.0
    }

    /// Go/no-go gate: a booth is final only when its serial range is fully
    /// covered and nothing is left for manual review.
    pub fn is_final(&self) -> bool {
        self.serial_coverage_ok
            && self.gaps.is_empty()
            && self.conflict_count == 0
            && self.unresolved_pending == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {}/{} voters ({:.1}% complete), {} gaps, {} pending, {} conflicts{}",
            self.booth_key(),
            self.voter_count,
            self.expected_count,
            self.completeness_pct(),
            self.gaps.len(),
            self.unresolved_pending,
            self.conflict_count,
            if self.is_final() { " [FINAL]" } else { "" },
        )
    }
}

// ============================================================================
// ROLL AUDIT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollAudit {
    pub booths: Vec<BoothAudit>,
    pub total_voters: usize,
    pub total_conflicts: usize,
    pub total_pending: usize,
}

impl RollAudit {
    pub fn is_final(&self) -> bool {
        self.booths.iter().all(|b| b.is_final())
    }

    pub fn booth(&self, key: BoothKey) -> Option<&BoothAudit> {
        self.booths.iter().find(|b| b.booth_key() == key)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} booths, {} voters, {} conflicts, {} pending - {}",
            self.booths.len(),
            self.total_voters,
            self.total_conflicts,
            self.total_pending,
            if self.is_final() {
                "FINAL"
            } else {
                "NOT FINAL"
            },
        )
    }
}

// ============================================================================
// AUDITOR
// ============================================================================

pub struct RollAuditor;

impl RollAuditor {
    pub fn new() -> Self {
        RollAuditor
    }

    /// Audit the canonical set against booth configuration. Pure read-only;
    /// gap detection itself belongs to the serial assigner and arrives here
    /// through the conflict log.
    pub fn audit(
        &self,
        voters: &BTreeMap<String, CanonicalVoter>,
        conflicts: &ConflictLog,
        pending: &PendingIndex,
        configs: &HashMap<BoothKey, BoothConfig>,
    ) -> RollAudit {
        let mut keys: Vec<BoothKey> = configs.keys().copied().collect();
        keys.sort();

        let booths: Vec<BoothAudit> = keys
            .into_iter()
            .map(|key| self.audit_booth(key, configs[&key], voters, conflicts, pending))
            .collect();

        RollAudit {
            total_voters: voters.len(),
            total_conflicts: conflicts.len(),
            total_pending: pending.unresolved_count(),
            booths,
        }
    }

    fn audit_booth(
        &self,
        key: BoothKey,
        config: BoothConfig,
        voters: &BTreeMap<String, CanonicalVoter>,
        conflicts: &ConflictLog,
        pending: &PendingIndex,
    ) -> BoothAudit {
        let booth_voters: Vec<&CanonicalVoter> = voters
            .values()
            .filter(|v| v.booth_key() == key)
            .collect();

        let mut field_coverage: BTreeMap<String, FieldCoverage> = CORE_FIELDS
            .iter()
            .map(|f| (f.to_string(), FieldCoverage::default()))
            .collect();
        for voter in &booth_voters {
            for field in CORE_FIELDS {
                if let Some(cov) = field_coverage.get_mut(field) {
                    cov.record(voter.quality_of(field));
                }
            }
        }

        let complete_count = booth_voters.iter().filter(|v| v.is_complete()).count();

        // Cross-check the serial set against 1..=expected_count.
        let mut serials: Vec<u32> = booth_voters.iter().filter_map(|v| v.serial).collect();
        serials.sort_unstable();
        serials.dedup();
        let serial_coverage_ok = serials.len() == booth_voters.len()
            && serials.len() as u32 == config.expected_count
            && serials
                .iter()
                .zip(1..=config.expected_count)
                .all(|(&s, want)| s == want);

        BoothAudit {
            ward: key.ward,
            booth: key.booth,
            expected_count: config.expected_count,
            voter_count: booth_voters.len(),
            complete_count,
            field_coverage,
            gaps: conflicts.gaps_for_booth(key),
            unresolved_pending: pending.unresolved_for_booth(key),
            conflict_count: conflicts.for_booth(key).len(),
            serial_coverage_ok,
        }
    }
}

impl Default for RollAuditor {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictRecord;
    use crate::records::{Gender, Locator, RelationRole, SourceConfidence};

    fn complete_voter(id: &str, serial: u32) -> CanonicalVoter {
        let mut v = CanonicalVoter::new(id, Locator::new(245, 12));
        v.serial = Some(serial);
        v.name = Some("रमेश".to_string());
        v.age = Some(45);
        v.gender = Some(Gender::M);
        v.relation_role = Some(RelationRole::Father);
        v.relation_name = Some("सुरेश".to_string());
        v.house_number = Some("14B".to_string());
        for field in CORE_FIELDS {
            v.field_quality
                .insert(field.to_string(), FieldQuality::Extracted);
        }
        v.provenance.push("pass-1".to_string());
        v
    }

    fn configs(expected: u32) -> HashMap<BoothKey, BoothConfig> {
        let mut m = HashMap::new();
        m.insert(BoothKey::new(245, 12), BoothConfig::new(expected));
        m
    }

    #[test]
    fn test_final_booth() {
        let mut voters = BTreeMap::new();
        for serial in 1..=3u32 {
            let id = format!("XUA{:07}", serial);
            voters.insert(id.clone(), complete_voter(&id, serial));
        }

        let audit = RollAuditor::new().audit(
            &voters,
            &ConflictLog::new(),
            &PendingIndex::new(),
            &configs(3),
        );

        assert_eq!(audit.booths.len(), 1);
        let booth = &audit.booths[0];
        assert_eq!(booth.voter_count, 3);
        assert_eq!(booth.complete_count, 3);
        assert!(booth.serial_coverage_ok);
        assert!(booth.is_final());
        assert!(audit.is_final());

        let name_cov = &booth.field_coverage["name"];
        assert_eq!(name_cov.extracted, 3);
        assert_eq!(name_cov.missing, 0);
        assert!((name_cov.present_pct() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_incomplete_fields_counted() {
        let mut voters = BTreeMap::new();
        let mut v = complete_voter("XUA0000001", 1);
        v.age = None;
        v.field_quality.remove("age");
        voters.insert(v.identity_id.clone(), v);

        let audit = RollAuditor::new().audit(
            &voters,
            &ConflictLog::new(),
            &PendingIndex::new(),
            &configs(1),
        );

        let booth = &audit.booths[0];
        assert_eq!(booth.complete_count, 0);
        assert_eq!(booth.field_coverage["age"].missing, 1);
        assert_eq!(booth.field_coverage["name"].extracted, 1);
        // Serial range is still covered; missing demographics alone do not
        // block finality.
        assert!(booth.serial_coverage_ok);
        assert!(booth.is_final());
        assert!((booth.completeness_pct() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_gaps_and_conflicts_block_finality() {
        let mut voters = BTreeMap::new();
        voters.insert(
            "XUA0000001".to_string(),
            complete_voter("XUA0000001", 1),
        );

        let key = BoothKey::new(245, 12);
        let mut conflicts = ConflictLog::new();
        conflicts.push(ConflictRecord::structural_gap(key, 2));

        let audit = RollAuditor::new().audit(
            &voters,
            &conflicts,
            &PendingIndex::new(),
            &configs(2),
        );

        let booth = &audit.booths[0];
        assert_eq!(booth.gaps, vec![2]);
        assert!(!booth.serial_coverage_ok);
        assert!(!booth.is_final());
        assert!(!audit.is_final());
    }

    #[test]
    fn test_pending_counts_as_incomplete() {
        // A record with no identity signal anywhere stays pending and is
        // counted by the auditor, never guessed into existence.
        let mut voters = BTreeMap::new();
        voters.insert(
            "XUA0000001".to_string(),
            complete_voter("XUA0000001", 1),
        );

        let mut pending = PendingIndex::new();
        pending.push_unkeyed(
            BoothKey::new(245, 12),
            crate::records::NormalizedRecord {
                identity_id: None,
                name: Some("अनाम".to_string()),
                age: None,
                gender: None,
                relation_role: None,
                relation_name: None,
                house_number: None,
                locator: None,
                claimed_serial: None,
                source_batch: "pass-1".to_string(),
                confidence: SourceConfidence::Extracted,
                line: 9,
            },
        );

        let audit =
            RollAuditor::new().audit(&voters, &ConflictLog::new(), &pending, &configs(1));

        let booth = &audit.booths[0];
        assert_eq!(booth.voter_count, 1); // excluded from the canonical set
        assert_eq!(booth.unresolved_pending, 1);
        assert!(!booth.is_final());
        assert_eq!(audit.total_pending, 1);
    }
}

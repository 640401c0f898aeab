// ⚖️ Merge Engine - combine observations of one voter
// Field-level precedence, applied independently per field (the relation
// role+name pair moves as a unit). Idempotent, and monotonic across
// confidence tiers: a verified value is never clobbered by a lower tier.

use crate::records::{CanonicalVoter, FieldQuality, NormalizedRecord, SourceConfidence};

/// What a merge changed, for receipts and event logging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub changed_fields: Vec<&'static str>,
}

impl MergeOutcome {
    pub fn is_noop(&self) -> bool {
        self.changed_fields.is_empty()
    }
}

// ============================================================================
// PRECEDENCE
// ============================================================================

/// Does an incoming present value replace the current present value?
///
/// 1. Higher quality always wins; lower quality never does.
/// 2. At equal quality, the batch with higher declared confidence wins.
/// 3. Remaining ties keep the first-seen value.
fn replaces(
    current_quality: FieldQuality,
    current_confidence: SourceConfidence,
    incoming_quality: FieldQuality,
    incoming_confidence: SourceConfidence,
) -> bool {
    if incoming_quality != current_quality {
        return incoming_quality > current_quality;
    }
    incoming_confidence > current_confidence
}

/// Merge one scalar field. A present value always beats an absent one;
/// otherwise precedence decides. Upgrading quality on an identical value
/// (a verified pass confirming an extracted one) is recorded too.
fn merge_field<T: Clone + PartialEq>(
    field: &'static str,
    current: &mut Option<T>,
    voter_quality: &mut std::collections::BTreeMap<String, FieldQuality>,
    voter_confidence: &mut std::collections::BTreeMap<String, SourceConfidence>,
    incoming: &Option<T>,
    incoming_quality: FieldQuality,
    incoming_confidence: SourceConfidence,
    outcome: &mut MergeOutcome,
) {
    let incoming_value = match incoming {
        Some(v) => v,
        None => return, // absent never wins
    };

    let current_quality = voter_quality
        .get(field)
        .copied()
        .unwrap_or(FieldQuality::Missing);
    let current_confidence = voter_confidence
        .get(field)
        .copied()
        .unwrap_or(SourceConfidence::Placeholder);

    let take = match current {
        None => true,
        Some(_) => replaces(
            current_quality,
            current_confidence,
            incoming_quality,
            incoming_confidence,
        ),
    };

    if take {
        let value_changed = current.as_ref() != Some(incoming_value);
        let tags_changed =
            current_quality != incoming_quality || current_confidence != incoming_confidence;
        *current = Some(incoming_value.clone());
        voter_quality.insert(field.to_string(), incoming_quality);
        voter_confidence.insert(field.to_string(), incoming_confidence);
        if value_changed || tags_changed {
            outcome.changed_fields.push(field);
        }
    }
}

// ============================================================================
// MERGE
// ============================================================================

/// Merge a normalized record into its canonical voter. The record must
/// already be resolved to this identity; the merge never touches
/// `identity_id`, `serial`, or booth placement.
pub fn merge_candidate(voter: &mut CanonicalVoter, record: &NormalizedRecord) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    let quality = record.incoming_quality();
    let confidence = record.confidence;

    merge_field(
        "name",
        &mut voter.name,
        &mut voter.field_quality,
        &mut voter.field_confidence,
        &record.name,
        quality,
        confidence,
        &mut outcome,
    );
    merge_field(
        "age",
        &mut voter.age,
        &mut voter.field_quality,
        &mut voter.field_confidence,
        &record.age,
        quality,
        confidence,
        &mut outcome,
    );
    merge_field(
        "gender",
        &mut voter.gender,
        &mut voter.field_quality,
        &mut voter.field_confidence,
        &record.gender,
        quality,
        confidence,
        &mut outcome,
    );
    merge_field(
        "house_number",
        &mut voter.house_number,
        &mut voter.field_quality,
        &mut voter.field_confidence,
        &record.house_number,
        quality,
        confidence,
        &mut outcome,
    );

    merge_relation_pair(voter, record, quality, confidence, &mut outcome);

    if !voter.provenance.contains(&record.source_batch) {
        voter.provenance.push(record.source_batch.clone());
    }

    outcome
}

/// The relation role and name are one logical field: a name must not end up
/// attached to a previously recorded but different role. The pair replaces
/// the pair, under the same precedence as any scalar field.
fn merge_relation_pair(
    voter: &mut CanonicalVoter,
    record: &NormalizedRecord,
    incoming_quality: FieldQuality,
    incoming_confidence: SourceConfidence,
    outcome: &mut MergeOutcome,
) {
    if record.relation_role.is_none() && record.relation_name.is_none() {
        return;
    }

    let current_quality = voter.quality_of("relation");
    let current_confidence = voter.confidence_of("relation");
    let current_present = voter.relation_role.is_some() || voter.relation_name.is_some();

    let take = if !current_present {
        true
    } else {
        replaces(
            current_quality,
            current_confidence,
            incoming_quality,
            incoming_confidence,
        )
    };

    if take {
        let value_changed = voter.relation_role != record.relation_role
            || voter.relation_name != record.relation_name;
        let tags_changed =
            current_quality != incoming_quality || current_confidence != incoming_confidence;
        voter.relation_role = record.relation_role;
        voter.relation_name = record.relation_name.clone();
        voter
            .field_quality
            .insert("relation".to_string(), incoming_quality);
        voter
            .field_confidence
            .insert("relation".to_string(), incoming_confidence);
        if value_changed || tags_changed {
            outcome.changed_fields.push("relation");
        }
    }
}

/// Create a fresh canonical voter from its first resolved observation.
pub fn voter_from_record(
    identity_id: &str,
    locator: crate::records::Locator,
    record: &NormalizedRecord,
) -> CanonicalVoter {
    let mut voter = CanonicalVoter::new(identity_id, locator);
    merge_candidate(&mut voter, record);
    voter
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Gender, Locator, RelationRole};

    fn record(batch: &str, confidence: SourceConfidence) -> NormalizedRecord {
        NormalizedRecord {
            identity_id: Some("XUA1234567".to_string()),
            name: None,
            age: None,
            gender: None,
            relation_role: None,
            relation_name: None,
            house_number: None,
            locator: None,
            claimed_serial: None,
            source_batch: batch.to_string(),
            confidence,
            line: 1,
        }
    }

    #[test]
    fn test_present_beats_absent() {
        let mut voter = CanonicalVoter::new("XUA1234567", Locator::new(245, 12));
        let mut rec = record("pass-1", SourceConfidence::Extracted);
        rec.name = Some("रमेश".to_string());

        let outcome = merge_candidate(&mut voter, &rec);
        assert_eq!(voter.name.as_deref(), Some("रमेश"));
        assert_eq!(voter.quality_of("name"), FieldQuality::Extracted);
        assert!(outcome.changed_fields.contains(&"name"));
        // Fields the record did not carry stay missing
        assert_eq!(voter.quality_of("age"), FieldQuality::Missing);
    }

    #[test]
    fn test_verified_beats_extracted() {
        // Scenario: A extracted name "रमेश", B verified "रमेश कुलकर्णी" + age
        let mut voter = CanonicalVoter::new("XUA1234567", Locator::new(245, 12));

        let mut a = record("pass-1", SourceConfidence::Extracted);
        a.name = Some("रमेश".to_string());
        merge_candidate(&mut voter, &a);

        let mut b = record("pass-2", SourceConfidence::Verified);
        b.name = Some("रमेश कुलकर्णी".to_string());
        b.age = Some(45);
        merge_candidate(&mut voter, &b);

        assert_eq!(voter.name.as_deref(), Some("रमेश कुलकर्णी"));
        assert_eq!(voter.age, Some(45));
        assert_eq!(voter.quality_of("name"), FieldQuality::Verified);
        assert_eq!(voter.provenance, vec!["pass-1", "pass-2"]);
    }

    #[test]
    fn test_verified_never_clobbered() {
        // Precedence monotonicity: once verified, an extracted candidate
        // changes nothing, regardless of arrival order.
        let mut voter = CanonicalVoter::new("XUA1234567", Locator::new(245, 12));

        let mut verified = record("pass-1", SourceConfidence::Verified);
        verified.name = Some("रमेश कुलकर्णी".to_string());
        merge_candidate(&mut voter, &verified);

        let mut extracted = record("pass-2", SourceConfidence::Extracted);
        extracted.name = Some("रमश".to_string()); // OCR-mangled
        let outcome = merge_candidate(&mut voter, &extracted);

        assert_eq!(voter.name.as_deref(), Some("रमेश कुलकर्णी"));
        assert!(!outcome.changed_fields.contains(&"name"));
        assert_eq!(voter.quality_of("name"), FieldQuality::Verified);
    }

    #[test]
    fn test_equal_quality_higher_confidence_wins() {
        // Placeholder and extracted batches both carry Extracted-tier
        // fields; the declared confidence breaks the tie.
        let mut voter = CanonicalVoter::new("XUA1234567", Locator::new(245, 12));

        let mut placeholder = record("pass-0", SourceConfidence::Placeholder);
        placeholder.house_number = Some("l4B".to_string());
        merge_candidate(&mut voter, &placeholder);

        let mut extracted = record("pass-1", SourceConfidence::Extracted);
        extracted.house_number = Some("14B".to_string());
        merge_candidate(&mut voter, &extracted);

        assert_eq!(voter.house_number.as_deref(), Some("14B"));

        // And the reverse order ends identically: the placeholder batch
        // cannot take the field back.
        let replay = merge_candidate(&mut voter, &placeholder);
        assert!(replay.is_noop());
        assert_eq!(voter.house_number.as_deref(), Some("14B"));
    }

    #[test]
    fn test_equal_tie_keeps_first_seen() {
        let mut voter = CanonicalVoter::new("XUA1234567", Locator::new(245, 12));

        let mut first = record("pass-1", SourceConfidence::Extracted);
        first.name = Some("रमेश".to_string());
        merge_candidate(&mut voter, &first);

        let mut second = record("pass-2", SourceConfidence::Extracted);
        second.name = Some("रमेष".to_string());
        let outcome = merge_candidate(&mut voter, &second);

        assert_eq!(voter.name.as_deref(), Some("रमेश"));
        assert!(!outcome.changed_fields.contains(&"name"));
        // The losing batch still contributed provenance
        assert_eq!(voter.provenance, vec!["pass-1", "pass-2"]);
    }

    #[test]
    fn test_merge_idempotence() {
        let mut rec = record("pass-1", SourceConfidence::Extracted);
        rec.name = Some("रमेश".to_string());
        rec.age = Some(45);
        rec.gender = Some(Gender::M);
        rec.relation_role = Some(RelationRole::Father);
        rec.relation_name = Some("सुरेश".to_string());
        rec.house_number = Some("14B".to_string());

        let mut once = CanonicalVoter::new("XUA1234567", Locator::new(245, 12));
        merge_candidate(&mut once, &rec);

        let mut twice = once.clone();
        let outcome = merge_candidate(&mut twice, &rec);

        assert!(outcome.is_noop());
        // Byte-identical, not just logically equal
        assert_eq!(
            serde_json::to_string(&once).unwrap(),
            serde_json::to_string(&twice).unwrap()
        );
    }

    #[test]
    fn test_relation_merges_as_pair() {
        let mut voter = CanonicalVoter::new("XUA1234567", Locator::new(245, 12));

        let mut first = record("pass-1", SourceConfidence::Extracted);
        first.relation_role = Some(RelationRole::Father);
        first.relation_name = Some("सुरेश".to_string());
        merge_candidate(&mut voter, &first);

        // A verified pass says the relation is the husband, with a name.
        // The pair replaces the pair: the old father-name must not linger
        // under the new role.
        let mut second = record("pass-2", SourceConfidence::Verified);
        second.relation_role = Some(RelationRole::Husband);
        second.relation_name = Some("विजय".to_string());
        merge_candidate(&mut voter, &second);

        assert_eq!(voter.relation_role, Some(RelationRole::Husband));
        assert_eq!(voter.relation_name.as_deref(), Some("विजय"));

        // An extracted pass carrying only a role cannot split the pair
        let mut third = record("pass-3", SourceConfidence::Extracted);
        third.relation_role = Some(RelationRole::Father);
        let outcome = merge_candidate(&mut voter, &third);
        assert!(!outcome.changed_fields.contains(&"relation"));
        assert_eq!(voter.relation_role, Some(RelationRole::Husband));
        assert_eq!(voter.relation_name.as_deref(), Some("विजय"));
    }

    #[test]
    fn test_voter_from_record() {
        let mut rec = record("pass-1", SourceConfidence::Verified);
        rec.name = Some("रमेश कुलकर्णी".to_string());
        rec.age = Some(45);

        let voter = voter_from_record("XUA1234567", Locator::new(245, 12), &rec);
        assert_eq!(voter.identity_id, "XUA1234567");
        assert_eq!(voter.ward, 245);
        assert_eq!(voter.booth, 12);
        assert_eq!(voter.name.as_deref(), Some("रमेश कुलकर्णी"));
        assert_eq!(voter.quality_of("name"), FieldQuality::Verified);
        assert_eq!(voter.serial, None);
        assert_eq!(voter.provenance, vec!["pass-1"]);
    }
}

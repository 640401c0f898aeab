// Record Model - Core data types for electoral roll reconciliation
// Raw candidates come from upstream extraction passes; canonical voters
// are the durable merged entities.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// CONFIDENCE & QUALITY
// ============================================================================

/// Declared confidence of an extraction batch.
///
/// Ordered: a `verified` batch outranks an `extracted` one, which outranks a
/// `placeholder` pass. Variant order is load-bearing for merge precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceConfidence {
    Placeholder,
    Extracted,
    Verified,
}

impl SourceConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceConfidence::Placeholder => "placeholder",
            SourceConfidence::Extracted => "extracted",
            SourceConfidence::Verified => "verified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "placeholder" => Some(SourceConfidence::Placeholder),
            "extracted" => Some(SourceConfidence::Extracted),
            "verified" => Some(SourceConfidence::Verified),
            _ => None,
        }
    }
}

/// Per-field quality on a canonical voter.
///
/// Ordered: `Missing < Extracted < Verified`. A verified field is never
/// overwritten by a lower-quality candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldQuality {
    Missing,
    Extracted,
    Verified,
}

impl FieldQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldQuality::Missing => "missing",
            FieldQuality::Extracted => "extracted",
            FieldQuality::Verified => "verified",
        }
    }
}

// ============================================================================
// CLOSED DEMOGRAPHIC ENUMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    M,
    F,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::M => "M",
            Gender::F => "F",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "M" => Some(Gender::M),
            "F" => Some(Gender::F),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationRole {
    Father,
    Husband,
    Mother,
    Other,
}

impl RelationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationRole::Father => "father",
            RelationRole::Husband => "husband",
            RelationRole::Mother => "mother",
            RelationRole::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "father" => Some(RelationRole::Father),
            "husband" => Some(RelationRole::Husband),
            "mother" => Some(RelationRole::Mother),
            "other" => Some(RelationRole::Other),
            _ => None,
        }
    }
}

// ============================================================================
// LOCATOR (ward / booth / sub-unit)
// ============================================================================

/// Administrative subdivision a record belongs to: `ward/booth[/sub]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub ward: u32,
    pub booth: u32,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_unit: Option<u32>,
}

impl Locator {
    pub fn new(ward: u32, booth: u32) -> Self {
        Locator {
            ward,
            booth,
            sub_unit: None,
        }
    }

    pub fn booth_key(&self) -> BoothKey {
        BoothKey {
            ward: self.ward,
            booth: self.booth,
        }
    }

    /// Parse an ASCII `ward/booth[/sub]` code. Script conversion is the
    /// normalizer's job; this expects Latin digits only.
    pub fn parse(code: &str) -> Option<Self> {
        let mut parts = code.trim().split('/');
        let ward: u32 = parts.next()?.trim().parse().ok()?;
        let booth: u32 = parts.next()?.trim().parse().ok()?;
        let sub_unit = match parts.next() {
            Some(p) => Some(p.trim().parse().ok()?),
            None => None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Locator {
            ward,
            booth,
            sub_unit,
        })
    }

    pub fn code(&self) -> String {
        match self.sub_unit {
            Some(sub) => format!("{}/{}/{}", self.ward, self.booth, sub),
            None => format!("{}/{}", self.ward, self.booth),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Index key for per-booth state: `(ward, booth)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BoothKey {
    pub ward: u32,
    pub booth: u32,
}

impl BoothKey {
    pub fn new(ward: u32, booth: u32) -> Self {
        BoothKey { ward, booth }
    }
}

impl fmt::Display for BoothKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ward {} / booth {}", self.ward, self.booth)
    }
}

// ============================================================================
// RAW CANDIDATE & BATCH
// ============================================================================

/// One unvalidated observation of a voter, as produced by an extraction
/// pass. Every field may be absent, mis-scripted, or bleed label text from
/// a neighboring field; the normalizer sorts that out. Ephemeral: consumed
/// and discarded once normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    #[serde(default)]
    pub identity_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Raw digits, possibly Devanagari.
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub gender_token: Option<String>,
    #[serde(default)]
    pub relation_role: Option<String>,
    #[serde(default)]
    pub relation_name: Option<String>,
    #[serde(default)]
    pub house_number: Option<String>,
    /// Raw `ward/booth[/sub]` code, possibly Devanagari digits.
    #[serde(default)]
    pub locator_code: Option<String>,
    #[serde(default)]
    pub claimed_serial: Option<String>,
    /// Line on the source page, for provenance.
    #[serde(default)]
    pub line: usize,
}

impl RawCandidate {
    pub fn with_identity(mut self, id: &str) -> Self {
        self.identity_id = Some(id.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_serial(mut self, serial: &str) -> Self {
        self.claimed_serial = Some(serial.to_string());
        self
    }
}

/// One extraction pass over one page, tagged with its declared confidence
/// and the page's locator. Candidates inherit the batch locator unless they
/// carry their own `locator_code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub confidence: SourceConfidence,
    pub locator: Locator,
    pub candidates: Vec<RawCandidate>,
}

impl Batch {
    pub fn new(id: &str, confidence: SourceConfidence, locator: Locator) -> Self {
        Batch {
            id: id.to_string(),
            confidence,
            locator,
            candidates: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Content fingerprint, recorded in the audit trail so a replayed batch
    /// can be told apart from a renamed one.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.confidence.as_str().as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.locator.code().as_bytes());
        for c in &self.candidates {
            for field in [
                &c.identity_id,
                &c.name,
                &c.age,
                &c.gender_token,
                &c.relation_role,
                &c.relation_name,
                &c.house_number,
                &c.locator_code,
                &c.claimed_serial,
            ] {
                hasher.update([0x1f]);
                if let Some(v) = field {
                    hasher.update(v.as_bytes());
                }
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// NORMALIZED RECORD
// ============================================================================

/// A candidate after field canonicalization: Latin digits only, closed
/// enums, validated identity code. Never persisted standalone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub identity_id: Option<String>,
    pub name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub relation_role: Option<RelationRole>,
    pub relation_name: Option<String>,
    pub house_number: Option<String>,
    pub locator: Option<Locator>,
    pub claimed_serial: Option<u32>,
    pub source_batch: String,
    pub confidence: SourceConfidence,
    pub line: usize,
}

impl NormalizedRecord {
    /// The booth this record claims: its own locator if present, the
    /// batch's page locator otherwise.
    pub fn claimed_booth(&self, batch_booth: BoothKey) -> BoothKey {
        self.locator.map(|l| l.booth_key()).unwrap_or(batch_booth)
    }

    /// Quality tier this record's present fields carry into a merge.
    pub fn incoming_quality(&self) -> FieldQuality {
        match self.confidence {
            SourceConfidence::Verified => FieldQuality::Verified,
            _ => FieldQuality::Extracted,
        }
    }
}

// ============================================================================
// CANONICAL VOTER
// ============================================================================

/// Core fields the auditor requires for a voter to count as "complete".
/// `relation` covers the role+name pair, which merges as a unit.
pub const CORE_FIELDS: [&str; 5] = ["name", "age", "gender", "relation", "house_number"];

/// The single authoritative, merged representation of one voter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalVoter {
    /// Globally unique, immutable once assigned.
    pub identity_id: String,
    pub ward: u32,
    pub booth: u32,
    /// Unique within `(ward, booth)`; absent while backlogged or conflicted.
    pub serial: Option<u32>,
    pub name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub relation_role: Option<RelationRole>,
    pub relation_name: Option<String>,
    pub house_number: Option<String>,
    pub locator: Locator,
    /// Field name → quality of the currently-held value.
    pub field_quality: BTreeMap<String, FieldQuality>,
    /// Field name → declared confidence of the batch that supplied the
    /// currently-held value. Persisted so replay from a snapshot keeps
    /// merge precedence deterministic.
    pub field_confidence: BTreeMap<String, SourceConfidence>,
    /// Contributing source batches, in first-contribution order.
    pub provenance: Vec<String>,
}

impl CanonicalVoter {
    pub fn new(identity_id: &str, locator: Locator) -> Self {
        CanonicalVoter {
            identity_id: identity_id.to_string(),
            ward: locator.ward,
            booth: locator.booth,
            serial: None,
            name: None,
            age: None,
            gender: None,
            relation_role: None,
            relation_name: None,
            house_number: None,
            locator,
            field_quality: BTreeMap::new(),
            field_confidence: BTreeMap::new(),
            provenance: Vec::new(),
        }
    }

    pub fn booth_key(&self) -> BoothKey {
        BoothKey {
            ward: self.ward,
            booth: self.booth,
        }
    }

    /// Booth-scoped display key, stable across exports.
    pub fn unique_serial(&self) -> Option<String> {
        self.serial
            .map(|s| format!("W{:03}B{:03}-{:04}", self.ward, self.booth, s))
    }

    pub fn quality_of(&self, field: &str) -> FieldQuality {
        self.field_quality
            .get(field)
            .copied()
            .unwrap_or(FieldQuality::Missing)
    }

    pub fn confidence_of(&self, field: &str) -> SourceConfidence {
        self.field_confidence
            .get(field)
            .copied()
            .unwrap_or(SourceConfidence::Placeholder)
    }

    /// All core fields present (the relation pair counts as one field).
    pub fn is_complete(&self) -> bool {
        self.name.is_some()
            && self.age.is_some()
            && self.gender.is_some()
            && self.relation_name.is_some()
            && self.house_number.is_some()
    }
}

// ============================================================================
// BOOTH CONFIGURATION
// ============================================================================

/// Authoritative per-booth configuration, supplied externally from the
/// source document's declared total. Never inferred from observed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoothConfig {
    pub expected_count: u32,
}

impl BoothConfig {
    pub fn new(expected_count: u32) -> Self {
        BoothConfig { expected_count }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(SourceConfidence::Placeholder < SourceConfidence::Extracted);
        assert!(SourceConfidence::Extracted < SourceConfidence::Verified);
        assert!(FieldQuality::Missing < FieldQuality::Extracted);
        assert!(FieldQuality::Extracted < FieldQuality::Verified);
    }

    #[test]
    fn test_confidence_round_trip() {
        for c in [
            SourceConfidence::Placeholder,
            SourceConfidence::Extracted,
            SourceConfidence::Verified,
        ] {
            assert_eq!(SourceConfidence::parse(c.as_str()), Some(c));
        }
        assert_eq!(SourceConfidence::parse("guessed"), None);
    }

    #[test]
    fn test_locator_parse() {
        let loc = Locator::parse("245/12/3").unwrap();
        assert_eq!(loc.ward, 245);
        assert_eq!(loc.booth, 12);
        assert_eq!(loc.sub_unit, Some(3));
        assert_eq!(loc.code(), "245/12/3");

        let loc = Locator::parse(" 245 / 12 ").unwrap();
        assert_eq!(loc.sub_unit, None);
        assert_eq!(loc.code(), "245/12");

        assert!(Locator::parse("245").is_none());
        assert!(Locator::parse("245/12/3/9").is_none());
        assert!(Locator::parse("ward/booth").is_none());
    }

    #[test]
    fn test_unique_serial_format() {
        let mut voter = CanonicalVoter::new("XUA1234567", Locator::new(245, 12));
        assert_eq!(voter.unique_serial(), None);
        voter.serial = Some(5);
        assert_eq!(voter.unique_serial().unwrap(), "W245B012-0005");
    }

    #[test]
    fn test_voter_completeness() {
        let mut voter = CanonicalVoter::new("XUA1234567", Locator::new(245, 12));
        assert!(!voter.is_complete());

        voter.name = Some("रमेश कुलकर्णी".to_string());
        voter.age = Some(45);
        voter.gender = Some(Gender::M);
        voter.relation_role = Some(RelationRole::Father);
        voter.relation_name = Some("सुरेश".to_string());
        voter.house_number = Some("14B".to_string());
        assert!(voter.is_complete());
    }

    #[test]
    fn test_batch_fingerprint_sensitivity() {
        let loc = Locator::new(245, 12);
        let mut a = Batch::new("pass-1", SourceConfidence::Extracted, loc);
        a.candidates
            .push(RawCandidate::default().with_identity("XUA1234567"));

        let b = {
            let mut b = a.clone();
            b.candidates[0].name = Some("रमेश".to_string());
            b
        };

        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_claimed_booth_falls_back_to_batch() {
        let rec = NormalizedRecord {
            identity_id: Some("XUA1234567".to_string()),
            name: None,
            age: None,
            gender: None,
            relation_role: None,
            relation_name: None,
            house_number: None,
            locator: None,
            claimed_serial: None,
            source_batch: "pass-1".to_string(),
            confidence: SourceConfidence::Extracted,
            line: 1,
        };
        let batch_booth = BoothKey::new(245, 12);
        assert_eq!(rec.claimed_booth(batch_booth), batch_booth);

        let mut rec2 = rec;
        rec2.locator = Some(Locator::new(245, 13));
        assert_eq!(rec2.claimed_booth(batch_booth), BoothKey::new(245, 13));
    }
}

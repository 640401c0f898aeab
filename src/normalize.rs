// 🔤 Field Normalizer - canonicalize raw candidate fields
// Pure and infallible: an unparsable field drops to absent, never to an
// error. Parameterized by the known grammars (identity-code pattern,
// digit systems, gender tokens) instead of per-page heuristics.

use crate::records::{
    Gender, Locator, NormalizedRecord, RawCandidate, RelationRole, SourceConfidence,
};

/// Identity code grammar: fixed-length alphabetic prefix + digit run.
const ID_PREFIX_LEN: usize = 3;
const ID_DIGIT_LEN: usize = 7;

/// Age window outside which a bare token is not a plausible data point.
const AGE_MIN: u32 = 18;
const AGE_MAX: u32 = 120;

/// Label tokens that belong to field headers, not field values. A name-like
/// field containing one of these leaked from a neighboring column and is
/// rejected rather than retained verbatim.
const LABEL_TOKENS: [&str; 10] = [
    "नाव", "वय", "लिंग", "घर", "पत्ता", "क्रमांक", "name", "age", "sex", "house",
];

// ============================================================================
// ENTRY POINT
// ============================================================================

/// Normalize one raw candidate against its batch's tags.
pub fn normalize_candidate(
    raw: &RawCandidate,
    batch_id: &str,
    confidence: SourceConfidence,
) -> NormalizedRecord {
    let (relation_role, relation_name) = normalize_relation(
        raw.relation_role.as_deref(),
        raw.relation_name.as_deref(),
    );

    NormalizedRecord {
        identity_id: raw.identity_id.as_deref().and_then(normalize_identity_id),
        name: raw.name.as_deref().and_then(normalize_name),
        age: raw.age.as_deref().and_then(normalize_age),
        gender: raw.gender_token.as_deref().and_then(normalize_gender),
        relation_role,
        relation_name,
        house_number: raw.house_number.as_deref().and_then(normalize_house_number),
        locator: raw.locator_code.as_deref().and_then(normalize_locator),
        claimed_serial: raw.claimed_serial.as_deref().and_then(normalize_serial),
        source_batch: batch_id.to_string(),
        confidence,
        line: raw.line,
    }
}

// ============================================================================
// DIGIT SCRIPT CONVERSION
// ============================================================================

/// Translate Devanagari digits (U+0966..U+096F) to ASCII, character by
/// character. Everything else passes through unchanged, so mixed-script
/// digit runs normalize cleanly.
pub fn to_latin_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '०'..='९' => {
                let offset = c as u32 - '०' as u32;
                char::from_digit(offset, 10).unwrap_or(c)
            }
            _ => c,
        })
        .collect()
}

// ============================================================================
// FIELD RULES
// ============================================================================

/// Age parses only when the converted digits land in `[18, 120]`.
pub fn normalize_age(raw: &str) -> Option<u32> {
    let cleaned = to_latin_digits(raw);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let age: u32 = cleaned.parse().ok()?;
    if (AGE_MIN..=AGE_MAX).contains(&age) {
        Some(age)
    } else {
        None
    }
}

/// Closed gender token map, both scripts, abbreviations included.
/// Anything unrecognized is absent - never inferred from relation fields.
pub fn normalize_gender(raw: &str) -> Option<Gender> {
    let token = raw.trim().trim_end_matches('.').to_lowercase();
    match token.as_str() {
        "m" | "male" | "पु" | "पुरुष" => Some(Gender::M),
        "f" | "female" | "स्त्री" | "महिला" => Some(Gender::F),
        _ => None,
    }
}

/// Re-case and validate an identity code against the known grammar:
/// 3 ASCII letters followed by 7 digits, after stripping separators and
/// converting digit script. A non-conforming code is absent, not guessed.
pub fn normalize_identity_id(raw: &str) -> Option<String> {
    let cleaned: String = to_latin_digits(raw)
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '/')
        .collect();
    if !cleaned.is_ascii() || cleaned.len() != ID_PREFIX_LEN + ID_DIGIT_LEN {
        return None;
    }
    let upper = cleaned.to_ascii_uppercase();
    let (prefix, digits) = upper.split_at(ID_PREFIX_LEN);
    if !prefix.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(upper)
}

/// Whitespace-collapse a name; reject values that carry label text or
/// digits bled from a neighboring field.
pub fn normalize_name(raw: &str) -> Option<String> {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() {
        return None;
    }
    // Digits in a name are serial/house bleed from the adjacent column.
    if to_latin_digits(&collapsed).chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    for word in collapsed.split_whitespace() {
        let bare = word.trim_end_matches(':').to_lowercase();
        if LABEL_TOKENS.contains(&bare.as_str()) {
            return None;
        }
    }
    if collapsed.contains(':') {
        return None;
    }
    Some(collapsed)
}

/// The relation is a role+name pair. The role token maps through a closed
/// list; an unrecognized non-empty token is `Other`. A role without a name
/// survives; a name whose text fails normalization drops the pair's name.
pub fn normalize_relation(
    role: Option<&str>,
    name: Option<&str>,
) -> (Option<RelationRole>, Option<String>) {
    let role = role.and_then(normalize_relation_role);
    let name = name.and_then(normalize_name);
    (role, name)
}

pub fn normalize_relation_role(raw: &str) -> Option<RelationRole> {
    let token = raw.trim().trim_end_matches('.').to_lowercase();
    if token.is_empty() {
        return None;
    }
    match token.as_str() {
        "f" | "father" | "वडील" => Some(RelationRole::Father),
        "h" | "husband" | "पती" => Some(RelationRole::Husband),
        "m" | "mother" | "आई" => Some(RelationRole::Mother),
        _ => Some(RelationRole::Other),
    }
}

/// House numbers keep alphanumerics (`14B`, `12/3`) but drop label bleed.
pub fn normalize_house_number(raw: &str) -> Option<String> {
    let collapsed = collapse_whitespace(&to_latin_digits(raw));
    if collapsed.is_empty() {
        return None;
    }
    for word in collapsed.split_whitespace() {
        let bare = word.trim_end_matches(':').to_lowercase();
        if LABEL_TOKENS.contains(&bare.as_str()) {
            return None;
        }
    }
    Some(collapsed)
}

/// `ward/booth[/sub]` with either digit script.
pub fn normalize_locator(raw: &str) -> Option<Locator> {
    Locator::parse(&to_latin_digits(raw))
}

/// Claimed serial: positive integer after digit conversion. The upper bound
/// is the booth's expected count, which the serial assigner owns.
pub fn normalize_serial(raw: &str) -> Option<u32> {
    let cleaned = to_latin_digits(raw);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let serial: u32 = cleaned.parse().ok()?;
    if serial >= 1 {
        Some(serial)
    } else {
        None
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devanagari_digit_conversion() {
        assert_eq!(to_latin_digits("४५"), "45");
        assert_eq!(to_latin_digits("१०"), "10");
        assert_eq!(to_latin_digits("4५"), "45"); // mixed scripts
        assert_eq!(to_latin_digits("रमेश"), "रमेश"); // non-digits untouched
    }

    #[test]
    fn test_age_bounds() {
        assert_eq!(normalize_age("45"), Some(45));
        assert_eq!(normalize_age("४५"), Some(45));
        assert_eq!(normalize_age(" 18 "), Some(18));
        assert_eq!(normalize_age("120"), Some(120));
        assert_eq!(normalize_age("17"), None);
        assert_eq!(normalize_age("121"), None);
        assert_eq!(normalize_age("0"), None);
        assert_eq!(normalize_age("45 yrs"), None);
        assert_eq!(normalize_age(""), None);
    }

    #[test]
    fn test_gender_tokens() {
        assert_eq!(normalize_gender("M"), Some(Gender::M));
        assert_eq!(normalize_gender("male"), Some(Gender::M));
        assert_eq!(normalize_gender("पु"), Some(Gender::M));
        assert_eq!(normalize_gender("पुरुष"), Some(Gender::M));
        assert_eq!(normalize_gender("F"), Some(Gender::F));
        assert_eq!(normalize_gender("महिला"), Some(Gender::F));
        assert_eq!(normalize_gender("स्त्री"), Some(Gender::F));
        assert_eq!(normalize_gender("पु."), Some(Gender::M)); // trailing dot
        // Never invented from adjacent fields or unknown tokens
        assert_eq!(normalize_gender("x"), None);
        assert_eq!(normalize_gender("वडील"), None);
        assert_eq!(normalize_gender(""), None);
    }

    #[test]
    fn test_identity_id_grammar() {
        assert_eq!(
            normalize_identity_id("XUA1234567"),
            Some("XUA1234567".to_string())
        );
        // Re-cased
        assert_eq!(
            normalize_identity_id("xua1234567"),
            Some("XUA1234567".to_string())
        );
        // Separators and digit script stripped
        assert_eq!(
            normalize_identity_id("XUA-123 45/67"),
            Some("XUA1234567".to_string())
        );
        assert_eq!(
            normalize_identity_id("XUA१२३४५६७"),
            Some("XUA1234567".to_string())
        );
        // Wrong shape is absent, never guessed
        assert_eq!(normalize_identity_id("XUA123456"), None); // short digit run
        assert_eq!(normalize_identity_id("XU1234567"), None); // short prefix
        assert_eq!(normalize_identity_id("1UA1234567"), None); // digit in prefix
        assert_eq!(normalize_identity_id("XUAX234567"), None); // letter in digits
        assert_eq!(normalize_identity_id("रम1234"), None); // non-ASCII prefix
        assert_eq!(normalize_identity_id(""), None);
    }

    #[test]
    fn test_name_whitespace_collapse() {
        assert_eq!(
            normalize_name("  रमेश   कुलकर्णी "),
            Some("रमेश कुलकर्णी".to_string())
        );
        assert_eq!(normalize_name(""), None);
        assert_eq!(normalize_name("   "), None);
    }

    #[test]
    fn test_name_label_bleed_rejected() {
        // Header text leaked from the name column
        assert_eq!(normalize_name("नाव रमेश"), None);
        assert_eq!(normalize_name("Name: Ramesh"), None);
        assert_eq!(normalize_name("वय"), None);
        // Serial bleed: digits never belong in a name
        assert_eq!(normalize_name("रमेश ४५"), None);
        assert_eq!(normalize_name("Ramesh 45"), None);
        // A legitimate name survives
        assert_eq!(normalize_name("रमेश"), Some("रमेश".to_string()));
    }

    #[test]
    fn test_relation_roles() {
        assert_eq!(normalize_relation_role("वडील"), Some(RelationRole::Father));
        assert_eq!(normalize_relation_role("पती"), Some(RelationRole::Husband));
        assert_eq!(normalize_relation_role("आई"), Some(RelationRole::Mother));
        assert_eq!(normalize_relation_role("H"), Some(RelationRole::Husband));
        assert_eq!(normalize_relation_role("guardian"), Some(RelationRole::Other));
        assert_eq!(normalize_relation_role("  "), None);
    }

    #[test]
    fn test_locator_digit_script() {
        let loc = normalize_locator("२४५/१२/३").unwrap();
        assert_eq!(loc.ward, 245);
        assert_eq!(loc.booth, 12);
        assert_eq!(loc.sub_unit, Some(3));
        assert!(normalize_locator("ward twelve").is_none());
    }

    #[test]
    fn test_serial_parse() {
        assert_eq!(normalize_serial("५"), Some(5));
        assert_eq!(normalize_serial("28"), Some(28));
        assert_eq!(normalize_serial("0"), None);
        assert_eq!(normalize_serial("no. 5"), None);
    }

    #[test]
    fn test_normalize_candidate_never_fails() {
        // A thoroughly garbled candidate normalizes to mostly-absent fields
        // instead of erroring.
        let raw = RawCandidate {
            identity_id: Some("???".to_string()),
            name: Some("नाव:".to_string()),
            age: Some("two hundred".to_string()),
            gender_token: Some("??".to_string()),
            relation_role: Some("".to_string()),
            relation_name: Some("  ".to_string()),
            house_number: Some("घर".to_string()),
            locator_code: Some("x/y".to_string()),
            claimed_serial: Some("-3".to_string()),
            line: 7,
        };
        let rec = normalize_candidate(&raw, "pass-1", SourceConfidence::Extracted);
        assert_eq!(rec.identity_id, None);
        assert_eq!(rec.name, None);
        assert_eq!(rec.age, None);
        assert_eq!(rec.gender, None);
        assert_eq!(rec.relation_role, None);
        assert_eq!(rec.relation_name, None);
        assert_eq!(rec.house_number, None);
        assert_eq!(rec.locator, None);
        assert_eq!(rec.claimed_serial, None);
        assert_eq!(rec.source_batch, "pass-1");
        assert_eq!(rec.line, 7);
    }

    #[test]
    fn test_normalize_candidate_full() {
        let raw = RawCandidate {
            identity_id: Some("xua1234567".to_string()),
            name: Some(" रमेश  कुलकर्णी".to_string()),
            age: Some("४५".to_string()),
            gender_token: Some("पु".to_string()),
            relation_role: Some("वडील".to_string()),
            relation_name: Some("सुरेश कुलकर्णी".to_string()),
            house_number: Some("१४B".to_string()),
            locator_code: Some("२४५/१२".to_string()),
            claimed_serial: Some("५".to_string()),
            line: 3,
        };
        let rec = normalize_candidate(&raw, "pass-2", SourceConfidence::Verified);
        assert_eq!(rec.identity_id.as_deref(), Some("XUA1234567"));
        assert_eq!(rec.name.as_deref(), Some("रमेश कुलकर्णी"));
        assert_eq!(rec.age, Some(45));
        assert_eq!(rec.gender, Some(Gender::M));
        assert_eq!(rec.relation_role, Some(RelationRole::Father));
        assert_eq!(rec.relation_name.as_deref(), Some("सुरेश कुलकर्णी"));
        assert_eq!(rec.house_number.as_deref(), Some("14B"));
        assert_eq!(rec.locator.unwrap().code(), "245/12");
        assert_eq!(rec.claimed_serial, Some(5));
    }
}

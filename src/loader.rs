// Batch & configuration loading
// Thin ingestion layer over the extraction collaborator's output files.
// JSON batches carry their own metadata; CSV batches encode it in the
// filename (extraction passes are per page, one file per pass).

use crate::records::{Batch, BoothConfig, BoothKey, Locator, RawCandidate, SourceConfidence};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

// ============================================================================
// BOOTH CONFIGURATION
// ============================================================================

#[derive(Debug, Deserialize)]
struct ConfigRow {
    ward: u32,
    booth: u32,
    expected_count: u32,
}

/// Load `ward,booth,expected_count` rows. The counts come from the source
/// document's declared totals; nothing here is inferred.
pub fn load_booth_configs(path: &Path) -> Result<HashMap<BoothKey, BoothConfig>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open booth configuration {:?}", path))?;

    let mut configs = HashMap::new();
    for row in reader.deserialize() {
        let row: ConfigRow = row.context("malformed booth configuration row")?;
        configs.insert(
            BoothKey::new(row.ward, row.booth),
            BoothConfig::new(row.expected_count),
        );
    }
    if configs.is_empty() {
        bail!("booth configuration {:?} contains no rows", path);
    }
    Ok(configs)
}

// ============================================================================
// BATCH FILES
// ============================================================================

#[derive(Debug, Deserialize)]
struct CandidateRow {
    #[serde(default)]
    identity_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    age: Option<String>,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    relation_role: Option<String>,
    #[serde(default)]
    relation_name: Option<String>,
    #[serde(default)]
    house_number: Option<String>,
    #[serde(default)]
    locator: Option<String>,
    #[serde(default)]
    serial: Option<String>,
}

/// Load one batch file, dispatching on extension.
pub fn load_batch_file(path: &Path) -> Result<Batch> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => load_json_batch(path),
        Some("csv") => load_csv_batch(path),
        _ => bail!("unsupported batch file {:?} (expected .json or .csv)", path),
    }
}

fn load_json_batch(path: &Path) -> Result<Batch> {
    let file =
        File::open(path).with_context(|| format!("failed to open batch file {:?}", path))?;
    let batch: Batch = serde_json::from_reader(file)
        .with_context(|| format!("failed to parse batch file {:?}", path))?;
    Ok(batch)
}

/// CSV batches name their metadata in the file stem:
/// `<id>__W<ward>B<booth>__<confidence>.csv`
/// e.g. `page014-pass2__W245B012__extracted.csv`.
fn load_csv_batch(path: &Path) -> Result<Batch> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("batch file {:?} has no usable name", path))?;
    let (id, locator, confidence) = parse_batch_stem(stem)
        .with_context(|| format!("batch filename {:?} does not match <id>__W<ward>B<booth>__<confidence>", stem))?;

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open batch file {:?}", path))?;

    let mut batch = Batch::new(&id, confidence, locator);
    for (idx, row) in reader.deserialize().enumerate() {
        let row: CandidateRow =
            row.with_context(|| format!("malformed candidate row in {:?}", path))?;
        batch.candidates.push(RawCandidate {
            identity_id: row.identity_id,
            name: row.name,
            age: row.age,
            gender_token: row.gender,
            relation_role: row.relation_role,
            relation_name: row.relation_name,
            house_number: row.house_number,
            locator_code: row.locator,
            claimed_serial: row.serial,
            line: idx + 2, // 1-based, after the header row
        });
    }
    Ok(batch)
}

fn parse_batch_stem(stem: &str) -> Option<(String, Locator, SourceConfidence)> {
    let mut parts = stem.split("__");
    let id = parts.next()?.to_string();
    let loc_part = parts.next()?;
    let conf_part = parts.next()?;
    if parts.next().is_some() || id.is_empty() {
        return None;
    }

    let rest = loc_part.strip_prefix('W')?;
    let b_pos = rest.find('B')?;
    let ward: u32 = rest[..b_pos].parse().ok()?;
    let booth: u32 = rest[b_pos + 1..].parse().ok()?;

    let confidence = SourceConfidence::parse(conf_part)?;
    Some((id, Locator::new(ward, booth), confidence))
}

/// Load every batch in a directory, in filename order, so a replayed
/// ingestion absorbs batches in a stable sequence.
pub fn load_batch_dir(dir: &Path) -> Result<Vec<Batch>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read batch directory {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("json") | Some("csv")
            )
        })
        .collect();
    paths.sort();

    let mut batches = Vec::new();
    for path in paths {
        batches.push(load_batch_file(&path)?);
    }
    Ok(batches)
}

// ============================================================================
// TESTS
// ============================================================================

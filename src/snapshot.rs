// Snapshot boundary - timestamped pre-commit backups
// Before a run commits to the canonical database the caller captures an
// immutable copy of prior state, so any run can be replayed from snapshot
// plus the same batch inputs. Each copy gets a SHA-256 sidecar.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Copy the database into `snapshot_dir` under a timestamped name and
/// write a checksum sidecar next to it. Returns the snapshot path.
pub fn create_snapshot(db_path: &Path, snapshot_dir: &Path) -> Result<PathBuf> {
    if !db_path.exists() {
        bail!("nothing to snapshot: {:?} does not exist", db_path);
    }
    fs::create_dir_all(snapshot_dir)
        .with_context(|| format!("failed to create snapshot dir {:?}", snapshot_dir))?;

    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let mut dest = snapshot_dir.join(format!("canonical-{}.db", stamp));
    // Same-second snapshots get a numeric suffix instead of clobbering.
    let mut n = 1;
    while dest.exists() {
        n += 1;
        dest = snapshot_dir.join(format!("canonical-{}-{}.db", stamp, n));
    }

    fs::copy(db_path, &dest)
        .with_context(|| format!("failed to copy {:?} to {:?}", db_path, dest))?;

    let digest = checksum_file(&dest)?;
    fs::write(sidecar_path(&dest), format!("{}\n", digest))
        .context("failed to write snapshot checksum")?;

    Ok(dest)
}

pub fn checksum_file(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read {:?} for checksum", path))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Recompute the checksum and compare it against the sidecar.
pub fn verify_snapshot(snapshot_path: &Path) -> Result<bool> {
    let sidecar = sidecar_path(snapshot_path);
    let recorded = fs::read_to_string(&sidecar)
        .with_context(|| format!("missing checksum sidecar {:?}", sidecar))?;
    let actual = checksum_file(snapshot_path)?;
    Ok(recorded.trim() == actual)
}

/// Most recent snapshot in a directory. Timestamped names sort
/// chronologically, so name order is time order.
pub fn latest_snapshot(snapshot_dir: &Path) -> Result<Option<PathBuf>> {
    if !snapshot_dir.exists() {
        return Ok(None);
    }
    let mut snapshots: Vec<PathBuf> = fs::read_dir(snapshot_dir)
        .with_context(|| format!("failed to read snapshot dir {:?}", snapshot_dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension().and_then(|e| e.to_str()) == Some("db")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("canonical-"))
                    .unwrap_or(false)
        })
        .collect();
    snapshots.sort();
    Ok(snapshots.pop())
}

fn sidecar_path(snapshot_path: &Path) -> PathBuf {
    let mut name = snapshot_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".sha256");
    snapshot_path.with_file_name(name)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "roll-recon-snapshot-{}-{}",
            tag,
            uuid::Uuid::new_v4()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_snapshot_and_verify() {
        let dir = scratch_dir("verify");
        let db = dir.join("roll.db");
        fs::write(&db, b"canonical bytes").unwrap();

        let snap = create_snapshot(&db, &dir.join("snapshots")).unwrap();
        assert!(snap.exists());
        assert!(snap
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("canonical-"));
        assert!(verify_snapshot(&snap).unwrap());

        // Tampering is detected
        fs::write(&snap, b"altered bytes").unwrap();
        assert!(!verify_snapshot(&snap).unwrap());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_same_second_snapshots_do_not_clobber() {
        let dir = scratch_dir("twice");
        let db = dir.join("roll.db");
        fs::write(&db, b"canonical bytes").unwrap();
        let snapshots = dir.join("snapshots");

        let first = create_snapshot(&db, &snapshots).unwrap();
        let second = create_snapshot(&db, &snapshots).unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_latest_snapshot() {
        let dir = scratch_dir("latest");
        assert!(latest_snapshot(&dir.join("missing")).unwrap().is_none());

        let snapshots = dir.join("snapshots");
        fs::create_dir_all(&snapshots).unwrap();
        fs::write(snapshots.join("canonical-20260101-000000.db"), b"a").unwrap();
        fs::write(snapshots.join("canonical-20260201-000000.db"), b"b").unwrap();
        fs::write(snapshots.join("unrelated.txt"), b"x").unwrap();

        let latest = latest_snapshot(&snapshots).unwrap().unwrap();
        assert_eq!(
            latest.file_name().unwrap().to_string_lossy(),
            "canonical-20260201-000000.db"
        );

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_database_refused() {
        let dir = scratch_dir("missing");
        let err = create_snapshot(&dir.join("absent.db"), &dir.join("snapshots"));
        assert!(err.is_err());
        fs::remove_dir_all(&dir).ok();
    }
}

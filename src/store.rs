// Canonical store - SQLite persistence for voters, conflicts, audits
// The engine itself is in-memory; this is the durable layer the review
// surfaces read from. WAL mode for crash recovery, and an append-only
// events table as the run's audit trail.

use crate::audit::RollAudit;
use crate::conflict::{ConflictKind, ConflictRecord};
use crate::records::{
    BoothConfig, BoothKey, CanonicalVoter, FieldQuality, Gender, Locator, RelationRole,
    SourceConfidence,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS voters (
            identity_id TEXT PRIMARY KEY,
            ward INTEGER NOT NULL,
            booth INTEGER NOT NULL,
            serial INTEGER,
            unique_serial TEXT,
            name TEXT,
            age INTEGER,
            gender TEXT,
            relation_role TEXT,
            relation_name TEXT,
            house_number TEXT,
            locator TEXT NOT NULL,
            field_quality TEXT NOT NULL,
            field_confidence TEXT NOT NULL,
            provenance TEXT NOT NULL,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            ward INTEGER NOT NULL,
            booth INTEGER NOT NULL,
            identity_id TEXT,
            serial INTEGER,
            existing TEXT,
            incoming TEXT,
            batches TEXT NOT NULL,
            note TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS booth_configs (
            ward INTEGER NOT NULL,
            booth INTEGER NOT NULL,
            expected_count INTEGER NOT NULL,
            PRIMARY KEY (ward, booth)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            audit TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            at TEXT NOT NULL,
            kind TEXT NOT NULL,
            subject TEXT NOT NULL,
            detail TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_voters_booth ON voters(ward, booth)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_conflicts_booth ON conflicts(ward, booth)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_subject ON events(subject)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// VOTERS
// ============================================================================

/// Upsert canonical voters. Identity is the primary key, so replaying a
/// run rewrites each voter in place instead of duplicating it.
pub fn upsert_voters(conn: &Connection, voters: &[CanonicalVoter]) -> Result<usize> {
    let mut written = 0;
    for voter in voters {
        conn.execute(
            "INSERT INTO voters (
                identity_id, ward, booth, serial, unique_serial, name, age,
                gender, relation_role, relation_name, house_number, locator,
                field_quality, field_confidence, provenance
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(identity_id) DO UPDATE SET
                ward = excluded.ward,
                booth = excluded.booth,
                serial = excluded.serial,
                unique_serial = excluded.unique_serial,
                name = excluded.name,
                age = excluded.age,
                gender = excluded.gender,
                relation_role = excluded.relation_role,
                relation_name = excluded.relation_name,
                house_number = excluded.house_number,
                locator = excluded.locator,
                field_quality = excluded.field_quality,
                field_confidence = excluded.field_confidence,
                provenance = excluded.provenance,
                updated_at = CURRENT_TIMESTAMP",
            params![
                voter.identity_id,
                voter.ward,
                voter.booth,
                voter.serial,
                voter.unique_serial(),
                voter.name,
                voter.age,
                voter.gender.map(|g| g.as_str()),
                voter.relation_role.map(|r| r.as_str()),
                voter.relation_name,
                voter.house_number,
                voter.locator.code(),
                serde_json::to_string(&voter.field_quality)?,
                serde_json::to_string(&voter.field_confidence)?,
                serde_json::to_string(&voter.provenance)?,
            ],
        )?;
        written += 1;
    }
    Ok(written)
}

fn voter_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CanonicalVoter> {
    let gender: Option<String> = row.get(7)?;
    let relation_role: Option<String> = row.get(8)?;
    let locator_code: String = row.get(11)?;
    let field_quality: String = row.get(12)?;
    let field_confidence: String = row.get(13)?;
    let provenance: String = row.get(14)?;

    Ok(CanonicalVoter {
        identity_id: row.get(0)?,
        ward: row.get(1)?,
        booth: row.get(2)?,
        serial: row.get(3)?,
        name: row.get(5)?,
        age: row.get(6)?,
        gender: gender.as_deref().and_then(Gender::parse),
        relation_role: relation_role.as_deref().and_then(RelationRole::parse),
        relation_name: row.get(9)?,
        house_number: row.get(10)?,
        locator: Locator::parse(&locator_code)
            .unwrap_or_else(|| Locator::new(row.get(1).unwrap_or(0), row.get(2).unwrap_or(0))),
        field_quality: serde_json::from_str::<BTreeMap<String, FieldQuality>>(&field_quality)
            .unwrap_or_default(),
        field_confidence: serde_json::from_str::<BTreeMap<String, SourceConfidence>>(
            &field_confidence,
        )
        .unwrap_or_default(),
        provenance: serde_json::from_str::<Vec<String>>(&provenance).unwrap_or_default(),
    })
}

const VOTER_COLUMNS: &str = "identity_id, ward, booth, serial, unique_serial, name, age, \
     gender, relation_role, relation_name, house_number, locator, \
     field_quality, field_confidence, provenance";

pub fn get_all_voters(conn: &Connection) -> Result<Vec<CanonicalVoter>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM voters ORDER BY ward, booth, serial, identity_id",
        VOTER_COLUMNS
    ))?;
    let voters = stmt
        .query_map([], voter_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(voters)
}

pub fn get_voters_for_booth(conn: &Connection, key: BoothKey) -> Result<Vec<CanonicalVoter>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM voters WHERE ward = ?1 AND booth = ?2 \
         ORDER BY serial, identity_id",
        VOTER_COLUMNS
    ))?;
    let voters = stmt
        .query_map(params![key.ward, key.booth], voter_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(voters)
}

pub fn voter_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM voters", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// CONFLICTS
// ============================================================================

pub fn insert_conflicts(conn: &Connection, conflicts: &[ConflictRecord]) -> Result<usize> {
    let mut inserted = 0;
    for conflict in conflicts {
        conn.execute(
            "INSERT INTO conflicts (
                kind, ward, booth, identity_id, serial, existing, incoming, batches, note
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                conflict.kind.as_str(),
                conflict.ward,
                conflict.booth,
                conflict.identity_id,
                conflict.serial,
                conflict
                    .existing
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                conflict
                    .incoming
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                serde_json::to_string(&conflict.batches)?,
                conflict.note,
            ],
        )?;
        inserted += 1;
    }
    Ok(inserted)
}

/// Replace the stored conflict list for a fresh run. Conflicts are
/// run-scoped review output, not accumulating history.
pub fn replace_conflicts(conn: &Connection, conflicts: &[ConflictRecord]) -> Result<usize> {
    conn.execute("DELETE FROM conflicts", [])?;
    insert_conflicts(conn, conflicts)
}

pub fn get_conflicts(conn: &Connection) -> Result<Vec<ConflictRecord>> {
    let mut stmt = conn.prepare(
        "SELECT kind, ward, booth, identity_id, serial, existing, incoming, batches, note
         FROM conflicts ORDER BY ward, booth, serial, id",
    )?;
    let conflicts = stmt
        .query_map([], |row| {
            let kind: String = row.get(0)?;
            let existing: Option<String> = row.get(5)?;
            let incoming: Option<String> = row.get(6)?;
            let batches: String = row.get(7)?;
            Ok(ConflictRecord {
                kind: ConflictKind::parse(&kind).unwrap_or(ConflictKind::StructuralGap),
                ward: row.get(1)?,
                booth: row.get(2)?,
                identity_id: row.get(3)?,
                serial: row.get(4)?,
                existing: existing.and_then(|s| serde_json::from_str(&s).ok()),
                incoming: incoming.and_then(|s| serde_json::from_str(&s).ok()),
                batches: serde_json::from_str(&batches).unwrap_or_default(),
                note: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(conflicts)
}

// ============================================================================
// BOOTH CONFIGURATION & AUDITS
// ============================================================================

pub fn upsert_booth_configs(
    conn: &Connection,
    configs: &std::collections::HashMap<BoothKey, BoothConfig>,
) -> Result<()> {
    for (key, config) in configs {
        conn.execute(
            "INSERT INTO booth_configs (ward, booth, expected_count)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(ward, booth) DO UPDATE SET expected_count = excluded.expected_count",
            params![key.ward, key.booth, config.expected_count],
        )?;
    }
    Ok(())
}

pub fn get_booth_configs(
    conn: &Connection,
) -> Result<std::collections::HashMap<BoothKey, BoothConfig>> {
    let mut stmt = conn.prepare("SELECT ward, booth, expected_count FROM booth_configs")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                BoothKey::new(row.get(0)?, row.get(1)?),
                BoothConfig::new(row.get(2)?),
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows.into_iter().collect())
}

/// Store a run's audit under a fresh run id; the latest one is what the
/// review surfaces show.
pub fn insert_audit(conn: &Connection, audit: &RollAudit) -> Result<String> {
    let run_id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO audits (run_id, audit) VALUES (?1, ?2)",
        params![run_id, serde_json::to_string(audit)?],
    )?;
    Ok(run_id)
}

pub fn get_latest_audit(conn: &Connection) -> Result<Option<RollAudit>> {
    let result = conn.query_row(
        "SELECT audit FROM audits ORDER BY id DESC LIMIT 1",
        [],
        |row| row.get::<_, String>(0),
    );
    match result {
        Ok(json) => {
            let audit = serde_json::from_str(&json).context("stored audit is unreadable")?;
            Ok(Some(audit))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// PER-BOOTH STATS
// ============================================================================

/// Per-booth roll-up for the CLI report and server.
#[derive(Debug, Clone, Serialize)]
pub struct BoothStat {
    pub ward: u32,
    pub booth: u32,
    pub expected_count: u32,
    pub voter_count: i64,
    pub placed_count: i64,
}

pub fn get_booth_stats(conn: &Connection) -> Result<Vec<BoothStat>> {
    let mut stmt = conn.prepare(
        "SELECT c.ward, c.booth, c.expected_count,
                COUNT(v.identity_id) AS voter_count,
                COUNT(v.serial) AS placed_count
         FROM booth_configs c
         LEFT JOIN voters v ON v.ward = c.ward AND v.booth = c.booth
         GROUP BY c.ward, c.booth
         ORDER BY c.ward, c.booth",
    )?;
    let stats = stmt
        .query_map([], |row| {
            Ok(BoothStat {
                ward: row.get(0)?,
                booth: row.get(1)?,
                expected_count: row.get(2)?,
                voter_count: row.get(3)?,
                placed_count: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(stats)
}

// ============================================================================
// EVENTS (run audit trail)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub event_id: String,
    pub at: DateTime<Utc>,
    pub kind: String,
    pub subject: String,
    pub detail: serde_json::Value,
}

impl RunEvent {
    pub fn new(kind: &str, subject: &str, detail: serde_json::Value) -> Self {
        RunEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            at: Utc::now(),
            kind: kind.to_string(),
            subject: subject.to_string(),
            detail,
        }
    }
}

pub fn insert_event(conn: &Connection, event: &RunEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO events (event_id, at, kind, subject, detail)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.event_id,
            event.at.to_rfc3339(),
            event.kind,
            event.subject,
            serde_json::to_string(&event.detail)?,
        ],
    )?;
    Ok(())
}

pub fn get_events_for_subject(conn: &Connection, subject: &str) -> Result<Vec<RunEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, at, kind, subject, detail FROM events
         WHERE subject = ?1 ORDER BY id",
    )?;
    let events = stmt
        .query_map(params![subject], |row| {
            let at: String = row.get(1)?;
            let detail: String = row.get(4)?;
            Ok(RunEvent {
                event_id: row.get(0)?,
                at: DateTime::parse_from_rfc3339(&at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                kind: row.get(2)?,
                subject: row.get(3)?,
                detail: serde_json::from_str(&detail).unwrap_or(serde_json::Value::Null),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Gender, RelationRole};

    fn sample_voter(id: &str, serial: u32) -> CanonicalVoter {
        let mut v = CanonicalVoter::new(id, Locator::new(245, 12));
        v.serial = Some(serial);
        v.name = Some("रमेश कुलकर्णी".to_string());
        v.age = Some(45);
        v.gender = Some(Gender::M);
        v.relation_role = Some(RelationRole::Father);
        v.relation_name = Some("सुरेश".to_string());
        v.house_number = Some("14B".to_string());
        v.field_quality
            .insert("name".to_string(), FieldQuality::Verified);
        v.field_confidence
            .insert("name".to_string(), SourceConfidence::Verified);
        v.provenance.push("pass-1".to_string());
        v
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_voter_round_trip() {
        let conn = test_conn();
        let voter = sample_voter("XUA1234567", 5);
        upsert_voters(&conn, &[voter.clone()]).unwrap();

        let loaded = get_all_voters(&conn).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], voter);
        assert_eq!(loaded[0].unique_serial().unwrap(), "W245B012-0005");
    }

    #[test]
    fn test_upsert_is_idempotent_on_identity() {
        let conn = test_conn();
        let mut voter = sample_voter("XUA1234567", 5);
        upsert_voters(&conn, &[voter.clone()]).unwrap();

        // Replay with a corrected name: one row, updated in place
        voter.name = Some("रमेश ग. कुलकर्णी".to_string());
        upsert_voters(&conn, &[voter.clone()]).unwrap();

        assert_eq!(voter_count(&conn).unwrap(), 1);
        let loaded = get_all_voters(&conn).unwrap();
        assert_eq!(loaded[0].name.as_deref(), Some("रमेश ग. कुलकर्णी"));
    }

    #[test]
    fn test_booth_filter_and_stats() {
        let conn = test_conn();
        let mut other = sample_voter("XUB7654321", 1);
        other.booth = 13;
        other.locator = Locator::new(245, 13);
        upsert_voters(&conn, &[sample_voter("XUA1234567", 5), other]).unwrap();

        let mut configs = std::collections::HashMap::new();
        configs.insert(BoothKey::new(245, 12), BoothConfig::new(30));
        configs.insert(BoothKey::new(245, 13), BoothConfig::new(10));
        upsert_booth_configs(&conn, &configs).unwrap();

        let booth12 = get_voters_for_booth(&conn, BoothKey::new(245, 12)).unwrap();
        assert_eq!(booth12.len(), 1);
        assert_eq!(booth12[0].identity_id, "XUA1234567");

        let stats = get_booth_stats(&conn).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].booth, 12);
        assert_eq!(stats[0].expected_count, 30);
        assert_eq!(stats[0].voter_count, 1);
        assert_eq!(stats[0].placed_count, 1);
    }

    #[test]
    fn test_conflict_round_trip() {
        let conn = test_conn();
        let conflict = ConflictRecord::structural_gap(BoothKey::new(245, 12), 7);
        replace_conflicts(&conn, &[conflict.clone()]).unwrap();

        let loaded = get_conflicts(&conn).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], conflict);

        // A fresh run's conflicts replace, not append
        replace_conflicts(&conn, &[]).unwrap();
        assert!(get_conflicts(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_latest_audit() {
        let conn = test_conn();
        assert!(get_latest_audit(&conn).unwrap().is_none());

        let audit = RollAudit {
            booths: vec![],
            total_voters: 3,
            total_conflicts: 0,
            total_pending: 1,
        };
        insert_audit(&conn, &audit).unwrap();

        let newer = RollAudit {
            total_voters: 5,
            ..audit.clone()
        };
        insert_audit(&conn, &newer).unwrap();

        let loaded = get_latest_audit(&conn).unwrap().unwrap();
        assert_eq!(loaded.total_voters, 5);
    }

    #[test]
    fn test_event_log() {
        let conn = test_conn();
        let event = RunEvent::new(
            "batch_absorbed",
            "pass-1",
            serde_json::json!({"candidates": 30, "conflicts": 0}),
        );
        insert_event(&conn, &event).unwrap();

        let events = get_events_for_subject(&conn, "pass-1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "batch_absorbed");
        assert_eq!(events[0].detail["candidates"], 30);
    }
}

// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::{Path, PathBuf};

use roll_recon::{
    create_snapshot, get_all_voters, get_booth_stats, get_conflicts, get_latest_audit,
    insert_audit, insert_event, load_batch_dir, load_booth_configs, replace_conflicts,
    setup_database, upsert_booth_configs, upsert_voters, ReconciliationEngine, RunEvent,
};

const DEFAULT_DB: &str = "roll.db";
const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let rest = args.get(2..).unwrap_or(&[]);

    match args.get(1).map(|s| s.as_str()) {
        Some("ingest") => run_ingest(rest),
        Some("report") => run_report(rest),
        Some("review") | None => run_review(rest),
        Some(other) => {
            eprintln!("❌ Unknown command: {}", other);
            eprintln!("   Usage: roll-recon ingest <booths.csv> <batch_dir> [db]");
            eprintln!("          roll-recon report [db]");
            eprintln!("          roll-recon review [db]");
            std::process::exit(1);
        }
    }
}

fn run_ingest(args: &[String]) -> Result<()> {
    let (config_path, batch_dir) = match (args.first(), args.get(1)) {
        (Some(c), Some(b)) => (PathBuf::from(c), PathBuf::from(b)),
        _ => bail!("usage: roll-recon ingest <booths.csv> <batch_dir> [db]"),
    };
    let db_path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB));

    println!("🗳️  Roll Reconciliation - Ingest");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Snapshot prior canonical state before any commit
    if db_path.exists() {
        let snap = create_snapshot(&db_path, Path::new(DEFAULT_SNAPSHOT_DIR))?;
        println!("📦 Snapshot of prior state: {:?}", snap);
    }

    // 2. Booth configuration (authoritative expected counts)
    let configs = load_booth_configs(&config_path)?;
    println!("✓ Loaded {} booth configurations", configs.len());

    // 3. Batches, in filename order
    let batches = load_batch_dir(&batch_dir)?;
    println!("✓ Loaded {} batches from {:?}", batches.len(), batch_dir);

    // 4. Reconcile
    let conn = Connection::open(&db_path)?;
    setup_database(&conn)?;

    let mut engine = ReconciliationEngine::with_configs(configs.clone());
    let mut rejected = 0;
    for batch in &batches {
        match engine.absorb_batch(batch) {
            Ok(receipt) => {
                insert_event(
                    &conn,
                    &RunEvent::new(
                        "batch_absorbed",
                        &receipt.batch_id,
                        serde_json::json!({
                            "fingerprint": receipt.fingerprint,
                            "candidates": receipt.candidates,
                            "created": receipt.created,
                            "attached": receipt.attached,
                            "conflicts": receipt.conflicts,
                        }),
                    ),
                )?;
                println!(
                    "  ✓ {}: {} candidates, {} created, {} attached, {} conflicts",
                    receipt.batch_id,
                    receipt.candidates,
                    receipt.created,
                    receipt.attached,
                    receipt.conflicts
                );
            }
            Err(rejection) => {
                rejected += 1;
                insert_event(
                    &conn,
                    &RunEvent::new(
                        "batch_rejected",
                        &rejection.batch_id,
                        serde_json::json!({ "reason": rejection.reason }),
                    ),
                )?;
                eprintln!("  ❌ {}", rejection);
            }
        }
    }

    // 5. Close booths, audit, persist
    let output = engine.finalize()?;

    upsert_booth_configs(&conn, &configs)?;
    let written = upsert_voters(&conn, &output.voters)?;
    replace_conflicts(&conn, &output.conflicts)?;
    let run_id = insert_audit(&conn, &output.audit)?;
    insert_event(
        &conn,
        &RunEvent::new(
            "run_finalized",
            &run_id,
            serde_json::json!({
                "voters": output.voters.len(),
                "conflicts": output.conflicts.len(),
                "rejected_batches": rejected,
            }),
        ),
    )?;

    println!("\n💾 Wrote {} canonical voters to {:?}", written, db_path);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for booth in &output.audit.booths {
        println!("  {}", booth.summary());
    }
    println!("\n{}", output.audit.summary());
    if rejected > 0 {
        println!("⚠️  {} batch(es) rejected - see events table", rejected);
    }

    Ok(())
}

fn run_report(args: &[String]) -> Result<()> {
    let db_path = args
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB));
    let conn = open_existing(&db_path)?;

    println!("🗳️  Roll Reconciliation - Report");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let stats = get_booth_stats(&conn)?;
    for stat in &stats {
        println!(
            "  ward {} / booth {}: {}/{} voters, {} placed",
            stat.ward, stat.booth, stat.voter_count, stat.expected_count, stat.placed_count
        );
    }

    let conflicts = get_conflicts(&conn)?;
    println!("\n  Conflicts awaiting review: {}", conflicts.len());
    for conflict in conflicts.iter().take(20) {
        println!("    [{}] {}", conflict.kind, conflict.note);
    }
    if conflicts.len() > 20 {
        println!("    ... and {} more", conflicts.len() - 20);
    }

    match get_latest_audit(&conn)? {
        Some(audit) => println!("\n{}", audit.summary()),
        None => println!("\n(no audit recorded yet - run ingest first)"),
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_review(args: &[String]) -> Result<()> {
    let db_path = args
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB));
    let conn = open_existing(&db_path)?;

    println!("🖥️  Loading review UI...\n");
    let voters = get_all_voters(&conn)?;
    let conflicts = get_conflicts(&conn)?;
    let audit = get_latest_audit(&conn)?;
    println!(
        "✓ Loaded {} voters, {} conflicts\n",
        voters.len(),
        conflicts.len()
    );
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(voters, conflicts, audit);
    ui::run_ui(&mut app)?;

    println!("\n✅ Review session closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_review(_args: &[String]) -> Result<()> {
    eprintln!("❌ Review UI not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the JSON API: cargo run --bin roll-server --features server");
    std::process::exit(1);
}

fn open_existing(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        bail!(
            "database not found at {:?} - run `roll-recon ingest` first",
            db_path
        );
    }
    Connection::open(db_path).context("failed to open database")
}

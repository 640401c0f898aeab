// Roll Reconciliation - Core Library
// Reconciles noisy, partially-extracted voter records into a canonical,
// deduplicated list per ward/booth. Exposed for the CLI, review server,
// and tests.

pub mod records;
pub mod normalize;
pub mod identity;
pub mod serial;
pub mod merge;
pub mod conflict;
pub mod audit;
pub mod engine;
pub mod loader;
pub mod store;
pub mod snapshot;

// Re-export commonly used types
pub use records::{
    Batch, BoothConfig, BoothKey, CanonicalVoter, FieldQuality, Gender, Locator,
    NormalizedRecord, RawCandidate, RelationRole, SourceConfidence, CORE_FIELDS,
};
pub use normalize::normalize_candidate;
pub use identity::{resolve_identity, PendingIndex, PendingKey, Resolution};
pub use serial::{ClaimOutcome, CloseReport, SerialLedger};
pub use merge::{merge_candidate, voter_from_record, MergeOutcome};
pub use conflict::{ConflictKind, ConflictLog, ConflictRecord};
pub use audit::{BoothAudit, FieldCoverage, RollAudit, RollAuditor};
pub use engine::{
    BatchReceipt, BatchRejection, BoothCloseReport, ReconciliationEngine,
    ReconciliationOutput,
};
pub use loader::{load_batch_dir, load_batch_file, load_booth_configs};
pub use store::{
    get_all_voters, get_booth_configs, get_booth_stats, get_conflicts,
    get_events_for_subject, get_latest_audit, get_voters_for_booth, insert_audit,
    insert_event, replace_conflicts, setup_database, upsert_booth_configs, upsert_voters,
    voter_count, BoothStat, RunEvent,
};
pub use snapshot::{create_snapshot, latest_snapshot, verify_snapshot};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Roll Reconciliation - Review Server
// Read-only JSON API over the canonical store for external review tooling.
// Adjudication of conflicts stays manual; nothing here mutates state.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use roll_recon::{
    get_all_voters, get_booth_stats, get_conflicts, get_latest_audit, get_voters_for_booth,
    BoothKey,
};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

#[derive(Serialize)]
struct SummaryResponse {
    voter_count: usize,
    placed_count: usize,
    conflict_count: usize,
    booth_count: usize,
    is_final: Option<bool>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/voters - Full canonical roll
async fn list_voters(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    match get_all_voters(&conn) {
        Ok(voters) => (StatusCode::OK, Json(ApiResponse::ok(voters))).into_response(),
        Err(e) => {
            eprintln!("Error loading voters: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::ok(Vec::<roll_recon::CanonicalVoter>::new())),
            )
                .into_response()
        }
    }
}

/// GET /api/booths/:locator - One booth's roll. Locator is URL-encoded
/// `ward/booth`, e.g. `245%2F12`.
async fn booth_voters(
    State(state): State<AppState>,
    Path(locator): Path<String>,
) -> impl IntoResponse {
    let decoded = urlencoding::decode(&locator)
        .map(|s| s.into_owned())
        .unwrap_or(locator);

    let key = match parse_booth(&decoded) {
        Some(key) => key,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse {
                    success: false,
                    data: Vec::<roll_recon::CanonicalVoter>::new(),
                    error: Some(format!("bad booth locator: {}", decoded)),
                }),
            )
                .into_response();
        }
    };

    let conn = state.db.lock().unwrap();
    match get_voters_for_booth(&conn, key) {
        Ok(voters) => (StatusCode::OK, Json(ApiResponse::ok(voters))).into_response(),
        Err(e) => {
            eprintln!("Error loading booth {}: {}", decoded, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::ok(Vec::<roll_recon::CanonicalVoter>::new())),
            )
                .into_response()
        }
    }
}

/// GET /api/conflicts - Conflict list for manual review
async fn list_conflicts(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    match get_conflicts(&conn) {
        Ok(conflicts) => (StatusCode::OK, Json(ApiResponse::ok(conflicts))).into_response(),
        Err(e) => {
            eprintln!("Error loading conflicts: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::ok(Vec::<roll_recon::ConflictRecord>::new())),
            )
                .into_response()
        }
    }
}

/// GET /api/audit - Latest run audit
async fn latest_audit(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    match get_latest_audit(&conn) {
        Ok(audit) => (StatusCode::OK, Json(ApiResponse::ok(audit))).into_response(),
        Err(e) => {
            eprintln!("Error loading audit: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::ok(None::<roll_recon::RollAudit>)),
            )
                .into_response()
        }
    }
}

/// GET /api/summary - Headline numbers
async fn summary(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    let stats = get_booth_stats(&conn).unwrap_or_default();
    let conflicts = get_conflicts(&conn).map(|c| c.len()).unwrap_or(0);
    let audit = get_latest_audit(&conn).ok().flatten();

    let response = SummaryResponse {
        voter_count: stats.iter().map(|s| s.voter_count as usize).sum(),
        placed_count: stats.iter().map(|s| s.placed_count as usize).sum(),
        conflict_count: conflicts,
        booth_count: stats.len(),
        is_final: audit.map(|a| a.is_final()),
    };

    (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
}

fn parse_booth(s: &str) -> Option<BoothKey> {
    let mut parts = s.split('/');
    let ward: u32 = parts.next()?.trim().parse().ok()?;
    let booth: u32 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(BoothKey::new(ward, booth))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    println!("🌐 Roll Reconciliation - Review Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "roll.db".to_string());
    let db_path = std::path::Path::new(&db_path);

    if !db_path.exists() {
        eprintln!("❌ Database not found at {:?}", db_path);
        eprintln!("   Run: cargo run -- ingest <booths.csv> <batch_dir>");
        eprintln!("   to reconcile batches first.");
        std::process::exit(1);
    }

    let conn = Connection::open(db_path).expect("Failed to open database");
    println!("✓ Database opened: {:?}", db_path);

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/voters", get(list_voters))
        .route("/booths/:locator", get(booth_voters))
        .route("/conflicts", get(list_conflicts))
        .route("/audit", get(latest_audit))
        .route("/summary", get(summary))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   Voters:    http://localhost:3000/api/voters");
    println!("   Conflicts: http://localhost:3000/api/conflicts");
    println!("   Audit:     http://localhost:3000/api/audit");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

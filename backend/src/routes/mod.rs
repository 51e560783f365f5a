//! Route definitions for the stock ledger API

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/movements", movement_routes())
        .nest("/stock", stock_routes())
        .nest("/sync", sync_routes())
        .nest("/conflicts", conflict_routes())
        .nest("/agents", agent_routes())
        .route("/archive", post(handlers::archive_movements))
}

fn movement_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_movements).post(handlers::record_movement),
        )
        .route("/:movement_id", get(handlers::get_movement))
        .route("/:movement_id/approve", post(handlers::approve_movement))
        .route("/:movement_id/reject", post(handlers::reject_movement))
}

fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_snapshots))
        .route("/low", get(handlers::low_stock))
        .route("/:product_id", get(handlers::get_stock))
}

fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::sync_health))
        .route("/bins", post(handlers::sync_bins))
        .route("/queue", get(handlers::queue_status))
}

fn conflict_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_conflicts))
        .route("/resolve", post(handlers::resolve_conflicts))
}

fn agent_routes() -> Router<AppState> {
    Router::new()
        .route("/:agent_id/link", post(handlers::link_agent))
        .route("/:agent_id/activate", post(handlers::activate_agent))
        .route("/:agent_id/deactivate", post(handlers::deactivate_agent))
}

//! Route definitions for the Organic Certification Platform

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - inspection lifecycle
        .nest("/inspections", inspection_routes(state.clone()))
        // Protected routes - checklist scoring
        .nest("/checklists", checklist_routes(state.clone()))
        // Protected routes - certificate registry, plus public verification
        .nest("/certificates", certificate_routes(state.clone()))
        // Protected routes - per-farm views
        .nest("/farms", farm_routes(state))
}

/// Inspection routes (protected)
fn inspection_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::schedule_inspection))
        .route("/:inspection_id", get(handlers::get_inspection))
        .route("/:inspection_id/checklist", put(handlers::record_checklist))
        .route("/:inspection_id/status", put(handlers::update_status))
        .route("/:inspection_id/approve", post(handlers::approve_inspection))
        .route("/:inspection_id/reject", post(handlers::reject_inspection))
        .route("/:inspection_id/history", get(handlers::get_status_history))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Checklist routes (protected)
fn checklist_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/score", post(handlers::score_checklist))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Certificate routes; `/verify/:number` stays public for buyers and auditors
fn certificate_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::issue_certificate))
        .route("/expiring", get(handlers::list_expiring_certificates))
        .route("/expire", post(handlers::expire_overdue_certificates))
        .route("/:certificate_id", get(handlers::get_certificate))
        .route("/:certificate_id/pdf", get(handlers::download_certificate_pdf))
        .route(
            "/:certificate_id/status",
            put(handlers::change_certificate_status),
        )
        .route(
            "/:certificate_id/history",
            get(handlers::get_certificate_history),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
        .route("/verify/:number", get(handlers::verify_certificate))
}

/// Farm routes (protected)
fn farm_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/:farm_id/certificates",
            get(handlers::list_farm_certificates),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

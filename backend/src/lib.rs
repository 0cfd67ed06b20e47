//! Organic Certification Platform - Backend
//!
//! Inspection scheduling and scoring, the inspection status lifecycle and
//! certificate issuance for organic farms.

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;

use crate::external::{CertificateRenderer, DocumentStore};
use crate::services::{CertificateIssuer, CertificateService, InspectionLifecycle};
use crate::store::CertificationStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CertificationStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub renderer: Arc<dyn CertificateRenderer>,
    pub config: Arc<Config>,
    /// Set when running against PostgreSQL, for health reporting
    pub db: Option<sqlx::PgPool>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn CertificationStore>,
        documents: Arc<dyn DocumentStore>,
        renderer: Arc<dyn CertificateRenderer>,
        config: Config,
    ) -> Self {
        Self {
            store,
            documents,
            renderer,
            config: Arc::new(config),
            db: None,
        }
    }

    pub fn with_database(mut self, db: sqlx::PgPool) -> Self {
        self.db = Some(db);
        self
    }

    pub fn issuer(&self) -> CertificateIssuer {
        CertificateIssuer::new(
            self.store.clone(),
            self.documents.clone(),
            self.renderer.clone(),
            &self.config.certification,
        )
    }

    pub fn lifecycle(&self) -> InspectionLifecycle {
        InspectionLifecycle::new(
            self.store.clone(),
            self.issuer(),
            self.config.certification.auto_approve_on_completion,
        )
    }

    pub fn certificates(&self) -> CertificateService {
        CertificateService::new(self.store.clone(), self.documents.clone())
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

//! Organic Certification Platform - Backend Server
//!
//! Runs against PostgreSQL when `database.url` is set, otherwise on the
//! in-memory store for local demos.

use certification_backend::{
    config::LoggingConfig,
    create_app,
    external::{document_store_from_config, PdfCertificateRenderer},
    store::{CertificationStore, MemoryStore, PgStore},
    AppState, Config,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    init_tracing(&config.logging);

    tracing::info!("Starting Organic Certification Server");
    tracing::info!("Environment: {}", config.environment);

    let documents = document_store_from_config(&config.storage)?;
    let renderer = Arc::new(PdfCertificateRenderer::new());

    let state = if config.uses_database() {
        tracing::info!("Connecting to database...");
        let db_pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.database.url)
            .await?;

        tracing::info!("Database connection established");

        // Run migrations in development
        if config.environment == "development" {
            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&db_pool).await?;
            tracing::info!("Migrations completed");
        }

        let store: Arc<dyn CertificationStore> = Arc::new(PgStore::new(db_pool.clone()));
        AppState::new(store, documents, renderer, config.clone()).with_database(db_pool)
    } else {
        tracing::warn!("database.url is empty, using the in-memory store; data is not persisted");
        let store: Arc<dyn CertificationStore> = Arc::new(MemoryStore::new());
        AppState::new(store, documents, renderer, config.clone())
    };

    // Build application
    let app = create_app(state);

    // Start server
    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "oc_server=debug,certification_backend=debug,tower_http=debug,sqlx=warn".into()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(logging.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!logging.json).then(tracing_subscriber::fmt::layer))
        .init();
}

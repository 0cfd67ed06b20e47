//! Configuration management for the Organic Certification Platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with OC__ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT verification configuration
    pub jwt: JwtConfig,

    /// Certificate issuance policy
    pub certification: CertificationConfig,

    /// Certificate document storage
    pub storage: StorageConfig,

    /// Log output
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Empty runs the server on the in-memory store.
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret used to verify caller tokens issued upstream
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CertificationConfig {
    /// Certificate validity in months
    pub validity_months: u32,

    /// Issuing body printed on certificates
    pub certifying_body: String,

    /// Scope used when the caller does not give one
    pub default_scope: String,

    /// Certificate number prefix, `ORG` gives `ORG-2026-...`
    pub number_prefix: String,

    /// Upper bound on render + upload + persist during issuance
    pub issuance_timeout_secs: u64,

    /// Approve eligible inspections as soon as they are completed
    pub auto_approve_on_completion: bool,
}

impl Default for CertificationConfig {
    fn default() -> Self {
        Self {
            validity_months: 12,
            certifying_body: shared::CERTIFYING_BODY.to_string(),
            default_scope: "Organic crop production".to_string(),
            number_prefix: "ORG".to_string(),
            issuance_timeout_secs: 30,
            auto_approve_on_completion: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Http,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Where rendered certificate PDFs are kept
    pub backend: StorageBackend,

    /// Directory for the local backend
    pub local_dir: String,

    /// Base URL of the document service for the http backend
    pub http_base_url: String,

    /// API key sent to the document service
    pub http_api_key: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable ones
    pub json: bool,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("OC_ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let certification = CertificationConfig::default();

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("jwt.secret", "development-secret-key")?
            .set_default(
                "certification.validity_months",
                i64::from(certification.validity_months),
            )?
            .set_default("certification.certifying_body", certification.certifying_body)?
            .set_default("certification.default_scope", certification.default_scope)?
            .set_default("certification.number_prefix", certification.number_prefix)?
            .set_default(
                "certification.issuance_timeout_secs",
                certification.issuance_timeout_secs as i64,
            )?
            .set_default(
                "certification.auto_approve_on_completion",
                certification.auto_approve_on_completion,
            )?
            .set_default("storage.backend", "local")?
            .set_default("storage.local_dir", "./data/certificates")?
            .set_default("storage.http_base_url", "")?
            .set_default("storage.http_api_key", "")?
            .set_default("logging.json", false)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (OC_ prefix)
            .add_source(
                Environment::with_prefix("OC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn uses_database(&self) -> bool {
        !self.database.url.trim().is_empty()
    }
}

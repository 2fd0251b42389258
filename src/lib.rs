//! Unified patient profile library
//!
//! Federates a document store, a time-series store and a graph store into a
//! single patient report.

pub mod core;
pub mod db;
pub mod error;
pub mod models;

pub use crate::core::aggregate::{EngineSettings, ProfileEngine};
pub use crate::core::report::{persist, render};
pub use crate::error::{BackendError, ValidationError};

/// Application configuration
pub mod config {
    use serde::Deserialize;
    use std::path::PathBuf;
    use std::time::Duration;

    #[derive(Debug, Clone, Deserialize)]
    pub struct Config {
        pub document: DocumentConfig,
        pub timeseries: TimeSeriesConfig,
        pub graph: GraphConfig,
        pub supervisor: SupervisorConfig,
        pub engine: EngineConfig,
        pub report: ReportConfig,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct DocumentConfig {
        pub url: String,
        pub max_connections: u32,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct TimeSeriesConfig {
        pub url: Option<String>,
        pub org: Option<String>,
        pub bucket: String,
        pub token: Option<String>,
        pub measurement: String,
        pub window_days: u64,
    }

    impl TimeSeriesConfig {
        pub fn window(&self) -> Duration {
            Duration::from_secs(self.window_days * 24 * 60 * 60)
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct GraphConfig {
        pub url: Option<String>,
        pub database: String,
        pub user: Option<String>,
        pub password: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct SupervisorConfig {
        pub connect_attempts: usize,
        pub retry_delay_ms: u64,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct EngineConfig {
        pub query_timeout_ms: u64,
    }

    impl EngineConfig {
        pub fn query_timeout(&self) -> Duration {
            Duration::from_millis(self.query_timeout_ms)
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ReportConfig {
        pub output_dir: PathBuf,
    }

    /// Load configuration from `config/` in the working directory
    pub fn load_config() -> Result<Config, config::ConfigError> {
        load_config_from("config")
    }

    /// Load configuration from the given directory.
    ///
    /// Credentials have no defaults; they come from the environment
    /// (`PROFILE_GRAPH__PASSWORD`, `PROFILE_TIMESERIES__TOKEN`, ...).
    pub fn load_config_from(dir: &str) -> Result<Config, config::ConfigError> {
        let env = std::env::var("PROFILE_ENV").unwrap_or_else(|_| "development".into());

        config::Config::builder()
            // Start with default settings
            .set_default("document.url", "sqlite://profiles.db")?
            .set_default("document.max_connections", 5)?
            .set_default("timeseries.bucket", "HealthData")?
            .set_default("timeseries.measurement", "body_data")?
            .set_default("timeseries.window_days", 30)?
            .set_default("graph.database", "neo4j")?
            .set_default("supervisor.connect_attempts", 3)?
            .set_default("supervisor.retry_delay_ms", 2000)?
            .set_default("engine.query_timeout_ms", 5000)?
            .set_default("report.output_dir", "reports")?
            .add_source(config::File::with_name(&format!("{}/default", dir)).required(false))
            // Override with environment-specific settings
            .add_source(config::File::with_name(&format!("{}/{}", dir, env)).required(false))
            // Override with environment variables
            .add_source(
                config::Environment::with_prefix("PROFILE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

}

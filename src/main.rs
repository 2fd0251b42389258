//! Patient profile CLI
//!
//! Connects the backends once, then prints (and optionally saves) a unified
//! report for each patient name given on the command line.

use anyhow::{Context, Result};
use clap::Parser;
use patient_profile::config;
use patient_profile::db::{ConnectionSupervisor, RetryPolicy};
use patient_profile::{persist, render, EngineSettings, ProfileEngine};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "patient-profile",
    about = "Unified patient profiles from document, time-series and graph stores"
)]
struct Cli {
    /// Patient names to report on
    #[arg(required = true)]
    names: Vec<String>,

    /// Write each report to the configured output directory
    #[arg(long)]
    persist: bool,

    /// Directory holding default.toml and environment overrides
    #[arg(long, default_value = "config")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logger
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::load_config_from(&cli.config).context("Failed to load configuration")?;

    // Connect backends; failures only mark a backend unavailable
    let supervisor = ConnectionSupervisor::new(RetryPolicy::from(&config.supervisor));
    let backends = supervisor.connect_all(&config).await;
    info!(
        document = backends.document.is_available(),
        timeseries = backends.timeseries.is_available(),
        graph = backends.graph.is_available(),
        "Backends ready"
    );

    let engine = ProfileEngine::new(backends, EngineSettings::from(&config));

    for name in &cli.names {
        let report = match engine.build_profile(name).await {
            Ok(report) => report,
            Err(e) => {
                eprintln!("Invalid patient name {:?}: {}", name, e);
                continue;
            }
        };

        let text = render(&report);
        println!("{}", text);

        if cli.persist && !report.is_not_found() {
            if let Err(e) = persist(&config.report.output_dir, &report.patient, &text).await {
                error!(patient = %report.patient, error = %e, "Failed to write report");
            }
        }
    }

    Ok(())
}

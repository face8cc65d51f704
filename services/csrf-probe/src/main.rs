//! CSRF Probe - Main Entry Point

use anyhow::Context;
use csrf_probe::{Probe, ProbeConfig};
use rust_common::{TracingConfig, init_tracing};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    init_tracing(&TracingConfig::from_env("csrf-probe"))?;

    let config = ProbeConfig::from_env().context("Failed to load probe configuration")?;
    info!(backend = %config.client.base_url, "Starting CSRF probe");

    let probe = Probe::new(config)?;
    let report = probe.run().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.passed {
        info!("All CSRF checks passed");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(failed = report.failed_count(), "CSRF checks failed");
        Ok(ExitCode::FAILURE)
    }
}

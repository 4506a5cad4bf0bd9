//! Main entry point for the callbridge CLI
//!
//! Loads configuration, installs logging, and runs the interactive loop
//! against the simulated signaling gateway.

mod commands;
mod config;
mod logging;
mod shell;

use std::sync::Arc;

use anyhow::Result;
use callbridge_core::{BridgeOrchestrator, SimulatedGateway};
use clap::Parser;
use tokio::io::BufReader;

use crate::config::{Args, CliConfig};
use crate::shell::Shell;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = CliConfig::load(args.config.as_deref())?.with_overrides(&args);

    logging::setup_logging(config.logging_config()?)?;
    logging::log_welcome("callbridge", callbridge_core::VERSION);

    let gateway_config = config.gateway_config();
    tracing::info!(
        "Simulated gateway with {} endpoints, app {}",
        gateway_config.endpoints.len(),
        config.bridge.app_name
    );
    let gateway = Arc::new(SimulatedGateway::new(gateway_config));
    let orchestrator = BridgeOrchestrator::new(gateway, config.bridge.clone());

    Shell::new(&orchestrator, std::io::stdout())
        .run(BufReader::new(tokio::io::stdin()))
        .await
}

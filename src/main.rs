use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod cli;
mod commands;
mod config;
mod models;
mod services;
mod utils;

use cli::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    // Logs go to stderr; stdout carries the cycle summary
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("price_monitor=info,warn")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    info!("🚀 Starting price-monitor v{}", env!("CARGO_PKG_VERSION"));
    info!("Using config {}", args.config.display());

    match commands::execute(&args).await {
        Ok(()) => {
            info!("✅ {}", commands::completion_message(&args));
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

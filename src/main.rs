//! Main entry point for the pgshift application.
//!
//! Initializes tracing when debug mode is requested and delegates to the
//! CLI handler for command execution.

use anyhow::Result;
use pgshift::commands::Cli;
use std::env;

fn main() -> Result<()> {
    // Initialize tracing only if debug mode is enabled
    // This prevents log output from cluttering normal CLI usage
    if env::var("PGSHIFT_DEBUG").is_ok() || env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "pgshift=debug".into()))
            .init();
    }

    Cli::menu()
}

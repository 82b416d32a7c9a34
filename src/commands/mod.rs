//! Command-line interface commands for the pgshift application.
//!
//! One module per subcommand, each exposing its clap `Args` struct and a
//! `cmd` entry point:
//!
//! ```bash
//! pgshift initdb                      # Create the migrator bookkeeping schema
//! pgshift up                          # Apply all pending phases
//! pgshift down 3                      # Revert back to revision 3
//! pgshift revision "add user emails"  # Generate the next revision from the live DB
//! ```
//!
//! Every command takes `--config` (the repository YAML, `migrator.yml` by
//! default) and `--database-url` (falling back to the `DATABASE_URL`
//! environment variable).

pub mod down;
pub mod initdb;
pub mod revision;
pub mod up;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Options shared by every subcommand.
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Path to the repository config file
    #[arg(short, long, default_value = "migrator.yml")]
    pub config: PathBuf,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,
}

/// Defines the main subcommands that the application can execute.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the migrator's bookkeeping schema in the target database
    #[command(about = "Initialize the migrator schema")]
    Initdb(initdb::InitdbArgs),

    /// Apply every pending phase, resuming from the audit log
    #[command(about = "Upgrade the database to the latest revision")]
    Up(up::UpArgs),

    /// Revert phases until the target revision is the newest applied
    #[command(about = "Downgrade the database to a revision")]
    Down(down::DownArgs),

    /// Diff the live database against the last declared schema and write
    /// the next revision files
    #[command(about = "Generate a new revision")]
    Revision(revision::RevisionArgs),
}

/// The main CLI structure that parses command-line arguments.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help(true))]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Parses command-line arguments and executes the corresponding command.
    pub fn menu() -> Result<()> {
        let cli = Self::parse();

        match cli.command {
            Commands::Initdb(args) => initdb::cmd(args),
            Commands::Up(args) => up::cmd(args),
            Commands::Down(args) => down::cmd(args),
            Commands::Revision(args) => revision::cmd(args),
        }
    }
}

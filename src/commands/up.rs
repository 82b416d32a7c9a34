//! Database upgrade command.
//!
//! Parses the repository, derives the resume point from the audit log, and
//! applies every pending phase in order. An uninitialized database can be
//! set up on the spot after a confirmation, matching the behaviour of a
//! first deploy.

use crate::db::db::Db;
use crate::libs::error::MigratorError;
use crate::libs::messages::Message;
use crate::libs::migrate;
use crate::libs::revision::Repo;
use crate::msg_info;
use anyhow::Result;
use clap::Args;

/// Command-line arguments for the up command.
#[derive(Debug, Args)]
pub struct UpArgs {
    #[command(flatten)]
    connection: super::ConnectionArgs,

    /// Initialize the migrator schema without prompting if it is missing
    #[arg(short, long)]
    yes: bool,
}

/// Executes the up command.
pub fn cmd(args: UpArgs) -> Result<()> {
    let repo = Repo::parse(&args.connection.config)?;
    let mut db = Db::connect(&args.connection.database_url)?;

    if !db.is_set_up()? {
        if !args.yes && !super::initdb::confirm_initialize()? {
            msg_info!(Message::OperationCancelled);
            return Err(MigratorError::SchemaNotInitialised.into());
        }
        db.create_schema()?;
    }

    migrate::upgrade(&mut db, &repo)
}

//! Migrator schema initialization command.
//!
//! Creates the `migrator_status` schema with its three bookkeeping tables.
//! Safe to re-run; an already initialized database is reported and left
//! untouched.

use crate::db::db::Db;
use crate::libs::messages::Message;
use crate::{msg_info, msg_success};
use anyhow::Result;
use clap::Args;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;

/// Command-line arguments for the initdb command.
#[derive(Debug, Args)]
pub struct InitdbArgs {
    #[command(flatten)]
    connection: super::ConnectionArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

/// Executes the initdb command.
pub fn cmd(args: InitdbArgs) -> Result<()> {
    let mut db = Db::connect(&args.connection.database_url)?;
    if db.is_set_up()? {
        msg_info!(Message::DbAlreadySetUp);
        return Ok(());
    }
    if !args.yes && !confirm_initialize()? {
        msg_info!(Message::OperationCancelled);
        return Ok(());
    }
    db.create_schema()?;
    msg_success!(Message::DbInitialized);
    Ok(())
}

/// Asks before creating the schema so `initdb` against the wrong URL is a
/// recoverable mistake.
pub fn confirm_initialize() -> Result<bool> {
    let answer = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(Message::AskInitializeDb.to_string())
        .default(true)
        .interact()?;
    Ok(answer)
}

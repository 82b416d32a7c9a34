//! Database downgrade command.
//!
//! Reverts phases in reverse plan order until the target revision is the
//! newest applied one. Downgrades are destructive by nature, so the command
//! reports application backends still pinned above the target and asks for
//! confirmation before touching anything.

use crate::db::db::Db;
use crate::db::{audit, connections};
use crate::libs::error::MigratorError;
use crate::libs::messages::Message;
use crate::libs::migrate;
use crate::libs::revision::Repo;
use crate::{msg_info, msg_warning};
use anyhow::Result;
use clap::Args;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;

/// Command-line arguments for the down command.
#[derive(Debug, Args)]
pub struct DownArgs {
    /// Revision number to downgrade to; 0 reverts everything
    pub revision: i32,

    #[command(flatten)]
    connection: super::ConnectionArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

/// Executes the down command.
pub fn cmd(args: DownArgs) -> Result<()> {
    let repo = Repo::parse(&args.connection.config)?;
    let mut db = Db::connect(&args.connection.database_url)?;
    if !db.is_set_up()? {
        return Err(MigratorError::SchemaNotInitialised.into());
    }

    if let Some(last) = audit::get_last_finished(&mut db.client)? {
        msg_info!(Message::DowngradePlan {
            from: last.index.revision,
            to: args.revision,
        });
    }

    // Backends pinned above the target would lose the columns and shim
    // views they depend on the moment the contraction runs.
    let pinned = connections::pinned_at_or_above(&mut db.client, args.revision + 1)?;
    if !pinned.is_empty() {
        msg_warning!(Message::PinnedConnections {
            count: pinned.len(),
            revision: args.revision + 1,
        });
    }

    if !args.yes {
        let answer = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(Message::ConfirmDowngrade(args.revision).to_string())
            .default(false)
            .interact()?;
        if !answer {
            msg_info!(Message::OperationCancelled);
            return Ok(());
        }
    }

    migrate::downgrade(&mut db, &repo, args.revision)
}

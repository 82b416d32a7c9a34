//! Display implementation for pgshift application messages.
//!
//! Converts structured [`Message`] values into the human-readable text shown
//! on the terminal. All user-facing wording lives here, in one place, so the
//! rest of the code never formats ad-hoc strings.

use super::types::Message;
use std::fmt;

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            // === INITDB MESSAGES ===
            Message::AskInitializeDb => "The migrator schema does not exist in this database. Create it?".to_string(),
            Message::DbInitialized => "Migrator schema created".to_string(),
            Message::DbAlreadySetUp => "Migrator schema already exists, nothing to do".to_string(),

            // === UPGRADE MESSAGES ===
            Message::UpgradeUpToDate => "Database is up to date".to_string(),
            Message::UpgradePending(count) => format!("{} phase(s) pending", count),
            Message::RunningPhase(index) => format!("Running {}", index),
            Message::ResumingUnfinishedPhase(index) => format!("Re-running unfinished {}", index),
            Message::RevisionApplied(number) => format!("Revision {} applied", number),
            Message::UpgradeComplete(count) => format!("Upgrade complete, {} phase(s) run", count),

            // === DOWNGRADE MESSAGES ===
            Message::DowngradePlan { from, to } => format!("Downgrading from revision {} to revision {}", from, to),
            Message::ConfirmDowngrade(target) => format!("Revert the database to revision {}?", target),
            Message::PinnedConnections { count, revision } => {
                format!("{} connection(s) still pinned to revision {} or later", count, revision)
            }
            Message::RevertingPhase(index) => format!("Reverting {}", index),
            Message::NothingToDowngrade => "No finished phases above the target revision, nothing to do".to_string(),
            Message::DowngradeComplete(target) => format!("Downgrade complete, database is at revision {}", target),

            // === REVISION MESSAGES ===
            Message::DumpingSchema(command) => format!("Dumping schema with `{}`", command),
            Message::SchemaDumped(path) => format!("Schema written to {}", path),
            Message::DiffEmpty => "No schema changes detected; writing an empty migration".to_string(),
            Message::RevisionWritten { number, path } => format!("Revision {} written to {}", number, path),
            Message::IncantationWritten(path) => format!("Connection incantation written to {}", path),

            // === SHIM SCHEMA MESSAGES ===
            Message::ShimSchemaCreated(name) => format!("Shim schema {} created", name),
            Message::ShimSchemaDropped(name) => format!("Shim schema {} dropped", name),
            Message::ShimSchemaInUse(name) => format!("Shim schema {} still holds rename views, leaving it in place", name),

            // === GENERIC MESSAGES ===
            Message::OperationCancelled => "Operation cancelled".to_string(),
        };
        write!(f, "{}", text)
    }
}

//! Typed error kinds for the migration engine.
//!
//! Every failure mode that callers may want to distinguish is a variant
//! here; commands surface them through `anyhow` and exit non-zero. None of
//! these are retried automatically — re-running the command is the recovery
//! path for interrupted idempotent phases.

use crate::libs::plan::PhaseIndex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigratorError {
    /// The `migrator_status` schema is missing; only `initdb` may recover.
    #[error("migrator schema is not set up in this database; run `pgshift initdb` first")]
    SchemaNotInitialised,

    /// On-disk and database disagree on a revision's hash triple.
    #[error("revision {revision} on disk does not match the copy recorded in the database; refusing to continue")]
    RevisionConflict { revision: i32 },

    /// A second migrator holds the single unfinished-audit slot.
    #[error("another migrator already holds an unfinished phase; only one migrator may run at a time")]
    ConcurrentMigrator,

    /// A rename references a column that does not exist on the live table.
    #[error("columns not present on table \"{table}\": {columns}")]
    SchemaMismatch { table: String, columns: String },

    /// The database rejected a phase's DDL.
    #[error("{index} failed")]
    PhaseFailure {
        index: PhaseIndex,
        #[source]
        source: postgres::Error,
    },

    /// A revision file failed YAML schema validation.
    #[error("malformed revision file {filename}: {cause}")]
    MalformedRevision { filename: String, cause: String },

    /// On-disk revisions are not contiguous from 1.
    #[error("revision files are not contiguous: expected revision {gap_at}")]
    MissingRevision { gap_at: i32 },

    /// The diff engine cannot represent a required change.
    #[error("cannot represent schema change: {0}")]
    DiffUnsupported(String),

    /// An audit row was finished twice; guards against double-commit.
    #[error("audit row {id} is already finished")]
    AuditAlreadyFinished { id: i32 },
}

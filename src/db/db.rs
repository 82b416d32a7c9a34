//! Core database connection management and migrator bookkeeping schema.
//!
//! Wraps a synchronous PostgreSQL connection and owns the lifecycle of the
//! migrator's own namespace: the `migrator_status` schema with its three
//! tables, and the per-revision shim schemas created around each revision's
//! phases.
//!
//! ## Transaction discipline
//!
//! The connection runs in autocommit mode. Code that must run inside a
//! transaction takes a `postgres::Transaction`; code that must not (the
//! `CONCURRENTLY` statements) takes the plain client. The type system makes
//! it impossible to open a transaction inside a transaction, which is the
//! invariant the audit disciplines depend on.

use crate::libs::messages::Message;
use crate::msg_debug;
use anyhow::Result;
use postgres::error::SqlState;
use postgres::{Client, NoTls};
use rand::Rng;

/// Namespace holding the migrator's bookkeeping tables.
pub const SCHEMA_NAME: &str = "migrator_status";

/// Bookkeeping DDL, idempotent so `initdb` can be re-run safely.
///
/// Two partial unique indexes carry the engine's core invariants:
/// at most one audit row may be unfinished at any time (this is the
/// mutual-exclusion primitive between migrator processes), and each
/// non-deleted revision number appears once. The primary key on the
/// hash triple lets re-runs upsert revisions they have seen before.
const SCHEMA_DDL: &str = "
CREATE SCHEMA IF NOT EXISTS migrator_status;

CREATE TABLE IF NOT EXISTS migrator_status.revisions (
    revision INT NOT NULL,
    migration_hash BYTEA NOT NULL,
    schema_hash BYTEA NOT NULL,
    migration_text TEXT NOT NULL,
    is_deleted BOOL NOT NULL DEFAULT FALSE,
    PRIMARY KEY (revision, migration_hash, schema_hash)
);

CREATE UNIQUE INDEX IF NOT EXISTS revisions_one_live_number
    ON migrator_status.revisions (revision)
    WHERE NOT is_deleted;

CREATE TABLE IF NOT EXISTS migrator_status.migration_audit (
    id SERIAL PRIMARY KEY,
    revision INT NOT NULL,
    migration_hash BYTEA NOT NULL,
    schema_hash BYTEA NOT NULL,
    pre_deploy BOOL NOT NULL,
    change INT NOT NULL,
    phase INT NOT NULL,
    is_revert BOOL NOT NULL,
    started_at TIMESTAMP WITH TIME ZONE NOT NULL,
    finished_at TIMESTAMP WITH TIME ZONE,
    CHECK (finished_at IS NULL OR finished_at >= started_at)
);

CREATE UNIQUE INDEX IF NOT EXISTS migration_audit_one_unfinished
    ON migrator_status.migration_audit ((true))
    WHERE started_at IS NOT NULL AND finished_at IS NULL;

CREATE TABLE IF NOT EXISTS migrator_status.connections (
    pid INT PRIMARY KEY,
    revision INT NOT NULL,
    schema_hash BYTEA NOT NULL,
    backend_start TIMESTAMP WITH TIME ZONE NOT NULL
);
";

/// Existence probe for the migrator namespace.
const SELECT_IS_SET_UP: &str = "SELECT EXISTS (SELECT FROM information_schema.schemata WHERE schema_name = $1)";

/// Name of the shim schema serving revision `revision`.
///
/// Applications prepend this schema to their `search_path` while the
/// revision's rename views are live.
pub fn shim_schema_name(revision: i32) -> String {
    format!("shim_rev_{}", revision)
}

/// Core database handle used by the migrator.
pub struct Db {
    /// The underlying connection, in autocommit mode.
    pub client: Client,
}

impl Db {
    /// Connects to the given database URL.
    pub fn connect(database_url: &str) -> Result<Self> {
        let client = Client::connect(database_url, NoTls)?;
        Ok(Db { client })
    }

    /// Whether the migrator bookkeeping schema exists in this database.
    pub fn is_set_up(&mut self) -> Result<bool> {
        let row = self.client.query_one(SELECT_IS_SET_UP, &[&SCHEMA_NAME])?;
        Ok(row.get(0))
    }

    /// Creates the bookkeeping schema, tables and invariant indexes.
    pub fn create_schema(&mut self) -> Result<()> {
        let mut tx = self.client.transaction()?;
        tx.batch_execute(SCHEMA_DDL)?;
        tx.commit()?;
        Ok(())
    }

    /// Creates the shim schema for a revision.
    ///
    /// Runs immediately before the revision's first phase so rename views
    /// have a namespace to land in.
    pub fn create_shim_schema(&mut self, revision: i32) -> Result<()> {
        let name = shim_schema_name(revision);
        self.client.batch_execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", name))?;
        msg_debug!(Message::ShimSchemaCreated(name));
        Ok(())
    }

    /// Drops the shim schema for a revision.
    ///
    /// Not cascaded. A schema still holding a rename view is left standing
    /// on purpose: applications pinned to the revision read through that
    /// view until the next revision's FinishRename retires it.
    pub fn drop_shim_schema(&mut self, revision: i32) -> Result<()> {
        let name = shim_schema_name(revision);
        match self.client.batch_execute(&format!("DROP SCHEMA IF EXISTS {}", name)) {
            Ok(()) => {
                msg_debug!(Message::ShimSchemaDropped(name));
                Ok(())
            }
            Err(e) if e.code() == Some(&SqlState::DEPENDENT_OBJECTS_STILL_EXIST) => {
                msg_debug!(Message::ShimSchemaInUse(name));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Runs `f` against a throwaway database created on this server.
    ///
    /// The database gets a random name, `f` receives a URL pointing at it,
    /// and the database is dropped afterwards whether or not `f` succeeded.
    /// `f` must close its own connections before returning or the drop
    /// fails.
    pub fn with_temp_database<T>(&mut self, base_url: &str, f: impl FnOnce(&str) -> Result<T>) -> Result<T> {
        let suffix: String = rand::thread_rng().sample_iter(rand::distributions::Alphanumeric).take(10).map(char::from).collect();
        let db_name = format!("pgshift_tmp_{}", suffix.to_lowercase());
        self.client.batch_execute(&format!("CREATE DATABASE {}", db_name))?;
        let result = f(&replace_db_name(base_url, &db_name));
        let dropped = self.client.batch_execute(&format!("DROP DATABASE IF EXISTS {}", db_name));
        let value = result?;
        dropped?;
        Ok(value)
    }
}

/// Swaps the database name in a connection URL, keeping any query string.
pub fn replace_db_name(url: &str, db_name: &str) -> String {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };
    let replaced = match base.rsplit_once('/') {
        Some((head, _)) => format!("{}/{}", head, db_name),
        None => format!("{}/{}", base, db_name),
    };
    match query {
        Some(query) => format!("{}?{}", replaced, query),
        None => replaced,
    }
}

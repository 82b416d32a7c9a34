//! The applied-revisions table.
//!
//! One row per revision that has started applying, identified by the
//! `(revision, migration_hash, schema_hash)` triple. Re-running a revision
//! whose hashes match the recorded row is an upsert; the same number with
//! different hashes means history was rewritten underneath the database and
//! is a hard error. Rows are tombstoned via `is_deleted`, never removed.

use crate::libs::error::MigratorError;
use crate::libs::revision::Revision;
use anyhow::Result;
use postgres::error::SqlState;
use postgres::{Client, Row};
use std::collections::BTreeMap;

/// Records a revision, ignoring exact duplicates.
///
/// The conflict target is the hash-triple primary key, so a re-run of an
/// already recorded revision is a no-op while a changed file at the same
/// number trips the `revisions_one_live_number` partial index instead.
const UPSERT: &str = "INSERT INTO migrator_status.revisions (revision, migration_hash, schema_hash, migration_text)
VALUES ($1, $2, $3, $4)
ON CONFLICT (revision, migration_hash, schema_hash) DO NOTHING";

/// Fetches the live row for a revision number.
const SELECT_BY_NUMBER: &str = "SELECT revision, migration_hash, schema_hash, migration_text, is_deleted
FROM migrator_status.revisions
WHERE revision = $1 AND NOT is_deleted";

/// Fetches all live revisions in number order.
const SELECT_ALL: &str = "SELECT revision, migration_hash, schema_hash, migration_text, is_deleted
FROM migrator_status.revisions
WHERE NOT is_deleted
ORDER BY revision";

/// A revision as recorded in the database.
#[derive(Debug, Clone)]
pub struct DbRevision {
    pub revision: i32,
    pub migration_hash: Vec<u8>,
    pub schema_hash: Vec<u8>,
    pub migration_text: String,
    pub is_deleted: bool,
}

fn map_revision(row: &Row) -> DbRevision {
    DbRevision {
        revision: row.get(0),
        migration_hash: row.get(1),
        schema_hash: row.get(2),
        migration_text: row.get(3),
        is_deleted: row.get(4),
    }
}

/// Records `revision` and returns the stored row.
///
/// Raises [`MigratorError::RevisionConflict`] when the database already
/// holds the same revision number with different contents.
pub fn upsert(client: &mut Client, revision: &Revision) -> Result<DbRevision> {
    let result = client.execute(
        UPSERT,
        &[
            &revision.number,
            &revision.migration_hash,
            &revision.schema_hash,
            &revision.migration_text,
        ],
    );
    match result {
        Ok(_) => {}
        Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
            return Err(MigratorError::RevisionConflict { revision: revision.number }.into());
        }
        Err(e) => return Err(e.into()),
    }
    let row = client.query_one(SELECT_BY_NUMBER, &[&revision.number])?;
    let stored = map_revision(&row);
    if stored.migration_hash != revision.migration_hash || stored.schema_hash != revision.schema_hash {
        return Err(MigratorError::RevisionConflict { revision: revision.number }.into());
    }
    Ok(stored)
}

/// All live revisions, keyed by number.
pub fn get_all(client: &mut Client) -> Result<BTreeMap<i32, DbRevision>> {
    let rows = client.query(SELECT_ALL, &[])?;
    Ok(rows.iter().map(|row| {
        let revision = map_revision(row);
        (revision.revision, revision)
    }).collect())
}

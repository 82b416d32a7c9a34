//! The migration audit log.
//!
//! One row per phase execution attempt, forward or revert. A row is
//! inserted when the attempt starts and updated exactly once when it
//! finishes; rows are never deleted. The partial unique index created in
//! [`db`](crate::db::db) allows at most one unfinished row at any time,
//! which is simultaneously the resume marker for crashed idempotent phases
//! and the lock that keeps a second migrator out.
//!
//! Functions that must run inside the caller's transaction take a
//! [`postgres::Transaction`]; read-only queries used for resume-point
//! derivation take the plain client.

use crate::libs::error::MigratorError;
use crate::libs::plan::PhaseIndex;
use anyhow::Result;
use chrono::{DateTime, Utc};
use postgres::error::SqlState;
use postgres::{Client, Row, Transaction};

/// Inserts the start record for a phase attempt.
///
/// The insert claims the single unfinished-audit slot; a unique violation
/// here means another migrator got there first.
const INSERT_START: &str = "INSERT INTO migrator_status.migration_audit
    (revision, migration_hash, schema_hash, pre_deploy, change, phase, is_revert, started_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, now())
RETURNING id, started_at, finished_at, is_revert, revision, migration_hash, schema_hash, pre_deploy, change, phase";

/// Marks a phase attempt finished.
///
/// The `finished_at IS NULL` guard makes finishing idempotent-unsafe on
/// purpose: finishing the same row twice is a logic error and reports as
/// zero rows updated.
const UPDATE_END: &str = "UPDATE migrator_status.migration_audit
    SET finished_at = now()
WHERE id = $1 AND finished_at IS NULL
RETURNING id, started_at, finished_at, is_revert, revision, migration_hash, schema_hash, pre_deploy, change, phase";

/// Most recent audit row of any kind.
const SELECT_LATEST: &str = "SELECT id, started_at, finished_at, is_revert, revision, migration_hash, schema_hash, pre_deploy, change, phase
FROM migrator_status.migration_audit
ORDER BY id DESC
LIMIT 1";

/// Most recent finished audit row.
const SELECT_LAST_FINISHED: &str = "SELECT id, started_at, finished_at, is_revert, revision, migration_hash, schema_hash, pre_deploy, change, phase
FROM migrator_status.migration_audit
WHERE finished_at IS NOT NULL
ORDER BY id DESC
LIMIT 1";

/// Most recent attempt at a specific `(index, is_revert)` pair.
const SELECT_BY_INDEX: &str = "SELECT id, started_at, finished_at, is_revert, revision, migration_hash, schema_hash, pre_deploy, change, phase
FROM migrator_status.migration_audit
WHERE revision = $1 AND migration_hash = $2 AND schema_hash = $3
  AND pre_deploy = $4 AND change = $5 AND phase = $6 AND is_revert = $7
ORDER BY id DESC
LIMIT 1";

/// Unfinished attempt at a specific `(index, is_revert)` pair, if any.
///
/// Used to adopt the orphaned row left behind when a process died between
/// an idempotent phase's two audit transactions.
const SELECT_UNFINISHED_BY_INDEX: &str = "SELECT id, started_at, finished_at, is_revert, revision, migration_hash, schema_hash, pre_deploy, change, phase
FROM migrator_status.migration_audit
WHERE revision = $1 AND migration_hash = $2 AND schema_hash = $3
  AND pre_deploy = $4 AND change = $5 AND phase = $6 AND is_revert = $7
  AND finished_at IS NULL
ORDER BY id DESC
LIMIT 1";

/// One durable record of a phase execution attempt.
#[derive(Debug, Clone)]
pub struct MigrationAudit {
    pub id: i32,
    pub index: PhaseIndex,
    pub is_revert: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

fn map_audit(row: &Row) -> MigrationAudit {
    MigrationAudit {
        id: row.get(0),
        started_at: row.get(1),
        finished_at: row.get(2),
        is_revert: row.get(3),
        index: PhaseIndex {
            revision: row.get(4),
            migration_hash: row.get(5),
            schema_hash: row.get(6),
            pre_deploy: row.get(7),
            change: row.get(8),
            phase: row.get(9),
        },
    }
}

/// Inserts the start row for a phase attempt inside the caller's
/// transaction.
///
/// A unique violation on the one-unfinished index maps to
/// [`MigratorError::ConcurrentMigrator`]; it means a different process
/// holds an unfinished phase right now.
pub fn phase_start(tx: &mut Transaction<'_>, index: &PhaseIndex, is_revert: bool) -> Result<MigrationAudit> {
    let result = tx.query_one(
        INSERT_START,
        &[
            &index.revision,
            &index.migration_hash,
            &index.schema_hash,
            &index.pre_deploy,
            &index.change,
            &index.phase,
            &is_revert,
        ],
    );
    match result {
        Ok(row) => Ok(map_audit(&row)),
        Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => Err(MigratorError::ConcurrentMigrator.into()),
        Err(e) => Err(e.into()),
    }
}

/// Finishes a phase attempt inside the caller's transaction.
pub fn phase_end(tx: &mut Transaction<'_>, audit: &MigrationAudit) -> Result<MigrationAudit> {
    match tx.query_opt(UPDATE_END, &[&audit.id])? {
        Some(row) => Ok(map_audit(&row)),
        None => Err(MigratorError::AuditAlreadyFinished { id: audit.id }.into()),
    }
}

/// Most recent audit row, the anchor for resume-point derivation.
pub fn get_latest(client: &mut Client) -> Result<Option<MigrationAudit>> {
    Ok(client.query_opt(SELECT_LATEST, &[])?.map(|row| map_audit(&row)))
}

/// Most recent finished audit row.
pub fn get_last_finished(client: &mut Client) -> Result<Option<MigrationAudit>> {
    Ok(client.query_opt(SELECT_LAST_FINISHED, &[])?.map(|row| map_audit(&row)))
}

/// Most recent attempt at `(index, is_revert)`, finished or not.
pub fn get_audit(client: &mut Client, index: &PhaseIndex, is_revert: bool) -> Result<Option<MigrationAudit>> {
    let row = client.query_opt(
        SELECT_BY_INDEX,
        &[
            &index.revision,
            &index.migration_hash,
            &index.schema_hash,
            &index.pre_deploy,
            &index.change,
            &index.phase,
            &is_revert,
        ],
    )?;
    Ok(row.map(|row| map_audit(&row)))
}

/// Unfinished attempt at `(index, is_revert)` to adopt on resume.
pub fn get_unfinished(tx: &mut Transaction<'_>, index: &PhaseIndex, is_revert: bool) -> Result<Option<MigrationAudit>> {
    let row = tx.query_opt(
        SELECT_UNFINISHED_BY_INDEX,
        &[
            &index.revision,
            &index.migration_hash,
            &index.schema_hash,
            &index.pre_deploy,
            &index.change,
            &index.phase,
            &is_revert,
        ],
    )?;
    Ok(row.map(|row| map_audit(&row)))
}

//! The migration driver: upgrade and downgrade loops.
//!
//! The driver turns the audit log's tail into a resume point, slices the
//! global phase plan accordingly, and walks the slice through the phase
//! executor. Shim schemas are created immediately before a revision's first
//! phase and dropped immediately after its last one; the downgrade loop
//! mirrors that at the opposite ends.
//!
//! Before touching anything the driver proves that the on-disk repository
//! and the database agree on every applied revision's hash triple. A
//! mismatch means history was rewritten and no automated recovery is safe.

use crate::db::db::Db;
use crate::db::{audit, revisions};
use crate::libs::error::MigratorError;
use crate::libs::executor;
use crate::libs::messages::Message;
use crate::libs::plan::PhaseSlice;
use crate::libs::revision::Repo;
use crate::{msg_debug, msg_info, msg_success};
use anyhow::Result;

/// Applies every pending phase in plan order.
///
/// The resume point comes from the latest audit row: after a finished
/// forward phase the slice starts strictly past it; after a revert the
/// same index runs again as a forward step; an unfinished row (a crashed
/// idempotent phase) is re-entered in place.
pub fn upgrade(db: &mut Db, repo: &Repo) -> Result<()> {
    check_consistency(db, repo)?;

    let slice = match audit::get_latest(&mut db.client)? {
        None => PhaseSlice::default(),
        Some(last) => PhaseSlice {
            start_inclusive: last.is_revert || last.finished_at.is_none(),
            start: Some(last.index),
            ..PhaseSlice::default()
        },
    };
    let steps = repo.revisions.get_phases(&slice);
    if steps.is_empty() {
        msg_success!(Message::UpgradeUpToDate);
        return Ok(());
    }
    msg_info!(Message::UpgradePending(steps.len()));

    for step in &steps {
        let revision = repo
            .revisions
            .get(step.index.revision)
            .ok_or(MigratorError::RevisionConflict { revision: step.index.revision })?;
        if revision.first_index().as_ref() == Some(&step.index) {
            db.create_shim_schema(revision.number)?;
            revisions::upsert(&mut db.client, revision)?;
        }
        msg_debug!(Message::RunningPhase(step.index.to_string()));
        executor::run(db, &step.phase, &step.index)?;
        if revision.last_index().as_ref() == Some(&step.index) {
            db.drop_shim_schema(revision.number)?;
            msg_info!(Message::RevisionApplied(revision.number));
        }
    }
    msg_success!(Message::UpgradeComplete(steps.len()));
    Ok(())
}

/// Reverts phases in reverse plan order until `target` is the newest
/// applied revision.
///
/// The slice is bounded below by the first phase of revision `target + 1`
/// and above by the audit tail: a finished forward phase is included (it
/// must be undone), a finished revert is excluded (already undone), an
/// unfinished forward is excluded (it never completed), and an unfinished
/// revert is re-entered in place.
pub fn downgrade(db: &mut Db, repo: &Repo, target: i32) -> Result<()> {
    check_consistency(db, repo)?;

    let Some(first_to_revert) = repo.revisions.first_index_from(target + 1) else {
        msg_info!(Message::NothingToDowngrade);
        return Ok(());
    };
    let Some(last) = audit::get_latest(&mut db.client)? else {
        msg_info!(Message::NothingToDowngrade);
        return Ok(());
    };
    let end_inclusive = if last.is_revert {
        last.finished_at.is_none()
    } else {
        last.finished_at.is_some()
    };
    let slice = PhaseSlice {
        start: Some(first_to_revert),
        start_inclusive: true,
        end_inclusive,
        end: Some(last.index),
    };

    let steps = repo.revisions.get_phases(&slice);
    if steps.is_empty() {
        msg_info!(Message::NothingToDowngrade);
        return Ok(());
    }

    for step in steps.iter().rev() {
        let revision = repo
            .revisions
            .get(step.index.revision)
            .ok_or(MigratorError::RevisionConflict { revision: step.index.revision })?;
        if revision.last_index().as_ref() == Some(&step.index) {
            db.create_shim_schema(revision.number)?;
        }
        msg_debug!(Message::RevertingPhase(step.index.to_string()));
        executor::revert(db, &step.phase, &step.index)?;
        if revision.first_index().as_ref() == Some(&step.index) {
            db.drop_shim_schema(revision.number)?;
        }
    }
    msg_success!(Message::DowngradeComplete(target));
    Ok(())
}

/// Verifies disk and database agree on every applied revision.
///
/// Every live row in the revisions table must match the on-disk revision
/// of the same number by both hashes. Revisions past the audit tail are
/// allowed to be absent from the database; they simply have not run yet.
pub fn check_consistency(db: &mut Db, repo: &Repo) -> Result<()> {
    for (number, recorded) in revisions::get_all(&mut db.client)? {
        let Some(on_disk) = repo.revisions.get(number) else {
            return Err(MigratorError::RevisionConflict { revision: number }.into());
        };
        if recorded.migration_hash != on_disk.migration_hash || recorded.schema_hash != on_disk.schema_hash {
            return Err(MigratorError::RevisionConflict { revision: number }.into());
        }
    }
    Ok(())
}

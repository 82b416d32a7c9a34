//! Phase execution under the two audit disciplines.
//!
//! Running a phase direction always produces one finished audit row; the
//! difference between the disciplines is how many commits that takes.
//!
//! **Transactional** directions run in a single transaction: audit start,
//! DDL, audit finish, commit. A failure rolls the whole attempt back and
//! the log never shows it.
//!
//! **Idempotent** directions take three steps: a committed audit start, the
//! DDL outside any transaction (PostgreSQL refuses `CONCURRENTLY` inside a
//! transaction block), and a committed audit finish. A crash in the middle
//! leaves an unfinished row; on the next run that row is adopted and the
//! DDL re-executed, which is safe because every idempotent statement the
//! change model emits carries `IF [NOT] EXISTS`.

use crate::db::audit::{self, MigrationAudit};
use crate::db::db::{shim_schema_name, Db};
use crate::libs::change::{quote_ident, Direction, Phase, RenameDef};
use crate::libs::error::MigratorError;
use crate::libs::messages::Message;
use crate::libs::plan::PhaseIndex;
use crate::msg_info;
use anyhow::Result;
use postgres::Transaction;

/// Columns of a table in `public`, in ordinal order.
const SELECT_COLUMNS: &str = "SELECT column_name
FROM information_schema.columns
WHERE table_schema = 'public' AND table_name = $1
ORDER BY ordinal_position";

/// Runs a phase's up direction as a forward step.
pub fn run(db: &mut Db, phase: &Phase, index: &PhaseIndex) -> Result<()> {
    run_direction(db, &phase.up, index, false)
}

/// Runs a phase's down direction as a revert.
pub fn revert(db: &mut Db, phase: &Phase, index: &PhaseIndex) -> Result<()> {
    run_direction(db, &phase.down, index, true)
}

fn run_direction(db: &mut Db, direction: &Direction, index: &PhaseIndex, is_revert: bool) -> Result<()> {
    if direction.is_idempotent() {
        run_idempotent(db, direction, index, is_revert)
    } else {
        run_transactional(db, direction, index, is_revert)
    }
}

/// Single-transaction discipline: audit and DDL commit or roll back as one.
fn run_transactional(db: &mut Db, direction: &Direction, index: &PhaseIndex, is_revert: bool) -> Result<()> {
    let mut tx = db.client.transaction()?;
    let audit = audit::phase_start(&mut tx, index, is_revert)?;
    match direction {
        Direction::TxDdl(sql) => execute_ddl(&mut tx, sql, index)?,
        Direction::CreateRenameView { rename, in_prior_shim } => {
            create_rename_view(&mut tx, rename, index, shim_revision(index, *in_prior_shim))?
        }
        Direction::DropRenameView { table, in_prior_shim } => {
            let shim = shim_schema_name(shim_revision(index, *in_prior_shim));
            let sql = format!("DROP VIEW {}.{}", shim, quote_ident(table));
            execute_ddl(&mut tx, &sql, index)?;
        }
        Direction::NoOp => {}
        Direction::IdempotentDdl(_) => unreachable!("idempotent directions use their own discipline"),
    }
    audit::phase_end(&mut tx, &audit)?;
    tx.commit()?;
    Ok(())
}

/// Three-step discipline for DDL that cannot run in a transaction block.
fn run_idempotent(db: &mut Db, direction: &Direction, index: &PhaseIndex, is_revert: bool) -> Result<()> {
    let Direction::IdempotentDdl(sql) = direction else {
        unreachable!("caller checked is_idempotent");
    };

    // Step 1: claim the unfinished-audit slot, or adopt the row a crashed
    // run left behind for this same attempt.
    let audit = claim_start(db, index, is_revert)?;

    // Step 2: the DDL itself, outside any transaction. A failure here
    // leaves the unfinished row in place for the next run to adopt.
    db.client.batch_execute(sql).map_err(|source| MigratorError::PhaseFailure {
        index: index.clone(),
        source,
    })?;

    // Step 3: release the slot.
    let mut tx = db.client.transaction()?;
    audit::phase_end(&mut tx, &audit)?;
    tx.commit()?;
    Ok(())
}

fn claim_start(db: &mut Db, index: &PhaseIndex, is_revert: bool) -> Result<MigrationAudit> {
    let mut tx = db.client.transaction()?;
    let audit = match audit::get_unfinished(&mut tx, index, is_revert)? {
        Some(orphan) => {
            msg_info!(Message::ResumingUnfinishedPhase(index.to_string()));
            orphan
        }
        None => audit::phase_start(&mut tx, index, is_revert)?,
    };
    tx.commit()?;
    Ok(audit)
}

fn execute_ddl(tx: &mut Transaction<'_>, sql: &str, index: &PhaseIndex) -> Result<()> {
    tx.batch_execute(sql).map_err(|source| MigratorError::PhaseFailure {
        index: index.clone(),
        source,
    })?;
    Ok(())
}

/// Revision whose shim schema a rename-view direction targets.
fn shim_revision(index: &PhaseIndex, in_prior_shim: bool) -> i32 {
    if in_prior_shim {
        index.revision - 1
    } else {
        index.revision
    }
}

/// Creates the shim view exposing a table under its post-rename column
/// names.
///
/// The view selects every current column of `public.<table>`, aliasing the
/// renamed ones, so both old and new application versions resolve their
/// expected names for the lifetime of the spanning revisions.
fn create_rename_view(tx: &mut Transaction<'_>, rename: &RenameDef, index: &PhaseIndex, shim_of: i32) -> Result<()> {
    let rows = tx.query(SELECT_COLUMNS, &[&rename.table])?;
    let mut pending = rename.renames.clone();
    let mut aliases = Vec::with_capacity(rows.len());
    for row in &rows {
        let column: String = row.get(0);
        match pending.remove(&column) {
            Some(new_name) => aliases.push(format!("{} as {}", column, new_name)),
            None => aliases.push(column),
        }
    }
    if !pending.is_empty() {
        return Err(MigratorError::SchemaMismatch {
            table: rename.table.clone(),
            columns: pending.keys().cloned().collect::<Vec<_>>().join(","),
        }
        .into());
    }
    let sql = format!(
        "CREATE VIEW {}.{} AS SELECT {} FROM public.{}",
        shim_schema_name(shim_of),
        quote_ident(&rename.table),
        aliases.join(", "),
        quote_ident(&rename.table)
    );
    execute_ddl(tx, &sql, index)
}

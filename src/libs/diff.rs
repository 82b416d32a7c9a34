//! Catalog diff engine.
//!
//! Compares two [`Catalog`] snapshots and produces the expand/contract
//! change pair: a **pre-deploy** list that leaves the database usable by
//! both the old and the new application version, and a **post-deploy** list
//! that finishes the contraction once the old version is retired.
//!
//! Placement rules:
//! - Everything additive (new schemas, types, sequences, tables, columns,
//!   views, functions, indexes, constraints) goes pre-deploy.
//! - Everything destructive (drops of any of the above, column removal)
//!   goes post-deploy.
//! - In-place alterations that both versions tolerate (column types,
//!   defaults, comments, view and function bodies) go pre-deploy.
//!
//! Indexes and check/foreign-key constraints are emitted as their typed
//! change variants rather than raw DDL so execution keeps the concurrent
//! build and two-phase validation disciplines.
//!
//! The pre-deploy list is assembled in forward dependency order (schemas
//! before the types and tables inside them, tables before the indexes and
//! constraints on them); the post-deploy list in the reverse order, so
//! dependents drop before their dependencies.

use crate::libs::catalog::{qualified, Catalog, Column, Constraint, ConstraintKind, Index, Sequence, Table};
use crate::libs::change::{Change, ConstraintDef, IndexDef, RunDdl};
use crate::libs::error::MigratorError;
use anyhow::Result;
use std::collections::BTreeSet;

/// Diffs two snapshots into `(pre_deploy, post_deploy)` change lists.
pub fn diff(old: &Catalog, new: &Catalog) -> Result<(Vec<Change>, Vec<Change>)> {
    let schemas = diff_schemas(old, new);
    let enums = diff_enums(old, new)?;
    let domains = diff_domains(old, new)?;
    let sequences = diff_sequences(old, new);
    let tables = diff_tables(old, new)?;
    let views = diff_views(old, new);
    let functions = diff_functions(old, new);
    let triggers = diff_triggers(old, new);
    let indexes = diff_indexes(old, new)?;
    let constraints = diff_constraints(old, new)?;

    let forward = [
        &schemas,
        &enums,
        &domains,
        &sequences,
        &tables,
        &views,
        &functions,
        &triggers,
        &indexes,
        &constraints,
    ];
    let mut pre = Vec::new();
    for part in forward {
        pre.extend(part.0.iter().cloned());
    }
    let mut post = Vec::new();
    for part in forward.iter().rev() {
        post.extend(part.1.iter().cloned());
    }
    Ok((elide(pre), elide(post)))
}

/// `(pre_deploy, post_deploy)` contributions of one object category.
type Split = (Vec<Change>, Vec<Change>);

/// Drops generated `RunDDL` changes whose both directions are empty.
fn elide(changes: Vec<Change>) -> Vec<Change> {
    changes
        .into_iter()
        .filter(|change| !matches!(change, Change::RunDdl(ddl) if ddl.is_empty()))
        .collect()
}

fn run_ddl(up: String, down: String) -> Change {
    Change::RunDdl(RunDdl { up, down })
}

/// Quotes a string literal for embedding in generated DDL.
fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn diff_schemas(old: &Catalog, new: &Catalog) -> Split {
    let mut pre = Vec::new();
    let mut post = Vec::new();
    for name in new.schemas.difference(&old.schemas) {
        pre.push(run_ddl(format!("CREATE SCHEMA {};", name), format!("DROP SCHEMA {};", name)));
    }
    for name in old.schemas.difference(&new.schemas) {
        post.push(run_ddl(format!("DROP SCHEMA {};", name), format!("CREATE SCHEMA {};", name)));
    }
    (pre, post)
}

fn diff_enums(old: &Catalog, new: &Catalog) -> Result<Split> {
    let mut pre = Vec::new();
    let mut post = Vec::new();
    for (key, definition) in &new.enums {
        let labels = definition.labels.iter().map(|l| quote_literal(l)).collect::<Vec<_>>().join(", ");
        match old.enums.get(key) {
            None => pre.push(run_ddl(
                format!("CREATE TYPE {} AS ENUM ({});", key, labels),
                format!("DROP TYPE {};", key),
            )),
            Some(previous) if previous.labels != definition.labels => {
                // Only appending labels is expressible; removal or
                // reordering would need a type rebuild.
                if definition.labels.len() < previous.labels.len()
                    || definition.labels[..previous.labels.len()] != previous.labels[..]
                {
                    return Err(MigratorError::DiffUnsupported(format!("enum {} labels removed or reordered", key)).into());
                }
                let added = definition.labels[previous.labels.len()..]
                    .iter()
                    .map(|label| format!("ALTER TYPE {} ADD VALUE {};", key, quote_literal(label)))
                    .collect::<Vec<_>>()
                    .join(" ");
                pre.push(run_ddl(added, String::new()));
            }
            Some(_) => {}
        }
    }
    for (key, definition) in &old.enums {
        if !new.enums.contains_key(key) {
            let labels = definition.labels.iter().map(|l| quote_literal(l)).collect::<Vec<_>>().join(", ");
            post.push(run_ddl(
                format!("DROP TYPE {};", key),
                format!("CREATE TYPE {} AS ENUM ({});", key, labels),
            ));
        }
    }
    Ok((pre, post))
}

fn diff_domains(old: &Catalog, new: &Catalog) -> Result<Split> {
    let mut pre = Vec::new();
    let mut post = Vec::new();
    for (key, definition) in &new.domains {
        match old.domains.get(key) {
            None => pre.push(run_ddl(create_domain_sql(key, definition), format!("DROP DOMAIN {};", key))),
            Some(previous) => {
                if previous.base_type != definition.base_type {
                    return Err(MigratorError::DiffUnsupported(format!("domain {} base type changed", key)).into());
                }
                let mut up = Vec::new();
                let mut down = Vec::new();
                if previous.default != definition.default {
                    up.push(set_domain_default_sql(key, definition.default.as_deref()));
                    down.push(set_domain_default_sql(key, previous.default.as_deref()));
                }
                if previous.not_null != definition.not_null {
                    let (set, unset) = ("SET NOT NULL", "DROP NOT NULL");
                    let (to, back) = if definition.not_null { (set, unset) } else { (unset, set) };
                    up.push(format!("ALTER DOMAIN {} {};", key, to));
                    down.push(format!("ALTER DOMAIN {} {};", key, back));
                }
                if !up.is_empty() {
                    pre.push(run_ddl(up.join(" "), down.join(" ")));
                }
            }
        }
    }
    for (key, definition) in &old.domains {
        if !new.domains.contains_key(key) {
            post.push(run_ddl(format!("DROP DOMAIN {};", key), create_domain_sql(key, definition)));
        }
    }
    Ok((pre, post))
}

fn create_domain_sql(key: &str, domain: &crate::libs::catalog::Domain) -> String {
    let mut sql = format!("CREATE DOMAIN {} AS {}", key, domain.base_type);
    if let Some(default) = &domain.default {
        sql.push_str(&format!(" DEFAULT {}", default));
    }
    if domain.not_null {
        sql.push_str(" NOT NULL");
    }
    sql.push(';');
    sql
}

fn set_domain_default_sql(key: &str, default: Option<&str>) -> String {
    match default {
        Some(default) => format!("ALTER DOMAIN {} SET DEFAULT {};", key, default),
        None => format!("ALTER DOMAIN {} DROP DEFAULT;", key),
    }
}

fn diff_sequences(old: &Catalog, new: &Catalog) -> Split {
    let mut pre = Vec::new();
    let mut post = Vec::new();
    for (key, definition) in &new.sequences {
        match old.sequences.get(key) {
            None => pre.push(run_ddl(create_sequence_sql(key, definition), format!("DROP SEQUENCE {};", key))),
            Some(previous) if previous != definition => {
                pre.push(run_ddl(
                    alter_sequence_sql(key, previous, definition),
                    alter_sequence_sql(key, definition, previous),
                ));
            }
            Some(_) => {}
        }
    }
    for (key, definition) in &old.sequences {
        if !new.sequences.contains_key(key) {
            post.push(run_ddl(format!("DROP SEQUENCE {};", key), create_sequence_sql(key, definition)));
        }
    }
    (pre, post)
}

fn create_sequence_sql(key: &str, sequence: &Sequence) -> String {
    let mut sql = format!("CREATE SEQUENCE {}", key);
    if sequence.data_type != "bigint" {
        sql.push_str(&format!(" AS {}", sequence.data_type));
    }
    if sequence.increment != 1 {
        sql.push_str(&format!(" INCREMENT BY {}", sequence.increment));
    }
    if let Some(min) = sequence.min_value {
        sql.push_str(&format!(" MINVALUE {}", min));
    }
    if let Some(max) = sequence.max_value {
        sql.push_str(&format!(" MAXVALUE {}", max));
    }
    let implicit_start = if sequence.increment > 0 { sequence.min_value.unwrap_or(1) } else { sequence.max_value.unwrap_or(-1) };
    if sequence.start != implicit_start {
        sql.push_str(&format!(" START WITH {}", sequence.start));
    }
    if sequence.cycle {
        sql.push_str(" CYCLE");
    }
    sql.push(';');
    sql
}

/// `ALTER SEQUENCE` limited to the attributes that differ.
///
/// The implicit-bound normalisation happened at snapshot time, so a bound
/// that is `None` on both sides never shows up as `NO MINVALUE` churn.
fn alter_sequence_sql(key: &str, from: &Sequence, to: &Sequence) -> String {
    let mut clauses = Vec::new();
    if from.increment != to.increment {
        clauses.push(format!("INCREMENT BY {}", to.increment));
    }
    if from.min_value != to.min_value {
        clauses.push(match to.min_value {
            Some(min) => format!("MINVALUE {}", min),
            None => "NO MINVALUE".to_string(),
        });
    }
    if from.max_value != to.max_value {
        clauses.push(match to.max_value {
            Some(max) => format!("MAXVALUE {}", max),
            None => "NO MAXVALUE".to_string(),
        });
    }
    if from.start != to.start {
        clauses.push(format!("START WITH {}", to.start));
    }
    if from.cycle != to.cycle {
        clauses.push(if to.cycle { "CYCLE".to_string() } else { "NO CYCLE".to_string() });
    }
    if clauses.is_empty() {
        String::new()
    } else {
        format!("ALTER SEQUENCE {} {};", key, clauses.join(" "))
    }
}

fn diff_tables(old: &Catalog, new: &Catalog) -> Result<Split> {
    let mut pre = Vec::new();
    let mut post = Vec::new();

    // Old-side tables protected from dropping because a new-side table
    // declares them as its former name.
    let nodrop: BTreeSet<String> = new
        .tables
        .values()
        .filter_map(|table| table.former_name.as_ref().map(|former| qualified(&table.schema, former)))
        .collect();

    for (key, table) in &new.tables {
        match old.tables.get(key) {
            None => {
                let renamed_from = table
                    .former_name
                    .as_ref()
                    .map(|former| qualified(&table.schema, former))
                    .filter(|old_key| old.tables.contains_key(old_key));
                if let Some(old_key) = renamed_from {
                    let old_name = old_key.rsplit('.').next().unwrap_or(old_key.as_str());
                    pre.push(run_ddl(
                        format!("ALTER TABLE {} RENAME TO {};", old_key, table.name),
                        format!("ALTER TABLE {} RENAME TO {};", key, old_name),
                    ));
                } else {
                    pre.push(run_ddl(create_table_sql(table), format!("DROP TABLE {};", key)));
                }
            }
            Some(previous) => diff_one_table(key, previous, table, &mut pre, &mut post)?,
        }
    }
    for (key, table) in &old.tables {
        if !new.tables.contains_key(key) && !nodrop.contains(key) {
            post.push(run_ddl(format!("DROP TABLE {};", key), create_table_sql(table)));
        }
    }
    Ok((pre, post))
}

fn diff_one_table(key: &str, old: &Table, new: &Table, pre: &mut Vec<Change>, post: &mut Vec<Change>) -> Result<()> {
    if old.keys != new.keys {
        return Err(MigratorError::DiffUnsupported(format!("primary key or unique constraint changed on {}", key)).into());
    }

    let renamed_from: BTreeSet<&str> = new.columns.iter().filter_map(|column| column.former_name.as_deref()).collect();

    for column in &new.columns {
        match old.column(&column.name) {
            None => {
                let former = column.former_name.as_deref().and_then(|name| old.column(name));
                if let Some(former) = former {
                    pre.push(run_ddl(
                        format!("ALTER TABLE {} RENAME COLUMN {} TO {};", key, former.name, column.name),
                        format!("ALTER TABLE {} RENAME COLUMN {} TO {};", key, column.name, former.name),
                    ));
                } else {
                    pre.push(run_ddl(
                        format!("ALTER TABLE {} ADD COLUMN {};", key, column_spec(column)),
                        format!("ALTER TABLE {} DROP COLUMN {};", key, column.name),
                    ));
                    if let Some(comment) = &column.comment {
                        pre.push(run_ddl(
                            comment_sql(key, &column.name, Some(comment)),
                            comment_sql(key, &column.name, None),
                        ));
                    }
                }
            }
            Some(previous) => diff_one_column(key, previous, column, pre),
        }
    }
    for column in &old.columns {
        if new.column(&column.name).is_none() && !renamed_from.contains(column.name.as_str()) {
            post.push(run_ddl(
                format!("ALTER TABLE {} DROP COLUMN {};", key, column.name),
                format!("ALTER TABLE {} ADD COLUMN {};", key, column_spec(column)),
            ));
        }
    }
    Ok(())
}

fn diff_one_column(table: &str, old: &Column, new: &Column, pre: &mut Vec<Change>) {
    if old.type_name != new.type_name {
        pre.push(run_ddl(
            format!("ALTER TABLE {} ALTER COLUMN {} TYPE {};", table, new.name, new.type_name),
            format!("ALTER TABLE {} ALTER COLUMN {} TYPE {};", table, new.name, old.type_name),
        ));
    }
    if old.default != new.default {
        pre.push(run_ddl(
            default_sql(table, &new.name, new.default.as_deref()),
            default_sql(table, &new.name, old.default.as_deref()),
        ));
    }
    if old.not_null != new.not_null {
        let (set, unset) = ("SET NOT NULL", "DROP NOT NULL");
        let (to, back) = if new.not_null { (set, unset) } else { (unset, set) };
        pre.push(run_ddl(
            format!("ALTER TABLE {} ALTER COLUMN {} {};", table, new.name, to),
            format!("ALTER TABLE {} ALTER COLUMN {} {};", table, new.name, back),
        ));
    }
    if old.comment != new.comment {
        pre.push(run_ddl(
            comment_sql(table, &new.name, new.comment.as_deref()),
            comment_sql(table, &new.name, old.comment.as_deref()),
        ));
    }
}

fn column_spec(column: &Column) -> String {
    let mut spec = format!("{} {}", column.name, column.type_name);
    if let Some(default) = &column.default {
        spec.push_str(&format!(" DEFAULT {}", default));
    }
    if column.not_null {
        spec.push_str(" NOT NULL");
    }
    spec
}

fn comment_sql(table: &str, column: &str, comment: Option<&str>) -> String {
    match comment {
        Some(comment) => format!("COMMENT ON COLUMN {}.{} IS {};", table, column, quote_literal(comment)),
        None => format!("COMMENT ON COLUMN {}.{} IS NULL;", table, column),
    }
}

fn default_sql(table: &str, column: &str, default: Option<&str>) -> String {
    match default {
        Some(default) => format!("ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};", table, column, default),
        None => format!("ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT;", table, column),
    }
}

fn create_table_sql(table: &Table) -> String {
    let mut parts: Vec<String> = table.columns.iter().map(column_spec).collect();
    for constraint in &table.keys {
        parts.push(format!("CONSTRAINT {} {}", constraint.name, constraint.definition));
    }
    let mut sql = format!("CREATE TABLE {} (\n    {}\n);", table.qualified_name(), parts.join(",\n    "));
    for column in &table.columns {
        if let Some(comment) = &column.comment {
            sql.push('\n');
            sql.push_str(&comment_sql(&table.qualified_name(), &column.name, Some(comment)));
        }
    }
    sql
}

fn diff_views(old: &Catalog, new: &Catalog) -> Split {
    let mut pre = Vec::new();
    let mut post = Vec::new();
    for (key, view) in &new.views {
        match old.views.get(key) {
            None => pre.push(run_ddl(
                format!("CREATE VIEW {} AS {};", key, view_body(&view.definition)),
                format!("DROP VIEW {};", key),
            )),
            Some(previous) if previous.definition != view.definition => pre.push(run_ddl(
                format!("CREATE OR REPLACE VIEW {} AS {};", key, view_body(&view.definition)),
                format!("CREATE OR REPLACE VIEW {} AS {};", key, view_body(&previous.definition)),
            )),
            Some(_) => {}
        }
    }
    for (key, view) in &old.views {
        if !new.views.contains_key(key) {
            post.push(run_ddl(
                format!("DROP VIEW {};", key),
                format!("CREATE VIEW {} AS {};", key, view_body(&view.definition)),
            ));
        }
    }
    (pre, post)
}

/// `pg_get_viewdef` output with trailing whitespace and semicolon shaved.
fn view_body(definition: &str) -> String {
    definition.trim().trim_end_matches(';').trim_end().to_string()
}

fn diff_functions(old: &Catalog, new: &Catalog) -> Split {
    let mut pre = Vec::new();
    let mut post = Vec::new();
    for (key, function) in &new.functions {
        match old.functions.get(key) {
            None => pre.push(run_ddl(
                format!("{};", function.definition.trim_end_matches(';')),
                format!("DROP FUNCTION {}({});", qualified(&function.schema, &function.name), function.identity_args),
            )),
            Some(previous) if previous.definition != function.definition => pre.push(run_ddl(
                format!("{};", function.definition.trim_end_matches(';')),
                format!("{};", previous.definition.trim_end_matches(';')),
            )),
            Some(_) => {}
        }
    }
    for (key, function) in &old.functions {
        if !new.functions.contains_key(key) {
            post.push(run_ddl(
                format!("DROP FUNCTION {}({});", qualified(&function.schema, &function.name), function.identity_args),
                format!("{};", function.definition.trim_end_matches(';')),
            ));
        }
    }
    (pre, post)
}

fn diff_triggers(old: &Catalog, new: &Catalog) -> Split {
    let mut pre = Vec::new();
    let mut post = Vec::new();
    for (key, trigger) in &new.triggers {
        match old.triggers.get(key) {
            None => pre.push(run_ddl(
                format!("{};", trigger.definition.trim_end_matches(';')),
                drop_trigger_sql(trigger),
            )),
            Some(previous) if previous.definition != trigger.definition => {
                // No CREATE OR REPLACE for triggers across supported
                // server versions; replace in one transactional change.
                pre.push(run_ddl(
                    format!("{} {};", drop_trigger_sql(previous), trigger.definition.trim_end_matches(';')),
                    format!("{} {};", drop_trigger_sql(trigger), previous.definition.trim_end_matches(';')),
                ));
            }
            Some(_) => {}
        }
    }
    for (key, trigger) in &old.triggers {
        if !new.triggers.contains_key(key) {
            post.push(run_ddl(
                drop_trigger_sql(trigger),
                format!("{};", trigger.definition.trim_end_matches(';')),
            ));
        }
    }
    (pre, post)
}

fn drop_trigger_sql(trigger: &crate::libs::catalog::Trigger) -> String {
    format!("DROP TRIGGER {} ON {};", trigger.name, qualified(&trigger.schema, &trigger.table))
}

fn diff_indexes(old: &Catalog, new: &Catalog) -> Result<Split> {
    let mut pre = Vec::new();
    let mut post = Vec::new();
    for (key, index) in &new.indexes {
        match old.indexes.get(key) {
            None => pre.push(Change::CreateIndex(to_index_def(index)?)),
            Some(previous) if previous != index => {
                // Same name, different definition: rebuild in post-deploy,
                // old index first so the name is free for the new build.
                post.push(Change::DropIndex(to_index_def(previous)?));
                post.push(Change::CreateIndex(to_index_def(index)?));
            }
            Some(_) => {}
        }
    }
    for (key, index) in &old.indexes {
        if !new.indexes.contains_key(key) {
            post.push(Change::DropIndex(to_index_def(index)?));
        }
    }
    Ok((pre, post))
}

/// Converts a snapshot index into the typed change that rebuilds it
/// concurrently.
fn to_index_def(index: &Index) -> Result<IndexDef> {
    if index.schema != "public" {
        return Err(MigratorError::DiffUnsupported(format!("index {}.{} outside schema public", index.schema, index.name)).into());
    }
    Ok(IndexDef {
        unique: index.unique,
        name: index.name.clone(),
        table: index.table.clone(),
        expr: index.expr.clone(),
        using: index.using.clone(),
        where_clause: index.predicate.clone(),
    })
}

fn diff_constraints(old: &Catalog, new: &Catalog) -> Result<Split> {
    let mut pre = Vec::new();
    let mut post = Vec::new();
    for (key, constraint) in &new.constraints {
        match old.constraints.get(key) {
            None => pre.push(Change::AddConstraint(to_constraint_def(constraint)?)),
            Some(previous) if previous != constraint => {
                post.push(Change::DropConstraint(to_constraint_def(previous)?));
                post.push(Change::AddConstraint(to_constraint_def(constraint)?));
            }
            Some(_) => {}
        }
    }
    for (key, constraint) in &old.constraints {
        if !new.constraints.contains_key(key) {
            post.push(Change::DropConstraint(to_constraint_def(constraint)?));
        }
    }
    Ok((pre, post))
}

/// Converts a snapshot constraint into the typed two-phase change.
fn to_constraint_def(constraint: &Constraint) -> Result<ConstraintDef> {
    if constraint.schema != "public" {
        return Err(MigratorError::DiffUnsupported(format!(
            "constraint {}.{} outside schema public",
            constraint.schema, constraint.name
        ))
        .into());
    }
    let (check, foreign_key, references) = match &constraint.kind {
        ConstraintKind::Check { expr } => (Some(expr.clone()), None, None),
        ConstraintKind::ForeignKey { columns, references } => (None, Some(columns.clone()), Some(references.clone())),
    };
    Ok(ConstraintDef {
        table: constraint.table.clone(),
        domain: constraint.domain.clone(),
        name: constraint.name.clone(),
        check,
        foreign_key,
        references,
    })
}

//! Declarative change model and its phase decomposition.
//!
//! A revision body is a list of [`Change`]s. Each change expands into a
//! fixed, ordered list of [`Phase`]s, and each phase carries an up- and a
//! down-[`Direction`]. Directions come in two disciplines:
//!
//! - **Transactional**: executed inside a single transaction together with
//!   its audit bookkeeping; all-or-nothing.
//! - **Idempotent**: executed outside any transaction (required for
//!   `CREATE INDEX CONCURRENTLY` and friends), bracketed by two small audit
//!   transactions. The DDL must tolerate re-execution, which the generated
//!   statements guarantee with `IF [NOT] EXISTS`.
//!
//! This split is what lets concurrent index builds, two-phase constraint
//! validation and shim-view column renames run under one execution model.
//!
//! The serialised form keeps the one-key-per-list-element YAML grammar:
//!
//! ```yaml
//! pre_deploy:
//!   - run_ddl: { up: "...", down: "..." }
//!   - create_index: { name: users_email_idx, table: users, expr: email }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quotes an SQL identifier, doubling any embedded quote characters.
pub fn quote_ident(id: &str) -> String {
    format!("\"{}\"", id.replace('"', "\"\""))
}

/// One declarative modification within a revision.
///
/// Serde's externally tagged representation produces exactly the one-key
/// map shape the migration YAML grammar requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    RunDdl(RunDdl),
    CreateIndex(IndexDef),
    DropIndex(IndexDef),
    AddConstraint(ConstraintDef),
    DropConstraint(ConstraintDef),
    BeginRename(RenameDef),
    FinishRename(RenameDef),
}

impl Change {
    /// Structural checks the YAML grammar cannot express.
    ///
    /// Returns a human-readable cause on failure; the revision parser
    /// wraps it into `MalformedRevision` with the offending filename.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Change::AddConstraint(constraint) | Change::DropConstraint(constraint) => constraint.validate(),
            Change::BeginRename(rename) | Change::FinishRename(rename) => rename.validate(),
            _ => Ok(()),
        }
    }

    /// Expands the change into its ordered phase list.
    ///
    /// The decomposition is part of the on-database contract: audit rows
    /// record `(change, phase)` positions, so the expansion for a given
    /// change value must never be reordered between releases.
    pub fn phases(&self) -> Vec<Phase> {
        match self {
            Change::RunDdl(ddl) => vec![Phase {
                up: Direction::TxDdl(ddl.up.clone()),
                down: Direction::TxDdl(ddl.down.clone()),
            }],
            Change::CreateIndex(index) => vec![Phase {
                up: Direction::IdempotentDdl(index.create_sql()),
                down: Direction::IdempotentDdl(index.drop_sql()),
            }],
            Change::DropIndex(index) => vec![Phase {
                up: Direction::IdempotentDdl(index.drop_sql()),
                down: Direction::IdempotentDdl(index.create_sql()),
            }],
            Change::AddConstraint(constraint) => vec![
                Phase {
                    up: Direction::TxDdl(constraint.add_sql()),
                    down: Direction::TxDdl(constraint.drop_sql()),
                },
                Phase {
                    up: Direction::TxDdl(constraint.validate_sql()),
                    down: Direction::NoOp,
                },
            ],
            Change::DropConstraint(constraint) => vec![
                Phase {
                    up: Direction::NoOp,
                    down: Direction::TxDdl(constraint.validate_sql()),
                },
                Phase {
                    up: Direction::TxDdl(constraint.drop_sql()),
                    down: Direction::TxDdl(constraint.add_sql()),
                },
            ],
            Change::BeginRename(rename) => vec![Phase {
                up: Direction::CreateRenameView {
                    rename: rename.clone(),
                    in_prior_shim: false,
                },
                down: Direction::DropRenameView {
                    table: rename.table.clone(),
                    in_prior_shim: false,
                },
            }],
            Change::FinishRename(rename) => vec![
                Phase {
                    up: Direction::TxDdl(rename.up_rename_sql()),
                    down: Direction::TxDdl(rename.down_rename_sql()),
                },
                // The view being retired was created by the previous
                // revision's BeginRename and lives in that revision's shim.
                Phase {
                    up: Direction::DropRenameView {
                        table: rename.table.clone(),
                        in_prior_shim: true,
                    },
                    down: Direction::CreateRenameView {
                        rename: rename.reversed(),
                        in_prior_shim: true,
                    },
                },
            ],
        }
    }
}

/// Raw up/down DDL executed transactionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDdl {
    pub up: String,
    pub down: String,
}

impl RunDdl {
    /// True when both directions are empty; such changes are elided by the
    /// diff engine.
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }
}

/// A concurrently built (or dropped) index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    pub name: String,
    pub table: String,
    pub expr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub using: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "where")]
    pub where_clause: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl IndexDef {
    /// `CREATE [UNIQUE] INDEX CONCURRENTLY IF NOT EXISTS …`
    ///
    /// `CONCURRENTLY` cannot run inside a transaction block, hence the
    /// idempotent discipline; `IF NOT EXISTS` makes re-execution safe.
    pub fn create_sql(&self) -> String {
        let unique = if self.unique { "UNIQUE " } else { "" };
        let using = self.using.as_deref().map(|u| format!("USING {}", u)).unwrap_or_default();
        let where_clause = self.where_clause.as_deref().map(|w| format!("WHERE {}", w)).unwrap_or_default();
        format!(
            "CREATE {}INDEX CONCURRENTLY IF NOT EXISTS {} on {} {} ({}) {}",
            unique,
            quote_ident(&self.name),
            quote_ident(&self.table),
            using,
            self.expr,
            where_clause
        )
    }

    /// `DROP INDEX CONCURRENTLY IF EXISTS …`
    pub fn drop_sql(&self) -> String {
        format!("DROP INDEX CONCURRENTLY IF EXISTS {}", quote_ident(&self.name))
    }
}

/// A check or foreign-key constraint on a table or domain.
///
/// Exactly one of `table`/`domain` is set, and exactly one of `check` or
/// the `foreign_key`+`references` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

impl ConstraintDef {
    /// Exactly one owner, exactly one body.
    fn validate(&self) -> Result<(), String> {
        if self.table.is_some() == self.domain.is_some() {
            return Err(format!("constraint {}: exactly one of table or domain must be set", self.name));
        }
        match (&self.check, &self.foreign_key, &self.references) {
            (Some(_), None, None) => Ok(()),
            (None, Some(_), Some(_)) => Ok(()),
            _ => Err(format!(
                "constraint {}: either check or foreign_key with references must be set",
                self.name
            )),
        }
    }

    /// `ALTER TABLE …` or `ALTER DOMAIN …` prefix for this constraint.
    fn alter(&self) -> String {
        let (kind, name) = match &self.table {
            Some(table) => ("TABLE", table.as_str()),
            None => ("DOMAIN", self.domain.as_deref().unwrap_or_default()),
        };
        format!("ALTER {} {}", kind, quote_ident(name))
    }

    /// The constraint body: `CHECK …` or `FOREIGN KEY … REFERENCES …`.
    fn descr(&self) -> String {
        if let Some(check) = &self.check {
            format!("CHECK {}", check)
        } else {
            format!(
                "FOREIGN KEY ({}) REFERENCES {}",
                self.foreign_key.as_deref().unwrap_or_default(),
                self.references.as_deref().unwrap_or_default()
            )
        }
    }

    /// Adds the constraint without validating existing rows.
    ///
    /// `NOT VALID` keeps the exclusive lock short; validation runs as a
    /// separate phase so the long table scan never shares a transaction
    /// with other work.
    pub fn add_sql(&self) -> String {
        format!("{} ADD CONSTRAINT {} {} NOT VALID", self.alter(), quote_ident(&self.name), self.descr())
    }

    /// Validates a previously added `NOT VALID` constraint.
    pub fn validate_sql(&self) -> String {
        format!("{} VALIDATE CONSTRAINT {}", self.alter(), quote_ident(&self.name))
    }

    pub fn drop_sql(&self) -> String {
        format!("{} DROP CONSTRAINT {}", self.alter(), quote_ident(&self.name))
    }
}

/// A column rename on one table, old name to new name.
///
/// `BeginRename` only creates a shim view exposing the new names;
/// `FinishRename` performs the physical rename once no application still
/// reads the old names through `public`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameDef {
    pub table: String,
    pub renames: BTreeMap<String, String>,
}

impl RenameDef {
    fn validate(&self) -> Result<(), String> {
        if self.renames.is_empty() {
            return Err(format!("rename on table {}: no columns listed", self.table));
        }
        Ok(())
    }

    fn rename_sql<'a>(&self, pairs: impl Iterator<Item = (&'a String, &'a String)>) -> String {
        pairs
            .map(|(old, new)| {
                format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    quote_ident(&self.table),
                    quote_ident(old),
                    quote_ident(new)
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn up_rename_sql(&self) -> String {
        self.rename_sql(self.renames.iter())
    }

    pub fn down_rename_sql(&self) -> String {
        self.rename_sql(self.renames.iter().map(|(old, new)| (new, old)))
    }

    /// The same rename with old and new names swapped.
    pub fn reversed(&self) -> RenameDef {
        RenameDef {
            table: self.table.clone(),
            renames: self.renames.iter().map(|(old, new)| (new.clone(), old.clone())).collect(),
        }
    }
}

/// The executable unit: an up-direction and a down-direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub up: Direction,
    pub down: Direction,
}

/// One side of a phase.
///
/// The rename-view directions carry `in_prior_shim`: a `FinishRename`
/// operates on the view its predecessor revision created, so its phases
/// target the shim schema one revision back from their own index.
#[derive(Debug, Clone, PartialEq)]
pub enum Direction {
    /// DDL executed inside the audit transaction.
    TxDdl(String),
    /// DDL executed outside any transaction; must be re-runnable.
    IdempotentDdl(String),
    /// Creates the shim view for a rename; resolves live columns at run
    /// time, so it cannot be pre-rendered to static SQL.
    CreateRenameView { rename: RenameDef, in_prior_shim: bool },
    /// Drops the shim view for a rename.
    DropRenameView { table: String, in_prior_shim: bool },
    /// Audit bookkeeping only.
    NoOp,
}

impl Direction {
    /// True for directions run outside a transaction block.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Direction::IdempotentDdl(_))
    }
}

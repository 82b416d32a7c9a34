//! PostgreSQL catalog snapshots.
//!
//! A [`Catalog`] is an in-memory description of every user-visible object
//! in a database: schemas, enum types, domains, sequences, tables with
//! their columns and key constraints, views, functions, indexes, and
//! check/foreign-key constraints. Snapshots are taken by querying
//! `pg_catalog` and `information_schema` directly; the diff engine then
//! compares two snapshots without touching either database again.
//!
//! The migrator's own namespaces (`migrator_status`, the `shim_rev_*`
//! schemas) and system schemas are excluded, so a snapshot describes only
//! what the application owns.

use crate::libs::error::MigratorError;
use anyhow::Result;
use postgres::{Client, NoTls};
use std::collections::{BTreeMap, BTreeSet};

/// Schema filter shared by every introspection query.
///
/// `n` must alias the relevant `pg_namespace` join in the enclosing query.
const USER_SCHEMAS: &str = "n.nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast', 'migrator_status')
  AND n.nspname NOT LIKE 'pg_temp_%'
  AND n.nspname NOT LIKE 'pg_toast_temp_%'
  AND n.nspname NOT LIKE 'shim_rev_%'";

/// A full snapshot of one database's user objects.
///
/// Maps are keyed by qualified name (`schema.name`); functions additionally
/// carry their identity argument list so overloads stay distinct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub schemas: BTreeSet<String>,
    pub enums: BTreeMap<String, EnumType>,
    pub domains: BTreeMap<String, Domain>,
    pub sequences: BTreeMap<String, Sequence>,
    pub tables: BTreeMap<String, Table>,
    pub views: BTreeMap<String, View>,
    pub functions: BTreeMap<String, Function>,
    pub triggers: BTreeMap<String, Trigger>,
    pub indexes: BTreeMap<String, Index>,
    pub constraints: BTreeMap<String, Constraint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    /// Primary-key and unique constraints, by definition text.
    pub keys: Vec<KeyConstraint>,
    /// Name this table had in the previous schema, when the author declares
    /// a rename. Never set by introspection; honoured by the diff engine's
    /// no-drop pass.
    pub former_name: Option<String>,
}

impl Table {
    pub fn qualified_name(&self) -> String {
        qualified(&self.schema, &self.name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// Rendered by `format_type`, e.g. `character varying(80)`.
    pub type_name: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub comment: Option<String>,
    /// Rename marker, as on [`Table::former_name`].
    pub former_name: Option<String>,
}

/// A primary-key or unique constraint, kept as its full definition text.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyConstraint {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub schema: String,
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub schema: String,
    pub name: String,
    pub data_type: String,
    pub start: i64,
    pub increment: i64,
    /// `None` when the bound equals the type's implicit bound; explicit
    /// bounds that merely restate the default would otherwise churn every
    /// diff as `NO MINVALUE`/`NO MAXVALUE`.
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub cycle: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub schema: String,
    pub name: String,
    pub base_type: String,
    pub not_null: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub schema: String,
    pub name: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub schema: String,
    pub name: String,
    pub identity_args: String,
    /// Full `CREATE OR REPLACE FUNCTION` statement from
    /// `pg_get_functiondef`.
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub schema: String,
    pub table: String,
    pub name: String,
    /// Full `CREATE TRIGGER` statement from `pg_get_triggerdef`.
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub schema: String,
    pub name: String,
    pub table: String,
    pub unique: bool,
    /// Access method, `None` for btree.
    pub using: Option<String>,
    /// Key columns and expressions, comma separated.
    pub expr: String,
    pub predicate: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub schema: String,
    /// Owning table name, for table constraints.
    pub table: Option<String>,
    /// Owning domain name, for domain constraints.
    pub domain: Option<String>,
    pub name: String,
    pub kind: ConstraintKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    Check { expr: String },
    ForeignKey { columns: String, references: String },
}

impl Constraint {
    /// Key of the object this constraint hangs off.
    pub fn owner_key(&self) -> String {
        let owner = self.table.as_deref().or(self.domain.as_deref()).unwrap_or_default();
        qualified(&self.schema, owner)
    }
}

pub fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", schema, name)
}

impl Catalog {
    /// Connects to `url`, snapshots it, and closes the connection.
    pub fn introspect_url(url: &str) -> Result<Catalog> {
        let mut client = Client::connect(url, NoTls)?;
        let catalog = Catalog::introspect(&mut client);
        let _ = client.close();
        catalog
    }

    /// Takes a snapshot over an existing connection.
    pub fn introspect(client: &mut Client) -> Result<Catalog> {
        let mut catalog = Catalog::default();
        load_schemas(client, &mut catalog)?;
        load_enums(client, &mut catalog)?;
        load_domains(client, &mut catalog)?;
        load_sequences(client, &mut catalog)?;
        load_tables(client, &mut catalog)?;
        load_keys(client, &mut catalog)?;
        load_views(client, &mut catalog)?;
        load_functions(client, &mut catalog)?;
        load_triggers(client, &mut catalog)?;
        load_indexes(client, &mut catalog)?;
        load_constraints(client, &mut catalog)?;
        Ok(catalog)
    }
}

fn load_schemas(client: &mut Client, catalog: &mut Catalog) -> Result<()> {
    let sql = format!(
        "SELECT n.nspname::text FROM pg_catalog.pg_namespace n WHERE {}",
        USER_SCHEMAS
    );
    for row in client.query(&sql, &[])? {
        catalog.schemas.insert(row.get(0));
    }
    Ok(())
}

fn load_enums(client: &mut Client, catalog: &mut Catalog) -> Result<()> {
    let sql = format!(
        "SELECT n.nspname::text, t.typname::text,
                array_agg(e.enumlabel::text ORDER BY e.enumsortorder)
         FROM pg_catalog.pg_type t
         JOIN pg_catalog.pg_enum e ON e.enumtypid = t.oid
         JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
         WHERE {}
         GROUP BY n.nspname, t.typname",
        USER_SCHEMAS
    );
    for row in client.query(&sql, &[])? {
        let definition = EnumType {
            schema: row.get(0),
            name: row.get(1),
            labels: row.get(2),
        };
        catalog.enums.insert(qualified(&definition.schema, &definition.name), definition);
    }
    Ok(())
}

fn load_domains(client: &mut Client, catalog: &mut Catalog) -> Result<()> {
    let sql = format!(
        "SELECT n.nspname::text, t.typname::text,
                pg_catalog.format_type(t.typbasetype, t.typtypmod),
                t.typnotnull, t.typdefault
         FROM pg_catalog.pg_type t
         JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
         WHERE t.typtype = 'd' AND {}",
        USER_SCHEMAS
    );
    for row in client.query(&sql, &[])? {
        let definition = Domain {
            schema: row.get(0),
            name: row.get(1),
            base_type: row.get(2),
            not_null: row.get(3),
            default: row.get(4),
        };
        catalog.domains.insert(qualified(&definition.schema, &definition.name), definition);
    }
    Ok(())
}

fn load_sequences(client: &mut Client, catalog: &mut Catalog) -> Result<()> {
    // Sequences owned by serial or identity columns travel with their
    // table and are skipped here (pg_depend deptype 'a'/'i').
    let sql = format!(
        "SELECT n.nspname::text, c.relname::text,
                pg_catalog.format_type(s.seqtypid, NULL),
                s.seqstart, s.seqincrement, s.seqmin, s.seqmax, s.seqcycle
         FROM pg_catalog.pg_sequence s
         JOIN pg_catalog.pg_class c ON c.oid = s.seqrelid
         JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
         WHERE NOT EXISTS (
                 SELECT 1 FROM pg_catalog.pg_depend dep
                 WHERE dep.objid = c.oid AND dep.deptype IN ('a', 'i'))
           AND {}",
        USER_SCHEMAS
    );
    for row in client.query(&sql, &[])? {
        let data_type: String = row.get(2);
        let increment: i64 = row.get(4);
        let definition = Sequence {
            schema: row.get(0),
            name: row.get(1),
            start: row.get(3),
            min_value: normalize_bound(row.get(5), &data_type, increment, Bound::Min),
            max_value: normalize_bound(row.get(6), &data_type, increment, Bound::Max),
            cycle: row.get(7),
            data_type,
            increment,
        };
        catalog.sequences.insert(qualified(&definition.schema, &definition.name), definition);
    }
    Ok(())
}

fn load_tables(client: &mut Client, catalog: &mut Catalog) -> Result<()> {
    let sql = format!(
        "SELECT n.nspname::text, c.relname::text, a.attname::text,
                pg_catalog.format_type(a.atttypid, a.atttypmod),
                a.attnotnull,
                pg_catalog.pg_get_expr(d.adbin, d.adrelid),
                pg_catalog.col_description(c.oid, a.attnum)
         FROM pg_catalog.pg_class c
         JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
         JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid
         LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = c.oid AND d.adnum = a.attnum
         WHERE c.relkind = 'r' AND a.attnum > 0 AND NOT a.attisdropped AND {}
         ORDER BY n.nspname, c.relname, a.attnum",
        USER_SCHEMAS
    );
    for row in client.query(&sql, &[])? {
        let schema: String = row.get(0);
        let name: String = row.get(1);
        let key = qualified(&schema, &name);
        let table = catalog.tables.entry(key).or_insert_with(|| Table {
            schema,
            name,
            columns: Vec::new(),
            keys: Vec::new(),
            former_name: None,
        });
        table.columns.push(Column {
            name: row.get(2),
            type_name: row.get(3),
            not_null: row.get(4),
            default: row.get(5),
            comment: row.get(6),
            former_name: None,
        });
    }
    Ok(())
}

fn load_keys(client: &mut Client, catalog: &mut Catalog) -> Result<()> {
    let sql = format!(
        "SELECT n.nspname::text, t.relname::text, con.conname::text,
                pg_catalog.pg_get_constraintdef(con.oid)
         FROM pg_catalog.pg_constraint con
         JOIN pg_catalog.pg_class t ON t.oid = con.conrelid
         JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
         WHERE con.contype IN ('p', 'u') AND {}
         ORDER BY n.nspname, t.relname, con.conname",
        USER_SCHEMAS
    );
    for row in client.query(&sql, &[])? {
        let schema: String = row.get(0);
        let name: String = row.get(1);
        if let Some(table) = catalog.tables.get_mut(&qualified(&schema, &name)) {
            table.keys.push(KeyConstraint {
                name: row.get(2),
                definition: row.get(3),
            });
        }
    }
    Ok(())
}

fn load_views(client: &mut Client, catalog: &mut Catalog) -> Result<()> {
    let sql = format!(
        "SELECT n.nspname::text, c.relname::text, pg_catalog.pg_get_viewdef(c.oid, true)
         FROM pg_catalog.pg_class c
         JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
         WHERE c.relkind = 'v' AND {}",
        USER_SCHEMAS
    );
    for row in client.query(&sql, &[])? {
        let definition = View {
            schema: row.get(0),
            name: row.get(1),
            definition: row.get(2),
        };
        catalog.views.insert(qualified(&definition.schema, &definition.name), definition);
    }
    Ok(())
}

fn load_functions(client: &mut Client, catalog: &mut Catalog) -> Result<()> {
    let sql = format!(
        "SELECT n.nspname::text, p.proname::text,
                pg_catalog.pg_get_function_identity_arguments(p.oid),
                pg_catalog.pg_get_functiondef(p.oid)
         FROM pg_catalog.pg_proc p
         JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
         WHERE p.prokind = 'f' AND {}",
        USER_SCHEMAS
    );
    for row in client.query(&sql, &[])? {
        let definition = Function {
            schema: row.get(0),
            name: row.get(1),
            identity_args: row.get(2),
            definition: row.get(3),
        };
        let key = format!("{}.{}({})", definition.schema, definition.name, definition.identity_args);
        catalog.functions.insert(key, definition);
    }
    Ok(())
}

fn load_triggers(client: &mut Client, catalog: &mut Catalog) -> Result<()> {
    // Constraint triggers and other internal machinery travel with their
    // constraints and are skipped (tgisinternal).
    let sql = format!(
        "SELECT n.nspname::text, c.relname::text, t.tgname::text,
                pg_catalog.pg_get_triggerdef(t.oid, true)
         FROM pg_catalog.pg_trigger t
         JOIN pg_catalog.pg_class c ON c.oid = t.tgrelid
         JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
         WHERE NOT t.tgisinternal AND {}",
        USER_SCHEMAS
    );
    for row in client.query(&sql, &[])? {
        let definition = Trigger {
            schema: row.get(0),
            table: row.get(1),
            name: row.get(2),
            definition: row.get(3),
        };
        let key = format!("{}.{}.{}", definition.schema, definition.table, definition.name);
        catalog.triggers.insert(key, definition);
    }
    Ok(())
}

fn load_indexes(client: &mut Client, catalog: &mut Catalog) -> Result<()> {
    // Primary-key and constraint-backing indexes travel with their
    // constraints; only free-standing indexes are snapshotted here.
    let sql = format!(
        "SELECT n.nspname::text, ic.relname::text, tc.relname::text,
                i.indisunique, am.amname::text,
                pg_catalog.pg_get_expr(i.indpred, i.indrelid),
                (SELECT string_agg(pg_catalog.pg_get_indexdef(i.indexrelid, k, true), ', ' ORDER BY k)
                 FROM generate_series(1, i.indnkeyatts) k)
         FROM pg_catalog.pg_index i
         JOIN pg_catalog.pg_class ic ON ic.oid = i.indexrelid
         JOIN pg_catalog.pg_class tc ON tc.oid = i.indrelid
         JOIN pg_catalog.pg_am am ON am.oid = ic.relam
         JOIN pg_catalog.pg_namespace n ON n.oid = ic.relnamespace
         WHERE NOT i.indisprimary
           AND NOT EXISTS (SELECT 1 FROM pg_catalog.pg_constraint cc WHERE cc.conindid = i.indexrelid)
           AND {}",
        USER_SCHEMAS
    );
    for row in client.query(&sql, &[])? {
        let method: String = row.get(4);
        let definition = Index {
            schema: row.get(0),
            name: row.get(1),
            table: row.get(2),
            unique: row.get(3),
            using: if method == "btree" { None } else { Some(method) },
            predicate: row.get(5),
            expr: row.get::<_, Option<String>>(6).unwrap_or_default(),
        };
        catalog.indexes.insert(qualified(&definition.schema, &definition.name), definition);
    }
    Ok(())
}

fn load_constraints(client: &mut Client, catalog: &mut Catalog) -> Result<()> {
    let sql = format!(
        "SELECT n.nspname::text, tn.relname::text, dt.typname::text,
                con.conname::text, con.contype::text,
                pg_catalog.pg_get_constraintdef(con.oid)
         FROM pg_catalog.pg_constraint con
         LEFT JOIN pg_catalog.pg_class tn ON tn.oid = con.conrelid
         LEFT JOIN pg_catalog.pg_type dt ON dt.oid = con.contypid
         JOIN pg_catalog.pg_namespace n ON n.oid = con.connamespace
         WHERE con.contype IN ('c', 'f') AND {}",
        USER_SCHEMAS
    );
    for row in client.query(&sql, &[])? {
        let name: String = row.get(3);
        let contype: String = row.get(4);
        let definition: String = row.get(5);
        let kind = match contype.as_str() {
            "c" => parse_check_definition(&definition),
            _ => parse_foreign_key_definition(&definition),
        }
        .ok_or_else(|| MigratorError::DiffUnsupported(format!("constraint {} ({})", name, definition)))?;
        let constraint = Constraint {
            schema: row.get(0),
            table: row.get(1),
            domain: row.get(2),
            name,
            kind,
        };
        let key = format!("{}.{}", constraint.owner_key(), constraint.name);
        catalog.constraints.insert(key, constraint);
    }
    Ok(())
}

/// Which end of a sequence's range a bound describes.
enum Bound {
    Min,
    Max,
}

/// Collapses a sequence bound to `None` when it equals the implicit bound
/// for the sequence's type and direction.
fn normalize_bound(value: i64, data_type: &str, increment: i64, bound: Bound) -> Option<i64> {
    let (type_min, type_max) = match data_type {
        "smallint" => (i64::from(i16::MIN), i64::from(i16::MAX)),
        "integer" => (i64::from(i32::MIN), i64::from(i32::MAX)),
        _ => (i64::MIN, i64::MAX),
    };
    let implicit = match (bound, increment > 0) {
        (Bound::Min, true) => 1,
        (Bound::Min, false) => type_min,
        (Bound::Max, true) => type_max,
        (Bound::Max, false) => -1,
    };
    if value == implicit {
        None
    } else {
        Some(value)
    }
}

/// Extracts the expression from a `CHECK (…)` constraint definition.
fn parse_check_definition(definition: &str) -> Option<ConstraintKind> {
    let expr = definition.strip_prefix("CHECK ")?;
    Some(ConstraintKind::Check { expr: expr.to_string() })
}

/// Splits a `FOREIGN KEY (…) REFERENCES …` definition into its halves.
///
/// Referential actions (`ON DELETE …`) stay attached to the references
/// side; the regenerated `ADD CONSTRAINT` keeps them verbatim.
fn parse_foreign_key_definition(definition: &str) -> Option<ConstraintKind> {
    let rest = definition.strip_prefix("FOREIGN KEY (")?;
    let (columns, references) = rest.split_once(") REFERENCES ")?;
    Some(ConstraintKind::ForeignKey {
        columns: columns.to_string(),
        references: references.to_string(),
    })
}

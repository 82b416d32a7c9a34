//! Revision generation command.
//!
//! Dumps the live database schema, diffs it against the previous revision's
//! declared schema, and writes the next `<n>-migration.yml` /
//! `<n>-schema.sql` pair plus a refreshed connection incantation.

use crate::db::db::Db;
use crate::libs::generator;
use crate::libs::revision::Repo;
use anyhow::Result;
use clap::Args;

/// Command-line arguments for the revision command.
#[derive(Debug, Args)]
pub struct RevisionArgs {
    /// Human-readable description recorded in the migration file
    pub message: String,

    #[command(flatten)]
    connection: super::ConnectionArgs,
}

/// Executes the revision command.
pub fn cmd(args: RevisionArgs) -> Result<()> {
    let repo = Repo::parse(&args.connection.config)?;
    let mut db = Db::connect(&args.connection.database_url)?;
    generator::generate(&mut db, &repo, &args.connection.database_url, &args.message)
}

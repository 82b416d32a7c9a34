//! Revision generation.
//!
//! Produces the next numbered revision on disk by comparing what the
//! database actually looks like against what the previous revision said it
//! should look like:
//!
//! 1. Run the configured schema-dump command, capturing the new canonical
//!    schema file.
//! 2. Load the previous and the new schema into two throwaway databases on
//!    the same server.
//! 3. Snapshot and diff the two catalogs.
//! 4. Serialise the resulting change lists as the new migration YAML.
//! 5. Refresh the connection incantation for the new revision.

use crate::db::db::Db;
use crate::libs::catalog::Catalog;
use crate::libs::diff;
use crate::libs::incantation::format_incantation;
use crate::libs::messages::Message;
use crate::libs::revision::{Migration, Repo, Revision};
use crate::{msg_info, msg_success};
use anyhow::{bail, Context, Result};
use postgres::{Client, NoTls};
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

/// Generates revision `N+1` in the repository's migrations directory.
///
/// `database_url` must point at the live database being dumped; throwaway
/// databases are created next to it on the same server.
pub fn generate(db: &mut Db, repo: &Repo, database_url: &str, message: &str) -> Result<()> {
    let number = repo.revisions.last_number() + 1;
    let dir = repo.migrations_dir();
    let schema_path = dir.join(format!("{}-schema.sql", number));
    let migration_path = dir.join(format!("{}-migration.yml", number));

    dump_schema(&repo.config.schema_dump_command, &schema_path)?;
    msg_info!(Message::SchemaDumped(schema_path.display().to_string()));

    let old_schema_sql = match repo.revisions.get(number - 1) {
        Some(previous) => previous.schema_text.clone(),
        None => String::new(),
    };
    let new_schema_sql = std::fs::read_to_string(&schema_path)?;

    let old_catalog = load_snapshot(db, database_url, &old_schema_sql)?;
    let new_catalog = load_snapshot(db, database_url, &new_schema_sql)?;
    let (pre_deploy, post_deploy) = diff::diff(&old_catalog, &new_catalog)?;
    if pre_deploy.is_empty() && post_deploy.is_empty() {
        msg_info!(Message::DiffEmpty);
    }

    let migration = Migration {
        message: message.to_string(),
        pre_deploy,
        post_deploy,
    };
    std::fs::write(&migration_path, serde_yaml::to_string(&migration)?)?;
    msg_success!(Message::RevisionWritten {
        number,
        path: migration_path.display().to_string(),
    });

    // Re-read through the normal parser so the incantation carries the
    // hashes of the bytes that actually landed on disk.
    let revision = Revision::parse(number, &migration_path)?;
    let incantation_path = repo.incantation_path();
    std::fs::write(&incantation_path, format_incantation(&revision))?;
    msg_info!(Message::IncantationWritten(incantation_path.display().to_string()));
    Ok(())
}

/// Runs the schema-dump command with stdout redirected into `path`.
fn dump_schema(command: &str, path: &Path) -> Result<()> {
    let words = shell_words::split(command).with_context(|| format!("failed to parse schema dump command `{}`", command))?;
    let Some((program, args)) = words.split_first() else {
        bail!("schema dump command is empty");
    };
    msg_info!(Message::DumpingSchema(command.to_string()));
    let out = File::create(path)?;
    let status = Command::new(program).args(args).stdout(Stdio::from(out)).status().with_context(|| format!("failed to run `{}`", program))?;
    if !status.success() {
        bail!("schema dump command `{}` exited with {}", command, status);
    }
    Ok(())
}

/// Loads `schema_sql` into a throwaway database and snapshots it.
fn load_snapshot(db: &mut Db, database_url: &str, schema_sql: &str) -> Result<Catalog> {
    db.with_temp_database(database_url, |url| {
        if !schema_sql.is_empty() {
            let mut client = Client::connect(url, NoTls)?;
            client.batch_execute(schema_sql)?;
            client.close()?;
        }
        Catalog::introspect_url(url)
    })
}

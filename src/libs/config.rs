//! Repository configuration management.
//!
//! A migration repository is a directory holding a YAML config file and a
//! `migrations/` directory of numbered revision files. The config names the
//! external schema-dump command and the output paths; everything else the
//! engine needs lives in the revision files themselves.
//!
//! ## Configuration file
//!
//! ```yaml
//! schema_dump_command: pg_dump --schema-only --no-owner --no-privileges
//! migrations_dir: migrations
//! incantation_path: migrations/incantation.sql
//! ```
//!
//! Paths are resolved relative to the directory containing the config file,
//! so a repository can be operated from any working directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Repository-level settings parsed from the config YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoConfig {
    /// Shell command that dumps the live database schema to stdout.
    ///
    /// Split with shell quoting rules before execution, so quoted
    /// arguments survive (`pg_dump --schema-only "$DATABASE_URL"` style
    /// commands are resolved by the caller's shell beforehand).
    pub schema_dump_command: String,

    /// Directory holding `<n>-migration.yml` / `<n>-schema.sql` pairs.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: String,

    /// Whether applications should refuse to start against a revision they
    /// were not built for. Recorded here for the application-side handshake;
    /// the migrator itself does not enforce it.
    #[serde(default = "default_crash_on_incompatible_version")]
    pub crash_on_incompatible_version: bool,

    /// Where `revision` writes the per-connection setup SQL.
    #[serde(default = "default_incantation_path")]
    pub incantation_path: String,
}

fn default_migrations_dir() -> String {
    "migrations".to_string()
}

fn default_crash_on_incompatible_version() -> bool {
    true
}

fn default_incantation_path() -> String {
    "migrations/incantation.sql".to_string()
}

impl RepoConfig {
    /// Reads and validates the config file at `path`.
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: RepoConfig = serde_yaml::from_str(&text).with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Resolves a config-relative path against the config file's directory.
    pub fn resolve(config_path: &Path, relative: &str) -> PathBuf {
        match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(relative),
            _ => PathBuf::from(relative),
        }
    }
}

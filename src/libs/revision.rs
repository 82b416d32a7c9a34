//! On-disk revision model and migration planner.
//!
//! A revision is a numbered pair of files in the migrations directory:
//! `<n>-migration.yml` (the declarative change lists) and `<n>-schema.sql`
//! (the canonical schema after the revision). Both files are hashed with
//! SHA-256 over their raw bytes; the hashes identify the revision in the
//! audit log and let the driver detect history rewrites.
//!
//! Revisions must form a contiguous range starting at 1. The planner
//! enumerates phases revision by revision, pre-deploy before post-deploy,
//! in declaration order, and assigns each one its [`PhaseIndex`].

use crate::libs::change::{Change, Phase};
use crate::libs::config::RepoConfig;
use crate::libs::error::MigratorError;
use crate::libs::plan::{PhaseIndex, PhaseSlice};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The parsed body of a revision's migration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    pub message: String,
    #[serde(default)]
    pub pre_deploy: Vec<Change>,
    #[serde(default)]
    pub post_deploy: Vec<Change>,
}

/// An immutable, hash-identified revision loaded from disk.
#[derive(Debug, Clone)]
pub struct Revision {
    /// Revision number, 1-based and contiguous on disk.
    pub number: i32,
    /// Raw bytes of the migration file, as written.
    pub migration_text: String,
    /// Raw bytes of the schema file, as written.
    pub schema_text: String,
    /// Parsed migration body.
    pub migration: Migration,
    /// SHA-256 over `migration_text` bytes.
    pub migration_hash: Vec<u8>,
    /// SHA-256 over `schema_text` bytes.
    pub schema_hash: Vec<u8>,
}

impl Revision {
    /// Loads one revision from its migration file and sibling schema file.
    pub fn parse(number: i32, migration_path: &Path) -> Result<Self> {
        let migration_text =
            fs::read_to_string(migration_path).with_context(|| format!("failed to read {}", migration_path.display()))?;
        let migration: Migration = serde_yaml::from_str(&migration_text).map_err(|e| MigratorError::MalformedRevision {
            filename: migration_path.display().to_string(),
            cause: e.to_string(),
        })?;
        for change in migration.pre_deploy.iter().chain(migration.post_deploy.iter()) {
            change.validate().map_err(|cause| MigratorError::MalformedRevision {
                filename: migration_path.display().to_string(),
                cause,
            })?;
        }
        let schema_path = sibling(migration_path, &format!("{}-schema.sql", number));
        let schema_text = fs::read_to_string(&schema_path).with_context(|| format!("failed to read {}", schema_path.display()))?;
        Ok(Revision {
            number,
            migration_hash: sha256(&migration_text),
            schema_hash: sha256(&schema_text),
            migration_text,
            schema_text,
            migration,
        })
    }

    /// The index of the given phase position within this revision.
    pub fn index_for(&self, pre_deploy: bool, change: i32, phase: i32) -> PhaseIndex {
        PhaseIndex {
            revision: self.number,
            migration_hash: self.migration_hash.clone(),
            schema_hash: self.schema_hash.clone(),
            pre_deploy,
            change,
            phase,
        }
    }

    /// Index of this revision's first phase, if it has any.
    ///
    /// Revisions with empty change lists produce no phases; they get no
    /// shim schema and no audit rows.
    pub fn first_index(&self) -> Option<PhaseIndex> {
        if !self.migration.pre_deploy.is_empty() {
            Some(self.index_for(true, 0, 0))
        } else if !self.migration.post_deploy.is_empty() {
            Some(self.index_for(false, 0, 0))
        } else {
            None
        }
    }

    /// Index of this revision's last phase, if it has any.
    pub fn last_index(&self) -> Option<PhaseIndex> {
        let last_of = |pre: bool, changes: &[Change]| {
            let change = changes.last()?;
            let phases = change.phases();
            Some(self.index_for(pre, changes.len() as i32 - 1, phases.len() as i32 - 1))
        };
        last_of(false, &self.migration.post_deploy).or_else(|| last_of(true, &self.migration.pre_deploy))
    }

    /// Enumerates `(index, phase)` for every phase of this revision in
    /// plan order.
    pub fn phases(&self) -> Vec<PlanStep> {
        let mut steps = Vec::new();
        let lists = [(true, &self.migration.pre_deploy), (false, &self.migration.post_deploy)];
        for (pre_deploy, changes) in lists {
            for (change_pos, change) in changes.iter().enumerate() {
                for (phase_pos, phase) in change.phases().into_iter().enumerate() {
                    steps.push(PlanStep {
                        index: self.index_for(pre_deploy, change_pos as i32, phase_pos as i32),
                        phase,
                    });
                }
            }
        }
        steps
    }
}

/// One enumerated phase of the global plan.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub index: PhaseIndex,
    pub phase: Phase,
}

/// All revisions of a repository, keyed by number.
#[derive(Debug, Clone, Default)]
pub struct RevisionList {
    revisions: BTreeMap<i32, Revision>,
}

impl RevisionList {
    /// Scans a migrations directory for `<n>-migration.yml` files.
    ///
    /// Numbers must be contiguous from 1; a gap is a hard error because the
    /// planner's phase order would silently skip the missing revision.
    pub fn parse_dir(dir: &Path) -> Result<Self> {
        let mut numbers: Vec<(i32, PathBuf)> = Vec::new();
        let entries = fs::read_dir(dir).with_context(|| format!("failed to read migrations directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(prefix) = name.strip_suffix("-migration.yml") {
                if let Ok(number) = prefix.parse::<i32>() {
                    numbers.push((number, path));
                }
            }
        }
        numbers.sort_by_key(|(number, _)| *number);

        let mut revisions = BTreeMap::new();
        for (position, (number, path)) in numbers.iter().enumerate() {
            let expected = position as i32 + 1;
            if *number != expected {
                return Err(MigratorError::MissingRevision { gap_at: expected }.into());
            }
            revisions.insert(*number, Revision::parse(*number, path)?);
        }
        Ok(RevisionList { revisions })
    }

    pub fn get(&self, number: i32) -> Option<&Revision> {
        self.revisions.get(&number)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Revision> {
        self.revisions.values()
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Highest revision number on disk, or 0 when the directory is empty.
    pub fn last_number(&self) -> i32 {
        self.revisions.keys().next_back().copied().unwrap_or(0)
    }

    /// Enumerates every phase of every revision that falls inside `slice`,
    /// in plan order.
    pub fn get_phases(&self, slice: &PhaseSlice) -> Vec<PlanStep> {
        self.revisions
            .values()
            .flat_map(|revision| revision.phases())
            .filter(|step| slice.contains(&step.index))
            .collect()
    }

    /// First phase index at or above `number`, skipping empty revisions.
    pub fn first_index_from(&self, number: i32) -> Option<PhaseIndex> {
        self.revisions
            .range(number..)
            .find_map(|(_, revision)| revision.first_index())
    }
}

/// A parsed repository: config plus its revision list.
#[derive(Debug, Clone)]
pub struct Repo {
    pub config_path: PathBuf,
    pub config: RepoConfig,
    pub revisions: RevisionList,
}

impl Repo {
    /// Parses the config file and every revision it points at.
    pub fn parse(config_path: &Path) -> Result<Self> {
        let config = RepoConfig::read(config_path)?;
        let dir = RepoConfig::resolve(config_path, &config.migrations_dir);
        let revisions = RevisionList::parse_dir(&dir)?;
        Ok(Repo {
            config_path: config_path.to_path_buf(),
            config,
            revisions,
        })
    }

    /// The migrations directory, resolved relative to the config file.
    pub fn migrations_dir(&self) -> PathBuf {
        RepoConfig::resolve(&self.config_path, &self.config.migrations_dir)
    }

    /// The incantation output path, resolved relative to the config file.
    pub fn incantation_path(&self) -> PathBuf {
        RepoConfig::resolve(&self.config_path, &self.config.incantation_path)
    }
}

/// SHA-256 over a string's raw bytes.
pub fn sha256(text: &str) -> Vec<u8> {
    Sha256::digest(text.as_bytes()).to_vec()
}

fn sibling(path: &Path, name: &str) -> PathBuf {
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

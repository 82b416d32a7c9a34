//! Core library modules for the pgshift application.
//!
//! The migration engine proper lives here: the change/phase model, the
//! planner, the executor, the upgrade/downgrade driver, and the catalog
//! diff machinery, plus the supporting config, error and message modules.

pub mod catalog;
pub mod change;
pub mod config;
pub mod diff;
pub mod error;
pub mod executor;
pub mod generator;
pub mod incantation;
pub mod messages;
pub mod migrate;
pub mod plan;
pub mod revision;

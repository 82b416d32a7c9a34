//! # Pgshift - expand/contract schema migrations for PostgreSQL
//!
//! A schema-migration engine built around resumable revisions. Each
//! revision declares a pre-deploy (expand) and a post-deploy (contract)
//! change list; changes decompose into audited phases that run either
//! transactionally or as re-runnable concurrent DDL, so `CREATE INDEX
//! CONCURRENTLY`, two-phase constraint validation and shim-schema column
//! renames all execute under one model while applications keep running.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pgshift::commands::Cli;
//!
//! fn main() -> anyhow::Result<()> {
//!     Cli::menu()
//! }
//! ```

pub mod commands;
pub mod db;
pub mod libs;

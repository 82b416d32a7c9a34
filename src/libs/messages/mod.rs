//! Centralized message management for the pgshift application.
//!
//! All user-facing text is defined by the [`Message`] enum and rendered by
//! its `Display` implementation, so wording stays consistent across the
//! commands and the migration driver. The companion macros in
//! [`macros`](crate::libs::messages::macros) handle routing between plain
//! console output and the tracing system.
//!
//! ## Usage
//!
//! ```rust
//! use pgshift::libs::messages::Message;
//! use pgshift::{msg_info, msg_success};
//!
//! msg_success!(Message::DbInitialized);
//! msg_info!(Message::UpgradePending(3));
//! ```

pub mod display;
pub mod macros;
pub mod types;

// Re-export the main Message type for convenient access
pub use types::Message;

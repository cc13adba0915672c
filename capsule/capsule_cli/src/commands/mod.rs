//! Command implementations
//!
//! Each command receives the started [`App`](crate::app::App) and prints
//! either text or, with `--json`, a JSON document on stdout.

pub mod capability;
pub mod types;

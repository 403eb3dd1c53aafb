//! appfreeze CLI
//!
//! User-facing surface over the toggle controller: status, on/off, target
//! selection, and a resident watch mode.

pub mod commands;
pub mod output;

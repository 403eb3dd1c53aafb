//! af-core: Core abstractions and configuration for appfreeze
//!
//! This crate provides the shared domain types, the error taxonomy, the
//! broker wire protocol, the persistent target store, and the trait seams
//! used by the controller and CLI crates.

pub mod config;
pub mod error;
pub mod ipc;
pub mod store;
pub mod traits;
pub mod types;

pub use error::{AfError, ControllerError};
pub use types::{Selection, TargetId, ToggleState};

//! af-controller: the privileged suspension toggle controller
//!
//! Owns the connection to the privileged broker, the command executor, the
//! status prober, the credential gate, the keep-alive supervisor, and the
//! state machine that ties them together. The CLI crate is a thin surface
//! over [`controller::ControllerHandle`].

pub mod auth;
pub mod broker;
pub mod controller;
pub mod keepalive;
pub mod probe;

pub use broker::{BrokerConnection, CommandExecutor};
pub use controller::{ControllerHandle, ToggleController};

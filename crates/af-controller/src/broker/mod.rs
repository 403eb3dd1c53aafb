//! Privileged broker attachment and command execution

mod connection;
mod executor;

pub use connection::BrokerConnection;
pub use executor::{CommandExecutor, VERB_SUSPEND, VERB_UNSUSPEND};

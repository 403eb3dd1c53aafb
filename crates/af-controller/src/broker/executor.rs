//! Privileged command construction and execution

use std::sync::Arc;

use af_core::error::ControllerError;
use af_core::traits::Broker;
use af_core::types::{CommandResult, Selection};

/// Verb that suspends the listed targets
pub const VERB_SUSPEND: &str = "suspend";

/// Verb that clears the suspension of the listed targets
pub const VERB_UNSUSPEND: &str = "unsuspend";

/// Runs suspension verbs against the broker.
///
/// The command is a fixed verb followed by the target identifiers, each as
/// a discrete argv token. Identifiers are never joined into one shell
/// string, so a crafted identifier cannot inject extra arguments.
#[derive(Clone)]
pub struct CommandExecutor {
    broker: Arc<dyn Broker>,
}

impl CommandExecutor {
    /// Create an executor over the given broker
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Run `verb target...` for every member of the selection.
    ///
    /// Requires an attached, permitted broker; anything else is
    /// `NotAuthorized` before a single byte reaches the socket. The exit
    /// code in the result is a hint: callers must reprobe to learn the true
    /// per-target outcome.
    pub async fn execute_verb(
        &self,
        verb: &str,
        selection: &Selection,
    ) -> Result<CommandResult, ControllerError> {
        if selection.is_empty() {
            return Err(ControllerError::EmptySelection);
        }
        if !self.broker.is_reachable() || !self.broker.has_permission() {
            return Err(ControllerError::NotAuthorized);
        }

        let mut argv = Vec::with_capacity(1 + selection.len());
        argv.push(verb.to_string());
        argv.extend(selection.iter().map(|t| t.as_str().to_string()));

        tracing::debug!(verb, targets = selection.len(), "Executing privileged command");
        let result = self.broker.execute(argv).await?;
        if !result.success() {
            tracing::warn!(
                verb,
                exit_code = result.exit_code,
                stderr = %result.stderr,
                "Privileged command reported failure"
            );
        }
        Ok(result)
    }
}

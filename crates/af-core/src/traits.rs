//! Trait seams between the controller and its external collaborators
//!
//! The controller depends only on these interfaces; the production
//! implementations live in `af-controller` and tests substitute mocks.

use async_trait::async_trait;

use crate::error::ControllerError;
use crate::types::{ChallengeOutcome, CommandResult, Selection, TargetId};

/// Event emitted by the broker connection.
///
/// Events land on a single channel consumed only by the controller owner
/// task; nothing mutates controller state from the broker side directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// Broker attached
    Attached,
    /// Broker detached; authoritative, in-flight results are discarded
    Detached,
    /// Result of a permission request
    PermissionResult {
        /// Matches the originating request
        request_id: u64,
        /// Whether the grant was given
        granted: bool,
    },
}

/// Capability-typed interface to the privileged broker.
///
/// The controller depends only on this surface; whether the underlying
/// broker exposes execution publicly or through a side channel is the
/// connection's internal business.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Synchronous liveness probe
    fn is_reachable(&self) -> bool;

    /// Whether the execution permission is currently granted
    fn has_permission(&self) -> bool;

    /// Trigger the asynchronous, user-mediated permission dialog.
    ///
    /// At most one request is outstanding; a second call while one is
    /// pending is a no-op. The result arrives only as a
    /// [`BrokerEvent::PermissionResult`].
    async fn request_permission(&self) -> Result<(), ControllerError>;

    /// Run a privileged command; each argv element is one discrete token
    async fn execute(&self, argv: Vec<String>) -> Result<CommandResult, ControllerError>;
}

/// Point-in-time query of host suspension flags.
///
/// The sole source of truth for toggle-state reconciliation; command
/// results are a hint, not a guarantee.
#[async_trait]
pub trait SuspensionProbe: Send + Sync {
    /// Whether the target is currently suspended.
    ///
    /// Absent or uninstalled targets read as not suspended, never as an
    /// error.
    async fn is_suspended(&self, target: &TargetId) -> bool;

    /// True iff the selection is non-empty and every member is suspended.
    ///
    /// An empty selection is `false` by convention, never vacuously active.
    async fn all_suspended(&self, selection: &Selection) -> bool {
        if selection.is_empty() {
            return false;
        }
        for target in selection.iter() {
            if !self.is_suspended(target).await {
                return false;
            }
        }
        true
    }
}

/// Credential challenge guarding the deactivating transition
#[async_trait]
pub trait AuthChallenge: Send + Sync {
    /// Run one challenge. Single-flight: a second call while one is
    /// outstanding is rejected with [`ChallengeOutcome::Failed`].
    async fn challenge(&self) -> ChallengeOutcome;
}

/// Best-effort process-priority-elevation mechanism.
///
/// Both calls are idempotent; entry/exit events may be delivered more than
/// once under reconciliation races.
pub trait KeepAlive: Send + Sync {
    /// Engage the mechanism
    fn start(&self);

    /// Disengage the mechanism
    fn stop(&self);
}

impl<T: KeepAlive + ?Sized> KeepAlive for std::sync::Arc<T> {
    fn start(&self) {
        (**self).start()
    }

    fn stop(&self) {
        (**self).stop()
    }
}

//! Core domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable identifier for a suspendable application
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId(pub String);

impl TargetId {
    /// Create a new target ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The set of targets the toggle applies to.
///
/// Duplicate-free by construction. An empty selection forces the toggle
/// inactive and blocks the activating transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection(BTreeSet<TargetId>);

impl Selection {
    /// Create an empty selection
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of targets
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the selection holds no targets
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the selection contains a target
    pub fn contains(&self, target: &TargetId) -> bool {
        self.0.contains(target)
    }

    /// Iterate over the targets
    pub fn iter(&self) -> impl Iterator<Item = &TargetId> {
        self.0.iter()
    }
}

impl FromIterator<TargetId> for Selection {
    fn from_iter<I: IntoIterator<Item = TargetId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Connection state for the privileged broker.
///
/// Driven only by broker lifecycle and permission-result events; the
/// controller never advances it past `PermissionPending` on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Broker not attached
    Disconnected,
    /// Broker attached and ready
    Connected,
    /// Permission request outstanding
    PermissionPending,
    /// Permission refused by the user or policy
    PermissionDenied,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::PermissionPending => write!(f, "permission pending"),
            ConnectionState::PermissionDenied => write!(f, "permission denied"),
        }
    }
}

/// State of the user-visible suspension toggle.
///
/// Owned exclusively by the controller; the UI switch is a view of this
/// state, never its source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToggleState {
    /// No targets suspended
    Inactive,
    /// Suspension command in flight
    Activating,
    /// All targets suspended
    Active,
    /// Unsuspension command in flight
    Deactivating,
    /// Transient failure, resolved by the next probe
    Error(String),
}

impl ToggleState {
    /// Whether a privileged transition is currently in flight
    pub fn is_transitioning(&self) -> bool {
        matches!(self, ToggleState::Activating | ToggleState::Deactivating)
    }
}

impl fmt::Display for ToggleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToggleState::Inactive => write!(f, "inactive"),
            ToggleState::Activating => write!(f, "activating"),
            ToggleState::Active => write!(f, "active"),
            ToggleState::Deactivating => write!(f, "deactivating"),
            ToggleState::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Structured result of one privileged command invocation.
///
/// Transient, produced per invocation, never persisted. Exit code 0 is a
/// hint of success only; reconciliation decides the real outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Process exit code
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandResult {
    /// Whether the command reported success
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outcome of a credential challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// User passed the challenge
    Success,
    /// User dismissed the challenge
    UserCanceled,
    /// Challenge could not be completed
    Failed(String),
}

/// Keep-alive mechanism state, derived from the toggle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveState {
    /// Mechanism disengaged
    Off,
    /// Mechanism engaged (toggle is active)
    On,
}

/// Snapshot of controller state published for the UI.
///
/// Every programmatic write goes through this view; observing it never
/// re-invokes user-intent handling, which is what makes reconciliation
/// and revert updates "silent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiState {
    /// Position the switch should show
    pub switch_on: bool,
    /// Whether the switch accepts user input
    pub switch_enabled: bool,
    /// Current toggle state
    pub toggle: ToggleState,
    /// Current broker connection state
    pub connection: ConnectionState,
    /// Number of selected targets
    pub selection_len: usize,
    /// Whether the start-up reconciliation probe has completed
    pub reconciled: bool,
    /// Last user-facing message, if any
    pub message: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            switch_on: false,
            switch_enabled: false,
            toggle: ToggleState::Inactive,
            connection: ConnectionState::Disconnected,
            selection_len: 0,
            reconciled: false,
            message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_dedups() {
        let selection: Selection = ["com.a", "com.b", "com.a"]
            .iter()
            .map(|s| TargetId::from(*s))
            .collect();
        assert_eq!(selection.len(), 2);
        assert!(selection.contains(&TargetId::from("com.a")));
    }

    #[test]
    fn test_empty_selection() {
        let selection = Selection::new();
        assert!(selection.is_empty());
        assert_eq!(selection.len(), 0);
    }

    #[test]
    fn test_toggle_state_display() {
        assert_eq!(format!("{}", ToggleState::Active), "active");
        assert_eq!(
            format!("{}", ToggleState::Error("boom".into())),
            "error: boom"
        );
    }

    #[test]
    fn test_toggle_state_transitioning() {
        assert!(ToggleState::Activating.is_transitioning());
        assert!(ToggleState::Deactivating.is_transitioning());
        assert!(!ToggleState::Active.is_transitioning());
        assert!(!ToggleState::Inactive.is_transitioning());
    }

    #[test]
    fn test_command_result_success() {
        let ok = CommandResult {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        };
        let failed = CommandResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: "permission denied".into(),
        };
        assert!(ok.success());
        assert!(!failed.success());
    }
}

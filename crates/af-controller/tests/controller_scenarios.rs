//! End-to-end controller state machine scenarios against mock collaborators

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};

use af_controller::controller::{ControllerHandle, ToggleController};
use af_core::error::ControllerError;
use af_core::store::TargetStore;
use af_core::traits::{AuthChallenge, Broker, BrokerEvent, KeepAlive, SuspensionProbe};
use af_core::types::{
    ChallengeOutcome, CommandResult, ConnectionState, Selection, TargetId, ToggleState, UiState,
};

/// Scripted reply for one `execute` call
enum ExecResponse {
    /// Succeed and flip the simulated host flag per the verb
    Apply,
    /// Return a non-zero exit
    Fail { exit_code: i32, stderr: String },
    /// Fail at the transport level without touching the host flag
    Error(ControllerError),
    /// Block until released; `true` applies the verb to the host flag
    Hold(oneshot::Receiver<bool>),
}

struct MockBroker {
    reachable: AtomicBool,
    permission: AtomicBool,
    permission_requests: AtomicUsize,
    responses: Mutex<VecDeque<ExecResponse>>,
    calls: Mutex<Vec<Vec<String>>>,
    host_suspended: Arc<AtomicBool>,
}

impl MockBroker {
    fn new(permission: bool, host_suspended: Arc<AtomicBool>) -> Self {
        Self {
            reachable: AtomicBool::new(true),
            permission: AtomicBool::new(permission),
            permission_requests: AtomicUsize::new(0),
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            host_suspended,
        }
    }

    fn script(&self, response: ExecResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    fn exec_calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn apply_verb(&self, argv: &[String]) {
        self.host_suspended
            .store(argv[0] == "suspend", Ordering::SeqCst);
    }
}

#[async_trait]
impl Broker for MockBroker {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn has_permission(&self) -> bool {
        self.permission.load(Ordering::SeqCst)
    }

    async fn request_permission(&self) -> Result<(), ControllerError> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self, argv: Vec<String>) -> Result<CommandResult, ControllerError> {
        self.calls.lock().unwrap().push(argv.clone());
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ExecResponse::Apply);
        match response {
            ExecResponse::Apply => {
                self.apply_verb(&argv);
                Ok(CommandResult {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
            ExecResponse::Fail { exit_code, stderr } => Ok(CommandResult {
                exit_code,
                stdout: String::new(),
                stderr,
            }),
            ExecResponse::Error(err) => Err(err),
            ExecResponse::Hold(release) => {
                let apply = release.await.unwrap_or(false);
                if apply {
                    self.apply_verb(&argv);
                }
                Ok(CommandResult {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
        }
    }
}

struct MockProbe {
    host_suspended: Arc<AtomicBool>,
}

#[async_trait]
impl SuspensionProbe for MockProbe {
    async fn is_suspended(&self, _target: &TargetId) -> bool {
        self.host_suspended.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct MockGate {
    outcomes: Mutex<VecDeque<ChallengeOutcome>>,
    challenges: AtomicUsize,
}

#[async_trait]
impl AuthChallenge for MockGate {
    async fn challenge(&self) -> ChallengeOutcome {
        self.challenges.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ChallengeOutcome::Success)
    }
}

#[derive(Default)]
struct MockKeepAlive {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl KeepAlive for MockKeepAlive {
    fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    broker: Arc<MockBroker>,
    events: mpsc::Sender<BrokerEvent>,
    handle: ControllerHandle,
    ui: watch::Receiver<UiState>,
    host_suspended: Arc<AtomicBool>,
    gate: Arc<MockGate>,
    keepalive: Arc<MockKeepAlive>,
    _dir: tempfile::TempDir,
}

/// Spawn a controller over mocks, attach the broker, and wait for the
/// start-up reconciliation to settle.
async fn start(targets: &[&str], host_suspended: bool, permission: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = TargetStore::new(dir.path().join("targets.toml"));
    let selection: Selection = targets.iter().map(|s| TargetId::from(*s)).collect();
    store.save(&selection).unwrap();

    let host = Arc::new(AtomicBool::new(host_suspended));
    let broker = Arc::new(MockBroker::new(permission, Arc::clone(&host)));
    let gate = Arc::new(MockGate::default());
    let keepalive = Arc::new(MockKeepAlive::default());
    let (event_tx, event_rx) = mpsc::channel(16);

    let handle = ToggleController::spawn(
        broker.clone(),
        event_rx,
        Arc::new(MockProbe {
            host_suspended: Arc::clone(&host),
        }),
        gate.clone(),
        keepalive.clone(),
        store,
    );
    let mut ui = handle.ui();

    event_tx.send(BrokerEvent::Attached).await.unwrap();
    wait_ui(&mut ui, |s| {
        s.reconciled && s.connection == ConnectionState::Connected && !s.toggle.is_transitioning()
    })
    .await;

    Harness {
        broker,
        events: event_tx,
        handle,
        ui,
        host_suspended: host,
        gate,
        keepalive,
        _dir: dir,
    }
}

async fn wait_ui<F>(rx: &mut watch::Receiver<UiState>, pred: F) -> UiState
where
    F: Fn(&UiState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            {
                let state = rx.borrow_and_update().clone();
                if pred(&state) {
                    return state;
                }
            }
            rx.changed().await.expect("controller dropped UI channel");
        }
    })
    .await
    .expect("timed out waiting for UI state")
}

async fn wait_until<F: Fn() -> bool>(pred: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !pred() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for condition")
}

// Scenario: command exits 0 and the reprobe confirms suspension.
#[tokio::test]
async fn activation_succeeds_when_reprobe_confirms() {
    let mut h = start(&["com.x"], false, true).await;

    h.handle.set_switch(true).await;
    let state = wait_ui(&mut h.ui, |s| s.toggle == ToggleState::Active).await;

    assert!(state.switch_on);
    assert!(state.switch_enabled);
    assert_eq!(h.broker.exec_calls(), vec![vec!["suspend", "com.x"]]);
    assert_eq!(h.keepalive.starts.load(Ordering::SeqCst), 1);
}

// Scenario: command exits 1; the switch reverts and stderr is surfaced.
#[tokio::test]
async fn activation_reverts_on_command_failure() {
    let mut h = start(&["com.x"], false, true).await;
    h.broker.script(ExecResponse::Fail {
        exit_code: 1,
        stderr: "permission denied".into(),
    });

    h.handle.set_switch(true).await;
    let state = wait_ui(&mut h.ui, |s| {
        s.toggle == ToggleState::Inactive
            && s.message.as_deref().is_some_and(|m| m.contains("permission denied"))
    })
    .await;

    assert!(!state.switch_on);
    assert_eq!(h.keepalive.starts.load(Ordering::SeqCst), 0);
}

// Scenario: a reported success that the reprobe contradicts still reverts.
#[tokio::test]
async fn activation_trusts_probe_over_exit_code() {
    let mut h = start(&["com.x"], false, true).await;
    // Exit 0 without actually suspending anything.
    h.broker.script(ExecResponse::Fail {
        exit_code: 0,
        stderr: String::new(),
    });

    h.handle.set_switch(true).await;
    let state = wait_ui(&mut h.ui, |s| {
        s.toggle == ToggleState::Inactive
            && s.message.as_deref().is_some_and(|m| m.contains("host state disagrees"))
    })
    .await;

    assert!(!state.switch_on);
}

// Scenario: the command fails at the transport level; the toggle passes
// through the error state and the follow-up reconcile settles it from the
// host flags, with the transport failure surfaced.
#[tokio::test]
async fn transport_failure_settles_via_reconcile() {
    let mut h = start(&["com.x"], false, true).await;
    h.broker
        .script(ExecResponse::Error(ControllerError::TransportLost));

    h.handle.set_switch(true).await;
    let state = wait_ui(&mut h.ui, |s| {
        s.toggle == ToggleState::Inactive
            && s.message.as_deref().is_some_and(|m| m.contains("connection lost"))
    })
    .await;

    assert!(!state.switch_on);
    assert!(state.switch_enabled);
    assert_eq!(h.broker.exec_calls().len(), 1);
    assert_eq!(h.keepalive.starts.load(Ordering::SeqCst), 0);
}

// Scenario: canceling the credential challenge keeps the toggle active
// and never runs a command.
#[tokio::test]
async fn challenge_cancel_reverts_switch_without_side_effects() {
    let mut h = start(&["com.x"], true, true).await;
    wait_ui(&mut h.ui, |s| s.toggle == ToggleState::Active).await;
    h.gate
        .outcomes
        .lock()
        .unwrap()
        .push_back(ChallengeOutcome::UserCanceled);

    h.handle.set_switch(false).await;
    // The watch channel collapses intermediate snapshots, so wait on the
    // gate itself before checking the settled state.
    wait_until(|| h.gate.challenges.load(Ordering::SeqCst) == 1).await;
    let state = wait_ui(&mut h.ui, |s| {
        s.switch_enabled && s.toggle == ToggleState::Active
    })
    .await;

    assert!(state.switch_on);
    assert!(h.broker.exec_calls().is_empty());
    assert!(state.message.is_none());
}

// Scenario: challenge success deactivates and the keep-alive disengages.
#[tokio::test]
async fn challenge_success_deactivates() {
    let mut h = start(&["com.x"], true, true).await;
    wait_ui(&mut h.ui, |s| s.toggle == ToggleState::Active).await;

    h.handle.set_switch(false).await;
    let state = wait_ui(&mut h.ui, |s| s.toggle == ToggleState::Inactive).await;

    assert!(!state.switch_on);
    assert_eq!(h.broker.exec_calls(), vec![vec!["unsuspend", "com.x"]]);
    assert_eq!(h.keepalive.stops.load(Ordering::SeqCst), 1);
}

// Scenario: empty selection rejects activation before any broker traffic.
#[tokio::test]
async fn empty_selection_rejects_activation() {
    let mut h = start(&[], false, true).await;

    h.handle.set_switch(true).await;
    let state = wait_ui(&mut h.ui, |s| {
        s.message.as_deref().is_some_and(|m| m.contains("No targets selected"))
    })
    .await;

    assert_eq!(state.toggle, ToggleState::Inactive);
    assert!(!state.switch_on);
    assert!(h.broker.exec_calls().is_empty());
}

// Scenario: broker detaches mid-activation; the late result is discarded.
#[tokio::test]
async fn detach_mid_activation_forces_inactive_and_discards_result() {
    let mut h = start(&["com.x"], false, true).await;
    let (release_tx, release_rx) = oneshot::channel();
    h.broker.script(ExecResponse::Hold(release_rx));

    h.handle.set_switch(true).await;
    wait_ui(&mut h.ui, |s| s.toggle == ToggleState::Activating).await;

    h.events.send(BrokerEvent::Detached).await.unwrap();
    let state = wait_ui(&mut h.ui, |s| {
        s.toggle == ToggleState::Inactive && s.connection == ConnectionState::Disconnected
    })
    .await;
    assert!(!state.switch_enabled);

    // The command "lands" after the detach; its success must not resurrect
    // the toggle.
    release_tx.send(true).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let state = h.ui.borrow().clone();
    assert_eq!(state.toggle, ToggleState::Inactive);
}

// Activation with no grant parks on the permission result.
#[tokio::test]
async fn activation_waits_for_permission_grant() {
    let mut h = start(&["com.x"], false, false).await;

    h.handle.set_switch(true).await;
    wait_ui(&mut h.ui, |s| {
        s.connection == ConnectionState::PermissionPending
    })
    .await;
    assert_eq!(h.broker.permission_requests.load(Ordering::SeqCst), 1);
    assert!(h.broker.exec_calls().is_empty());

    h.broker.permission.store(true, Ordering::SeqCst);
    h.events
        .send(BrokerEvent::PermissionResult {
            request_id: 1,
            granted: true,
        })
        .await
        .unwrap();

    let state = wait_ui(&mut h.ui, |s| s.toggle == ToggleState::Active).await;
    assert!(state.switch_on);
    assert_eq!(h.broker.exec_calls(), vec![vec!["suspend", "com.x"]]);
}

// A denied grant reverts the activation with a surfaced message.
#[tokio::test]
async fn permission_denial_reverts_activation() {
    let mut h = start(&["com.x"], false, false).await;

    h.handle.set_switch(true).await;
    wait_ui(&mut h.ui, |s| {
        s.connection == ConnectionState::PermissionPending
    })
    .await;

    h.events
        .send(BrokerEvent::PermissionResult {
            request_id: 1,
            granted: false,
        })
        .await
        .unwrap();

    let state = wait_ui(&mut h.ui, |s| {
        s.toggle == ToggleState::Inactive && s.connection == ConnectionState::PermissionDenied
    })
    .await;
    assert!(!state.switch_on);
    assert!(state.message.unwrap().contains("permission denied"));
    assert!(h.broker.exec_calls().is_empty());
}

// The selection is frozen for the whole suspension window.
#[tokio::test]
async fn selection_is_locked_while_active() {
    let mut h = start(&["com.x"], true, true).await;
    wait_ui(&mut h.ui, |s| s.toggle == ToggleState::Active).await;

    let err = h
        .handle
        .set_targets(vec![TargetId::from("com.y")])
        .await
        .unwrap_err();
    assert_eq!(err, ControllerError::SelectionLocked);

    let state = h.ui.borrow().clone();
    assert_eq!(state.selection_len, 1);
}

// Selection mutation while inactive is accepted and persisted.
#[tokio::test]
async fn selection_mutation_while_inactive_is_accepted() {
    let mut h = start(&["com.x"], false, true).await;

    h.handle
        .set_targets(vec![TargetId::from("com.y"), TargetId::from("com.z")])
        .await
        .unwrap();
    let state = wait_ui(&mut h.ui, |s| s.selection_len == 2).await;
    assert_eq!(state.toggle, ToggleState::Inactive);
}

// A silent (programmatic) switch update from reconciliation never invokes
// the user-intent path: no command, no challenge.
#[tokio::test]
async fn reconciliation_update_is_silent() {
    let mut h = start(&["com.x"], false, true).await;

    // Suspension applied behind the controller's back, then a re-attach
    // triggers reconciliation.
    h.host_suspended.store(true, Ordering::SeqCst);
    h.events.send(BrokerEvent::Attached).await.unwrap();

    let state = wait_ui(&mut h.ui, |s| s.toggle == ToggleState::Active).await;
    assert!(state.switch_on);
    assert!(h.broker.exec_calls().is_empty());
    assert_eq!(h.gate.challenges.load(Ordering::SeqCst), 0);
}

// Shutdown from Active disengages the keep-alive mechanism.
#[tokio::test]
async fn shutdown_disengages_keepalive() {
    let mut h = start(&["com.x"], true, true).await;
    wait_ui(&mut h.ui, |s| s.toggle == ToggleState::Active).await;
    assert_eq!(h.keepalive.starts.load(Ordering::SeqCst), 1);

    h.handle.shutdown().await;
    assert_eq!(h.keepalive.stops.load(Ordering::SeqCst), 1);
}

//! Toggle state controller
//!
//! The owner task for all toggle, connection, and selection state. User
//! intent, broker lifecycle events, and worker completions all arrive as
//! messages; nothing mutates controller state from another task. The UI
//! observes a `watch` channel, so every programmatic update (revert,
//! reconciliation) is silent by construction: publishing a snapshot can
//! never re-enter the user-intent path.
//!
//! For every transition the order is fixed: permission or credential gate,
//! then command, then reprobe, then commit. The reprobe is mandatory even
//! when the command reports success; exit codes are hints, host state is
//! truth.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use af_core::error::ControllerError;
use af_core::store::TargetStore;
use af_core::traits::{AuthChallenge, Broker, BrokerEvent, KeepAlive, SuspensionProbe};
use af_core::types::{
    ChallengeOutcome, CommandResult, ConnectionState, Selection, TargetId, ToggleState, UiState,
};

use crate::broker::{CommandExecutor, VERB_SUSPEND, VERB_UNSUSPEND};
use crate::keepalive::KeepAliveSupervisor;

/// Inbox capacity for user-intent messages
const CONTROLLER_INBOX_CAPACITY: usize = 32;

/// Channel capacity for worker completions
const TASK_CHANNEL_CAPACITY: usize = 32;

/// User-intent message to the controller
pub enum ControllerMsg {
    /// The user moved the switch
    SetSwitch {
        /// Requested position
        on: bool,
    },

    /// The target listing UI accepted a new selection.
    ///
    /// An empty list clears the selection; cancel is simply never sending
    /// this message, which leaves the selection untouched.
    SetTargets {
        /// Accepted target identifiers (duplicates are collapsed)
        targets: Vec<TargetId>,
        /// Completion reply
        reply: oneshot::Sender<Result<(), ControllerError>>,
    },
}

/// Completion reported back to the owner task by a worker
enum TaskOutcome {
    /// A suspend/unsuspend command finished and the reprobe ran
    CommandDone {
        attempt: u64,
        activating: bool,
        command: Result<CommandResult, ControllerError>,
        all_suspended: bool,
    },
    /// A standalone reconciliation probe finished
    ReconcileDone { attempt: u64, all_suspended: bool },
    /// The credential challenge finished
    ChallengeDone {
        attempt: u64,
        outcome: ChallengeOutcome,
    },
}

/// Handle to a running controller
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerMsg>,
    ui: watch::Receiver<UiState>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl ControllerHandle {
    /// Subscribe to UI state snapshots
    pub fn ui(&self) -> watch::Receiver<UiState> {
        self.ui.clone()
    }

    /// Report a user switch flip. Fire-and-forget: rejections surface in
    /// the next [`UiState`] snapshot, never as a return value.
    pub async fn set_switch(&self, on: bool) {
        if self
            .tx
            .send(ControllerMsg::SetSwitch { on })
            .await
            .is_err()
        {
            tracing::warn!("Controller is gone; switch flip dropped");
        }
    }

    /// Replace the target selection (empty clears it)
    pub async fn set_targets(&self, targets: Vec<TargetId>) -> Result<(), ControllerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControllerMsg::SetTargets {
                targets,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ControllerError::Shutdown)?;
        reply_rx.await.map_err(|_| ControllerError::Shutdown)?
    }

    /// Stop the controller and wait for the owner task to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.join.await;
    }
}

/// The privileged toggle controller owner task
pub struct ToggleController {
    broker: Arc<dyn Broker>,
    executor: CommandExecutor,
    probe: Arc<dyn SuspensionProbe>,
    gate: Arc<dyn AuthChallenge>,
    keepalive: KeepAliveSupervisor<Arc<dyn KeepAlive>>,
    store: TargetStore,

    selection: Selection,
    toggle: ToggleState,
    connection: ConnectionState,
    /// Transition token; completions carrying a stale token are discarded
    attempt: u64,
    /// Whether a credential challenge is outstanding
    challenge_inflight: bool,
    /// Whether an activation is parked on a permission result
    pending_activation: bool,
    /// Whether the start-up reconciliation probe has completed
    reconciled: bool,
    message: Option<String>,

    inbox: mpsc::Receiver<ControllerMsg>,
    broker_events: mpsc::Receiver<BrokerEvent>,
    tasks_tx: mpsc::Sender<TaskOutcome>,
    tasks_rx: mpsc::Receiver<TaskOutcome>,
    ui_tx: watch::Sender<UiState>,
    cancel: CancellationToken,
}

impl ToggleController {
    /// Spawn the controller owner task.
    ///
    /// The initial toggle state is reconciled from a probe, never assumed;
    /// the persisted selection is loaded once here.
    pub fn spawn(
        broker: Arc<dyn Broker>,
        broker_events: mpsc::Receiver<BrokerEvent>,
        probe: Arc<dyn SuspensionProbe>,
        gate: Arc<dyn AuthChallenge>,
        keepalive: Arc<dyn KeepAlive>,
        store: TargetStore,
    ) -> ControllerHandle {
        let (tx, inbox) = mpsc::channel(CONTROLLER_INBOX_CAPACITY);
        let (tasks_tx, tasks_rx) = mpsc::channel(TASK_CHANNEL_CAPACITY);
        let (ui_tx, ui_rx) = watch::channel(UiState::default());
        let cancel = CancellationToken::new();

        let controller = Self {
            executor: CommandExecutor::new(Arc::clone(&broker)),
            broker,
            probe,
            gate,
            keepalive: KeepAliveSupervisor::new(keepalive),
            store,
            selection: Selection::new(),
            toggle: ToggleState::Inactive,
            connection: ConnectionState::Disconnected,
            attempt: 0,
            challenge_inflight: false,
            pending_activation: false,
            reconciled: false,
            message: None,
            inbox,
            broker_events,
            tasks_tx,
            tasks_rx,
            ui_tx,
            cancel: cancel.clone(),
        };

        let join = tokio::spawn(controller.run());

        ControllerHandle {
            tx,
            ui: ui_rx,
            cancel,
            join,
        }
    }

    async fn run(mut self) {
        self.selection = match self.store.load() {
            Ok(selection) => selection,
            Err(e) => {
                tracing::warn!("Failed to load target selection: {}", e);
                Selection::new()
            }
        };
        tracing::info!(targets = self.selection.len(), "Controller starting");

        self.launch_reconcile();
        self.publish();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                msg = self.inbox.recv() => match msg {
                    Some(msg) => self.handle_msg(msg).await,
                    None => break,
                },
                event = self.broker_events.recv() => match event {
                    Some(event) => self.handle_broker_event(event),
                    None => break,
                },
                Some(outcome) = self.tasks_rx.recv() => self.handle_task_outcome(outcome),
            }
        }

        // Exit from Active via shutdown still disengages keep-alive.
        self.keepalive.on_toggle_state_changed(&ToggleState::Inactive);
        tracing::info!("Controller stopped");
    }

    async fn handle_msg(&mut self, msg: ControllerMsg) {
        match msg {
            ControllerMsg::SetSwitch { on } => self.handle_switch(on).await,
            ControllerMsg::SetTargets { targets, reply } => {
                let _ = reply.send(self.handle_set_targets(targets));
            }
        }
    }

    async fn handle_switch(&mut self, on: bool) {
        // The control is disabled during a transition or challenge; a flip
        // arriving anyway (races with the silent update) is dropped.
        if self.toggle.is_transitioning() || self.challenge_inflight {
            tracing::debug!("Switch flip ignored mid-transition");
            return;
        }
        if self.connection != ConnectionState::Connected
            && self.connection != ConnectionState::PermissionDenied
        {
            self.message = Some(ControllerError::ConnectionUnavailable.to_string());
            self.publish();
            return;
        }
        let currently_on = self.toggle == ToggleState::Active;
        if on == currently_on {
            return;
        }

        if on {
            self.begin_activation().await;
        } else {
            self.begin_deactivation();
        }
    }

    async fn begin_activation(&mut self) {
        // An empty selection disables activation outright; the broker is
        // never consulted.
        if self.selection.is_empty() {
            self.message = Some(ControllerError::EmptySelection.to_string());
            self.publish();
            return;
        }

        self.attempt += 1;
        self.message = None;
        self.commit_toggle(ToggleState::Activating);
        tracing::info!(attempt = self.attempt, "Activation requested");

        if !self.broker.has_permission() {
            self.connection = ConnectionState::PermissionPending;
            self.pending_activation = true;
            if let Err(e) = self.broker.request_permission().await {
                self.pending_activation = false;
                self.connection = ConnectionState::Disconnected;
                self.commit_toggle(ToggleState::Inactive);
                self.message = Some(e.to_string());
            }
            self.publish();
            return;
        }

        self.launch_command(VERB_SUSPEND, true);
        self.publish();
    }

    fn begin_deactivation(&mut self) {
        // The toggle stays Active while the challenge runs: a cancel means
        // the switch just snaps back with no side effects.
        self.attempt += 1;
        self.message = None;
        self.challenge_inflight = true;
        tracing::info!(attempt = self.attempt, "Deactivation requested, running challenge");

        let gate = Arc::clone(&self.gate);
        let tasks = self.tasks_tx.clone();
        let attempt = self.attempt;
        tokio::spawn(async move {
            let outcome = gate.challenge().await;
            let _ = tasks
                .send(TaskOutcome::ChallengeDone { attempt, outcome })
                .await;
        });
        self.publish();
    }

    fn handle_set_targets(&mut self, targets: Vec<TargetId>) -> Result<(), ControllerError> {
        // The target set is frozen for the whole suspension window so a
        // transition never runs against a set it did not start with.
        if self.toggle.is_transitioning()
            || self.toggle == ToggleState::Active
            || self.challenge_inflight
        {
            return Err(ControllerError::SelectionLocked);
        }

        let selection: Selection = targets.into_iter().collect();
        self.store
            .save(&selection)
            .map_err(|e| ControllerError::StoreFailed(e.to_string()))?;

        tracing::info!(targets = selection.len(), "Selection updated");
        self.selection = selection;
        self.launch_reconcile();
        self.publish();
        Ok(())
    }

    fn handle_broker_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Attached => {
                self.connection = ConnectionState::Connected;
                self.message = Some("privileged service ready".to_string());
                self.launch_reconcile();
            }
            BrokerEvent::Detached => {
                // Authoritative: invalidate every in-flight attempt so late
                // results are discarded, and force the toggle inactive.
                self.attempt += 1;
                self.pending_activation = false;
                self.challenge_inflight = false;
                self.connection = ConnectionState::Disconnected;
                self.commit_toggle(ToggleState::Inactive);
                self.message = Some("privileged service disconnected".to_string());
                tracing::warn!("Broker detached; toggle forced inactive");
            }
            BrokerEvent::PermissionResult {
                request_id,
                granted,
            } => {
                tracing::info!(request_id, granted, "Permission result received");
                if granted {
                    self.connection = ConnectionState::Connected;
                    if self.pending_activation {
                        self.pending_activation = false;
                        self.launch_command(VERB_SUSPEND, true);
                    }
                } else {
                    self.connection = ConnectionState::PermissionDenied;
                    self.message = Some(ControllerError::PermissionDenied.to_string());
                    if self.pending_activation {
                        self.pending_activation = false;
                        self.commit_toggle(ToggleState::Inactive);
                    }
                }
            }
        }
        self.publish();
    }

    fn handle_task_outcome(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::CommandDone {
                attempt,
                activating,
                command,
                all_suspended,
            } => {
                if attempt != self.attempt {
                    tracing::debug!(attempt, "Discarding stale command outcome");
                    return;
                }
                self.finish_command(activating, command, all_suspended);
            }
            TaskOutcome::ReconcileDone {
                attempt,
                all_suspended,
            } => {
                self.reconciled = true;
                if attempt != self.attempt || self.toggle.is_transitioning() {
                    tracing::debug!(attempt, "Discarding stale reconcile outcome");
                    self.publish();
                    return;
                }
                let reconciled_state = if all_suspended {
                    ToggleState::Active
                } else {
                    ToggleState::Inactive
                };
                if reconciled_state != self.toggle {
                    tracing::info!(state = %reconciled_state, "Reconciled toggle state");
                }
                self.commit_toggle(reconciled_state);
                self.publish();
            }
            TaskOutcome::ChallengeDone { attempt, outcome } => {
                if attempt != self.attempt {
                    tracing::debug!(attempt, "Discarding stale challenge outcome");
                    return;
                }
                self.finish_challenge(outcome);
            }
        }
    }

    fn finish_command(
        &mut self,
        activating: bool,
        command: Result<CommandResult, ControllerError>,
        all_suspended: bool,
    ) {
        let committed = if all_suspended {
            ToggleState::Active
        } else {
            ToggleState::Inactive
        };

        match command {
            Ok(result) if result.success() => {
                if all_suspended == activating {
                    self.message = Some(if activating {
                        "targets suspended".to_string()
                    } else {
                        "targets restored".to_string()
                    });
                } else {
                    // The command claimed success but host state disagrees.
                    self.message = Some(format!(
                        "command reported success but host state disagrees ({} targets)",
                        self.selection.len()
                    ));
                    tracing::warn!(activating, all_suspended, "Reprobe contradicts command result");
                }
                self.commit_toggle(committed);
            }
            Ok(result) => {
                let err = ControllerError::CommandFailed {
                    exit_code: result.exit_code,
                    stderr: result.stderr.trim().to_string(),
                };
                self.message = Some(err.to_string());
                tracing::warn!("Transition failed: {}", err);
                self.commit_toggle(committed);
            }
            Err(e) => {
                // Ground truth is uncertain here (the connection may have
                // died as the command landed); park in Error and settle
                // with a fresh probe.
                self.message = Some(e.to_string());
                tracing::warn!("Transition failed: {}", e);
                self.commit_toggle(ToggleState::Error(e.to_string()));
                self.launch_reconcile();
            }
        }
        self.publish();
    }

    fn finish_challenge(&mut self, outcome: ChallengeOutcome) {
        self.challenge_inflight = false;
        match outcome {
            ChallengeOutcome::Success => {
                // Leaving Active: keep-alive disengages here, and re-engages
                // if the transition reverts.
                self.commit_toggle(ToggleState::Deactivating);
                tracing::info!("Challenge passed, deactivating");
                self.launch_command(VERB_UNSUSPEND, false);
            }
            ChallengeOutcome::UserCanceled => {
                // Intentional cancel: snap the switch back, surface nothing.
                tracing::info!("Challenge canceled; toggle stays active");
            }
            ChallengeOutcome::Failed(reason) => {
                tracing::warn!("Challenge failed: {}; toggle stays active", reason);
            }
        }
        self.publish();
    }

    /// Spawn the command worker: execute, then reprobe, then report.
    ///
    /// The worker owns the blocking wait on the subprocess; the owner task
    /// never stalls on it. No timeout is imposed: a hung broker command
    /// hangs its worker, and only a detach or a new attempt invalidates it.
    fn launch_command(&mut self, verb: &'static str, activating: bool) {
        let attempt = self.attempt;
        let executor = self.executor.clone();
        let probe = Arc::clone(&self.probe);
        let selection = self.selection.clone();
        let tasks = self.tasks_tx.clone();

        tokio::spawn(async move {
            let command = executor.execute_verb(verb, &selection).await;
            // Mandatory reprobe, success or not.
            let all_suspended = probe.all_suspended(&selection).await;
            let _ = tasks
                .send(TaskOutcome::CommandDone {
                    attempt,
                    activating,
                    command,
                    all_suspended,
                })
                .await;
        });
    }

    /// Spawn a standalone reconciliation probe under the current attempt
    /// token, so a transition starting afterwards invalidates it.
    fn launch_reconcile(&mut self) {
        let attempt = self.attempt;
        let probe = Arc::clone(&self.probe);
        let selection = self.selection.clone();
        let tasks = self.tasks_tx.clone();

        tokio::spawn(async move {
            let all_suspended = probe.all_suspended(&selection).await;
            let _ = tasks
                .send(TaskOutcome::ReconcileDone {
                    attempt,
                    all_suspended,
                })
                .await;
        });
    }

    fn commit_toggle(&mut self, state: ToggleState) {
        if state != self.toggle {
            tracing::debug!(from = %self.toggle, to = %state, "Toggle transition");
            self.toggle = state;
        }
        self.keepalive.on_toggle_state_changed(&self.toggle);
    }

    /// Publish the current snapshot for the UI. This is the silent-update
    /// path: observers render it, they never feed it back as intent.
    fn publish(&self) {
        let switch_on = matches!(self.toggle, ToggleState::Active | ToggleState::Activating);
        let switch_enabled = self.connection == ConnectionState::Connected
            && !self.toggle.is_transitioning()
            && !self.challenge_inflight;

        self.ui_tx.send_replace(UiState {
            switch_on,
            switch_enabled,
            toggle: self.toggle.clone(),
            connection: self.connection,
            selection_len: self.selection.len(),
            reconciled: self.reconciled,
            message: self.message.clone(),
        });
    }
}

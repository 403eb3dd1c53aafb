//! CLI command implementations

mod status;
mod targets;
mod toggle;
mod watch;

pub use status::status_command;
pub use targets::{targets_clear, targets_list, targets_set};
pub use toggle::{off_command, on_command};
pub use watch::watch_command;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use af_controller::auth::CredentialGate;
use af_controller::keepalive::OomScoreKeepAlive;
use af_controller::probe::OsStatusProber;
use af_controller::{BrokerConnection, ControllerHandle, ToggleController};
use af_core::config::ControllerConfig;
use af_core::store::TargetStore;
use af_core::types::{ConnectionState, UiState};

/// How long the one-shot commands wait for start-up reconciliation
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// A running controller plus the broker connection it drives
pub struct Session {
    /// Controller handle
    pub handle: ControllerHandle,
    /// Broker connection, unbound exactly once at close
    pub connection: Arc<BrokerConnection>,
}

/// Assemble the production controller stack from configuration
pub fn start_session(config: &ControllerConfig) -> Session {
    let (connection, events) =
        BrokerConnection::connect(config.broker_socket.clone(), config.connect_timeout());

    let handle = ToggleController::spawn(
        connection.clone(),
        events,
        Arc::new(OsStatusProber::new(config.probe_program.clone())),
        Arc::new(CredentialGate::new(
            config.verifier_program.clone(),
            config.verifier_cancel_code,
        )),
        Arc::new(OomScoreKeepAlive::new(config.keepalive_oom_score)),
        TargetStore::new(config.store_path.clone()),
    );

    Session { handle, connection }
}

impl Session {
    /// Wait until the start-up reconciliation probe has run
    pub async fn wait_reconciled(&self) -> Result<UiState> {
        self.wait_ui(|s| s.reconciled)
            .await
            .context("Timed out waiting for state reconciliation")
    }

    /// Wait until the broker is attached and the state reconciled
    pub async fn wait_ready(&self) -> Result<UiState> {
        self.wait_ui(|s| s.reconciled && s.connection == ConnectionState::Connected)
            .await
            .context("Timed out waiting for the privileged broker")
    }

    async fn wait_ui<F>(&self, pred: F) -> Result<UiState>
    where
        F: Fn(&UiState) -> bool,
    {
        let mut ui = self.handle.ui();
        tokio::time::timeout(READY_TIMEOUT, async {
            loop {
                {
                    let state = ui.borrow_and_update().clone();
                    if pred(&state) {
                        return Ok(state);
                    }
                }
                ui.changed().await.context("Controller stopped")?;
            }
        })
        .await?
    }

    /// Shut down the controller and unbind the broker connection
    pub async fn close(self) {
        self.handle.shutdown().await;
        self.connection.shutdown().await;
    }
}

//! Activation and deactivation commands

use std::time::Duration;

use anyhow::{bail, Result};

use af_core::types::ToggleState;

use crate::commands::Session;
use crate::output::{print_error, print_info, print_success};

/// How long a transition may take, including the permission dialog
const ACTIVATE_TIMEOUT: Duration = Duration::from_secs(60);

/// How long deactivation may take, including the credential challenge
const DEACTIVATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Suspend all selected targets
pub async fn on_command(session: &Session) -> Result<()> {
    let state = session.wait_ready().await?;
    if state.toggle == ToggleState::Active {
        print_info("Targets are already suspended");
        return Ok(());
    }

    tracing::info!(targets = state.selection_len, "Requesting suspension");
    let baseline_message = state.message.clone();
    session.handle.set_switch(true).await;

    let mut ui = session.handle.ui();
    let settled = tokio::time::timeout(ACTIVATE_TIMEOUT, async {
        loop {
            {
                let state = ui.borrow_and_update().clone();
                if state.toggle == ToggleState::Active {
                    return state;
                }
                if state.toggle == ToggleState::Inactive
                    && state.message != baseline_message
                    && state.message.is_some()
                {
                    return state;
                }
            }
            if ui.changed().await.is_err() {
                return ui.borrow().clone();
            }
        }
    })
    .await?;

    if settled.toggle == ToggleState::Active {
        print_success("Targets suspended");
        Ok(())
    } else {
        let message = settled.message.unwrap_or_else(|| "activation failed".into());
        print_error(&message);
        bail!("Activation failed: {}", message);
    }
}

/// Restore all selected targets, after passing the credential challenge
pub async fn off_command(session: &Session) -> Result<()> {
    let state = session.wait_ready().await?;
    if state.toggle != ToggleState::Active && !state.switch_on {
        print_info("Targets are not suspended");
        return Ok(());
    }

    tracing::info!(targets = state.selection_len, "Requesting restore");
    let baseline_message = state.message.clone();
    print_info("Credential challenge required to restore targets...");
    session.handle.set_switch(false).await;

    let mut ui = session.handle.ui();
    let settled = tokio::time::timeout(DEACTIVATE_TIMEOUT, async {
        let mut saw_flip = false;
        loop {
            {
                let state = ui.borrow_and_update().clone();
                if state.toggle == ToggleState::Inactive {
                    return state;
                }
                // An Active snapshot with the switch usable again means the
                // challenge ended without deactivating (cancel or failure).
                if saw_flip && state.toggle == ToggleState::Active && state.switch_enabled {
                    return state;
                }
                if !state.switch_enabled || state.toggle == ToggleState::Deactivating {
                    saw_flip = true;
                }
                if state.toggle == ToggleState::Active
                    && state.message != baseline_message
                    && state.message.is_some()
                {
                    return state;
                }
            }
            if ui.changed().await.is_err() {
                return ui.borrow().clone();
            }
        }
    })
    .await?;

    match settled.toggle {
        ToggleState::Inactive => {
            print_success("Targets restored");
            Ok(())
        }
        ToggleState::Active if settled.message == baseline_message => {
            // Silent revert after a canceled challenge; not an error.
            print_info("Challenge not passed; targets remain suspended");
            Ok(())
        }
        _ => {
            let message = settled
                .message
                .unwrap_or_else(|| "deactivation failed".into());
            print_error(&message);
            bail!("Deactivation failed: {}", message);
        }
    }
}

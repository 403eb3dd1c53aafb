//! Resident watch mode
//!
//! Keeps the controller alive and prints every state change until
//! interrupted. This is the mode in which keep-alive protection matters:
//! while the toggle is active the process holds its elevated OOM score.

use anyhow::Result;

use crate::commands::Session;
use crate::output::{format_state_line, print_info};

/// Follow controller state until Ctrl-C
pub async fn watch_command(session: &Session) -> Result<()> {
    let mut ui = session.handle.ui();
    tracing::debug!("Entering watch mode");

    print_info(&format_state_line(&ui.borrow().clone()));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("Watch interrupted");
                print_info("Interrupted, shutting down");
                return Ok(());
            }
            changed = ui.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                print_info(&format_state_line(&ui.borrow_and_update().clone()));
            }
        }
    }
}

//! Target selection commands
//!
//! `set` and `clear` are the accept path of the selection UI; not running
//! them is the cancel path, which touches nothing.

use anyhow::{bail, Result};

use af_core::config::ControllerConfig;
use af_core::error::ControllerError;
use af_core::store::TargetStore;
use af_core::types::TargetId;

use crate::commands::Session;
use crate::output::{print_error, print_info, print_success};

/// Replace the selection with the given identifiers
pub async fn targets_set(session: &Session, ids: Vec<String>) -> Result<()> {
    // Reconciliation must finish first so a live suspension window locks
    // the selection instead of being overwritten underneath.
    session.wait_reconciled().await?;

    let targets: Vec<TargetId> = ids.into_iter().map(TargetId::from).collect();
    let count = targets.len();
    match session.handle.set_targets(targets).await {
        Ok(()) => {
            print_success(&format!("Selected {} target(s)", count));
            Ok(())
        }
        Err(ControllerError::SelectionLocked) => {
            print_error("Selection is locked while targets are suspended");
            bail!(ControllerError::SelectionLocked);
        }
        Err(e) => {
            print_error(&e.to_string());
            bail!(e);
        }
    }
}

/// Clear the selection
pub async fn targets_clear(session: &Session) -> Result<()> {
    session.wait_reconciled().await?;

    match session.handle.set_targets(Vec::new()).await {
        Ok(()) => {
            print_success("Selection cleared");
            Ok(())
        }
        Err(e) => {
            print_error(&e.to_string());
            bail!(e);
        }
    }
}

/// List the persisted selection. Reads the store directly; no broker or
/// controller involved.
pub fn targets_list(config: &ControllerConfig) -> Result<()> {
    let store = TargetStore::new(config.store_path.clone());
    let selection = store.load()?;

    if selection.is_empty() {
        print_info("No targets selected");
        return Ok(());
    }
    for target in selection.iter() {
        println!("{}", target);
    }
    Ok(())
}

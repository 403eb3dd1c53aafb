//! Host suspension-state prober
//!
//! Queries the host package tool for per-target suspension flags. This is
//! the ground truth the controller reconciles against; command exit codes
//! never decide the committed toggle state on their own.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use af_core::traits::SuspensionProbe;
use af_core::types::TargetId;

/// Probes suspension flags via the host package tool.
///
/// Runs `<program> is-suspended <id>`; exit 0 means suspended. A non-zero
/// exit, an unknown target, or a failure to spawn the tool all read as not
/// suspended, never as an error. This counts toward the all-suspended
/// computation: a selection holding an uninstalled target can never read
/// fully suspended, so the toggle stays inactive until that target is
/// removed from the selection.
pub struct OsStatusProber {
    program: PathBuf,
}

impl OsStatusProber {
    /// Create a prober using the given query program
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl SuspensionProbe for OsStatusProber {
    async fn is_suspended(&self, target: &TargetId) -> bool {
        let output = Command::new(&self.program)
            .arg("is-suspended")
            .arg(target.as_str())
            .output()
            .await;

        match output {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::debug!(target = %target, "Suspension probe failed: {}", e);
                false
            }
        }
    }
}

//! Credential gate for the deactivating transition
//!
//! Wraps the host credential verifier (fingerprint reader or equivalent)
//! behind the [`AuthChallenge`] seam. The gate only guards Active to
//! Inactive; activation is gated by broker permission alone.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::process::Command;

use af_core::traits::AuthChallenge;
use af_core::types::ChallengeOutcome;

/// Invokes the host credential verifier as a subprocess.
///
/// Exit 0 is success, the configured cancel code is a user dismissal, and
/// anything else is a failure. Single-flight: while one challenge is
/// outstanding a second one is rejected without spawning the verifier.
pub struct CredentialGate {
    program: PathBuf,
    cancel_code: i32,
    in_flight: AtomicBool,
}

impl CredentialGate {
    /// Create a gate over the given verifier program
    pub fn new(program: impl Into<PathBuf>, cancel_code: i32) -> Self {
        Self {
            program: program.into(),
            cancel_code,
            in_flight: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl AuthChallenge for CredentialGate {
    async fn challenge(&self) -> ChallengeOutcome {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::warn!("Credential challenge already in progress");
            return ChallengeOutcome::Failed("challenge already in progress".into());
        }

        tracing::info!(program = %self.program.display(), "Running credential challenge");
        let status = Command::new(&self.program).status().await;
        self.in_flight.store(false, Ordering::SeqCst);

        match status {
            Ok(status) if status.success() => ChallengeOutcome::Success,
            Ok(status) if status.code() == Some(self.cancel_code) => {
                ChallengeOutcome::UserCanceled
            }
            Ok(status) => {
                ChallengeOutcome::Failed(format!("verifier exited with {}", status))
            }
            Err(e) => ChallengeOutcome::Failed(format!("verifier failed to start: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_verifier_success() {
        let gate = CredentialGate::new("true", 3);
        assert_eq!(gate.challenge().await, ChallengeOutcome::Success);
    }

    #[tokio::test]
    async fn test_verifier_failure() {
        let gate = CredentialGate::new("false", 3);
        assert!(matches!(
            gate.challenge().await,
            ChallengeOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_verifier_is_failure() {
        let gate = CredentialGate::new("/nonexistent/appfreeze-verify", 3);
        assert!(matches!(
            gate.challenge().await,
            ChallengeOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_challenge_is_single_flight() {
        use std::os::unix::fs::PermissionsExt;

        // A verifier that stalls, holding the first challenge open long
        // enough for the second to hit the in-flight guard.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-verify");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let gate = Arc::new(CredentialGate::new(script.clone(), 3));
        let slow = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.challenge().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let second = gate.challenge().await;
        assert_eq!(
            second,
            ChallengeOutcome::Failed("challenge already in progress".into())
        );
        slow.abort();
    }
}

//! Keep-alive supervision
//!
//! While the toggle is active the controller process is the only thing that
//! can undo the suspension, so it protects itself from memory-pressure
//! kills by lowering its own OOM score. The supervisor correlates the
//! mechanism with toggle state: engaged exactly while `Active`.

use std::sync::Mutex;

use af_core::traits::KeepAlive;
use af_core::types::{KeepAliveState, ToggleState};

#[cfg(target_os = "linux")]
const OOM_SCORE_PATH: &str = "/proc/self/oom_score_adj";

/// Lowers the process OOM score while engaged, restoring the previous
/// value on stop. Best-effort: failures are logged, never fatal.
pub struct OomScoreKeepAlive {
    score: i32,
    saved: Mutex<Option<String>>,
}

impl OomScoreKeepAlive {
    /// Create a mechanism applying the given OOM score adjustment
    pub fn new(score: i32) -> Self {
        Self {
            score,
            saved: Mutex::new(None),
        }
    }
}

#[cfg(target_os = "linux")]
impl KeepAlive for OomScoreKeepAlive {
    fn start(&self) {
        let mut saved = self.saved.lock().unwrap();
        if saved.is_some() {
            return;
        }
        match std::fs::read_to_string(OOM_SCORE_PATH) {
            Ok(previous) => {
                if let Err(e) = std::fs::write(OOM_SCORE_PATH, self.score.to_string()) {
                    tracing::warn!("Failed to adjust OOM score: {}", e);
                    return;
                }
                tracing::debug!(score = self.score, "Keep-alive engaged");
                *saved = Some(previous.trim().to_string());
            }
            Err(e) => tracing::warn!("Failed to read OOM score: {}", e),
        }
    }

    fn stop(&self) {
        let mut saved = self.saved.lock().unwrap();
        let Some(previous) = saved.take() else {
            return;
        };
        if let Err(e) = std::fs::write(OOM_SCORE_PATH, &previous) {
            tracing::warn!("Failed to restore OOM score: {}", e);
        } else {
            tracing::debug!("Keep-alive disengaged");
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl KeepAlive for OomScoreKeepAlive {
    fn start(&self) {
        let mut saved = self.saved.lock().unwrap();
        if saved.is_none() {
            tracing::debug!("Keep-alive not supported on this platform");
            *saved = Some(String::new());
        }
    }

    fn stop(&self) {
        self.saved.lock().unwrap().take();
    }
}

/// Correlates the keep-alive mechanism with toggle state.
///
/// `on_toggle_state_changed` is the only entry point: the mechanism starts
/// on entry into `Active` and stops on any exit from it, including exits
/// via error revert. Repeated deliveries of the same state are harmless;
/// reconciliation races may replay entry and exit events.
pub struct KeepAliveSupervisor<K: KeepAlive> {
    mechanism: K,
    state: KeepAliveState,
}

impl<K: KeepAlive> KeepAliveSupervisor<K> {
    /// Create a supervisor over the given mechanism
    pub fn new(mechanism: K) -> Self {
        Self {
            mechanism,
            state: KeepAliveState::Off,
        }
    }

    /// Current derived state
    pub fn state(&self) -> KeepAliveState {
        self.state
    }

    /// Notify the supervisor of a committed toggle state
    pub fn on_toggle_state_changed(&mut self, toggle: &ToggleState) {
        let desired = if *toggle == ToggleState::Active {
            KeepAliveState::On
        } else {
            KeepAliveState::Off
        };
        if desired == self.state {
            return;
        }
        match desired {
            KeepAliveState::On => self.mechanism.start(),
            KeepAliveState::Off => self.mechanism.stop(),
        }
        self.state = desired;
    }
}

impl<K: KeepAlive> Drop for KeepAliveSupervisor<K> {
    fn drop(&mut self) {
        if self.state == KeepAliveState::On {
            self.mechanism.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingMechanism {
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl KeepAlive for &CountingMechanism {
        fn start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_engages_only_on_active() {
        let mechanism = CountingMechanism::default();
        let mut supervisor = KeepAliveSupervisor::new(&mechanism);

        supervisor.on_toggle_state_changed(&ToggleState::Activating);
        assert_eq!(mechanism.starts.load(Ordering::SeqCst), 0);

        supervisor.on_toggle_state_changed(&ToggleState::Active);
        assert_eq!(mechanism.starts.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.state(), KeepAliveState::On);
    }

    #[test]
    fn test_repeated_deliveries_are_idempotent() {
        let mechanism = CountingMechanism::default();
        let mut supervisor = KeepAliveSupervisor::new(&mechanism);

        supervisor.on_toggle_state_changed(&ToggleState::Active);
        supervisor.on_toggle_state_changed(&ToggleState::Active);
        supervisor.on_toggle_state_changed(&ToggleState::Active);
        assert_eq!(mechanism.starts.load(Ordering::SeqCst), 1);

        supervisor.on_toggle_state_changed(&ToggleState::Inactive);
        supervisor.on_toggle_state_changed(&ToggleState::Inactive);
        assert_eq!(mechanism.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stops_on_error_exit_from_active() {
        let mechanism = CountingMechanism::default();
        let mut supervisor = KeepAliveSupervisor::new(&mechanism);

        supervisor.on_toggle_state_changed(&ToggleState::Active);
        supervisor.on_toggle_state_changed(&ToggleState::Error("boom".into()));
        assert_eq!(mechanism.stops.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.state(), KeepAliveState::Off);
    }

    #[test]
    fn test_drop_disengages() {
        let mechanism = CountingMechanism::default();
        {
            let mut supervisor = KeepAliveSupervisor::new(&mechanism);
            supervisor.on_toggle_state_changed(&ToggleState::Active);
        }
        assert_eq!(mechanism.stops.load(Ordering::SeqCst), 1);
    }
}

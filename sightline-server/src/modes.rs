//! Streaming mode state machine

use parking_lot::Mutex;
use serde::Serialize;
use sightline_core::Mode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const IDLE: u64 = 0;

/// Handle given to the session loop of one started mode.
///
/// The token stays active until the mode is stopped or a newer session of
/// the same mode replaces it.
#[derive(Debug, Clone)]
pub struct SessionToken {
    mode: Mode,
    generation: u64,
    current: Arc<AtomicU64>,
}

impl SessionToken {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }
}

#[derive(Debug, Clone)]
pub enum StartOutcome {
    Started(SessionToken),
    AlreadyRunning,
    /// The other mode holds the camera
    CameraBusy(Mode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

/// Snapshot of both modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeState {
    pub navigation: bool,
    pub object_detection: bool,
}

impl ModeState {
    /// The active mode, if any
    pub fn active(&self) -> Option<Mode> {
        if self.navigation {
            Some(Mode::Navigation)
        } else if self.object_detection {
            Some(Mode::ObjectDetection)
        } else {
            None
        }
    }
}

/// Single writer of the mode state.
///
/// Each mode slot holds the generation of its running session, or zero when
/// idle. Transitions take a short lock; session loops only read the slot.
pub struct ModeController {
    navigation: Arc<AtomicU64>,
    object_detection: Arc<AtomicU64>,
    next_generation: AtomicU64,
    transition: Mutex<()>,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeController {
    pub fn new() -> Self {
        Self {
            navigation: Arc::new(AtomicU64::new(IDLE)),
            object_detection: Arc::new(AtomicU64::new(IDLE)),
            next_generation: AtomicU64::new(IDLE + 1),
            transition: Mutex::new(()),
        }
    }

    fn slot(&self, mode: Mode) -> &Arc<AtomicU64> {
        match mode {
            Mode::Navigation => &self.navigation,
            Mode::ObjectDetection => &self.object_detection,
        }
    }

    fn other(mode: Mode) -> Mode {
        match mode {
            Mode::Navigation => Mode::ObjectDetection,
            Mode::ObjectDetection => Mode::Navigation,
        }
    }

    pub fn start(&self, mode: Mode) -> StartOutcome {
        let _guard = self.transition.lock();

        if self.is_active(mode) {
            debug!("{} already running", mode.display_name());
            return StartOutcome::AlreadyRunning;
        }

        let other = Self::other(mode);
        if self.is_active(other) {
            info!("Refusing to start {}: camera in use by {}", mode, other);
            return StartOutcome::CameraBusy(other);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let slot = self.slot(mode);
        slot.store(generation, Ordering::Release);
        info!("{} started (session {})", mode.display_name(), generation);

        StartOutcome::Started(SessionToken {
            mode,
            generation,
            current: slot.clone(),
        })
    }

    pub fn stop(&self, mode: Mode) -> StopOutcome {
        let _guard = self.transition.lock();
        let previous = self.slot(mode).swap(IDLE, Ordering::AcqRel);
        if previous == IDLE {
            StopOutcome::NotRunning
        } else {
            info!("{} stopped (session {})", mode.display_name(), previous);
            StopOutcome::Stopped
        }
    }

    /// Return the mode to idle when its session ends on its own.
    ///
    /// No effect if the token is stale.
    pub fn finish(&self, token: &SessionToken) {
        let _guard = self.transition.lock();
        if self
            .slot(token.mode)
            .compare_exchange(token.generation, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!("{} session {} ended", token.mode.display_name(), token.generation);
        }
    }

    pub fn start_navigation(&self) -> StartOutcome {
        self.start(Mode::Navigation)
    }

    pub fn stop_navigation(&self) -> StopOutcome {
        self.stop(Mode::Navigation)
    }

    pub fn start_object_detection(&self) -> StartOutcome {
        self.start(Mode::ObjectDetection)
    }

    pub fn stop_object_detection(&self) -> StopOutcome {
        self.stop(Mode::ObjectDetection)
    }

    pub fn stop_all(&self) {
        for mode in Mode::ALL {
            self.stop(mode);
        }
    }

    pub fn is_active(&self, mode: Mode) -> bool {
        self.slot(mode).load(Ordering::Acquire) != IDLE
    }

    pub fn state(&self) -> ModeState {
        ModeState {
            navigation: self.is_active(Mode::Navigation),
            object_detection: self.is_active(Mode::ObjectDetection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(outcome: StartOutcome) -> SessionToken {
        match outcome {
            StartOutcome::Started(token) => token,
            other => panic!("Expected Started, got {:?}", other),
        }
    }

    #[test]
    fn test_start_is_idempotent() {
        let modes = ModeController::new();
        let token = started(modes.start_navigation());
        assert!(token.is_active());
        assert!(matches!(modes.start_navigation(), StartOutcome::AlreadyRunning));
        assert!(token.is_active());
        assert_eq!(modes.state(), ModeState { navigation: true, object_detection: false });
    }

    #[test]
    fn test_stop_is_idempotent() {
        let modes = ModeController::new();
        assert_eq!(modes.stop_object_detection(), StopOutcome::NotRunning);

        let token = started(modes.start_object_detection());
        assert_eq!(modes.stop_object_detection(), StopOutcome::Stopped);
        assert!(!token.is_active());
        assert_eq!(modes.stop_object_detection(), StopOutcome::NotRunning);
        assert_eq!(modes.stop_navigation(), StopOutcome::NotRunning);
    }

    #[test]
    fn test_other_mode_is_refused_while_camera_busy() {
        let modes = ModeController::new();
        let _token = started(modes.start(Mode::Navigation));
        assert!(matches!(
            modes.start(Mode::ObjectDetection),
            StartOutcome::CameraBusy(Mode::Navigation)
        ));
        assert!(!modes.is_active(Mode::ObjectDetection));

        modes.stop(Mode::Navigation);
        started(modes.start(Mode::ObjectDetection));
        assert_eq!(modes.state().active(), Some(Mode::ObjectDetection));
    }

    #[test]
    fn test_stale_token_stays_inactive_after_restart() {
        let modes = ModeController::new();
        let first = started(modes.start(Mode::Navigation));
        modes.stop(Mode::Navigation);
        let second = started(modes.start(Mode::Navigation));

        assert!(!first.is_active());
        assert!(second.is_active());
        assert!(second.generation() > first.generation());

        // A stale session finishing late must not idle the new one
        modes.finish(&first);
        assert!(second.is_active());
        modes.finish(&second);
        assert!(!modes.is_active(Mode::Navigation));
    }

    #[test]
    fn test_concurrent_starts_yield_one_session() {
        let modes = Arc::new(ModeController::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let modes = modes.clone();
                std::thread::spawn(move || matches!(modes.start(Mode::Navigation), StartOutcome::Started(_)))
            })
            .collect();
        let started = handles.into_iter().map(|h| h.join().unwrap()).filter(|s| *s).count();
        assert_eq!(started, 1);
    }
}

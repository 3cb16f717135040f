use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Capture state machine.
///
/// State transitions:
/// ```text
/// ready → capturing ↔ paused
///   ↑         ↓         ↓
///   └──────── stop ─────┘
/// ```
/// Any failed start rolls back to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CaptureState {
    Ready = 0,
    Capturing = 1,
    Paused = 2,
}

impl CaptureState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Capturing,
            2 => Self::Paused,
            _ => Self::Ready,
        }
    }
}

/// Lock-free cell holding the current `CaptureState`.
#[derive(Debug)]
pub(crate) struct AtomicCaptureState(AtomicU8);

impl AtomicCaptureState {
    pub(crate) fn new(state: CaptureState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> CaptureState {
        CaptureState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: CaptureState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub(crate) fn is(&self, state: CaptureState) -> bool {
        self.load() == state
    }
}

/// Read-only view of a capture's state, usable from any thread.
#[derive(Debug, Clone)]
pub struct StateHandle(pub(crate) Arc<AtomicCaptureState>);

impl StateHandle {
    pub fn get(&self) -> CaptureState {
        self.0.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_cell_round_trips_every_state() {
        let cell = AtomicCaptureState::new(CaptureState::Ready);
        for s in [CaptureState::Capturing, CaptureState::Paused, CaptureState::Ready] {
            cell.store(s);
            assert_eq!(cell.load(), s);
            assert!(cell.is(s));
        }
    }

    #[test]
    fn handle_observes_updates_from_other_threads() {
        let cell = Arc::new(AtomicCaptureState::new(CaptureState::Ready));
        let handle = StateHandle(Arc::clone(&cell));

        std::thread::spawn(move || cell.store(CaptureState::Paused))
            .join()
            .unwrap();

        assert!(handle.get().is_paused());
    }
}

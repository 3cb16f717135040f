use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::traits::device_session::FrameSignal;

/// Portable auto-reset event.
///
/// For backends whose platform has no native event object to hand out.
#[derive(Debug, Default)]
pub struct EventSignal {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl EventSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        *self.signalled.lock()
    }
}

impl FrameSignal for EventSignal {
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signalled = self.signalled.lock();
        while !*signalled {
            if self.cond.wait_until(&mut signalled, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *signalled, false)
    }

    fn set(&self) {
        *self.signalled.lock() = true;
        self.cond.notify_one();
    }

    fn reset(&self) {
        *self.signalled.lock() = false;
    }
}

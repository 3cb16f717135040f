use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct Slot<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

/// Turns a completion-callback activation into a blocking wait.
///
/// Hand a clone to the completion handler, which calls `complete`; the
/// activating thread calls `wait`. The waiter is reusable: `wait` takes the
/// completed value and leaves the slot empty for the next activation.
///
/// `wait` has no timeout. If the platform never completes the activation the
/// calling thread stays blocked.
pub struct ActivationWaiter<T = ()> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for ActivationWaiter<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for ActivationWaiter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ActivationWaiter<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Slot {
                value: Mutex::new(None),
                ready: Condvar::new(),
            }),
        }
    }

    /// Store the result and wake one waiter.
    pub fn complete(&self, value: T) {
        *self.slot.value.lock() = Some(value);
        self.slot.ready.notify_one();
    }

    pub fn is_complete(&self) -> bool {
        self.slot.value.lock().is_some()
    }

    /// Block until `complete` has been called, then take the value.
    pub fn wait(&self) -> T {
        let mut value = self.slot.value.lock();
        loop {
            if let Some(v) = value.take() {
                return v;
            }
            self.slot.ready.wait(&mut value);
        }
    }

    /// Like `wait`, but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut value = self.slot.value.lock();
        loop {
            if let Some(v) = value.take() {
                return Some(v);
            }
            if self.slot.ready.wait_until(&mut value, deadline).timed_out() {
                return value.take();
            }
        }
    }
}

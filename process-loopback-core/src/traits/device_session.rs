use std::sync::Arc;
use std::time::Duration;

use crate::models::error::PlatformError;
use crate::models::format::CaptureFormat;

/// Wakeable "frames are ready" notification.
///
/// Auto-reset semantics: a successful `wait` consumes the signal. A `set`
/// with no waiter is remembered until the next `wait` or `reset`.
pub trait FrameSignal: Send + Sync {
    /// Block until signalled or until `timeout` elapses.
    /// Returns `true` if the signal was consumed.
    fn wait(&self, timeout: Duration) -> bool;

    fn set(&self);

    fn reset(&self);
}

/// One buffer of captured frames, borrowed from the session until released.
#[derive(Debug)]
pub struct FramePacket<'a> {
    /// `frames * block_align` bytes.
    pub data: &'a [u8],
    pub frames: u32,
    /// The device reported silence; `data` must be treated as zeros.
    pub silent: bool,
}

/// Reverts a thread scheduling change when dropped.
///
/// Created and dropped on the same thread, so the release action need not be `Send`.
#[must_use = "the priority boost is reverted when the guard is dropped"]
pub struct PriorityGuard {
    release: Option<Box<dyn FnOnce()>>,
}

impl PriorityGuard {
    /// A guard that does nothing.
    pub fn none() -> Self {
        Self { release: None }
    }

    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for PriorityGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Reader side of a device session. Owned by the producer thread while capturing.
pub trait FrameSource: Send {
    /// Next available packet, or `None` when the session has no more data for now.
    fn next_packet(&mut self) -> Result<Option<FramePacket<'_>>, PlatformError>;

    /// Hand a packet's frames back to the session.
    fn release_packet(&mut self, frames: u32) -> Result<(), PlatformError>;

    /// Raise the calling thread's scheduling priority for real-time reads.
    fn boost_priority(&self) -> PriorityGuard {
        PriorityGuard::none()
    }
}

/// An activated loopback session scoped to one target process.
///
/// Every method is called from the thread that owns the capture object; the
/// frame source and signal are the only parts handed to worker threads.
pub trait AudioDeviceSession: Send {
    type Source: FrameSource + 'static;
    type Signal: FrameSignal + 'static;

    /// Configure the stream for `format`. Called once, before anything else.
    fn initialize(&mut self, format: &CaptureFormat) -> Result<(), PlatformError>;

    /// Obtain the frame reader for the initialized stream.
    fn frame_source(&mut self) -> Result<Self::Source, PlatformError>;

    /// Create the frame-ready signal and bind it to the stream.
    fn frame_ready_signal(&mut self) -> Result<Arc<Self::Signal>, PlatformError>;

    fn start(&mut self) -> Result<(), PlatformError>;

    fn stop(&mut self) -> Result<(), PlatformError>;

    /// Flush any data the session still holds. Only called while stopped.
    fn reset(&mut self);
}

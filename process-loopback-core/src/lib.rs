//! # process-loopback-core
//!
//! Platform-agnostic core of process-scoped loopback capture.
//!
//! Captures the audio rendered by one process tree (or by everything except
//! it) and streams raw PCM to a callback. Platform backends (Windows WASAPI
//! process loopback) implement `SessionActivator` / `AudioDeviceSession` and
//! plug into the generic `LoopbackCapture`.
//!
//! ## Architecture
//!
//! ```text
//! process-loopback-core (this crate)
//! ├── traits/       ← SessionActivator, AudioDeviceSession, FrameSource, FrameSignal, CaptureCallback
//! ├── models/       ← CaptureError, CaptureState, CaptureFormat, TargetProcess, CaptureConfiguration
//! ├── processing/   ← ProducerStage, DecouplingStage, handoff queue, ExecutionMonitor
//! ├── session/      ← LoopbackCapture (state machine + worker lifecycle)
//! └── sync/         ← ActivationWaiter, EventSignal
//! ```
//!
//! ## Features
//!
//! - `intermediate-queue` (default): the decoupled delivery mode, where a
//!   second thread delivers frame-aligned chunks on a fixed interval.

pub mod models;
pub mod processing;
pub mod session;
pub mod sync;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use models::config::CaptureConfiguration;
pub use models::error::{ActivationError, CaptureError, PlatformError};
pub use models::format::{CaptureFormat, FormatTag, TargetProcess};
pub use models::state::{CaptureState, StateHandle};
pub use session::loopback_capture::LoopbackCapture;
pub use sync::activation::ActivationWaiter;
pub use sync::event_signal::EventSignal;
pub use traits::capture_callback::CaptureCallback;
pub use traits::device_session::{AudioDeviceSession, FramePacket, FrameSignal, FrameSource, PriorityGuard};
pub use traits::session_activator::SessionActivator;

use crate::models::error::ActivationError;
use crate::models::format::TargetProcess;
use crate::traits::device_session::AudioDeviceSession;

/// Interface for platform backends that can open a process loopback session.
///
/// Implemented by:
/// - `ProcessLoopbackActivator` (Windows, `process-loopback-windows`)
pub trait SessionActivator: Send {
    type Session: AudioDeviceSession;

    /// Acquire a loopback session for `target`. Blocks until activation
    /// has completed.
    fn activate(&mut self, target: &TargetProcess) -> Result<Self::Session, ActivationError>;
}

use thiserror::Error;

/// Raw failure reported by a platform backend.
///
/// `code` is the platform status value (an `HRESULT` on Windows). Zero means
/// success and never appears inside an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} (0x{code:08X})")]
pub struct PlatformError {
    pub code: i32,
    pub message: String,
}

impl PlatformError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Failure while activating a device session.
///
/// Activation is a two-step operation: the request itself can be rejected, or
/// it can be accepted and complete with a failing result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActivationError {
    #[error("activation request rejected: {0}")]
    Request(PlatformError),

    #[error("activation completed with failure: {0}")]
    Completion(PlatformError),
}

/// Errors returned by the capture API.
///
/// Configuration errors (`Param` .. `ProcessId`) are detected before anything
/// is touched. Session errors name the stage that failed and carry the
/// platform status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("invalid parameter: {0}")]
    Param(String),

    #[error("invalid operation for current state")]
    State,

    #[error("feature not available")]
    NotAvailable,

    #[error("capture format is invalid or not initialized")]
    Format,

    #[error("process id is invalid (0/not set)")]
    ProcessId,

    #[error("failed to get device: {0}")]
    Device(PlatformError),

    #[error("failed to activate device: {0}")]
    Activation(PlatformError),

    #[error("failed to init device: {0}")]
    Initialize(PlatformError),

    #[error("failed to get capture service: {0}")]
    Service(PlatformError),

    #[error("failed to start capture: {0}")]
    Start(PlatformError),

    #[error("failed to stop capture: {0}")]
    Stop(PlatformError),

    #[error("failed to create and set event: {0}")]
    Event(PlatformError),

    #[error("interface failure: {0}")]
    Interface(String),
}

impl CaptureError {
    /// True for errors raised by argument or state checks.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Param(_) | Self::State | Self::NotAvailable | Self::Format | Self::ProcessId
        )
    }

    /// Platform status attached to a session error, if any.
    pub fn platform_code(&self) -> Option<i32> {
        match self {
            Self::Device(e)
            | Self::Activation(e)
            | Self::Initialize(e)
            | Self::Service(e)
            | Self::Start(e)
            | Self::Stop(e)
            | Self::Event(e) => Some(e.code),
            _ => None,
        }
    }
}

impl From<ActivationError> for CaptureError {
    fn from(err: ActivationError) -> Self {
        match err {
            ActivationError::Request(e) => Self::Device(e),
            ActivationError::Completion(e) => Self::Activation(e),
        }
    }
}

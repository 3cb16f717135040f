//! COM apartment lifetime and error conversion shared by the backend.

use windows::Win32::System::Com::{CoDecrementMTAUsage, CoIncrementMTAUsage, CO_MTA_USAGE_COOKIE};

use process_loopback_core::PlatformError;

/// Convert a windows-rs error into the core's platform error (HRESULT + message).
pub(crate) fn platform_error(err: windows::core::Error) -> PlatformError {
    PlatformError::new(err.code().0, err.message())
}

/// Keeps the process-wide multithreaded apartment alive.
///
/// Activation completes on an MTA thread and the loopback client is used from
/// the capture threads, so the apartment has to outlive the session even when
/// the owning thread never called `CoInitializeEx`.
pub(crate) struct MtaUsage {
    cookie: CO_MTA_USAGE_COOKIE,
}

impl MtaUsage {
    pub(crate) fn acquire() -> Result<Self, PlatformError> {
        let cookie = unsafe { CoIncrementMTAUsage() }.map_err(platform_error)?;
        Ok(Self { cookie })
    }
}

impl Drop for MtaUsage {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CoDecrementMTAUsage(self.cookie) } {
            log::debug!("CoDecrementMTAUsage failed: {}", e);
        }
    }
}

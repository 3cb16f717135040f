//! Win32 auto-reset event used as the frame-ready signal.

use std::time::Duration;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::System::Threading::{CreateEventW, ResetEvent, SetEvent, WaitForSingleObject, INFINITE};

use process_loopback_core::{FrameSignal, PlatformError};

use crate::com::platform_error;

/// Unnamed auto-reset event, initially unsignalled.
///
/// Bound to the audio client with `SetEventHandle`; the engine sets it
/// whenever a buffer is ready.
pub struct Win32Event {
    handle: HANDLE,
}

// SAFETY: event handles may be waited on, set and reset from any thread.
unsafe impl Send for Win32Event {}
unsafe impl Sync for Win32Event {}

impl Win32Event {
    pub fn new() -> Result<Self, PlatformError> {
        let handle = unsafe { CreateEventW(None, false, false, PCWSTR::null()) }.map_err(platform_error)?;
        Ok(Self { handle })
    }

    pub(crate) fn handle(&self) -> HANDLE {
        self.handle
    }
}

impl FrameSignal for Win32Event {
    fn wait(&self, timeout: Duration) -> bool {
        // INFINITE is reserved; clamp just below it.
        let millis = u32::try_from(timeout.as_millis()).unwrap_or(INFINITE).min(INFINITE - 1);
        unsafe { WaitForSingleObject(self.handle, millis) == WAIT_OBJECT_0 }
    }

    fn set(&self) {
        if let Err(e) = unsafe { SetEvent(self.handle) } {
            log::warn!("SetEvent failed: {}", e);
        }
    }

    fn reset(&self) {
        if let Err(e) = unsafe { ResetEvent(self.handle) } {
            log::warn!("ResetEvent failed: {}", e);
        }
    }
}

impl Drop for Win32Event {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

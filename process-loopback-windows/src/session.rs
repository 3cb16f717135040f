//! Shared-mode, event-driven WASAPI session on a process loopback client.

use std::sync::Arc;

use windows::core::w;
use windows::Win32::Media::Audio::{
    IAudioCaptureClient, IAudioClient, AUDCLNT_BUFFERFLAGS_SILENT, AUDCLNT_SHAREMODE_SHARED,
    AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM, AUDCLNT_STREAMFLAGS_EVENTCALLBACK, AUDCLNT_STREAMFLAGS_LOOPBACK,
    AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY, WAVEFORMATEX,
};
use windows::Win32::System::Threading::{
    AvRevertMmThreadCharacteristics, AvSetMmThreadCharacteristicsW, GetCurrentThread, SetThreadPriority,
    THREAD_PRIORITY_TIME_CRITICAL,
};

use process_loopback_core::{
    AudioDeviceSession, CaptureFormat, FramePacket, FrameSource, PlatformError, PriorityGuard,
};

use crate::com::{platform_error, MtaUsage};
use crate::event::Win32Event;

/// An activated process loopback `IAudioClient`.
///
/// Field order matters on drop: the client goes before the event it signals
/// and before the MTA reference.
pub struct WasapiProcessSession {
    client: IAudioClient,
    block_align: usize,
    event: Option<Arc<Win32Event>>,
    _mta: MtaUsage,
}

// SAFETY: the client was activated in the MTA and process loopback clients are
// free-threaded. The session only ever moves between threads, never shares.
unsafe impl Send for WasapiProcessSession {}

impl WasapiProcessSession {
    pub(crate) fn new(client: IAudioClient, mta: MtaUsage) -> Self {
        Self {
            client,
            block_align: 0,
            event: None,
            _mta: mta,
        }
    }
}

impl AudioDeviceSession for WasapiProcessSession {
    type Source = WasapiFrameSource;
    type Signal = Win32Event;

    fn initialize(&mut self, format: &CaptureFormat) -> Result<(), PlatformError> {
        let wave = wave_format(format);
        // Buffer duration and periodicity are ignored for process loopback.
        unsafe {
            self.client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_LOOPBACK
                    | AUDCLNT_STREAMFLAGS_EVENTCALLBACK
                    | AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM
                    | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
                0,
                0,
                &wave,
                None,
            )
        }
        .map_err(platform_error)?;

        self.block_align = format.block_align() as usize;
        Ok(())
    }

    fn frame_source(&mut self) -> Result<WasapiFrameSource, PlatformError> {
        let capture: IAudioCaptureClient = unsafe { self.client.GetService() }.map_err(platform_error)?;
        Ok(WasapiFrameSource {
            capture,
            block_align: self.block_align,
        })
    }

    fn frame_ready_signal(&mut self) -> Result<Arc<Win32Event>, PlatformError> {
        let event = Arc::new(Win32Event::new()?);
        unsafe { self.client.SetEventHandle(event.handle()) }.map_err(platform_error)?;
        self.event = Some(Arc::clone(&event));
        Ok(event)
    }

    fn start(&mut self) -> Result<(), PlatformError> {
        unsafe { self.client.Start() }.map_err(platform_error)
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        unsafe { self.client.Stop() }.map_err(platform_error)
    }

    fn reset(&mut self) {
        if let Err(e) = unsafe { self.client.Reset() } {
            log::debug!("IAudioClient::Reset failed: {}", e);
        }
    }
}

/// `IAudioCaptureClient` reader, owned by the producer thread.
pub struct WasapiFrameSource {
    capture: IAudioCaptureClient,
    block_align: usize,
}

// SAFETY: see `WasapiProcessSession`; the capture client belongs to the same
// free-threaded audio client and is used by one thread at a time.
unsafe impl Send for WasapiFrameSource {}

impl FrameSource for WasapiFrameSource {
    fn next_packet(&mut self) -> Result<Option<FramePacket<'_>>, PlatformError> {
        let pending = unsafe { self.capture.GetNextPacketSize() }.map_err(platform_error)?;
        if pending == 0 {
            return Ok(None);
        }

        let mut data: *mut u8 = std::ptr::null_mut();
        let mut frames: u32 = 0;
        let mut flags: u32 = 0;
        unsafe { self.capture.GetBuffer(&mut data, &mut frames, &mut flags, None, None) }.map_err(platform_error)?;

        let len = frames as usize * self.block_align;
        let bytes: &[u8] = if data.is_null() || len == 0 {
            &[]
        } else {
            // SAFETY: GetBuffer returned `frames` whole frames at `data`, valid
            // until the matching ReleaseBuffer.
            unsafe { std::slice::from_raw_parts(data, len) }
        };

        Ok(Some(FramePacket {
            data: bytes,
            frames,
            silent: flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0,
        }))
    }

    fn release_packet(&mut self, frames: u32) -> Result<(), PlatformError> {
        unsafe { self.capture.ReleaseBuffer(frames) }.map_err(platform_error)
    }

    /// MMCSS "Pro Audio" registration plus time-critical thread priority.
    fn boost_priority(&self) -> PriorityGuard {
        if let Err(e) = unsafe { SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_TIME_CRITICAL) } {
            log::warn!("SetThreadPriority failed: {}", e);
        }

        let mut task_index: u32 = 0;
        match unsafe { AvSetMmThreadCharacteristicsW(w!("Pro Audio"), &mut task_index) } {
            Ok(task) => PriorityGuard::new(move || {
                if let Err(e) = unsafe { AvRevertMmThreadCharacteristics(task) } {
                    log::debug!("AvRevertMmThreadCharacteristics failed: {}", e);
                }
            }),
            Err(e) => {
                log::warn!("MMCSS registration failed: {}", e);
                PriorityGuard::none()
            }
        }
    }
}

/// `WAVEFORMATEX` for a validated capture format.
pub(crate) fn wave_format(format: &CaptureFormat) -> WAVEFORMATEX {
    WAVEFORMATEX {
        wFormatTag: format.tag().wave_format_code(),
        nChannels: format.channels(),
        nSamplesPerSec: format.sample_rate(),
        nAvgBytesPerSec: format.avg_bytes_per_sec(),
        nBlockAlign: format.block_align(),
        wBitsPerSample: format.bit_depth(),
        cbSize: 0,
    }
}

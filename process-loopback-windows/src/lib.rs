//! # process-loopback-windows
//!
//! Windows WASAPI backend for process-loopback-core.
//!
//! Provides:
//! - `ProcessLoopbackActivator` — activates a loopback client scoped to one
//!   process tree via `ActivateAudioInterfaceAsync`
//! - `WasapiProcessSession` / `WasapiFrameSource` — event-driven shared-mode
//!   stream and its `IAudioCaptureClient` reader
//! - `Win32Event` — auto-reset event used as the frame-ready signal
//!
//! ## Platform Requirements
//! - Windows 10 2004 (build 19041) or later for process loopback
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use process_loopback_core::{FormatTag, LoopbackCapture};
//! use process_loopback_windows::ProcessLoopbackActivator;
//!
//! let mut capture = LoopbackCapture::new(ProcessLoopbackActivator::new());
//! capture.set_capture_format(48_000, 16, 2, FormatTag::Pcm)?;
//! capture.set_target_process(pid, true)?;
//! capture.set_callback(Arc::new(|pcm: &[u8]| { /* ... */ }))?;
//! capture.start_capture()?;
//! ```

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod activator;
#[cfg(target_os = "windows")]
pub mod event;
#[cfg(target_os = "windows")]
pub mod session;

#[cfg(target_os = "windows")]
pub use activator::ProcessLoopbackActivator;
#[cfg(target_os = "windows")]
pub use event::Win32Event;
#[cfg(target_os = "windows")]
pub use session::{WasapiFrameSource, WasapiProcessSession};

//! Scripted in-memory backend for exercising the capture pipeline without a
//! real audio device.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::error::{ActivationError, PlatformError};
use crate::models::format::{CaptureFormat, TargetProcess};
use crate::sync::event_signal::EventSignal;
use crate::traits::device_session::{AudioDeviceSession, FramePacket, FrameSignal, FrameSource};
use crate::traits::session_activator::SessionActivator;

/// Session step to fail on. Stays armed until cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailAt {
    Request,
    Completion,
    Initialize,
    Service,
    Event,
    Start,
    Stop,
}

impl FailAt {
    pub(crate) fn code(self) -> i32 {
        match self {
            Self::Request => -101,
            Self::Completion => -102,
            Self::Initialize => -103,
            Self::Service => -104,
            Self::Event => -105,
            Self::Start => -106,
            Self::Stop => -107,
        }
    }

    fn error(self) -> PlatformError {
        PlatformError::new(self.code(), format!("scripted {:?} failure", self))
    }
}

/// Call counters for the scripted device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DeviceLog {
    pub activations: u32,
    pub initializes: u32,
    pub sources: u32,
    pub starts: u32,
    pub stops: u32,
    pub resets: u32,
    pub released_frames: u64,
}

#[derive(Default)]
struct Shared {
    packets: Mutex<VecDeque<(Vec<u8>, bool)>>,
    fail: Mutex<Option<FailAt>>,
    log: Mutex<DeviceLog>,
    signal: Mutex<Option<Arc<EventSignal>>>,
    block_align: Mutex<usize>,
    target: Mutex<Option<TargetProcess>>,
}

/// Test-side handle to a scripted device; clones share state.
#[derive(Clone, Default)]
pub(crate) struct ScriptedDevice {
    shared: Arc<Shared>,
}

impl ScriptedDevice {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn activator(&self) -> ScriptedActivator {
        ScriptedActivator { device: self.clone() }
    }

    pub(crate) fn fail_at(&self, step: Option<FailAt>) {
        *self.shared.fail.lock() = step;
    }

    /// Queue a packet and wake the reader.
    pub(crate) fn push_packet(&self, bytes: &[u8]) {
        self.queue(bytes, false);
    }

    pub(crate) fn push_silent_packet(&self, len: usize) {
        self.queue(&vec![0x5A; len], true);
    }

    fn queue(&self, bytes: &[u8], silent: bool) {
        self.shared.packets.lock().push_back((bytes.to_vec(), silent));
        if let Some(signal) = self.shared.signal.lock().as_ref() {
            signal.set();
        }
    }

    pub(crate) fn pending_packets(&self) -> usize {
        self.shared.packets.lock().len()
    }

    pub(crate) fn log(&self) -> DeviceLog {
        self.shared.log.lock().clone()
    }

    pub(crate) fn last_target(&self) -> Option<TargetProcess> {
        *self.shared.target.lock()
    }

    fn check(&self, step: FailAt) -> Result<(), PlatformError> {
        match *self.shared.fail.lock() {
            Some(armed) if armed == step => Err(step.error()),
            _ => Ok(()),
        }
    }
}

pub(crate) struct ScriptedActivator {
    device: ScriptedDevice,
}

impl SessionActivator for ScriptedActivator {
    type Session = ScriptedSession;

    fn activate(&mut self, target: &TargetProcess) -> Result<ScriptedSession, ActivationError> {
        self.device.check(FailAt::Request).map_err(ActivationError::Request)?;
        self.device
            .check(FailAt::Completion)
            .map_err(ActivationError::Completion)?;

        self.device.shared.log.lock().activations += 1;
        *self.device.shared.target.lock() = Some(*target);
        Ok(ScriptedSession {
            device: self.device.clone(),
        })
    }
}

pub(crate) struct ScriptedSession {
    device: ScriptedDevice,
}

impl AudioDeviceSession for ScriptedSession {
    type Source = ScriptedSource;
    type Signal = EventSignal;

    fn initialize(&mut self, format: &CaptureFormat) -> Result<(), PlatformError> {
        self.device.check(FailAt::Initialize)?;
        self.device.shared.log.lock().initializes += 1;
        *self.device.shared.block_align.lock() = format.block_align() as usize;
        Ok(())
    }

    fn frame_source(&mut self) -> Result<ScriptedSource, PlatformError> {
        self.device.check(FailAt::Service)?;
        self.device.shared.log.lock().sources += 1;
        Ok(ScriptedSource {
            device: self.device.clone(),
            current: Vec::new(),
        })
    }

    fn frame_ready_signal(&mut self) -> Result<Arc<EventSignal>, PlatformError> {
        self.device.check(FailAt::Event)?;
        let signal = Arc::new(EventSignal::new());
        *self.device.shared.signal.lock() = Some(Arc::clone(&signal));
        Ok(signal)
    }

    fn start(&mut self) -> Result<(), PlatformError> {
        self.device.check(FailAt::Start)?;
        self.device.shared.log.lock().starts += 1;
        // Wake the reader for anything queued while stopped.
        if !self.device.shared.packets.lock().is_empty() {
            if let Some(signal) = self.device.shared.signal.lock().as_ref() {
                signal.set();
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        self.device.check(FailAt::Stop)?;
        self.device.shared.log.lock().stops += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.device.shared.log.lock().resets += 1;
        self.device.shared.packets.lock().clear();
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.device.shared.signal.lock().take();
    }
}

pub(crate) struct ScriptedSource {
    device: ScriptedDevice,
    current: Vec<u8>,
}

impl FrameSource for ScriptedSource {
    fn next_packet(&mut self) -> Result<Option<FramePacket<'_>>, PlatformError> {
        let Some((bytes, silent)) = self.device.shared.packets.lock().pop_front() else {
            return Ok(None);
        };
        let block_align = (*self.device.shared.block_align.lock()).max(1);
        self.current = bytes;
        Ok(Some(FramePacket {
            data: &self.current,
            frames: (self.current.len() / block_align) as u32,
            silent,
        }))
    }

    fn release_packet(&mut self, frames: u32) -> Result<(), PlatformError> {
        self.device.shared.log.lock().released_frames += u64::from(frames);
        Ok(())
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

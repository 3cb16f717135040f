use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::models::config::{
    CaptureConfiguration, DEFAULT_CALLBACK_INTERVAL, DEFAULT_RESUME_SKIP_SECS, MIN_CALLBACK_INTERVAL,
};
use crate::models::error::CaptureError;
use crate::models::format::{CaptureFormat, FormatTag, TargetProcess};
use crate::models::state::{AtomicCaptureState, CaptureState, StateHandle};
#[cfg(feature = "intermediate-queue")]
use crate::processing::decoupler::DecouplingStage;
use crate::processing::execution_monitor::ExecutionMonitor;
#[cfg(feature = "intermediate-queue")]
use crate::processing::handoff_queue::{self, QueueStats};
use crate::processing::producer::{Destination, ProducerExit, ProducerStage};
use crate::traits::capture_callback::CaptureCallback;
use crate::traits::device_session::{AudioDeviceSession, FrameSignal};
use crate::traits::session_activator::SessionActivator;

/// Worker threads of one CAPTURING interval.
struct Workers<F> {
    running: Arc<AtomicBool>,
    producer: JoinHandle<ProducerExit<F>>,
    decoupler: Option<JoinHandle<Vec<u8>>>,
}

/// A session that has been activated and initialized.
struct ActiveSession<S: AudioDeviceSession> {
    session: S,
    signal: Arc<S::Signal>,
    /// Parked here between intervals; owned by the producer while capturing.
    source: Option<S::Source>,
    workers: Option<Workers<S::Source>>,
}

/// Captures the audio of one process (tree) and streams raw PCM to a callback.
///
/// Generic over the platform backend via `SessionActivator`. Settings can
/// only change while the capture is `Ready`, so the running pipeline never
/// needs to synchronize on them.
///
/// Data flow:
/// ```text
/// direct:        [Session] → Producer (staging) → callback
/// intermediate:  [Session] → Producer → [SPSC queue] → Decoupler (align) → callback
/// ```
pub struct LoopbackCapture<A: SessionActivator> {
    activator: A,
    state: Arc<AtomicCaptureState>,

    format: Option<CaptureFormat>,
    target: Option<TargetProcess>,
    callback: Option<CaptureCallback>,
    callback_interval: Duration,
    intermediate_mode: bool,
    resume_skip_secs: f64,

    last_error: i32,
    monitor: Arc<ExecutionMonitor>,

    active: Option<ActiveSession<A::Session>>,
    staging: Vec<u8>,
    pending_skip_bytes: u64,

    #[cfg(feature = "intermediate-queue")]
    queue_stats: Arc<QueueStats>,
}

impl<A: SessionActivator> LoopbackCapture<A> {
    pub fn new(activator: A) -> Self {
        Self {
            activator,
            state: Arc::new(AtomicCaptureState::new(CaptureState::Ready)),
            format: None,
            target: None,
            callback: None,
            callback_interval: DEFAULT_CALLBACK_INTERVAL,
            intermediate_mode: false,
            resume_skip_secs: DEFAULT_RESUME_SKIP_SECS,
            last_error: 0,
            monitor: Arc::new(ExecutionMonitor::new()),
            active: None,
            staging: Vec::new(),
            pending_skip_bytes: 0,
            #[cfg(feature = "intermediate-queue")]
            queue_stats: Arc::new(QueueStats::default()),
        }
    }

    // --- Configuration (Ready only) ---

    /// `FormatTag::IeeeFloat` forces 32-bit samples.
    pub fn set_capture_format(
        &mut self,
        sample_rate: u32,
        bit_depth: u16,
        channels: u16,
        tag: FormatTag,
    ) -> Result<(), CaptureError> {
        self.ensure_ready()?;
        self.format = Some(CaptureFormat::new(sample_rate, bit_depth, channels, tag)?);
        Ok(())
    }

    /// The configured format, if one has been set.
    pub fn capture_format(&self) -> Option<CaptureFormat> {
        self.format
    }

    /// `include_tree`: capture only this process tree (true) or everything
    /// except it (false).
    pub fn set_target_process(&mut self, process_id: u32, include_tree: bool) -> Result<(), CaptureError> {
        self.ensure_ready()?;
        self.target = Some(TargetProcess::new(process_id, include_tree)?);
        Ok(())
    }

    pub fn target_process(&self) -> Option<TargetProcess> {
        self.target
    }

    pub fn set_callback(&mut self, callback: CaptureCallback) -> Result<(), CaptureError> {
        self.ensure_ready()?;
        self.callback = Some(callback);
        Ok(())
    }

    /// Captured bytes are read and discarded while no callback is set.
    pub fn clear_callback(&mut self) -> Result<(), CaptureError> {
        self.ensure_ready()?;
        self.callback = None;
        Ok(())
    }

    /// Decoupling stage cycle interval. Values below 1 ms are raised to 1 ms.
    pub fn set_callback_interval(&mut self, interval: Duration) -> Result<(), CaptureError> {
        self.ensure_ready()?;
        self.callback_interval = interval.max(MIN_CALLBACK_INTERVAL);
        Ok(())
    }

    pub fn callback_interval(&self) -> Duration {
        self.callback_interval
    }

    /// Deliver through the decoupling thread instead of the producer thread.
    ///
    /// Fails with `NotAvailable` when built without `intermediate-queue`.
    pub fn set_intermediate_mode_enabled(&mut self, enable: bool) -> Result<(), CaptureError> {
        if !cfg!(feature = "intermediate-queue") {
            return Err(CaptureError::NotAvailable);
        }
        self.ensure_ready()?;
        self.intermediate_mode = enable;
        Ok(())
    }

    pub fn intermediate_mode_enabled(&self) -> bool {
        self.intermediate_mode
    }

    /// Apply a whole configuration at once. Nothing changes unless every
    /// value is valid.
    pub fn configure(&mut self, config: &CaptureConfiguration) -> Result<(), CaptureError> {
        self.ensure_ready()?;
        config.validate()?;
        if config.intermediate_mode && !cfg!(feature = "intermediate-queue") {
            return Err(CaptureError::NotAvailable);
        }

        self.format = Some(config.capture_format()?);
        self.target = config.target()?;
        self.callback_interval = config.callback_interval();
        self.intermediate_mode = config.intermediate_mode;
        self.resume_skip_secs = config.resume_skip_secs;
        Ok(())
    }

    // --- State ---

    pub fn state(&self) -> CaptureState {
        self.state.load()
    }

    /// A handle for reading the state from other threads.
    pub fn state_handle(&self) -> StateHandle {
        StateHandle(Arc::clone(&self.state))
    }

    /// Activate a session for the target and start capturing.
    /// Transitions: ready → capturing.
    ///
    /// On any failure everything acquired so far is released and the capture
    /// stays `Ready`, so the call can simply be retried.
    pub fn start_capture(&mut self) -> Result<(), CaptureError> {
        self.ensure_ready()?;
        let format = self.format.ok_or(CaptureError::Format)?;
        let target = self.target.ok_or(CaptureError::ProcessId)?;

        let mut session = match self.activator.activate(&target) {
            Ok(session) => session,
            Err(e) => return Err(self.start_failed(e.into())),
        };

        let (source, signal) = match bring_up(&mut session, &format) {
            Ok(parts) => parts,
            Err(e) => {
                session.reset();
                return Err(self.start_failed(e));
            }
        };
        self.last_error = 0;

        #[cfg(feature = "intermediate-queue")]
        self.queue_stats.clear();

        let mut active = ActiveSession {
            session,
            signal,
            source: Some(source),
            workers: None,
        };
        if let Err(e) = self.launch_workers(&mut active, 0.0) {
            if let Err(stop) = active.session.stop() {
                log::warn!("Session stop during rollback failed: {}", stop);
            }
            active.session.reset();
            self.release_buffers();
            return Err(self.start_failed(e));
        }

        self.active = Some(active);
        self.state.store(CaptureState::Capturing);
        log::info!(
            "Capture started: pid {} ({}), {} Hz / {} bit / {} ch, {} mode",
            target.process_id,
            if target.include_tree { "include tree" } else { "exclude tree" },
            format.sample_rate(),
            format.bit_depth(),
            format.channels(),
            if self.intermediate_mode { "intermediate" } else { "direct" },
        );
        Ok(())
    }

    /// Stop capturing and release the session. Transitions: any → ready.
    pub fn stop_capture(&mut self) -> Result<(), CaptureError> {
        if self.state.is(CaptureState::Ready) {
            return Err(CaptureError::State);
        }
        self.teardown();
        log::info!("Capture stopped");
        Ok(())
    }

    /// Transitions: capturing → paused.
    ///
    /// Bytes read but not yet delivered are discarded.
    pub fn pause_capture(&mut self) -> Result<(), CaptureError> {
        if !self.state.is(CaptureState::Capturing) {
            return Err(CaptureError::State);
        }
        let Some(mut active) = self.active.take() else {
            return Err(CaptureError::State);
        };

        if let Err(e) = active.session.stop() {
            self.last_error = e.code;
            self.active = Some(active);
            return Err(CaptureError::Stop(e));
        }
        self.last_error = 0;

        self.stop_workers(&mut active);
        self.active = Some(active);
        self.state.store(CaptureState::Paused);
        log::info!("Capture paused");
        Ok(())
    }

    /// Transitions: paused → capturing.
    ///
    /// The first `skip_secs` of audio after the restart are dropped (whole
    /// frames, negative counts as zero); devices may replay stale frames.
    pub fn resume_capture(&mut self, skip_secs: f64) -> Result<(), CaptureError> {
        if !self.state.is(CaptureState::Paused) {
            return Err(CaptureError::State);
        }
        let Some(mut active) = self.active.take() else {
            return Err(CaptureError::State);
        };

        active.signal.reset();
        if let Err(e) = active.session.start() {
            self.last_error = e.code;
            self.active = Some(active);
            return Err(CaptureError::Start(e));
        }
        self.last_error = 0;

        if let Err(e) = self.launch_workers(&mut active, skip_secs) {
            if let Err(stop) = active.session.stop() {
                log::warn!("Session stop after failed resume failed: {}", stop);
            }
            self.active = Some(active);
            return Err(e);
        }

        self.active = Some(active);
        self.state.store(CaptureState::Capturing);
        log::info!("Capture resumed, skipping {} bytes", self.pending_skip_bytes);
        Ok(())
    }

    /// `resume_capture` with the configured skip (0.1 s unless configured).
    pub fn resume_capture_default(&mut self) -> Result<(), CaptureError> {
        self.resume_capture(self.resume_skip_secs)
    }

    // --- Diagnostics ---

    /// Platform status of the last session operation (0 = success).
    /// Configuration errors leave it untouched.
    pub fn last_error_result(&self) -> i32 {
        self.last_error
    }

    /// Longest producer wake-to-delivery time since the last reset.
    pub fn max_execution_time(&self) -> Duration {
        self.monitor.max()
    }

    pub fn reset_max_execution_time(&self) {
        self.monitor.reset();
    }

    /// Approximate bytes waiting in the handoff queue.
    ///
    /// `NotAvailable` unless intermediate mode is enabled.
    pub fn queue_size(&self) -> Result<usize, CaptureError> {
        if !self.intermediate_mode {
            return Err(CaptureError::NotAvailable);
        }
        #[cfg(feature = "intermediate-queue")]
        let queued = Ok(self.queue_stats.queued());
        #[cfg(not(feature = "intermediate-queue"))]
        let queued = Err(CaptureError::NotAvailable);
        queued
    }

    /// Bytes dropped because the handoff queue was full, since the last start.
    pub fn dropped_bytes(&self) -> u64 {
        #[cfg(feature = "intermediate-queue")]
        let dropped = self.queue_stats.dropped();
        #[cfg(not(feature = "intermediate-queue"))]
        let dropped = 0;
        dropped
    }

    // --- Internal helpers ---

    fn ensure_ready(&self) -> Result<(), CaptureError> {
        if self.state.is(CaptureState::Ready) {
            Ok(())
        } else {
            Err(CaptureError::State)
        }
    }

    fn start_failed(&mut self, err: CaptureError) -> CaptureError {
        if let Some(code) = err.platform_code() {
            self.last_error = code;
        }
        log::warn!("Start capture failed, rolled back: {}", err);
        err
    }

    /// Spawn the producer (and decoupler in intermediate mode) for one
    /// capturing interval, with a fresh skip budget.
    fn launch_workers(&mut self, active: &mut ActiveSession<A::Session>, skip_secs: f64) -> Result<(), CaptureError> {
        let format = self.format.ok_or(CaptureError::Format)?;
        let source = match active.source.take() {
            Some(source) => source,
            None => active.session.frame_source().map_err(|e| {
                self.last_error = e.code;
                CaptureError::Service(e)
            })?,
        };

        self.pending_skip_bytes = format.bytes_for_duration(skip_secs);
        let running = Arc::new(AtomicBool::new(true));
        let staging = std::mem::take(&mut self.staging);

        #[cfg(feature = "intermediate-queue")]
        let (destination, decoupling) = if self.intermediate_mode {
            let capacity = handoff_queue::capacity_for(&format, self.callback_interval);
            let (queue, consumer) = handoff_queue::handoff_queue(capacity, Arc::clone(&self.queue_stats));
            let stage = DecouplingStage {
                consumer,
                staging,
                block_align: format.block_align() as usize,
                callback: self.callback.clone(),
                interval: self.callback_interval,
                running: Arc::clone(&running),
            };
            (Destination::Queue { queue, warned: false }, Some(stage))
        } else {
            (self.direct_destination(staging), None)
        };
        #[cfg(not(feature = "intermediate-queue"))]
        let destination = self.direct_destination(staging);

        let stage = ProducerStage {
            source,
            signal: Arc::clone(&active.signal),
            running: Arc::clone(&running),
            skip_bytes: self.pending_skip_bytes,
            destination,
            monitor: Arc::clone(&self.monitor),
        };
        let producer = thread::Builder::new()
            .name("loopback-producer".into())
            .spawn(move || stage.run())
            .map_err(|e| CaptureError::Interface(format!("failed to spawn producer thread: {}", e)))?;

        #[cfg(feature = "intermediate-queue")]
        let decoupler = match decoupling {
            Some(stage) => {
                match thread::Builder::new()
                    .name("loopback-decoupler".into())
                    .spawn(move || stage.run())
                {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        active.workers = Some(Workers {
                            running,
                            producer,
                            decoupler: None,
                        });
                        self.stop_workers(active);
                        return Err(CaptureError::Interface(format!(
                            "failed to spawn decoupler thread: {}",
                            e
                        )));
                    }
                }
            }
            None => None,
        };
        #[cfg(not(feature = "intermediate-queue"))]
        let decoupler = None;

        active.workers = Some(Workers {
            running,
            producer,
            decoupler,
        });
        Ok(())
    }

    fn direct_destination(&self, staging: Vec<u8>) -> Destination {
        Destination::Callback {
            staging,
            callback: self.callback.clone(),
        }
    }

    /// Signal the workers to exit, join them and discard in-flight bytes.
    fn stop_workers(&mut self, active: &mut ActiveSession<A::Session>) {
        let Some(workers) = active.workers.take() else {
            return;
        };

        workers.running.store(false, Ordering::Release);
        active.signal.set();
        if let Some(ref decoupler) = workers.decoupler {
            decoupler.thread().unpark();
        }

        match workers.producer.join() {
            Ok(exit) => {
                active.source = Some(exit.source);
                self.staging = exit.staging;
                self.pending_skip_bytes = exit.skip_bytes;
            }
            Err(_) => log::error!("Producer thread panicked; frame source will be reacquired on resume"),
        }
        if let Some(decoupler) = workers.decoupler {
            match decoupler.join() {
                Ok(staging) => self.staging = staging,
                Err(_) => log::error!("Decoupler thread panicked"),
            }
        }

        // Queue halves died with their threads.
        self.staging.clear();
        #[cfg(feature = "intermediate-queue")]
        self.queue_stats.flush();
    }

    /// Return to `Ready`, releasing the session and all buffers.
    fn teardown(&mut self) {
        if let Some(mut active) = self.active.take() {
            if self.state.is(CaptureState::Capturing) {
                if let Err(e) = active.session.stop() {
                    self.last_error = e.code;
                    log::warn!("Session stop during teardown failed: {}", e);
                }
            }
            self.stop_workers(&mut active);
            active.session.reset();
        }
        self.release_buffers();
        self.state.store(CaptureState::Ready);
    }

    fn release_buffers(&mut self) {
        self.staging = Vec::new();
        self.pending_skip_bytes = 0;
        #[cfg(feature = "intermediate-queue")]
        self.queue_stats.flush();
    }
}

impl<A: SessionActivator> Drop for LoopbackCapture<A> {
    fn drop(&mut self) {
        if !self.state.is(CaptureState::Ready) {
            self.teardown();
        }
    }
}

/// Initialize, fetch the reader, bind the signal and start, mapping each
/// step's failure to its stage.
fn bring_up<S: AudioDeviceSession>(
    session: &mut S,
    format: &CaptureFormat,
) -> Result<(S::Source, Arc<S::Signal>), CaptureError> {
    session.initialize(format).map_err(CaptureError::Initialize)?;
    let source = session.frame_source().map_err(CaptureError::Service)?;
    let signal = session.frame_ready_signal().map_err(CaptureError::Event)?;
    session.start().map_err(CaptureError::Start)?;
    Ok((source, signal))
}

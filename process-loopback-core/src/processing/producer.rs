use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "intermediate-queue")]
use crate::processing::handoff_queue::QueueProducer;
use crate::processing::execution_monitor::ExecutionMonitor;
use crate::traits::capture_callback::CaptureCallback;
use crate::traits::device_session::{FrameSignal, FrameSource};

/// Upper bound on one wait for the frame-ready signal.
pub const FRAME_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Where the producer puts the bytes it reads.
pub enum Destination {
    /// Direct mode: stage one wake's worth of bytes, then call back on this thread.
    Callback {
        staging: Vec<u8>,
        callback: Option<CaptureCallback>,
    },
    /// Intermediate mode: hand bytes to the decoupling stage.
    #[cfg(feature = "intermediate-queue")]
    Queue { queue: QueueProducer, warned: bool },
}

impl Destination {
    fn push(&mut self, bytes: &[u8]) {
        match self {
            Self::Callback { staging, .. } => staging.extend_from_slice(bytes),
            #[cfg(feature = "intermediate-queue")]
            Self::Queue { queue, warned } => {
                if !queue.push_all(bytes) {
                    Self::overflowed(warned, bytes.len());
                }
            }
        }
    }

    fn push_silence(&mut self, len: usize) {
        match self {
            Self::Callback { staging, .. } => staging.resize(staging.len() + len, 0),
            #[cfg(feature = "intermediate-queue")]
            Self::Queue { queue, warned } => {
                if !queue.push_silence(len) {
                    Self::overflowed(warned, len);
                }
            }
        }
    }

    #[cfg(feature = "intermediate-queue")]
    fn overflowed(warned: &mut bool, len: usize) {
        if !*warned {
            log::warn!("Handoff queue full, dropping {} bytes (further drops not logged)", len);
            *warned = true;
        }
    }

    /// Direct mode only: pass the staged bytes to the callback and clear them.
    fn deliver(&mut self) {
        if let Self::Callback { staging, callback } = self {
            if staging.is_empty() {
                return;
            }
            if let Some(cb) = callback {
                cb(staging.as_slice());
            }
            staging.clear();
        }
    }

    fn into_staging(self) -> Vec<u8> {
        match self {
            Self::Callback { staging, .. } => staging,
            #[cfg(feature = "intermediate-queue")]
            Self::Queue { .. } => Vec::new(),
        }
    }
}

/// What the producer thread hands back when it exits.
pub struct ProducerExit<S> {
    pub source: S,
    pub staging: Vec<u8>,
    pub skip_bytes: u64,
}

/// Real-time reader: waits for the frame-ready signal and drains the session.
pub struct ProducerStage<S, G> {
    pub source: S,
    pub signal: Arc<G>,
    pub running: Arc<AtomicBool>,
    /// Bytes still to discard at the head of the stream.
    pub skip_bytes: u64,
    pub destination: Destination,
    pub monitor: Arc<ExecutionMonitor>,
}

impl<S: FrameSource, G: FrameSignal> ProducerStage<S, G> {
    pub fn run(mut self) -> ProducerExit<S> {
        let priority = self.source.boost_priority();

        while self.running.load(Ordering::Acquire) {
            if !self.signal.wait(FRAME_WAIT_TIMEOUT) {
                continue;
            }
            // Woken by stop.
            if !self.running.load(Ordering::Acquire) {
                break;
            }

            let woke = Instant::now();
            self.drain_available();
            self.destination.deliver();
            self.monitor.record(woke.elapsed());
        }

        drop(priority);

        ProducerExit {
            source: self.source,
            staging: self.destination.into_staging(),
            skip_bytes: self.skip_bytes,
        }
    }

    /// Read packets until the session has none left.
    ///
    /// A read error ends this drain but not the capture.
    fn drain_available(&mut self) {
        loop {
            let frames = match self.source.next_packet() {
                Ok(Some(packet)) => {
                    let skip = take_skip(&mut self.skip_bytes, packet.data.len());
                    let keep = packet.data.len() - skip;
                    if keep > 0 {
                        if packet.silent {
                            self.destination.push_silence(keep);
                        } else {
                            self.destination.push(&packet.data[skip..]);
                        }
                    }
                    packet.frames
                }
                Ok(None) => break,
                Err(e) => {
                    log::debug!("Frame read failed, ending drain: {}", e);
                    break;
                }
            };

            if let Err(e) = self.source.release_packet(frames) {
                log::debug!("Frame release failed, ending drain: {}", e);
                break;
            }
        }
    }
}

/// Consume up to `len` bytes of the skip budget; returns how many to drop.
fn take_skip(budget: &mut u64, len: usize) -> usize {
    let skip = (*budget).min(len as u64);
    *budget -= skip;
    skip as usize
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::thread;

    use parking_lot::Mutex;

    use super::*;
    use crate::models::error::PlatformError;
    use crate::sync::event_signal::EventSignal;
    use crate::traits::device_session::FramePacket;

    enum Step {
        Packet(Vec<u8>, bool),
        Fail,
    }

    struct ListSource {
        steps: VecDeque<Step>,
        current: Vec<u8>,
        released: Vec<u32>,
        block_align: usize,
    }

    impl ListSource {
        fn new(block_align: usize, steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                current: Vec::new(),
                released: Vec::new(),
                block_align,
            }
        }
    }

    impl FrameSource for ListSource {
        fn next_packet(&mut self) -> Result<Option<FramePacket<'_>>, PlatformError> {
            match self.steps.pop_front() {
                None => Ok(None),
                Some(Step::Fail) => Err(PlatformError::new(-1, "device lost")),
                Some(Step::Packet(bytes, silent)) => {
                    self.current = bytes;
                    Ok(Some(FramePacket {
                        data: &self.current,
                        frames: (self.current.len() / self.block_align) as u32,
                        silent,
                    }))
                }
            }
        }

        fn release_packet(&mut self, frames: u32) -> Result<(), PlatformError> {
            self.released.push(frames);
            Ok(())
        }
    }

    fn direct(callback: CaptureCallback) -> Destination {
        Destination::Callback {
            staging: Vec::new(),
            callback: Some(callback),
        }
    }

    fn stage(source: ListSource, skip_bytes: u64, destination: Destination) -> ProducerStage<ListSource, EventSignal> {
        ProducerStage {
            source,
            signal: Arc::new(EventSignal::new()),
            running: Arc::new(AtomicBool::new(true)),
            skip_bytes,
            destination,
            monitor: Arc::new(ExecutionMonitor::new()),
        }
    }

    #[test]
    fn one_callback_per_wake_with_skip_applied() {
        let calls = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
        let sink = Arc::clone(&calls);
        let source = ListSource::new(
            2,
            vec![
                Step::Packet(vec![1, 2, 3, 4], false),
                Step::Packet(vec![5, 6, 7, 8], false),
            ],
        );
        let mut producer = stage(source, 6, direct(Arc::new(move |b: &[u8]| sink.lock().push(b.to_vec()))));

        producer.drain_available();
        producer.destination.deliver();

        assert_eq!(*calls.lock(), vec![vec![7, 8]]);
        assert_eq!(producer.skip_bytes, 0);
        assert_eq!(producer.source.released, vec![2, 2]);
    }

    #[test]
    fn silent_packets_become_zeros() {
        let calls = Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink = Arc::clone(&calls);
        let source = ListSource::new(
            2,
            vec![
                Step::Packet(vec![1, 1], false),
                Step::Packet(vec![0xAB, 0xCD, 0xEF, 0x01], true),
            ],
        );
        let mut producer = stage(source, 0, direct(Arc::new(move |b: &[u8]| sink.lock().extend_from_slice(b))));

        producer.drain_available();
        producer.destination.deliver();

        assert_eq!(*calls.lock(), vec![1, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn read_error_ends_the_drain_only() {
        let calls = Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink = Arc::clone(&calls);
        let source = ListSource::new(
            1,
            vec![
                Step::Packet(vec![1], false),
                Step::Fail,
                Step::Packet(vec![2], false),
            ],
        );
        let mut producer = stage(source, 0, direct(Arc::new(move |b: &[u8]| sink.lock().extend_from_slice(b))));

        producer.drain_available();
        producer.destination.deliver();
        assert_eq!(*calls.lock(), vec![1]);

        // Next wake picks up where the failed one stopped.
        producer.drain_available();
        producer.destination.deliver();
        assert_eq!(*calls.lock(), vec![1, 2]);
    }

    #[test]
    fn staging_is_cleared_after_each_delivery() {
        let source = ListSource::new(1, vec![Step::Packet(vec![1, 2, 3], false)]);
        let mut producer = stage(source, 0, direct(Arc::new(|_: &[u8]| {})));

        producer.drain_available();
        producer.destination.deliver();

        match &producer.destination {
            Destination::Callback { staging, .. } => assert!(staging.is_empty()),
            #[cfg(feature = "intermediate-queue")]
            Destination::Queue { .. } => unreachable!(),
        }
    }

    #[test]
    fn thread_exits_on_stop_and_returns_its_state() {
        let source = ListSource::new(1, vec![Step::Packet(vec![1, 2, 3], false)]);
        let producer = stage(source, 10, direct(Arc::new(|_: &[u8]| {})));
        let signal = Arc::clone(&producer.signal);
        let running = Arc::clone(&producer.running);
        let monitor = Arc::clone(&producer.monitor);

        signal.set();
        let handle = thread::spawn(move || producer.run());

        // Let the first wake happen, then stop.
        thread::sleep(Duration::from_millis(50));
        running.store(false, Ordering::Release);
        signal.set();

        let exit = handle.join().unwrap();
        assert_eq!(exit.skip_bytes, 7);
        assert!(exit.staging.is_empty());
        assert!(monitor.max() > Duration::ZERO);
    }

    #[test]
    fn skip_budget_never_goes_negative() {
        let mut budget = 5;
        assert_eq!(take_skip(&mut budget, 3), 3);
        assert_eq!(take_skip(&mut budget, 3), 2);
        assert_eq!(take_skip(&mut budget, 3), 0);
        assert_eq!(budget, 0);
    }

    #[cfg(feature = "intermediate-queue")]
    #[test]
    fn queue_mode_enqueues_without_calling_back() {
        use crate::processing::handoff_queue::{handoff_queue, QueueStats};

        let stats = Arc::new(QueueStats::default());
        let (queue, mut consumer) = handoff_queue(64, Arc::clone(&stats));
        let source = ListSource::new(2, vec![Step::Packet(vec![1, 2, 3, 4], false)]);
        let mut producer = stage(source, 2, Destination::Queue { queue, warned: false });

        producer.drain_available();
        producer.destination.deliver();

        assert_eq!(stats.queued(), 2);
        let mut out = Vec::new();
        consumer.drain_into(&mut out);
        assert_eq!(out, vec![3, 4]);
    }
}

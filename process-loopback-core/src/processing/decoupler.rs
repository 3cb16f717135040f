use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::processing::handoff_queue::QueueConsumer;
use crate::traits::capture_callback::CaptureCallback;

/// Callback-side stage of intermediate mode.
///
/// Every `interval` it drains the handoff queue, cuts the staged bytes at the
/// last whole frame and hands that prefix to the callback. Partial-frame bytes
/// stay staged for the next cycle.
pub struct DecouplingStage {
    pub consumer: QueueConsumer,
    pub staging: Vec<u8>,
    pub block_align: usize,
    pub callback: Option<CaptureCallback>,
    pub interval: Duration,
    pub running: Arc<AtomicBool>,
}

impl DecouplingStage {
    /// Runs until `running` is cleared. Unpark the thread to stop without
    /// waiting out the interval. Returns the staging buffer.
    pub fn run(mut self) -> Vec<u8> {
        while self.running.load(Ordering::Acquire) {
            self.consumer.drain_into(&mut self.staging);
            deliver_aligned(&mut self.staging, self.block_align, self.callback.as_ref());
            thread::park_timeout(self.interval);
        }
        self.staging
    }
}

/// Deliver the frame-aligned prefix of `staging` and remove it.
/// Returns the number of bytes delivered.
pub fn deliver_aligned(staging: &mut Vec<u8>, block_align: usize, callback: Option<&CaptureCallback>) -> usize {
    let aligned = staging.len() / block_align * block_align;
    if aligned == 0 {
        return 0;
    }
    if let Some(cb) = callback {
        cb(&staging[..aligned]);
    }
    staging.drain(..aligned);
    aligned
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::processing::handoff_queue::{handoff_queue, QueueStats};

    fn recorder() -> (CaptureCallback, Arc<Mutex<Vec<Vec<u8>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        (Arc::new(move |b: &[u8]| sink.lock().push(b.to_vec())), calls)
    }

    #[test]
    fn stray_bytes_wait_for_the_next_cycle() {
        let (cb, calls) = recorder();
        let mut staging: Vec<u8> = (0..4103u32).map(|i| i as u8).collect();

        assert_eq!(deliver_aligned(&mut staging, 4, Some(&cb)), 4100);
        assert_eq!(staging, vec![4100u32 as u8, 4101u32 as u8, 4102u32 as u8]);

        staging.push(0xFF);
        assert_eq!(deliver_aligned(&mut staging, 4, Some(&cb)), 4);

        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].len(), 4100);
        assert_eq!(calls[1], vec![4100u32 as u8, 4101u32 as u8, 4102u32 as u8, 0xFF]);
        assert!(staging.is_empty());
    }

    #[test]
    fn nothing_delivered_below_one_frame() {
        let (cb, calls) = recorder();
        let mut staging = vec![1, 2, 3];
        assert_eq!(deliver_aligned(&mut staging, 4, Some(&cb)), 0);
        assert!(calls.lock().is_empty());
        assert_eq!(staging.len(), 3);
    }

    #[test]
    fn aligned_bytes_are_consumed_without_a_callback() {
        let mut staging = vec![0; 10];
        assert_eq!(deliver_aligned(&mut staging, 4, None), 8);
        assert_eq!(staging.len(), 2);
    }

    #[test]
    fn thread_delivers_only_whole_frames_then_stops() {
        let (cb, calls) = recorder();
        let stats = Arc::new(QueueStats::default());
        let (mut producer, consumer) = handoff_queue(1024, Arc::clone(&stats));
        let running = Arc::new(AtomicBool::new(true));

        let stage = DecouplingStage {
            consumer,
            staging: Vec::new(),
            block_align: 4,
            callback: Some(cb),
            interval: Duration::from_millis(5),
            running: Arc::clone(&running),
        };
        let handle = thread::spawn(move || stage.run());

        producer.push_all(&[1, 2, 3, 4, 5, 6]);
        thread::sleep(Duration::from_millis(100));
        running.store(false, Ordering::Release);
        handle.thread().unpark();
        let staging = handle.join().unwrap();

        let calls = calls.lock();
        assert_eq!(calls.concat(), vec![1, 2, 3, 4]);
        assert!(calls.iter().all(|c| c.len() % 4 == 0));
        assert_eq!(staging, vec![5, 6]);
        assert_eq!(stats.queued(), 0);
    }
}

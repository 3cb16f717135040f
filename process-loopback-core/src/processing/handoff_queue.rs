//! Lock-free SPSC byte queue between the producer and decoupling stages.
//!
//! Uses the `ringbuf` crate. The producer half lives on the real-time
//! producer thread, the consumer half on the decoupling thread; neither side
//! ever blocks or allocates.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

use crate::models::format::CaptureFormat;

const MIN_CAPACITY: usize = 64 * 1024;
const MAX_CAPACITY: usize = 64 * 1024 * 1024;
const MIN_BUFFERED: Duration = Duration::from_secs(2);

static ZEROS: [u8; 4096] = [0; 4096];

/// Counters observable from the owning thread without touching either half.
#[derive(Debug, Default)]
pub struct QueueStats {
    queued: AtomicUsize,
    dropped: AtomicU64,
}

impl QueueStats {
    /// Approximate number of bytes waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    /// Bytes discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Only valid once both halves are gone.
    pub(crate) fn flush(&self) {
        self.queued.store(0, Ordering::Relaxed);
    }

    pub(crate) fn clear(&self) {
        self.flush();
        self.dropped.store(0, Ordering::Relaxed);
    }
}

/// Queue capacity for `format`: `max(2 s, 4 × interval)` of audio, kept
/// between 64 KiB and 64 MiB.
pub fn capacity_for(format: &CaptureFormat, interval: Duration) -> usize {
    let span = MIN_BUFFERED.max(interval.saturating_mul(4));
    let bytes = format.bytes_for_duration(span.as_secs_f64());
    usize::try_from(bytes)
        .unwrap_or(usize::MAX)
        .clamp(MIN_CAPACITY, MAX_CAPACITY)
}

/// Producer half, owned by the producer stage.
pub struct QueueProducer {
    inner: HeapProd<u8>,
    stats: Arc<QueueStats>,
}

/// Consumer half, owned by the decoupling stage.
pub struct QueueConsumer {
    inner: HeapCons<u8>,
    stats: Arc<QueueStats>,
}

/// Create a matched producer/consumer pair of `capacity` bytes.
pub fn handoff_queue(capacity: usize, stats: Arc<QueueStats>) -> (QueueProducer, QueueConsumer) {
    let (prod, cons) = HeapRb::<u8>::new(capacity.max(1)).split();
    (
        QueueProducer {
            inner: prod,
            stats: Arc::clone(&stats),
        },
        QueueConsumer { inner: cons, stats },
    )
}

impl QueueProducer {
    /// Enqueue all of `bytes`, or nothing if they do not fit.
    ///
    /// Pushing whole packets keeps the stream frame-aligned when full.
    pub fn push_all(&mut self, bytes: &[u8]) -> bool {
        if !self.reserve(bytes.len()) {
            return false;
        }
        self.inner.push_slice(bytes);
        true
    }

    /// Enqueue `len` zero bytes, or nothing if they do not fit.
    pub fn push_silence(&mut self, len: usize) -> bool {
        if !self.reserve(len) {
            return false;
        }
        let mut left = len;
        while left > 0 {
            let n = left.min(ZEROS.len());
            self.inner.push_slice(&ZEROS[..n]);
            left -= n;
        }
        true
    }

    // Counted before the push so the consumer never subtracts more than was added.
    fn reserve(&mut self, len: usize) -> bool {
        if self.inner.vacant_len() < len {
            self.stats.dropped.fetch_add(len as u64, Ordering::Relaxed);
            return false;
        }
        self.stats.queued.fetch_add(len, Ordering::Relaxed);
        true
    }
}

impl QueueConsumer {
    /// Move everything currently queued onto the end of `out`.
    pub fn drain_into(&mut self, out: &mut Vec<u8>) -> usize {
        let available = self.inner.occupied_len();
        if available == 0 {
            return 0;
        }
        let start = out.len();
        out.resize(start + available, 0);
        let read = self.inner.pop_slice(&mut out[start..]);
        out.truncate(start + read);
        self.stats.queued.fetch_sub(read, Ordering::Relaxed);
        read
    }
}

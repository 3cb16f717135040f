use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// High-water mark of the producer's wake-to-delivery time.
#[derive(Debug, Default)]
pub struct ExecutionMonitor {
    max_nanos: AtomicU64,
}

impl ExecutionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    pub fn max(&self) -> Duration {
        Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.max_nanos.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_maximum() {
        let monitor = ExecutionMonitor::new();
        monitor.record(Duration::from_micros(300));
        monitor.record(Duration::from_micros(900));
        monitor.record(Duration::from_micros(100));
        assert_eq!(monitor.max(), Duration::from_micros(900));
    }

    #[test]
    fn reset_starts_a_new_epoch() {
        let monitor = ExecutionMonitor::new();
        monitor.record(Duration::from_millis(5));
        monitor.reset();
        assert_eq!(monitor.max(), Duration::ZERO);
        monitor.record(Duration::from_millis(1));
        assert_eq!(monitor.max(), Duration::from_millis(1));
    }
}

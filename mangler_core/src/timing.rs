use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Wall-clock time in milliseconds since the Unix epoch.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Timestamp of the last coverage discovery, written by the feedback side and
/// read by the mutation driver to decide whether progress has stalled.
#[derive(Debug)]
pub struct CoverageTiming {
    last_update_millis: AtomicU64,
}

impl CoverageTiming {
    pub fn new(now_millis: u64) -> Self {
        Self {
            last_update_millis: AtomicU64::new(now_millis),
        }
    }

    pub fn mark_update(&self, now_millis: u64) {
        self.last_update_millis.store(now_millis, Ordering::Release);
    }

    pub fn last_update_millis(&self) -> u64 {
        self.last_update_millis.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_are_visible_to_readers() {
        let timing = CoverageTiming::new(100);
        assert_eq!(timing.last_update_millis(), 100);
        timing.mark_update(2500);
        assert_eq!(timing.last_update_millis(), 2500);
    }

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now_millis();
        assert!(a > 0);
        assert!(clock.now_millis() >= a);
    }
}

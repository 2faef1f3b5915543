//! Frame rate gate
//!
//! Admits a frame only when at least `min_interval` has passed since the
//! last admitted one. Excess frames are dropped, never queued: the newest
//! frame wins over completeness.
//!
//! The last-admitted timestamp is a single `AtomicU64` updated with a
//! compare-and-swap loop, so callers on several threads can never admit two
//! frames inside one interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Sentinel for "nothing admitted yet"; the first call always passes
const NEVER: u64 = u64::MAX;

/// Rate gate statistics
#[derive(Debug, Clone, Default)]
pub struct PacerStats {
    /// Frames admitted
    pub admitted: u64,
    /// Frames rejected for arriving too early
    pub rejected: u64,
}

/// Lock-free minimum-interval gate
pub struct RateGate {
    min_interval_ms: u64,
    last_admitted: AtomicU64,
    admitted: AtomicU64,
    rejected: AtomicU64,
}

impl RateGate {
    /// Gate for at most `max_fps` frames per second
    ///
    /// The interval is `1000 / max_fps` milliseconds (floor). `max_fps == 0`
    /// disables gating.
    pub fn new(max_fps: u32) -> Self {
        let min_interval_ms = if max_fps == 0 {
            0
        } else {
            1000 / max_fps as u64
        };
        Self::with_interval_ms(min_interval_ms)
    }

    /// Gate with an explicit minimum interval
    pub fn with_interval(interval: Duration) -> Self {
        Self::with_interval_ms(interval.as_millis() as u64)
    }

    fn with_interval_ms(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            last_admitted: AtomicU64::new(NEVER),
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn min_interval_ms(&self) -> u64 {
        self.min_interval_ms
    }

    /// Decide whether an event at `now_ms` (monotonic) passes
    ///
    /// On admission the stored timestamp becomes `now_ms`; on rejection it is
    /// left untouched.
    pub fn admit(&self, now_ms: u64) -> bool {
        let mut last = self.last_admitted.load(Ordering::Acquire);
        loop {
            if last != NEVER && now_ms.saturating_sub(last) < self.min_interval_ms {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            match self.last_admitted.compare_exchange_weak(
                last,
                now_ms,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.admitted.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                Err(actual) => last = actual,
            }
        }
    }

    /// Forget the last admission so the next event passes immediately
    pub fn reset(&self) {
        self.last_admitted.store(NEVER, Ordering::Release);
    }

    /// Get gate statistics
    pub fn stats(&self) -> PacerStats {
        PacerStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_interval_from_fps() {
        assert_eq!(RateGate::new(10).min_interval_ms(), 100);
        assert_eq!(RateGate::new(3).min_interval_ms(), 333);
        assert_eq!(RateGate::new(0).min_interval_ms(), 0);
    }

    #[test]
    fn test_admit_sequence() {
        let gate = RateGate::new(10);
        assert!(gate.admit(0));
        assert!(!gate.admit(50));
        assert!(gate.admit(100));
        assert!(!gate.admit(150));

        let stats = gate.stats();
        assert_eq!(stats.admitted, 2);
        assert_eq!(stats.rejected, 2);
    }

    #[test]
    fn test_rejection_keeps_timestamp() {
        let gate = RateGate::new(10);
        assert!(gate.admit(1000));
        assert!(!gate.admit(1099));
        // measured from 1000, not from the rejected 1099
        assert!(gate.admit(1100));
    }

    #[test]
    fn test_clock_going_backwards_is_rejected() {
        let gate = RateGate::new(10);
        assert!(gate.admit(500));
        assert!(!gate.admit(400));
    }

    #[test]
    fn test_unlimited_gate() {
        let gate = RateGate::new(0);
        assert!(gate.admit(5));
        assert!(gate.admit(5));
    }

    #[test]
    fn test_reset() {
        let gate = RateGate::with_interval(Duration::from_secs(1));
        assert!(gate.admit(10));
        assert!(!gate.admit(20));
        gate.reset();
        assert!(gate.admit(20));
    }

    #[test]
    fn test_concurrent_callers_admit_one() {
        let gate = Arc::new(RateGate::new(10));
        let barrier = Arc::new(Barrier::new(100));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let gate = gate.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    gate.admit(1_000)
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(gate.stats().rejected, 99);
    }
}

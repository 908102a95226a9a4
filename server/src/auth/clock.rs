use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::database::utils::get_timestamp;

/// Source of "now" (Unix seconds) for token issuance, token verification and
/// refresh-record expiry checks.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        get_timestamp()
    }
}

/// Clock that only moves when told to. Used to test expiry boundaries.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_2023() {
        assert!(SystemClock.now() > 1_672_531_200);
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        clock.advance(15);
        assert_eq!(clock.now(), 1_015);
        clock.set(5);
        assert_eq!(clock.now(), 5);
    }
}

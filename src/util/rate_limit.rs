//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::util::time::unix_second;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Max accepted input calls per wall-clock second for a controlling session
pub const INPUT_RATE_LIMIT: u32 = 30;

/// Server-wide join attempts per second
pub const JOIN_RATE_LIMIT: u32 = 10;

/// Fixed one-second window counting accepted input calls.
///
/// The window is keyed on the wall-clock second, so the count resets the
/// moment the second rolls over rather than refilling gradually.
#[derive(Debug, Clone, Default)]
pub struct InputRateWindow {
    current_second: u64,
    count_in_second: u32,
}

impl InputRateWindow {
    /// Count one call at `now_ms`; returns false once `limit` calls were
    /// already accepted in this second. Rejected calls are not counted.
    pub fn try_acquire(&mut self, now_ms: u64, limit: u32) -> bool {
        let second = unix_second(now_ms);
        if second != self.current_second {
            self.current_second = second;
            self.count_in_second = 0;
        }

        if self.count_in_second >= limit {
            return false;
        }
        self.count_in_second += 1;
        true
    }

    #[cfg(test)]
    pub fn count_in_second(&self) -> u32 {
        self.count_in_second
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_caps_within_one_second() {
        let mut window = InputRateWindow::default();
        let base = 50_000;
        for i in 0..INPUT_RATE_LIMIT {
            assert!(window.try_acquire(base + i as u64, INPUT_RATE_LIMIT));
        }
        assert!(!window.try_acquire(base + 999, INPUT_RATE_LIMIT));
        assert_eq!(window.count_in_second(), INPUT_RATE_LIMIT);
    }

    #[test]
    fn window_resets_on_next_second() {
        let mut window = InputRateWindow::default();
        for _ in 0..INPUT_RATE_LIMIT {
            window.try_acquire(7_100, INPUT_RATE_LIMIT);
        }
        assert!(!window.try_acquire(7_900, INPUT_RATE_LIMIT));
        assert!(window.try_acquire(8_000, INPUT_RATE_LIMIT));
        assert_eq!(window.count_in_second(), 1);
    }

    #[test]
    fn join_limiter_allows_burst_up_to_quota() {
        let limiter = create_limiter(JOIN_RATE_LIMIT);
        for _ in 0..JOIN_RATE_LIMIT {
            assert!(limiter.check().is_ok());
        }
        assert!(limiter.check().is_err());
    }
}

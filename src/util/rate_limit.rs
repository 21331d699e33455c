//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Max turn messages per second per connection
pub const TURN_RATE_LIMIT: u32 = 30;

/// Per-player rate limiter state
#[derive(Clone)]
pub struct PlayerRateLimiter {
    turn_limiter: Arc<Limiter>,
}

impl PlayerRateLimiter {
    pub fn new() -> Self {
        Self::with_rate(TURN_RATE_LIMIT)
    }

    pub fn with_rate(per_second: u32) -> Self {
        Self {
            turn_limiter: create_limiter(per_second),
        }
    }

    /// Check if a turn message is allowed (returns true if allowed)
    pub fn check_turn(&self) -> bool {
        self.turn_limiter.check().is_ok()
    }
}

impl Default for PlayerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_beyond_quota_is_refused() {
        let limiter = PlayerRateLimiter::with_rate(3);
        let allowed = (0..10).filter(|_| limiter.check_turn()).count();
        assert_eq!(allowed, 3);
    }
}

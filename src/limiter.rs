//! Reply rate limiting.
//!
//! A token bucket guards the `reply` command against flooding the channel a
//! message came from. The bucket holds `limit` tokens over `interval` and
//! replenishes one token every `interval / limit`; a full bucket absorbs the
//! replenish tick, so bursts are strictly capped.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{Quota, RateLimiter};

const NZ_1: NonZeroU32 = match NonZeroU32::new(1) {
    Some(v) => v,
    None => panic!("1 is non-zero"),
};

/// Token bucket used by `reply` when reply limiting is enabled.
#[derive(Debug)]
pub(crate) struct ReplyLimiter {
    bucket: governor::DefaultDirectRateLimiter,
}

impl ReplyLimiter {
    /// Create a bucket of `limit` tokens over `interval`.
    ///
    /// The bucket starts full, so the first `limit` replies go through
    /// immediately.
    pub(crate) fn new(limit: u32, interval: Duration) -> Self {
        let burst = NonZeroU32::new(limit).unwrap_or(NZ_1);
        let period = interval
            .checked_div(burst.get())
            .filter(|p| !p.is_zero())
            .unwrap_or(Duration::from_millis(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        Self {
            bucket: RateLimiter::direct(quota),
        }
    }

    /// Consume one token. Returns `false` when the bucket is empty.
    pub(crate) fn try_take(&self) -> bool {
        self.bucket.check().is_ok()
    }
}

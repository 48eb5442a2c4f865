//! Keyed work queue: deduplication, per-key exclusivity, backoff retries.

pub mod rate_limiter;
pub mod rate_limiting;
pub mod work;

pub use rate_limiter::{
    BucketRateLimiter, ItemExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter,
    default_controller_rate_limiter,
};
pub use rate_limiting::RateLimitingQueue;
pub use work::WorkQueue;

mod limiter;
mod store;

pub use limiter::RateLimiter;
pub use store::{MemoryRateLimitStore, RateLimitDecision, RateLimitPermit};

//! Client-side request rate limiting.
//!
//! Two trailing windows (1 s and 60 s) of request timestamps guarded by a
//! single mutex, plus an optional pause imposed by the server through
//! `Retry-After`. The limiter is an explicit value owned by whoever builds
//! the client; share it with `Arc` when several clients hit the same API.

mod limiter;
mod window;

pub use limiter::{RateLimitExceeded, RateLimitPermit, RateLimiter};
pub use window::RateLimitWindow;

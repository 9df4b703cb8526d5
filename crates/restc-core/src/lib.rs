//! Blocking REST client core.
//!
//! [`ApiClient`] resolves requests against a base URL, waits on an optional
//! [`RateLimiter`], sends through a [`Transport`] and retries transient
//! failures under a [`RetryPolicy`].

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod rate_limit;
pub mod retry;
pub mod sanitize;
pub mod transport;

pub use client::ApiClient;
pub use config::{ClientConfig, RateLimitConfig, RetryConfig};
pub use error::ApiError;
pub use models::{ApiRequest, ApiResponse, Body, Headers, Method};
pub use rate_limit::{RateLimitExceeded, RateLimiter};
pub use retry::{ErrorKind, RetryExecutor, RetryPolicy};
pub use transport::{CurlTransport, PreparedRequest, Transport};

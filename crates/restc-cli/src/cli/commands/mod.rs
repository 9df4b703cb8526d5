//! CLI command handlers, one file per command.

pub mod backoff;
pub mod config;
pub mod request;

pub use backoff::run_backoff;
pub use config::run_config;
pub use request::{run_request, BodyArg};

//! HTTP transport boundary.
//!
//! The client talks to the network only through [`Transport`]; connection
//! handling, TLS and socket I/O live behind it. [`CurlTransport`] is the
//! libcurl-backed implementation; tests plug in scripted ones.

mod easy;
mod parse;

use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;
use crate::models::{ApiResponse, Headers, Method};

pub use easy::CurlTransport;
pub(crate) use parse::parse_header_lines;

/// A fully resolved request: absolute URL, merged headers, encoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub timeout: Duration,
    pub verify_tls: bool,
}

/// Executes one HTTP exchange. Implementations return a response for every
/// status code (including 4xx/5xx) and an error only when no response was
/// obtained.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &PreparedRequest) -> Result<ApiResponse, ApiError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: &PreparedRequest) -> Result<ApiResponse, ApiError> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: &PreparedRequest) -> Result<ApiResponse, ApiError> {
        (**self).execute(request)
    }
}

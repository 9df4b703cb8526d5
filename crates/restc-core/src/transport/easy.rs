//! libcurl `Easy` transport.

use std::str;
use std::time::{Duration, Instant};

use super::{parse_header_lines, PreparedRequest, Transport};
use crate::error::ApiError;
use crate::models::{request_id_from, ApiResponse, Method};
use crate::retry::{classify_curl_error, ErrorKind};

/// Blocking transport using one curl `Easy` handle per request.
///
/// Runs in the current thread; call from `spawn_blocking` if used from async code.
#[derive(Debug, Clone)]
pub struct CurlTransport {
    connect_timeout: Duration,
    follow_redirects: bool,
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            follow_redirects: true,
        }
    }
}

impl CurlTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }
}

impl Transport for CurlTransport {
    fn execute(&self, req: &PreparedRequest) -> Result<ApiResponse, ApiError> {
        let to_api = |e: curl::Error| map_curl_error(e, req.timeout);
        let start = Instant::now();
        let mut header_lines: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();

        let mut easy = curl::easy::Easy::new();
        easy.url(&req.url).map_err(to_api)?;
        match req.method {
            Method::Get => easy.get(true).map_err(to_api)?,
            Method::Head => easy.nobody(true).map_err(to_api)?,
            Method::Post => easy.post(true).map_err(to_api)?,
            other => easy.custom_request(other.as_str()).map_err(to_api)?,
        }
        if !req.body.is_empty() {
            easy.post_fields_copy(&req.body).map_err(to_api)?;
        } else if req.method == Method::Post {
            easy.post_field_size(0).map_err(to_api)?;
        }
        easy.follow_location(self.follow_redirects).map_err(to_api)?;
        easy.connect_timeout(self.connect_timeout.min(req.timeout))
            .map_err(to_api)?;
        easy.timeout(req.timeout).map_err(to_api)?;
        easy.ssl_verify_peer(req.verify_tls).map_err(to_api)?;
        easy.ssl_verify_host(req.verify_tls).map_err(to_api)?;

        let mut list = curl::easy::List::new();
        for (k, v) in req.headers.iter() {
            list.append(&header_line(k, v)).map_err(to_api)?;
        }
        if !req.headers.is_empty() {
            easy.http_headers(list).map_err(to_api)?;
        }

        {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    if let Ok(s) = str::from_utf8(data) {
                        header_lines.push(s.trim_end().to_string());
                    }
                    true
                })
                .map_err(to_api)?;
            transfer
                .write_function(|data| {
                    body.extend_from_slice(data);
                    Ok(data.len())
                })
                .map_err(to_api)?;
            transfer.perform().map_err(to_api)?;
        }

        let status = easy.response_code().map_err(to_api)?;
        let status = u16::try_from(status).map_err(|_| ApiError::Transport {
            message: format!("invalid HTTP status {status}"),
        })?;
        let url = easy
            .effective_url()
            .map_err(to_api)?
            .map(str::to_string)
            .unwrap_or_else(|| req.url.clone());
        let headers = parse_header_lines(&header_lines);

        Ok(ApiResponse {
            status,
            request_id: request_id_from(&headers),
            headers,
            body,
            elapsed: start.elapsed(),
            url,
        })
    }
}

/// curl drops a header given as "Name:", so an empty value goes as "Name;".
fn header_line(name: &str, value: &str) -> String {
    let (name, value) = (name.trim(), value.trim());
    if value.is_empty() {
        format!("{name};")
    } else {
        format!("{name}: {value}")
    }
}

fn map_curl_error(e: curl::Error, timeout: Duration) -> ApiError {
    match classify_curl_error(&e) {
        ErrorKind::Timeout => ApiError::Timeout { timeout },
        ErrorKind::Connection => ApiError::Connection {
            message: e.to_string(),
        },
        _ => ApiError::Transport {
            message: e.to_string(),
        },
    }
}

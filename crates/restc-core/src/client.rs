//! Blocking API client: URL resolution, header merging, rate limiting and
//! retries around a [`Transport`].

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use url::{Host, Url};

use crate::config::{ClientConfig, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};
use crate::error::ApiError;
use crate::models::{ApiRequest, ApiResponse, Headers, Method};
use crate::rate_limit::RateLimiter;
use crate::retry::{millis, RetryExecutor, RetryPolicy};
use crate::sanitize::{redact_headers, redact_url};
use crate::transport::{CurlTransport, PreparedRequest, Transport};

pub const USER_AGENT: &str = concat!("restc/", env!("CARGO_PKG_VERSION"));

pub struct ApiClient<T: Transport = CurlTransport> {
    base_url: Option<String>,
    default_headers: Headers,
    timeout: Duration,
    verify_tls: bool,
    block_private_hosts: bool,
    transport: T,
    limiter: Option<Arc<RateLimiter>>,
    executor: RetryExecutor,
}

impl ApiClient<CurlTransport> {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::with_transport(config, CurlTransport::new())
    }
}

impl<T: Transport> ApiClient<T> {
    /// Build a client over any transport. Fails on an invalid base URL,
    /// timeout, header, retry or rate-limit setting.
    pub fn with_transport(config: &ClientConfig, transport: T) -> Result<Self, ApiError> {
        let invalid = |e: anyhow::Error| ApiError::InvalidConfig(format!("{e:#}"));

        let base_url = config
            .base_url
            .as_deref()
            .map(normalize_base_url)
            .transpose()?;
        let timeout = config.timeout().map_err(invalid)?;
        let policy = config.retry_policy().map_err(invalid)?;
        let limiter = match config.rate_limit {
            Some(_) => Some(Arc::new(config.rate_limiter().map_err(invalid)?)),
            None => None,
        };

        let mut default_headers = Headers::new();
        default_headers.insert("User-Agent", USER_AGENT);
        default_headers.insert("Accept", "application/json");
        for (k, v) in &config.headers {
            validate_header(k, v).map_err(|e| ApiError::InvalidConfig(e.to_string()))?;
            default_headers.insert(k.as_str(), v.as_str());
        }
        if let Some(token) = &config.bearer_token {
            let value = format!("Bearer {token}");
            validate_header("Authorization", &value)
                .map_err(|_| ApiError::InvalidConfig("bearer_token contains CR or LF".into()))?;
            default_headers.insert("Authorization", value);
        }

        Ok(Self {
            base_url,
            default_headers,
            timeout,
            verify_tls: config.verify_tls,
            block_private_hosts: config.block_private_hosts,
            transport,
            limiter,
            executor: RetryExecutor::new(policy),
        })
    }

    /// Share a limiter with other clients (replaces any configured one).
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.executor = RetryExecutor::new(policy);
        self
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.executor.policy()
    }

    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    pub fn default_headers(&self) -> &Headers {
        &self.default_headers
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve `path` against the base URL and append `query`.
    ///
    /// Absolute http(s) URLs pass through. Relative paths are joined with
    /// exactly one `/` and may not contain `..` segments.
    pub fn build_url(&self, path: &str, query: &[(String, String)]) -> Result<Url, ApiError> {
        if path.contains(['\r', '\n']) {
            return Err(ApiError::InvalidRequest("path contains CR or LF".into()));
        }
        let lower = path.to_ascii_lowercase();
        let raw = if lower.starts_with("http://") || lower.starts_with("https://") {
            path.to_string()
        } else {
            let base = self.base_url.as_deref().ok_or_else(|| {
                ApiError::InvalidRequest(format!("relative path {path:?} needs a base_url"))
            })?;
            let path_only = path.split(['?', '#']).next().unwrap_or_default();
            if path_only
                .split('/')
                .any(|seg| seg == ".." || seg.eq_ignore_ascii_case("%2e%2e"))
            {
                return Err(ApiError::InvalidRequest(format!(
                    "path traversal not allowed: {path:?}"
                )));
            }
            let rel = path.trim_start_matches('/');
            if rel.is_empty() {
                base.to_string()
            } else {
                format!("{base}/{rel}")
            }
        };

        let mut url = Url::parse(&raw)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid URL {raw:?}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidRequest(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            )));
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        if self.block_private_hosts {
            ensure_public_host(&url)?;
        }
        Ok(url)
    }

    /// Resolve, merge and encode a request without sending it.
    pub fn prepare(&self, req: &ApiRequest) -> Result<PreparedRequest, ApiError> {
        let url = self.build_url(&req.path, &req.query)?;

        let timeout = req.timeout.unwrap_or(self.timeout);
        let secs = timeout.as_secs_f64();
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&secs) {
            return Err(ApiError::InvalidRequest(format!(
                "timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds, got {secs}"
            )));
        }

        for (k, v) in req.headers.iter() {
            validate_header(k, v)?;
        }
        let mut headers = self.default_headers.clone();
        if let Some(ct) = req.body.content_type() {
            headers.insert("Content-Type", ct);
        }
        headers.merge(&req.headers);

        Ok(PreparedRequest {
            method: req.method,
            url: url.to_string(),
            headers,
            body: req.body.to_bytes()?,
            timeout,
            verify_tls: self.verify_tls,
        })
    }

    /// Send once, no retries. Statuses of 400 and above become errors.
    pub fn execute_once(&self, req: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let prepared = self.prepare(req)?;
        self.send(&prepared)
    }

    /// Send under the client's retry policy. The returned error is the one
    /// from the last attempt.
    pub fn execute(&self, req: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let prepared = self.prepare(req)?;
        self.executor.run(|| self.send(&prepared))
    }

    /// Like [`execute`](Self::execute), calling `on_retry(attempt, error, delay)`
    /// before each wait.
    pub fn execute_with_callback<C>(&self, req: &ApiRequest, on_retry: C) -> Result<ApiResponse, ApiError>
    where
        C: FnMut(u32, &ApiError, Duration),
    {
        let prepared = self.prepare(req)?;
        self.executor
            .run_with_callback(|| self.send(&prepared), on_retry)
    }

    pub fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.execute(&ApiRequest::get(path))
    }

    /// GET and decode the body as JSON.
    pub fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        self.get(path)?.json()
    }

    pub fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse, ApiError> {
        self.execute(&ApiRequest::post(path).json(serde_json::to_value(body)?))
    }

    pub fn put_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse, ApiError> {
        self.execute(&ApiRequest::put(path).json(serde_json::to_value(body)?))
    }

    pub fn patch_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse, ApiError> {
        self.execute(&ApiRequest::patch(path).json(serde_json::to_value(body)?))
    }

    pub fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.execute(&ApiRequest::delete(path))
    }

    pub fn head(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.execute(&ApiRequest::new(Method::Head, path))
    }

    pub fn options(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.execute(&ApiRequest::new(Method::Options, path))
    }

    /// One attempt: wait for a rate-limit slot, send, map the status.
    fn send(&self, prepared: &PreparedRequest) -> Result<ApiResponse, ApiError> {
        let _permit = match &self.limiter {
            Some(limiter) => Some(limiter.acquire()?),
            None => None,
        };

        tracing::info!(method = %prepared.method, url = %redact_url(&prepared.url), "request");
        tracing::debug!(headers = ?redact_headers(&prepared.headers), body_len = prepared.body.len());

        let resp = self.transport.execute(prepared).map_err(|e| {
            tracing::debug!(url = %redact_url(&prepared.url), "transport error: {}", e);
            e
        })?;

        tracing::info!(
            status = resp.status,
            elapsed_ms = millis(resp.elapsed),
            request_id = resp.request_id.as_deref().unwrap_or("-"),
            "response"
        );

        if resp.status < 400 {
            return Ok(resp);
        }
        let err = ApiError::from_response(&resp);
        if let (ApiError::RateLimited { retry_after: Some(wait), .. }, Some(limiter)) =
            (&err, &self.limiter)
        {
            limiter.pause_for(*wait);
        }
        Err(err)
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|e| ApiError::InvalidConfig(format!("invalid base_url {trimmed:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::InvalidConfig(format!(
            "base_url must be http or https, got {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(ApiError::InvalidConfig(format!(
            "base_url has no host: {trimmed:?}"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_header(name: &str, value: &str) -> Result<(), ApiError> {
    if name.is_empty()
        || name
            .chars()
            .any(|c| c == ':' || c.is_ascii_whitespace() || c.is_ascii_control())
    {
        return Err(ApiError::InvalidRequest(format!(
            "invalid header name: {name:?}"
        )));
    }
    if value.contains(['\r', '\n']) {
        return Err(ApiError::InvalidRequest(format!(
            "header {name} contains CR or LF"
        )));
    }
    Ok(())
}

fn ensure_public_host(url: &Url) -> Result<(), ApiError> {
    let blocked = match url.host() {
        Some(Host::Domain(d)) => {
            let d = d.trim_end_matches('.').to_ascii_lowercase();
            d == "localhost" || d.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => is_private_v4(ip),
        Some(Host::Ipv6(ip)) => is_private_v6(ip),
        None => true,
    };
    if blocked {
        return Err(ApiError::InvalidRequest(format!(
            "refusing request to private or local host: {}",
            url.host_str().unwrap_or_default()
        )));
    }
    Ok(())
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || (first & 0xfe00) == 0xfc00 // unique local
        || (first & 0xffc0) == 0xfe80 // link local
        || ip.to_ipv4_mapped().is_some_and(is_private_v4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::num::NonZeroU32;
    use std::sync::Mutex;

    /// Transport that replays canned results and records what it was sent.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<ApiResponse, ApiError>>>,
        seen: Mutex<Vec<PreparedRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<ApiResponse, ApiError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::default(),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn last(&self) -> PreparedRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Transport for Scripted {
        fn execute(&self, request: &PreparedRequest) -> Result<ApiResponse, ApiError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(reply(200, &[], "")))
        }
    }

    fn reply(status: u16, headers: &[(&str, &str)], body: &str) -> ApiResponse {
        ApiResponse {
            status,
            headers: headers.iter().copied().collect(),
            body: body.as_bytes().to_vec(),
            elapsed: Duration::from_millis(1),
            request_id: None,
            url: "https://api.example.com/".into(),
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(max_attempts)
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .jitter(false)
            .build()
            .unwrap()
    }

    fn client(replies: Vec<Result<ApiResponse, ApiError>>) -> ApiClient<Scripted> {
        let cfg = ClientConfig::default().with_base_url("https://api.example.com/v1/");
        ApiClient::with_transport(&cfg, Scripted::new(replies))
            .unwrap()
            .with_retry_policy(fast_policy(3))
    }

    #[test]
    fn joins_paths_with_one_slash() {
        let c = client(vec![]);
        assert_eq!(c.base_url(), Some("https://api.example.com/v1"));
        let url = c.build_url("/users", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/users");
        let url = c.build_url("users/7", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/users/7");
        let url = c
            .build_url("search", &[("q".into(), "a b".into()), ("page".into(), "2".into())])
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/search?q=a+b&page=2");
    }

    #[test]
    fn absolute_urls_pass_through() {
        let c = client(vec![]);
        let url = c.build_url("https://other.example.org/x", &[]).unwrap();
        assert_eq!(url.as_str(), "https://other.example.org/x");
    }

    #[test]
    fn rejects_traversal_and_missing_base() {
        let c = client(vec![]);
        for bad in ["../etc/passwd", "/a/../b", "a/%2E%2E/b"] {
            assert!(
                matches!(c.build_url(bad, &[]), Err(ApiError::InvalidRequest(_))),
                "{bad}"
            );
        }
        let no_base = ApiClient::with_transport(&ClientConfig::default(), Scripted::default()).unwrap();
        assert!(matches!(
            no_base.build_url("/users", &[]),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        for bad in ["ftp://example.com", "not a url", "file:///tmp"] {
            let cfg = ClientConfig::default().with_base_url(bad);
            assert!(
                matches!(
                    ApiClient::with_transport(&cfg, Scripted::default()),
                    Err(ApiError::InvalidConfig(_))
                ),
                "{bad}"
            );
        }
    }

    #[test]
    fn blocks_private_hosts_when_enabled() {
        let cfg = ClientConfig {
            block_private_hosts: true,
            ..Default::default()
        };
        let c = ApiClient::with_transport(&cfg, Scripted::default()).unwrap();
        for blocked in [
            "http://127.0.0.1/",
            "http://10.1.2.3/",
            "http://192.168.0.1/",
            "http://169.254.169.254/latest/meta-data",
            "http://localhost:8080/",
            "http://[::1]/",
            "http://[fd00::1]/",
            "http://[::ffff:10.0.0.1]/",
        ] {
            assert!(c.build_url(blocked, &[]).is_err(), "{blocked}");
        }
        assert!(c.build_url("https://93.184.216.34/", &[]).is_ok());
        assert!(c.build_url("https://api.example.com/", &[]).is_ok());
    }

    #[test]
    fn rejects_header_injection() {
        let c = client(vec![]);
        let req = ApiRequest::get("/x").header("X-Evil", "a\r\nInjected: 1");
        assert!(matches!(c.prepare(&req), Err(ApiError::InvalidRequest(_))));
        let req = ApiRequest::get("/x").header("Bad Name", "v");
        assert!(matches!(c.prepare(&req), Err(ApiError::InvalidRequest(_))));
        assert_eq!(c.transport().calls(), 0);
    }

    #[test]
    fn merges_default_and_request_headers() {
        let mut cfg = ClientConfig::default().with_base_url("https://api.example.com");
        cfg.bearer_token = Some("s3cret".into());
        cfg.headers.insert("X-Team".into(), "infra".into());
        let c = ApiClient::with_transport(&cfg, Scripted::default()).unwrap();

        let req = ApiRequest::post("/items")
            .header("accept", "text/csv")
            .json(json!({"name": "n"}));
        let prepared = c.prepare(&req).unwrap();
        let h = &prepared.headers;
        assert_eq!(h.get("User-Agent"), Some(USER_AGENT));
        assert_eq!(h.get("Accept"), Some("text/csv"));
        assert_eq!(h.get("Authorization"), Some("Bearer s3cret"));
        assert_eq!(h.get("X-Team"), Some("infra"));
        assert_eq!(h.get("Content-Type"), Some("application/json"));
        assert_eq!(prepared.body, br#"{"name":"n"}"#.to_vec());
        assert_eq!(prepared.timeout, Duration::from_secs(30));
        assert!(prepared.verify_tls);
    }

    #[test]
    fn timeout_out_of_range_is_rejected() {
        let c = client(vec![]);
        let req = ApiRequest::get("/x").timeout(Duration::from_secs(301));
        assert!(matches!(c.prepare(&req), Err(ApiError::InvalidRequest(_))));
        let req = ApiRequest::get("/x").timeout(Duration::from_millis(500));
        assert!(c.prepare(&req).is_err());
        let req = ApiRequest::get("/x").timeout(Duration::from_secs(300));
        assert!(c.prepare(&req).is_ok());
    }

    #[test]
    fn retries_server_errors_until_success() {
        let c = client(vec![
            Ok(reply(503, &[], "")),
            Ok(reply(502, &[], "")),
            Ok(reply(200, &[], r#"{"ok": true}"#)),
        ]);
        let resp = c.get("/health").unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(c.transport().calls(), 3);
        assert_eq!(c.transport().last().url, "https://api.example.com/v1/health");
    }

    #[test]
    fn client_errors_are_not_retried() {
        let c = client(vec![Ok(reply(404, &[], r#"{"error": "no such user"}"#))]);
        let err = c.get("/users/9").unwrap_err();
        assert_eq!(c.transport().calls(), 1);
        match err {
            ApiError::Client { status, message, .. } => {
                assert_eq!(status, 404);
                assert_eq!(message, "no such user");
            }
            other => panic!("expected Client, got {other:?}"),
        }
    }

    #[test]
    fn exhaustion_returns_last_error() {
        let c = client(vec![
            Err(ApiError::Connection {
                message: "refused".into(),
            }),
            Err(ApiError::Timeout {
                timeout: Duration::from_secs(1),
            }),
            Ok(reply(500, &[], "boom")),
        ]);
        let mut retries = Vec::new();
        let err = c
            .execute_with_callback(&ApiRequest::get("/x"), |attempt, _, _| retries.push(attempt))
            .unwrap_err();
        assert_eq!(c.transport().calls(), 3);
        assert_eq!(retries, vec![0, 1]);
        assert!(matches!(err, ApiError::Server { status: 500, .. }));
    }

    #[test]
    fn execute_once_does_not_retry() {
        let c = client(vec![Ok(reply(503, &[], ""))]);
        assert!(c.execute_once(&ApiRequest::get("/x")).is_err());
        assert_eq!(c.transport().calls(), 1);
    }

    #[test]
    fn server_429_pauses_the_limiter() {
        let cfg = ClientConfig {
            rate_limit: Some(RateLimitConfig::default()),
            ..ClientConfig::default().with_base_url("https://api.example.com")
        };
        let c = ApiClient::with_transport(
            &cfg,
            Scripted::new(vec![Ok(reply(429, &[("Retry-After", "5")], ""))]),
        )
        .unwrap();
        let limiter = c.rate_limiter().unwrap().clone();
        assert!(limiter.allows_request());

        let err = c.execute_once(&ApiRequest::get("/x")).unwrap_err();
        assert!(matches!(
            err,
            ApiError::RateLimited {
                retry_after: Some(d),
                ..
            } if d == Duration::from_secs(5)
        ));
        assert!(!limiter.allows_request());
        assert!(limiter.wait_time() > Duration::from_secs(4));
        assert_eq!(limiter.in_flight(), 0);
    }

    #[test]
    fn local_limit_fails_fast_past_max_wait() {
        let limiter = Arc::new(
            RateLimiter::new(NonZeroU32::new(1), None).with_max_wait(Some(Duration::from_millis(10))),
        );
        let c = client(vec![]).with_rate_limiter(limiter.clone());
        c.execute_once(&ApiRequest::get("/a")).unwrap();
        let err = c.execute(&ApiRequest::get("/b")).unwrap_err();
        assert!(matches!(err, ApiError::RateLimitExceeded(_)));
        assert_eq!(c.transport().calls(), 1);
    }

    #[test]
    fn json_shortcuts() {
        let c = client(vec![Ok(reply(201, &[], r#"{"id": 3}"#))]);
        let resp = c.post_json("/items", &json!({"name": "x"})).unwrap();
        assert_eq!(resp.status, 201);
        let sent = c.transport().last();
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.body, br#"{"name":"x"}"#.to_vec());

        let c = client(vec![Ok(reply(200, &[], r#"{"id": 3}"#))]);
        let v: serde_json::Value = c.get_json("/items/3").unwrap();
        assert_eq!(v["id"], 3);
    }
}

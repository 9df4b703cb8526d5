//! `restc request|get|delete` – send one logical request and print the body.

use anyhow::{bail, Context, Result};
use restc_core::{ApiClient, ApiRequest, ApiResponse, ClientConfig, Method};
use std::time::Duration;

use crate::cli::RequestOpts;

/// Request body as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyArg {
    None,
    Json(String),
    Raw(String),
}

impl BodyArg {
    /// `--json` wins; clap already rejects both being set.
    pub fn from_flags(json: Option<String>, data: Option<String>) -> Self {
        match (json, data) {
            (Some(j), _) => BodyArg::Json(j),
            (None, Some(d)) => BodyArg::Raw(d),
            (None, None) => BodyArg::None,
        }
    }
}

pub fn build_request(
    method: Method,
    path: &str,
    body: BodyArg,
    opts: &RequestOpts,
) -> Result<ApiRequest> {
    let mut req = ApiRequest::new(method, path);
    for h in &opts.headers {
        let Some((name, value)) = h.split_once(':') else {
            bail!("invalid header {h:?}, expected NAME:VALUE");
        };
        req = req.header(name.trim(), value.trim());
    }
    for q in &opts.query {
        let Some((key, value)) = q.split_once('=') else {
            bail!("invalid query parameter {q:?}, expected KEY=VALUE");
        };
        req = req.query(key, value);
    }
    match body {
        BodyArg::None => {}
        BodyArg::Json(text) => {
            let value: serde_json::Value =
                serde_json::from_str(&text).context("--json is not valid JSON")?;
            req = req.json(value);
        }
        BodyArg::Raw(text) => req = req.raw(text, None),
    }
    if let Some(secs) = opts.timeout {
        let timeout = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid --timeout {secs}"))?;
        req = req.timeout(timeout);
    }
    Ok(req)
}

pub fn run_request(
    cfg: &ClientConfig,
    method: Method,
    path: &str,
    body: BodyArg,
    opts: &RequestOpts,
) -> Result<()> {
    let req = build_request(method, path, body, opts)?;
    let client = ApiClient::new(cfg)?;

    let result = if opts.no_retry {
        client.execute_once(&req)
    } else {
        client.execute_with_callback(&req, |attempt, err, delay| {
            eprintln!(
                "attempt {} failed: {} (retrying in {:.1}s)",
                attempt + 1,
                err,
                delay.as_secs_f64()
            );
        })
    };
    let resp = result.with_context(|| format!("{method} {path}"))?;

    eprintln!(
        "HTTP {} ({} ms){}",
        resp.status,
        resp.elapsed.as_millis(),
        resp.request_id
            .as_deref()
            .map(|id| format!(" request-id {id}"))
            .unwrap_or_default()
    );
    print_body(&resp);
    Ok(())
}

/// Pretty-print JSON bodies, pass anything else through.
fn print_body(resp: &ApiResponse) {
    if resp.body.is_empty() {
        return;
    }
    match serde_json::from_slice::<serde_json::Value>(&resp.body) {
        Ok(v) => match serde_json::to_string_pretty(&v) {
            Ok(s) => println!("{s}"),
            Err(_) => println!("{}", resp.text()),
        },
        Err(_) => println!("{}", resp.text()),
    }
}

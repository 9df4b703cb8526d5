//! `restc config` – show where the config lives and what is in effect.

use anyhow::Result;
use restc_core::config::{self, ClientConfig};
use restc_core::sanitize::{is_sensitive_header, REDACTED};
use std::path::Path;

/// Copy of `cfg` safe to print.
pub fn redacted_config(cfg: &ClientConfig) -> ClientConfig {
    let mut shown = cfg.clone();
    if shown.bearer_token.is_some() {
        shown.bearer_token = Some(REDACTED.to_string());
    }
    for (name, value) in shown.headers.iter_mut() {
        if is_sensitive_header(name) {
            *value = REDACTED.to_string();
        }
    }
    shown
}

pub fn run_config(cfg: &ClientConfig, path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config::config_path()?,
    };
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&redacted_config(cfg))?);
    Ok(())
}

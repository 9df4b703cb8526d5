//! CLI for the restc REST client.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use restc_core::config;
use restc_core::Method;
use std::path::PathBuf;

use commands::{run_backoff, run_config, run_request, BodyArg};

/// Top-level CLI for restc.
#[derive(Debug, Parser)]
#[command(name = "restc")]
#[command(about = "restc: REST client with retries and rate limiting", long_about = None)]
pub struct Cli {
    /// Base URL for relative paths (overrides `base_url` in the config file).
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Read configuration from this file instead of ~/.config/restc/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Options shared by every command that sends a request.
#[derive(Debug, Clone, Default, Args)]
pub struct RequestOpts {
    /// Extra header, repeatable.
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    /// Query parameter, repeatable.
    #[arg(short = 'q', long = "query", value_name = "KEY=VALUE")]
    pub query: Vec<String>,

    /// Per-request timeout in seconds (1-300).
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Send once; do not retry transient failures.
    #[arg(long)]
    pub no_retry: bool,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Send a request with any method.
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS).
        method: String,
        /// Path relative to the base URL, or an absolute http(s) URL.
        path: String,
        /// JSON request body.
        #[arg(long, value_name = "JSON", conflicts_with = "data")]
        json: Option<String>,
        /// Raw request body.
        #[arg(long, value_name = "TEXT")]
        data: Option<String>,
        #[command(flatten)]
        opts: RequestOpts,
    },

    /// GET a path and print the body.
    Get {
        path: String,
        #[command(flatten)]
        opts: RequestOpts,
    },

    /// DELETE a path.
    Delete {
        path: String,
        #[command(flatten)]
        opts: RequestOpts,
    },

    /// Print the retry delay schedule of the configured policy.
    Backoff {
        /// Number of attempts to show (default: the policy's max_attempts).
        #[arg(long, value_name = "N")]
        attempts: Option<u32>,
    },

    /// Show the config file path and effective settings (secrets redacted).
    Config,
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        Cli::parse().run()
    }
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let mut cfg = match &self.config {
            Some(path) => config::load_from(path)?,
            None => config::load_or_init()?,
        };
        if let Some(url) = self.base_url {
            cfg.base_url = Some(url);
        }
        tracing::debug!(base_url = ?cfg.base_url, "loaded config");

        match self.command {
            CliCommand::Request {
                method,
                path,
                json,
                data,
                opts,
            } => {
                let method: Method = method.parse()?;
                let body = BodyArg::from_flags(json, data);
                run_request(&cfg, method, &path, body, &opts)?;
            }
            CliCommand::Get { path, opts } => {
                run_request(&cfg, Method::Get, &path, BodyArg::None, &opts)?
            }
            CliCommand::Delete { path, opts } => {
                run_request(&cfg, Method::Delete, &path, BodyArg::None, &opts)?
            }
            CliCommand::Backoff { attempts } => run_backoff(&cfg, attempts)?,
            CliCommand::Config => run_config(&cfg, self.config.as_deref())?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;

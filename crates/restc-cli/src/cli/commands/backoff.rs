//! `restc backoff` – show the delays the configured retry policy would use.

use anyhow::Result;
use restc_core::{ClientConfig, RetryPolicy};
use std::time::Duration;

/// Delays between `attempts` tries: one entry per retry.
pub fn delay_schedule(policy: &RetryPolicy, attempts: u32) -> Vec<Duration> {
    (0..attempts.saturating_sub(1))
        .map(|attempt| policy.calculate_delay(attempt))
        .collect()
}

pub fn run_backoff(cfg: &ClientConfig, attempts: Option<u32>) -> Result<()> {
    let policy = cfg.retry_policy()?;
    let attempts = attempts.unwrap_or(policy.max_attempts());
    let schedule = delay_schedule(&policy, attempts);

    println!(
        "base {:?}, factor {}, max {:?}, jitter {}",
        policy.base_delay(),
        policy.growth_factor(),
        policy.max_delay(),
        if policy.jitter() {
            format!("+{:.0}%", policy.jitter_fraction() * 100.0)
        } else {
            "off".to_string()
        }
    );
    if schedule.is_empty() {
        println!("No retries ({} attempt).", attempts);
        return Ok(());
    }
    println!("{:<8} {:>10}", "RETRY", "DELAY");
    for (i, d) in schedule.iter().enumerate() {
        println!("{:<8} {:>9.3}s", i + 1, d.as_secs_f64());
    }
    let total: Duration = schedule.iter().sum();
    println!("{:<8} {:>9.3}s", "total", total.as_secs_f64());
    Ok(())
}

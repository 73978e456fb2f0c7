//! Retry helpers.
//!
//! Two policies live here:
//!
//! - [`post_json`]: provider HTTP calls. HTTP 429, 5xx, and network
//!   errors are retried with exponential backoff (1s, 2s, 4s, … capped at
//!   32s); any other non-success status fails immediately.
//! - [`RetryPolicy`]: a fixed number of attempts with a constant pause,
//!   used for destructive storage steps that can fail transiently (for
//!   example a file still held open by another process).

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tracing::{debug, warn};

/// Backoff before retry `attempt` (1-based).
pub fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

/// POST `body` as JSON and return the parsed JSON response.
///
/// `build` is called once per attempt so headers can be reattached.
/// `label` names the provider in error messages.
pub async fn post_json<F>(
    label: &str,
    max_retries: u32,
    body: &serde_json::Value,
    build: F,
) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff(attempt);
            debug!(provider = label, attempt, ?delay, "Retrying request");
            tokio::time::sleep(delay).await;
        }

        let resp = build()
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error: {}", label, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", label)))
}

/// Bounded retry with a constant pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least one.
    pub attempts: u32,
    pub pause: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, pause: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            pause,
        }
    }

    /// Run `op` until it succeeds or the attempts are used up, returning
    /// the last error.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.attempts => {
                    warn!(step = what, attempt, error = %err, "Step failed; retrying");
                    tokio::time::sleep(self.pause).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Download retry policy: exponential backoff plus a jitter keyed on the URL,
// so downloads of different templates that fail together retry apart.
//
// Timeouts, connection failures, 5xx and 429 responses are worth another
// try. Any other HTTP status, a malformed URL or an unsupported scheme is not.

use std::time::Duration;

use formcast_core::error::FormcastError;
use formcast_core::types::ErrorClass;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Backoff settings applied to each download.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each one after.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp(ErrorClass),
    Exhausted,
}

impl RetryConfig {
    /// What to do after failed attempt `attempt` (zero-based) at `url`.
    pub fn decide(&self, err: &FormcastError, attempt: u32, url: &str) -> RetryDecision {
        if classify_error(err) == ErrorClass::Permanent {
            debug!(url, error = %err, "Permanent failure, not retrying");
            return RetryDecision::GiveUp(ErrorClass::Permanent);
        }
        if attempt >= self.max_retries {
            warn!(url, attempt, max = self.max_retries, "Retry limit reached");
            return RetryDecision::Exhausted;
        }
        RetryDecision::RetryAfter(self.delay(attempt, url))
    }

    /// `base_delay × 2^attempt`, plus up to one `base_delay` of jitter
    /// derived from `url` and `attempt`, never above `max_delay`.
    pub fn delay(&self, attempt: u32, url: &str) -> Duration {
        let base_ms = millis(self.base_delay);
        let backoff_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
        let total_ms = backoff_ms.saturating_add(jitter_ms(url, attempt, base_ms));
        Duration::from_millis(total_ms.min(millis(self.max_delay)))
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn jitter_ms(url: &str, attempt: u32, base_ms: u64) -> u64 {
    if base_ms == 0 {
        return 0;
    }
    let digest = Sha256::new()
        .chain_update(url.as_bytes())
        .chain_update(attempt.to_be_bytes())
        .finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(seed) % base_ms
}

/// Sort an error into retry-worthy or not.
pub fn classify_error(err: &FormcastError) -> ErrorClass {
    match err {
        FormcastError::Retrieval { reason, .. } => classify_retrieval_reason(reason),
        FormcastError::Timeout(_) => ErrorClass::Transient,
        FormcastError::Delivery(detail) => {
            let lower = detail.to_ascii_lowercase();
            if lower.contains("timed out") || lower.contains("connection") {
                ErrorClass::Transient
            } else {
                ErrorClass::Permanent
            }
        }
        FormcastError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => ErrorClass::Permanent,
            _ => ErrorClass::Transient,
        },
        FormcastError::DocumentLoad(_)
        | FormcastError::Mutation(_)
        | FormcastError::InvalidRequest(_)
        | FormcastError::NothingProcessed(_)
        | FormcastError::Config(_)
        | FormcastError::Serialization(_) => ErrorClass::Permanent,
    }
}

/// Retrieval reasons are written by `Fetcher`. Anything that is neither an
/// HTTP status nor a rejected URL is a network-level failure.
fn classify_retrieval_reason(reason: &str) -> ErrorClass {
    let lower = reason.to_ascii_lowercase();
    match http_status(&lower) {
        Some(429) | Some(500..=599) => ErrorClass::Transient,
        Some(_) => ErrorClass::Permanent,
        None if lower.contains("invalid url") || lower.contains("unsupported scheme") => {
            ErrorClass::Permanent
        }
        None => ErrorClass::Transient,
    }
}

/// The code in an `"http status NNN ..."` reason.
fn http_status(lower: &str) -> Option<u16> {
    let rest = lower.split("http status ").nth(1)?;
    rest.get(..3)?.parse().ok()
}

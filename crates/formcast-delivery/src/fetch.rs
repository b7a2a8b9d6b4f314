// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Template retrieval — downloads remote PDF templates into a request folder.
//
// Each URL is fetched independently: a failure is recorded against that URL
// and the remaining downloads carry on. Transient failures are retried with
// backoff according to `RetryConfig`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use formcast_core::AppConfig;
use formcast_core::error::FormcastError;
use reqwest::{Client, Url};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::retry::{RetryConfig, RetryDecision};

/// A URL that could not be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub url: String,
    pub reason: String,
}

/// Outcome of fetching a list of URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Files written, in URL order.
    pub saved: Vec<PathBuf>,
    pub failures: Vec<FetchFailure>,
}

/// HTTP downloader for template PDFs.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    retry: RetryConfig,
}

impl Fetcher {
    /// Build a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration, retry: RetryConfig) -> Result<Self, FormcastError> {
        let client = Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(60))
            .use_rustls_tls()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("formcast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FormcastError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self { client, retry })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, FormcastError> {
        Self::new(
            Duration::from_secs(config.fetch_timeout_secs),
            RetryConfig {
                max_retries: config.fetch_max_retries,
                ..RetryConfig::default()
            },
        )
    }

    /// Download every URL into `dir`. Fails only when `dir` cannot be created.
    #[instrument(skip(self, urls), fields(urls = urls.len(), dir = %dir.display()))]
    pub async fn fetch_all(&self, urls: &[String], dir: &Path) -> Result<FetchReport, FormcastError> {
        tokio::fs::create_dir_all(dir).await?;

        let mut report = FetchReport::default();
        let mut used_names = HashSet::new();

        for url in urls {
            let name = unique_name(derive_file_name(url), &mut used_names);
            let dest = dir.join(&name);
            match self.fetch_one(url, &dest).await {
                Ok(len) => {
                    info!(url = %url, file = %name, bytes = len, "Template downloaded");
                    report.saved.push(dest);
                }
                Err(err) => {
                    warn!(url = %url, error = %err, "Template download failed");
                    report.failures.push(FetchFailure {
                        url: url.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Download one URL to `dest`, retrying transient failures.
    /// Returns the number of bytes written.
    pub async fn fetch_one(&self, url: &str, dest: &Path) -> Result<usize, FormcastError> {
        let mut attempt = 0;
        loop {
            match self.attempt(url).await {
                Ok(body) => {
                    tokio::fs::write(dest, &body).await?;
                    return Ok(body.len());
                }
                Err(err) => match self.retry.decide(&err, attempt, url) {
                    RetryDecision::RetryAfter(delay) => {
                        debug!(url, attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying download");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp(_) | RetryDecision::Exhausted => return Err(err),
                },
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<Vec<u8>, FormcastError> {
        let failure = |reason: String| FormcastError::Retrieval {
            url: url.to_string(),
            reason,
        };

        let parsed = Url::parse(url).map_err(|e| failure(format!("invalid URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(failure(format!("unsupported scheme '{}'", parsed.scheme())));
        }

        let response = self.client.get(parsed).send().await.map_err(|e| {
            if e.is_timeout() {
                failure("timed out".into())
            } else if e.is_connect() {
                failure(format!("connection failed: {e}"))
            } else {
                failure(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(failure(format!("HTTP status {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| failure(format!("body read failed: {e}")))?;
        Ok(body.to_vec())
    }
}

/// File name for a downloaded template: the URL's last path segment when it
/// already names a PDF, otherwise a name derived from the URL's SHA-256.
pub fn derive_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let basename = path.rsplit('/').next().unwrap_or_default();

    let is_pdf_name = basename.len() > 4
        && !basename.starts_with('.')
        && basename
            .get(basename.len() - 4..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".pdf"));

    if is_pdf_name {
        basename
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    } else {
        let digest = hex::encode(Sha256::digest(url.as_bytes()));
        format!("{}.pdf", &digest[..32])
    }
}

/// Append `-2`, `-3`, … before the extension until `name` is unused.
fn unique_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name.as_str(), "pdf"));
    let mut n = 2;
    loop {
        let candidate = format!("{stem}-{n}.{ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

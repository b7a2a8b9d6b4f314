// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.
//
// Nothing below the server binary reads the environment: the binary builds an
// `AppConfig` once and threads the relevant sections into each component.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{FormcastError, Result};
use crate::types::{FitPolicy, RgbColor};

/// Deployment environment. Decides whether HTTP error bodies carry the
/// underlying error text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn exposes_error_details(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Rendering knobs shared by the scanner, planner and mutator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillOptions {
    /// Minimum run length for a fragment to count as a placeholder.
    pub min_run: usize,
    /// If set, only these characters may form a placeholder.
    pub marker_alphabet: Option<String>,
    /// Overflow policy for replacement text.
    pub fit_policy: FitPolicy,
    /// Padding added around the glyph box when masking, in points.
    pub mask_padding: f32,
    /// Fill colour of the mask (match the page background).
    pub mask_color: RgbColor,
    /// Colour of replacement text.
    pub text_color: RgbColor,
    /// Baseline-to-baseline distance as a multiple of the font size.
    pub line_height: f32,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            min_run: 4,
            marker_alphabet: None,
            fit_policy: FitPolicy::Truncate,
            mask_padding: 0.5,
            mask_color: RgbColor::WHITE,
            text_color: RgbColor::BLACK,
            line_height: 1.15,
        }
    }
}

impl FillOptions {
    /// Whether `c` may be the repeated character of a placeholder.
    pub fn accepts_marker(&self, c: char) -> bool {
        if c.is_whitespace() {
            return false;
        }
        match &self.marker_alphabet {
            Some(alphabet) => alphabet.contains(c),
            None => true,
        }
    }
}

/// Outbound SMTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// `From:` address. Defaults to `username`.
    pub from: Option<String>,
    pub subject: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".into(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from: None,
            subject: "Your PDFs from FormCast".into(),
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    /// Base directory under which per-request folders are created.
    pub storage_root: PathBuf,
    pub host: String,
    pub port: u16,
    pub fill: FillOptions,
    /// Documents processed concurrently by the batch driver.
    pub batch_workers: usize,
    /// Per-document processing limit in seconds.
    pub document_timeout_secs: u64,
    /// Per-request download timeout in seconds.
    pub fetch_timeout_secs: u64,
    /// Retries for transient download failures.
    pub fetch_max_retries: u32,
    pub smtp: SmtpConfig,
    /// Request field name to marker character.
    pub field_markers: BTreeMap<String, char>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            storage_root: env::temp_dir().join("formcast"),
            host: "0.0.0.0".into(),
            port: 5000,
            fill: FillOptions::default(),
            batch_workers: 1,
            document_timeout_secs: 60,
            fetch_timeout_secs: 30,
            fetch_max_retries: 3,
            smtp: SmtpConfig::default(),
            field_markers: default_field_markers(),
        }
    }
}

/// Marker characters for the request fields the title sheets carry.
pub fn default_field_markers() -> BTreeMap<String, char> {
    [
        ("location", '*'),
        ("clientName", '#'),
        ("date", '$'),
        ("project", '&'),
        ("plotNumber", '@'),
        ("zone", '%'),
        ("district", '+'),
    ]
    .into_iter()
    .map(|(name, marker)| (name.to_string(), marker))
    .collect()
}

impl AppConfig {
    /// Build a configuration from `FORMCAST_*` variables, falling back to the
    /// defaults for anything unset. Malformed values are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] but reads values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("FORMCAST_ENV") {
            config.environment = match v.to_ascii_lowercase().as_str() {
                "production" | "prod" => Environment::Production,
                "development" | "dev" => Environment::Development,
                other => {
                    return Err(FormcastError::Config(format!(
                        "FORMCAST_ENV: unknown environment '{other}'"
                    )));
                }
            };
        }
        if let Some(v) = lookup("FORMCAST_STORAGE_ROOT") {
            config.storage_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("FORMCAST_HOST") {
            config.host = v;
        }
        if let Some(v) = lookup("FORMCAST_PORT") {
            config.port = parse_var("FORMCAST_PORT", &v)?;
        }
        if let Some(v) = lookup("FORMCAST_FIT_POLICY") {
            config.fill.fit_policy = v
                .parse()
                .map_err(|e| FormcastError::Config(format!("FORMCAST_FIT_POLICY: {e}")))?;
        }
        if let Some(v) = lookup("FORMCAST_MASK_PADDING") {
            config.fill.mask_padding = parse_var("FORMCAST_MASK_PADDING", &v)?;
        }
        if let Some(v) = lookup("FORMCAST_MASK_COLOR") {
            config.fill.mask_color = RgbColor::from_hex(&v).ok_or_else(|| {
                FormcastError::Config(format!("FORMCAST_MASK_COLOR: '{v}' is not #RRGGBB"))
            })?;
        }
        if let Some(v) = lookup("FORMCAST_MIN_RUN") {
            config.fill.min_run = parse_var("FORMCAST_MIN_RUN", &v)?;
        }
        if let Some(v) = lookup("FORMCAST_MARKER_ALPHABET") {
            config.fill.marker_alphabet = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("FORMCAST_BATCH_WORKERS") {
            config.batch_workers = parse_var("FORMCAST_BATCH_WORKERS", &v)?;
        }
        if let Some(v) = lookup("FORMCAST_DOCUMENT_TIMEOUT_SECS") {
            config.document_timeout_secs = parse_var("FORMCAST_DOCUMENT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("FORMCAST_FETCH_TIMEOUT_SECS") {
            config.fetch_timeout_secs = parse_var("FORMCAST_FETCH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("FORMCAST_FETCH_MAX_RETRIES") {
            config.fetch_max_retries = parse_var("FORMCAST_FETCH_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("FORMCAST_SMTP_HOST") {
            config.smtp.host = v;
        }
        if let Some(v) = lookup("FORMCAST_SMTP_PORT") {
            config.smtp.port = parse_var("FORMCAST_SMTP_PORT", &v)?;
        }
        if let Some(v) = lookup("FORMCAST_SMTP_USERNAME") {
            config.smtp.username = v;
        }
        if let Some(v) = lookup("FORMCAST_SMTP_PASSWORD") {
            config.smtp.password = v;
        }
        if let Some(v) = lookup("FORMCAST_SMTP_FROM") {
            config.smtp.from = Some(v);
        }
        if let Some(v) = lookup("FORMCAST_MAIL_SUBJECT") {
            config.smtp.subject = v;
        }

        if config.batch_workers == 0 {
            return Err(FormcastError::Config(
                "FORMCAST_BATCH_WORKERS must be at least 1".into(),
            ));
        }
        if config.fill.min_run < 2 {
            return Err(FormcastError::Config(
                "FORMCAST_MIN_RUN must be at least 2".into(),
            ));
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| FormcastError::Config(format!("{key}: '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.fill.fit_policy, FitPolicy::Truncate);
        assert_eq!(config.batch_workers, 1);
        assert_eq!(config.field_markers.get("clientName"), Some(&'#'));
    }

    #[test]
    fn overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("FORMCAST_PORT", "8080"),
            ("FORMCAST_FIT_POLICY", "wrap"),
            ("FORMCAST_MASK_PADDING", "1.5"),
            ("FORMCAST_BATCH_WORKERS", "4"),
            ("FORMCAST_ENV", "production"),
            ("FORMCAST_STORAGE_ROOT", "/var/lib/formcast"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.fill.fit_policy, FitPolicy::Wrap);
        assert_eq!(config.fill.mask_padding, 1.5);
        assert_eq!(config.batch_workers, 4);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.storage_root, PathBuf::from("/var/lib/formcast"));
    }

    #[test]
    fn malformed_port_is_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("FORMCAST_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, FormcastError::Config(msg) if msg.contains("FORMCAST_PORT")));
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(AppConfig::from_lookup(lookup_from(&[("FORMCAST_BATCH_WORKERS", "0")])).is_err());
    }

    #[test]
    fn marker_alphabet_restricts_markers() {
        let mut fill = FillOptions::default();
        assert!(fill.accepts_marker('_'));
        assert!(!fill.accepts_marker(' '));
        fill.marker_alphabet = Some("*#$".into());
        assert!(fill.accepts_marker('#'));
        assert!(!fill.accepts_marker('_'));
    }
}

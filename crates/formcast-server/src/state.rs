// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared handler state.

use std::sync::Arc;

use formcast_core::AppConfig;
use formcast_core::error::FormcastError;
use formcast_delivery::{Fetcher, Mailer, SmtpMailer};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub fetcher: Arc<Fetcher>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: AppConfig, fetcher: Fetcher, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            config: Arc::new(config),
            fetcher: Arc::new(fetcher),
            mailer,
        }
    }

    /// Production wiring: reqwest downloads and SMTP delivery.
    pub fn from_config(config: AppConfig) -> Result<Self, FormcastError> {
        let fetcher = Fetcher::from_config(&config)?;
        let mailer = Arc::new(SmtpMailer::new(&config.smtp)?);
        Ok(Self::new(config, fetcher, mailer))
    }
}

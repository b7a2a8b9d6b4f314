// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// formcast-delivery — Everything that crosses the network: downloading
// template PDFs (with retry) and mailing the filled results.

pub mod fetch;
pub mod mail;
pub mod retry;

pub use fetch::{FetchFailure, FetchReport, Fetcher, derive_file_name};
pub use mail::{MailAttachment, Mailer, OutgoingMail, SmtpMailer, collect_attachments, validate_recipient};
pub use retry::{RetryConfig, RetryDecision, classify_error};

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the people filling in forms.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The stage tells the caller whether their documents were produced at all,
// so "we made your documents but couldn't send them" never reads the same as
// "we couldn't make your documents".

use crate::error::FormcastError;

/// Which part of the request an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The request itself was unusable.
    Request,
    /// Source documents could not be downloaded.
    Retrieval,
    /// Documents were downloaded but could not be filled in.
    Processing,
    /// Documents were filled in but could not be sent.
    Delivery,
    /// Something on our side went wrong.
    Internal,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary.
    pub message: String,
    /// What the user should try.
    pub suggestion: String,
    pub stage: Stage,
}

/// Convert a `FormcastError` into a `HumanError`.
pub fn humanize_error(err: &FormcastError) -> HumanError {
    match err {
        FormcastError::InvalidRequest(detail) => HumanError {
            message: "Some required information is missing.".into(),
            suggestion: format!("Check the form and try again. ({detail})"),
            stage: Stage::Request,
        },

        FormcastError::Retrieval { url, .. } => HumanError {
            message: "We couldn't download your documents.".into(),
            suggestion: format!("Make sure the link is correct and publicly reachable: {url}"),
            stage: Stage::Retrieval,
        },

        FormcastError::DocumentLoad(_) => HumanError {
            message: "One of your files doesn't look like a PDF.".into(),
            suggestion: "Open the file on a computer to check it works, or upload it again.".into(),
            stage: Stage::Processing,
        },

        FormcastError::Mutation(_) | FormcastError::Timeout(_) => HumanError {
            message: "We couldn't fill in your documents.".into(),
            suggestion: "The template may be damaged or unusually complex. Try saving it again as a standard PDF.".into(),
            stage: Stage::Processing,
        },

        FormcastError::NothingProcessed(_) => HumanError {
            message: "We couldn't fill in any of your documents.".into(),
            suggestion: "Check that the links point to PDF templates with placeholder markers.".into(),
            stage: Stage::Processing,
        },

        FormcastError::Delivery(_) => HumanError {
            message: "Your documents were ready, but we couldn't email them.".into(),
            suggestion: "Check the email address and try again in a few minutes.".into(),
            stage: Stage::Delivery,
        },

        FormcastError::Config(_)
        | FormcastError::Io(_)
        | FormcastError::Serialization(_) => HumanError {
            message: "Something went wrong on our side.".into(),
            suggestion: "Please try again later.".into(),
            stage: Stage::Internal,
        },
    }
}

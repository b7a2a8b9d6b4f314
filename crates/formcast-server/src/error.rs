// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP error responses.
//
// Each `FormcastError` maps to a status and a stable `error` code. Request
// processing failures and delivery failures get distinct codes so a caller
// can tell "no documents were made" from "documents were made but not sent".
// The raw error text goes into `details` only when the handler asks for it.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use formcast_core::error::FormcastError;
use formcast_core::human_errors::humanize_error;
use serde::Serialize;

/// Per-document or per-URL failure listed in an error body.
#[derive(Debug, Clone, Serialize)]
pub struct FailureEntry {
    pub source: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct ApiError {
    error: FormcastError,
    failures: Vec<FailureEntry>,
    show_details: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    suggestion: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<FailureEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    pub fn with_failures(mut self, failures: Vec<FailureEntry>) -> Self {
        self.failures = failures;
        self
    }

    /// Include the underlying error text in the response body.
    pub fn with_details(mut self, show: bool) -> Self {
        self.show_details = show;
        self
    }

    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.error {
            FormcastError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            FormcastError::Retrieval { .. } => (StatusCode::BAD_GATEWAY, "retrieval_failed"),
            FormcastError::DocumentLoad(_)
            | FormcastError::Mutation(_)
            | FormcastError::Timeout(_)
            | FormcastError::NothingProcessed(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "processing_failed")
            }
            FormcastError::Delivery(_) => (StatusCode::BAD_GATEWAY, "delivery_failed"),
            FormcastError::Config(_) | FormcastError::Io(_) | FormcastError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl From<FormcastError> for ApiError {
    fn from(error: FormcastError) -> Self {
        Self {
            error,
            failures: Vec::new(),
            show_details: false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self.error, code, "Request failed");
        } else {
            tracing::warn!(error = %self.error, code, "Request rejected");
        }

        let human = humanize_error(&self.error);
        let body = Json(ErrorResponse {
            error: code,
            message: human.message,
            suggestion: human.suggestion,
            failures: self.failures,
            details: self.show_details.then(|| self.error.to_string()),
        });

        (status, body).into_response()
    }
}

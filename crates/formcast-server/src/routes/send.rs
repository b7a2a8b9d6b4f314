// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `POST /api/pdf/send` — download the templates, fill them, mail the results.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use formcast_core::BatchFailure;
use formcast_core::error::FormcastError;
use formcast_delivery::{FetchFailure, OutgoingMail, collect_attachments};
use formcast_document::BatchDriver;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument};

use crate::error::{ApiError, FailureEntry};
use crate::request::{SendJob, SendRequest};
use crate::state::AppState;
use crate::workspace::RequestWorkspace;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub message: String,
    pub processed: Vec<String>,
    pub failures: Vec<BatchFailure>,
    pub download_failures: Vec<FetchFailure>,
}

pub async fn send_pdfs(
    State(state): State<AppState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let show_details = state.config.environment.exposes_error_details();
    accept(&state, payload)
        .await
        .map(Json)
        .map_err(|err| err.with_details(show_details))
}

async fn accept(
    state: &AppState,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<SendResponse, ApiError> {
    let Json(request) = payload.map_err(|e| FormcastError::InvalidRequest(e.body_text()))?;
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let job = request.validate(&state.config.field_markers, &today)?;
    process(state, job).await
}

/// Run one validated request. The request folder is removed on every exit.
#[instrument(skip_all, fields(urls = job.urls.len(), recipient = %job.recipient))]
pub async fn process(state: &AppState, job: SendJob) -> Result<SendResponse, ApiError> {
    let workspace = RequestWorkspace::create(&state.config.storage_root).await?;
    let result = fill_and_send(state, job, &workspace).await;
    workspace.remove().await;
    result
}

async fn fill_and_send(
    state: &AppState,
    job: SendJob,
    workspace: &RequestWorkspace,
) -> Result<SendResponse, ApiError> {
    let downloads = state
        .fetcher
        .fetch_all(&job.urls, workspace.source_dir())
        .await?;
    if downloads.saved.is_empty() {
        let failures = downloads
            .failures
            .iter()
            .map(|f| FailureEntry {
                source: f.url.clone(),
                reason: f.reason.clone(),
            })
            .collect();
        let url = downloads
            .failures
            .first()
            .map(|f| f.url.clone())
            .unwrap_or_default();
        return Err(ApiError::from(FormcastError::Retrieval {
            url,
            reason: format!("all {} downloads failed", downloads.failures.len()),
        })
        .with_failures(failures));
    }

    let mut driver = BatchDriver::new(state.config.fill.clone())
        .with_workers(state.config.batch_workers)
        .with_document_timeout(Duration::from_secs(state.config.document_timeout_secs));
    if let Some(block) = job.title_block {
        driver = driver.with_title_block(block);
    }
    let outcome = driver
        .process_directory(
            workspace.source_dir(),
            workspace.output_dir(),
            &job.substitutions,
        )
        .await?;
    if outcome.processed.is_empty() {
        let failures = outcome
            .failures
            .iter()
            .map(|f| FailureEntry {
                source: f.file_name.clone(),
                reason: f.reason.clone(),
            })
            .collect();
        return Err(ApiError::from(FormcastError::NothingProcessed(format!(
            "none of {} documents could be filled",
            outcome.candidate_count()
        )))
        .with_failures(failures));
    }

    let attachments = collect_attachments(workspace.output_dir()).await?;
    state
        .mailer
        .send(&OutgoingMail {
            recipient: job.recipient.clone(),
            attachments,
            secondary_link: job.secondary_link,
        })
        .await?;

    info!(
        processed = outcome.processed.len(),
        failed = outcome.failures.len(),
        download_failures = downloads.failures.len(),
        "Request completed"
    );
    Ok(SendResponse {
        message: "PDF processed and sent successfully!".into(),
        processed: outcome.processed,
        failures: outcome.failures,
        download_failures: downloads.failures,
    })
}

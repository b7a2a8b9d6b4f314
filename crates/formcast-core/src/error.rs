// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for FormCast.

use thiserror::Error;

/// Top-level error type for all FormCast operations.
#[derive(Debug, Error)]
pub enum FormcastError {
    // -- Document errors --
    #[error("failed to load document: {0}")]
    DocumentLoad(String),

    #[error("failed to rewrite document: {0}")]
    Mutation(String),

    #[error("document processing timed out after {0}s")]
    Timeout(u64),

    // -- Retrieval / delivery --
    #[error("failed to retrieve {url}: {reason}")]
    Retrieval { url: String, reason: String },

    #[error("mail delivery failed: {0}")]
    Delivery(String),

    // -- Request surface --
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no document could be processed: {0}")]
    NothingProcessed(String),

    #[error("configuration error: {0}")]
    Config(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FormcastError>;

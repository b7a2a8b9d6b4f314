// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch driver — fills every PDF in a directory, isolating failures per file.
//
// Each document runs scan → plan → rewrite on the blocking pool under a
// per-document timeout. At most `workers` documents are in flight; results
// are reported in directory-listing order whatever order they finish in.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use formcast_core::error::FormcastError;
use formcast_core::{BatchFailure, BatchOutcome, FillOptions, SubstitutionMap};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::fill_document;
use crate::title_block::TitleBlock;

/// Processes directories of PDF templates.
#[derive(Debug, Clone)]
pub struct BatchDriver {
    options: Arc<FillOptions>,
    workers: usize,
    document_timeout: Duration,
    title_block: Option<Arc<TitleBlock>>,
}

impl BatchDriver {
    /// One worker, 60 second timeout, no title block.
    pub fn new(options: FillOptions) -> Self {
        Self {
            options: Arc::new(options),
            workers: 1,
            document_timeout: Duration::from_secs(60),
            title_block: None,
        }
    }

    /// Documents processed concurrently. Values below one are treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_document_timeout(mut self, timeout: Duration) -> Self {
        self.document_timeout = timeout;
        self
    }

    /// Stamp `block` onto every page after filling.
    pub fn with_title_block(mut self, block: TitleBlock) -> Self {
        self.title_block = Some(Arc::new(block));
        self
    }

    /// Fill every `.pdf` file directly inside `source_dir`, writing results
    /// under the same names in `dest_dir`.
    ///
    /// Fails only when a directory cannot be read or created. Per-document
    /// problems are reported in the outcome's `failures`.
    #[instrument(skip(self, map), fields(workers = self.workers))]
    pub async fn process_directory(
        &self,
        source_dir: &Path,
        dest_dir: &Path,
        map: &SubstitutionMap,
    ) -> Result<BatchOutcome, FormcastError> {
        let candidates = list_candidates(source_dir).await?;
        tokio::fs::create_dir_all(dest_dir).await?;

        info!(candidates = candidates.len(), "Batch started");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let map = Arc::new(map.clone());
        let mut pending = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let (file_name, path) = match candidate {
                Candidate::Document { file_name, path } => (file_name, path),
                Candidate::Unreadable { file_name, error } => {
                    pending.push((file_name, Err(error)));
                    continue;
                }
            };
            let sem = semaphore.clone();
            let map = map.clone();
            let options = self.options.clone();
            let title_block = self.title_block.clone();
            let timeout = self.document_timeout;
            let dest_path = dest_dir.join(&file_name);

            let handle = tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| FormcastError::Mutation(format!("worker pool closed: {e}")))?;
                process_one(&path, &dest_path, map, options, title_block, timeout).await
            });
            pending.push((file_name, Ok(handle)));
        }

        let mut outcome = BatchOutcome::default();
        for (file_name, job) in pending {
            let result = match job {
                Ok(handle) => match handle.await {
                    Ok(result) => result,
                    Err(join_err) => Err(FormcastError::Mutation(format!("worker failed: {join_err}"))),
                },
                Err(error) => Err(error),
            };
            match result {
                Ok(()) => outcome.processed.push(file_name),
                Err(err) => {
                    warn!(file = %file_name, error = %err, "Document skipped");
                    outcome.failures.push(BatchFailure {
                        file_name,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            processed = outcome.processed.len(),
            failed = outcome.failures.len(),
            "Batch finished"
        );
        Ok(outcome)
    }
}

/// A directory entry named like a PDF.
#[derive(Debug)]
enum Candidate {
    /// A regular file, directly or through a symlink.
    Document { file_name: String, path: PathBuf },
    /// An entry whose metadata could not be read, such as a dangling link.
    Unreadable { file_name: String, error: FormcastError },
}

/// Entries with a case-insensitive `.pdf` extension, in listing order.
/// Directories are skipped; anything that cannot be inspected is kept so it
/// is reported as a failure.
async fn list_candidates(dir: &Path) -> Result<Vec<Candidate>, FormcastError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        FormcastError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot read {}: {e}", dir.display()),
        ))
    })?;

    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !has_pdf_extension(&path) {
            debug!(path = %path.display(), "Not a PDF candidate");
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        // `metadata` follows symlinks, unlike `DirEntry::file_type`.
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => candidates.push(Candidate::Document { file_name, path }),
            Ok(_) => debug!(path = %path.display(), "Not a regular file"),
            Err(err) => candidates.push(Candidate::Unreadable {
                file_name,
                error: FormcastError::Io(std::io::Error::new(
                    err.kind(),
                    format!("cannot inspect {}: {err}", path.display()),
                )),
            }),
        }
    }
    Ok(candidates)
}

pub(crate) fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

async fn process_one(
    source: &Path,
    dest: &Path,
    map: Arc<SubstitutionMap>,
    options: Arc<FillOptions>,
    title_block: Option<Arc<TitleBlock>>,
    timeout: Duration,
) -> Result<(), FormcastError> {
    let bytes = tokio::fs::read(source).await?;

    let work = tokio::task::spawn_blocking(move || {
        let filled = fill_document(&bytes, &map, &options)?;
        match title_block {
            Some(block) => block.stamp(&filled),
            None => Ok(filled),
        }
    });

    let output = match tokio::time::timeout(timeout, work).await {
        Ok(Ok(result)) => result?,
        Ok(Err(join_err)) => {
            return Err(FormcastError::Mutation(format!("processing panicked: {join_err}")));
        }
        Err(_) => return Err(FormcastError::Timeout(timeout.as_secs())),
    };

    tokio::fs::write(dest, &output).await?;
    debug!(
        dest = %dest.display(),
        bytes = output.len(),
        sha256 = %hex::encode(Sha256::digest(&output)),
        "Document written"
    );
    Ok(())
}

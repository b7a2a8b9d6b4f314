// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-request scratch folders.
//
// Every request gets a randomly named folder under the storage root holding
// `source/` (downloads) and `output/` (filled documents). Handlers remove it
// with `remove` when they finish. A workspace dropped without that, e.g. when
// the request future is cancelled, is removed synchronously in `Drop`.

use std::path::{Path, PathBuf};

use formcast_core::error::FormcastError;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct RequestWorkspace {
    root: PathBuf,
    source: PathBuf,
    output: PathBuf,
    removed: bool,
}

impl RequestWorkspace {
    pub async fn create(storage_root: &Path) -> Result<Self, FormcastError> {
        let root = storage_root.join(Uuid::new_v4().simple().to_string());
        let source = root.join("source");
        let output = root.join("output");
        tokio::fs::create_dir_all(&source).await?;
        tokio::fs::create_dir_all(&output).await?;
        debug!(root = %root.display(), "Request workspace created");
        Ok(Self {
            root,
            source,
            output,
            removed: false,
        })
    }

    /// Delete the folder and everything in it.
    pub async fn remove(mut self) {
        let result = tokio::fs::remove_dir_all(&self.root).await;
        log_removal(&self.root, result);
        self.removed = true;
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self) -> &Path {
        &self.source
    }

    pub fn output_dir(&self) -> &Path {
        &self.output
    }
}

impl Drop for RequestWorkspace {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        debug!(root = %self.root.display(), "Workspace dropped before removal");
        log_removal(&self.root, std::fs::remove_dir_all(&self.root));
    }
}

fn log_removal(root: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => debug!(root = %root.display(), "Request workspace removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(root = %root.display(), error = %e, "Could not remove request workspace"),
    }
}

//! Deleting confirmed matches. Each file is removed on its own; nothing is rolled back.

use std::path::PathBuf;

use crate::records::QueryResult;
use crate::search::QueryEngine;

/// Literal reply that confirms a pending deletion.
pub const CONFIRM_WORD: &str = "yes";

/// Only `yes` (any case, surrounding whitespace ignored) confirms. Anything else cancels.
pub fn is_confirmation(reply: &str) -> bool {
    reply.trim().eq_ignore_ascii_case(CONFIRM_WORD)
}

#[derive(Debug)]
pub struct DeletionOutcome {
    pub path: PathBuf,
    pub result: Result<(), std::io::Error>,
}

impl DeletionOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Removes each result's file, in order. Successful deletions are forgotten by the engine.
/// Paths repeated in `results` are attempted once.
pub async fn delete_files(results: &[QueryResult], engine: &QueryEngine) -> Vec<DeletionOutcome> {
    let mut outcomes: Vec<DeletionOutcome> = Vec::with_capacity(results.len());
    for r in results {
        let path = &r.record.path;
        if outcomes.iter().any(|o| &o.path == path) {
            continue;
        }
        let result = tokio::fs::remove_file(path).await;
        match &result {
            Ok(()) => {
                engine.forget(path).await;
                tracing::info!(path = %path.display(), "deleted");
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "delete failed"),
        }
        outcomes.push(DeletionOutcome {
            path: path.clone(),
            result,
        });
    }
    outcomes
}

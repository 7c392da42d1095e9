//! Delegated retrieval: the seam between the query engine and an external semantic index.

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::LlmError;
use crate::records::ImageRecord;

/// Marker that precedes the image path inside every indexed document.
pub const FILE_PATH_MARKER: &str = "File Path:";

/// A scored text chunk as returned by a retrieval backend, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub content: String,
    pub score: f32,
}

/// An external semantic index over caption documents.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn insert(&self, records: &[ImageRecord]) -> Result<(), LlmError>;

    /// Forget the document for a deleted image. Backends that cannot remove are allowed to no-op.
    async fn remove(&self, _path: &str) {}

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredChunk>, LlmError>;
}

/// How the engine answers queries.
#[derive(Clone, Default)]
pub enum Retrieval {
    /// Substring and date scoring over the record store only.
    #[default]
    Local,
    /// Ask the backend first, fall back to local scoring on any failure.
    Remote(Arc<dyn RetrievalBackend>),
}

impl Retrieval {
    pub fn is_remote(&self) -> bool {
        matches!(self, Retrieval::Remote(_))
    }
}

impl std::fmt::Debug for Retrieval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Retrieval::Local => f.write_str("Local"),
            Retrieval::Remote(_) => f.write_str("Remote"),
        }
    }
}

/// Text indexed for one image. The `File Path:` line is what [`extract_file_path`] reads back.
pub fn document_text(record: &ImageRecord) -> String {
    format!(
        "Image Caption: {}\nCreation Date: {}\nCreation Time: {}\n{} {}",
        record.caption,
        record.creation_date,
        record.creation_time,
        FILE_PATH_MARKER,
        record.path.display()
    )
}

/// The value after the last `File Path:` up to the end of that line, trimmed.
/// The path line comes after the caption, so marker text inside a caption is ignored.
pub fn extract_file_path(content: &str) -> Option<&str> {
    let start = content.rfind(FILE_PATH_MARKER)? + FILE_PATH_MARKER.len();
    let rest = &content[start..];
    let value = rest.split('\n').next().unwrap_or(rest).trim();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::record;

    #[test]
    fn document_round_trips_path() {
        let r = record("/home/me/Desktop/Screen Shot 1.png", "a cat", "2024-01-05");
        let text = document_text(&r);
        assert!(text.starts_with("Image Caption: a cat\n"));
        assert_eq!(extract_file_path(&text), Some("/home/me/Desktop/Screen Shot 1.png"));
    }

    #[test]
    fn path_runs_to_end_of_line() {
        let content = "noise\nFile Path:   /a/b.png  \nCreation Date: 2024-01-01";
        assert_eq!(extract_file_path(content), Some("/a/b.png"));
    }

    #[test]
    fn marker_inside_caption_is_ignored() {
        let r = record("/real/b.png", "a note reading File Path: /other/a.png", "2024-01-05");
        assert_eq!(extract_file_path(&document_text(&r)), Some("/real/b.png"));
    }

    #[test]
    fn missing_or_empty_marker() {
        assert_eq!(extract_file_path("Image Caption: dog"), None);
        assert_eq!(extract_file_path("File Path:\nmore"), None);
    }
}

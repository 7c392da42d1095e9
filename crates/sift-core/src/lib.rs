//! All backend logic independent of how the app is run (interactive CLI or file browser).
//!
//! Images live in a folder the user chooses. Sift stores only its config in its own
//! app data directory (see [app_data]); records and the semantic index are in memory.

pub mod app_data;
pub mod assistant;
pub mod browser;
pub mod cleanup;
pub mod config;
pub mod dates;
pub mod images;
pub mod index;
pub mod llm;
pub mod ollama;
pub mod records;
pub mod retrieval;
pub mod search;
pub mod session;
pub mod store;
pub mod watcher;

pub use app_data::{app_data_dir, default_image_root};
pub use assistant::{Assistant, Intent, QueryIntent};
pub use browser::{router, serve, BrowseError};
pub use cleanup::{delete_files, is_confirmation, DeletionOutcome};
pub use config::{get_image_root, load_config, set_image_root, Config, ConfigError};
pub use dates::{is_date_in_range, DateRange};
pub use images::{ingest, ingest_all, scan_images, IngestError, ScanError};
pub use index::EmbeddingRetrieval;
pub use llm::{Captioner, LanguageModel, LlmError};
pub use ollama::{OllamaClient, OllamaError};
pub use records::{ImageRecord, QueryResult, RecordStore};
pub use retrieval::{Retrieval, RetrievalBackend, ScoredChunk};
pub use search::QueryEngine;
pub use session::Session;
pub use watcher::{watch_images, ImageWatcher, WatchError};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "sift-core ready"
}

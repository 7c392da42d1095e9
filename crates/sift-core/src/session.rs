//! Wiring: picks collaborators from config and Ollama availability, builds the engine,
//! runs the initial scan and starts the watcher.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::assistant::Assistant;
use crate::config::Config;
use crate::images::{ingest_all, scan_images, ScanError};
use crate::index::EmbeddingRetrieval;
use crate::llm::{Captioner, NoCaptioner};
use crate::ollama::OllamaClient;
use crate::records::RecordStore;
use crate::retrieval::Retrieval;
use crate::search::QueryEngine;
use crate::watcher::{run_ingest_loop, watch_images, ImageWatcher, WatchError};

/// Everything the interactive loop needs, built once at startup.
pub struct Session {
    pub engine: Arc<QueryEngine>,
    pub captioner: Arc<dyn Captioner>,
    pub config: Config,
}

impl Session {
    /// Uses Ollama for captions, retrieval and the assistant when it answers;
    /// otherwise (or with `offline`) everything runs locally.
    pub async fn connect(config: Config, offline: bool) -> Self {
        let store = Arc::new(RecordStore::new());
        if offline {
            tracing::info!("offline mode: local search only");
            return Self::local(config, store);
        }
        let client = match OllamaClient::from_config(&config) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "bad Ollama config, falling back to local search");
                return Self::local(config, store);
            }
        };
        if !client.is_available().await {
            tracing::warn!(url = %config.ollama_url, "Ollama unavailable, falling back to local search");
            return Self::local(config, store);
        }
        tracing::info!(chat = %config.chat_model, caption = %config.caption_model, "connected to Ollama");
        let retrieval = Retrieval::Remote(Arc::new(EmbeddingRetrieval::new(client.clone())));
        let client = Arc::new(client);
        let engine = QueryEngine::new(store, retrieval, Assistant::new(client.clone()));
        Self {
            engine: Arc::new(engine),
            captioner: client,
            config,
        }
    }

    pub fn local(config: Config, store: Arc<RecordStore>) -> Self {
        Self {
            engine: Arc::new(QueryEngine::local(store)),
            captioner: Arc::new(NoCaptioner),
            config,
        }
    }

    /// Scans and ingests every image under `root`. Returns how many records were added.
    pub async fn index_root(&self, root: &Path) -> Result<usize, ScanError> {
        let paths = scan_images(root, &self.config.extensions)?;
        tracing::info!(count = paths.len(), root = %root.display(), "found existing images");
        let records = ingest_all(&paths, self.captioner.as_ref()).await;
        let added = records.len();
        self.engine.add_records(records).await;
        Ok(added)
    }

    /// Starts watching `root`; changed images are ingested on a background task.
    /// Must be called inside a Tokio runtime.
    pub fn start_watching(&self, root: &Path) -> Result<ImageWatcher, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = watch_images(root, self.config.extensions.clone(), self.config.cooldown(), tx)?;
        tokio::spawn(run_ingest_loop(rx, self.engine.clone(), self.captioner.clone()));
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::PNG_HEADER;

    #[tokio::test]
    async fn offline_session_indexes_locally() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.png"), PNG_HEADER).unwrap();
        std::fs::write(dir.path().join("two.png"), PNG_HEADER).unwrap();
        std::fs::write(dir.path().join("skip.jpg"), b"x").unwrap();

        let session = Session::connect(Config::default(), true).await;
        assert!(!session.engine.retrieval().is_remote());
        assert!(!session.engine.assistant().has_model());
        assert_eq!(session.index_root(dir.path()).await.unwrap(), 2);
        assert_eq!(session.engine.store().len(), 2);
        // No captions offline, so only the empty query matches.
        assert!(session.engine.search("cat", 5).await.is_empty());
        assert_eq!(session.engine.search("", 5).await.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_ollama_falls_back() {
        let mut config = Config::default();
        config.ollama_url = "http://127.0.0.1:9".into();
        let session = Session::connect(config, false).await;
        assert!(!session.engine.retrieval().is_remote());
    }

    #[tokio::test]
    async fn index_missing_root_is_an_error() {
        let session = Session::connect(Config::default(), true).await;
        assert!(session.index_root(Path::new("/no/such/dir")).await.is_err());
    }
}

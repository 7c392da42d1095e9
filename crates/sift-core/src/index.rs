//! Index pipeline: record → document → embed → store. An in-memory semantic index
//! behind the [`RetrievalBackend`] seam.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::llm::LlmError;
use crate::ollama::OllamaClient;
use crate::records::ImageRecord;
use crate::retrieval::{document_text, RetrievalBackend, ScoredChunk};
use crate::store::{Document, VectorStore};

/// Caption documents embedded with Ollama and searched by cosine similarity.
pub struct EmbeddingRetrieval {
    client: OllamaClient,
    store: RwLock<VectorStore>,
}

impl EmbeddingRetrieval {
    pub fn new(client: OllamaClient) -> Self {
        Self {
            client,
            store: RwLock::new(VectorStore::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }
}

#[async_trait]
impl RetrievalBackend for EmbeddingRetrieval {
    async fn insert(&self, records: &[ImageRecord]) -> Result<(), LlmError> {
        if records.is_empty() {
            return Ok(());
        }
        let documents: Vec<Document> = records
            .iter()
            .map(|r| Document {
                id: r.path.to_string_lossy().into_owned(),
                text: document_text(r),
            })
            .collect();
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let embeddings = self.client.embed_batch(&texts).await?;

        let mut store = self.store.write().await;
        store.add_batch(documents, embeddings);
        tracing::info!(added = records.len(), total = store.len(), "indexed caption documents");
        Ok(())
    }

    async fn remove(&self, path: &str) {
        self.store.write().await.remove(path);
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredChunk>, LlmError> {
        let embedding = self.client.embed(text).await?;
        let store = self.store.read().await;
        Ok(store
            .search(&embedding, top_k)
            .into_iter()
            .map(|(doc, score)| ScoredChunk {
                content: doc.text,
                score,
            })
            .collect())
    }
}

//! Query engine: free text in, at most `top_k` ranked records out.
//!
//! Remote retrieval is tried first when configured; every failure on that path
//! lands in local substring/date scoring, so callers always get a result list.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::assistant::Assistant;
use crate::dates::{is_date_in_range, DateRange};
use crate::llm::LlmError;
use crate::records::{ImageRecord, QueryResult, RecordStore};
use crate::retrieval::{extract_file_path, Retrieval, RetrievalBackend, ScoredChunk};

/// Score for a caption containing the query text.
pub const CAPTION_MATCH_SCORE: f64 = 0.8;
/// Score for a creation date inside the extracted range.
pub const DATE_MATCH_SCORE: f64 = 0.9;

pub struct QueryEngine {
    store: Arc<RecordStore>,
    retrieval: Retrieval,
    assistant: Assistant,
}

impl QueryEngine {
    pub fn new(store: Arc<RecordStore>, retrieval: Retrieval, assistant: Assistant) -> Self {
        Self {
            store,
            retrieval,
            assistant,
        }
    }

    /// Local scoring only, no model.
    pub fn local(store: Arc<RecordStore>) -> Self {
        Self::new(store, Retrieval::Local, Assistant::offline())
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn retrieval(&self) -> &Retrieval {
        &self.retrieval
    }

    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    /// Appends records to the store and, when remote, to the backend index.
    /// Index failures are logged; the local store always gets the records.
    pub async fn add_records(&self, records: Vec<ImageRecord>) {
        if records.is_empty() {
            return;
        }
        if let Retrieval::Remote(backend) = &self.retrieval {
            if let Err(e) = backend.insert(&records).await {
                tracing::warn!(error = %e, "could not index records remotely");
            }
        }
        self.store.add(records);
    }

    /// Forgets a deleted file in both the store and the backend.
    pub async fn forget(&self, path: &Path) {
        self.store.remove(path);
        if let Retrieval::Remote(backend) = &self.retrieval {
            backend.remove(&path.to_string_lossy()).await;
        }
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Vec<QueryResult> {
        match &self.retrieval {
            Retrieval::Remote(backend) => match self.delegated_search(backend.as_ref(), query, top_k).await {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!(error = %e, "remote search failed, using local search");
                    self.local_search(query, top_k).await
                }
            },
            Retrieval::Local => self.local_search(query, top_k).await,
        }
    }

    pub async fn parse_date_query(&self, query: &str) -> DateRange {
        self.assistant.extract_dates(query).await
    }

    async fn delegated_search(
        &self,
        backend: &dyn RetrievalBackend,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<QueryResult>, LlmError> {
        let rewritten = self.assistant.rewrite_query(query).await;
        tracing::debug!(%query, %rewritten, "remote search");
        let chunks = backend.query(&rewritten, top_k).await?;
        let results = resolve_chunks(&chunks, &self.store);
        let range = self.parse_date_query(query).await;
        Ok(rank(filter_by_date(results, &range), top_k))
    }

    async fn local_search(&self, query: &str, top_k: usize) -> Vec<QueryResult> {
        let range = self.parse_date_query(query).await;
        score_records(&self.store.snapshot(), query, &range, top_k)
    }
}

/// Paths out of chunk text, first occurrence wins, matched against local records.
/// Chunks without a path or without a local record are dropped.
pub fn resolve_chunks(chunks: &[ScoredChunk], store: &RecordStore) -> Vec<QueryResult> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();
    for chunk in chunks {
        let Some(path) = extract_file_path(&chunk.content) else {
            continue;
        };
        if !seen.insert(path.to_string()) {
            continue;
        }
        match store.find(Path::new(path)) {
            Some(record) => results.push(QueryResult::new(record, chunk.score)),
            None => tracing::debug!(%path, "retrieved path has no local record"),
        }
    }
    results
}

/// Local fallback scoring over a snapshot.
pub fn score_records(
    records: &[ImageRecord],
    query: &str,
    range: &DateRange,
    top_k: usize,
) -> Vec<QueryResult> {
    let needle = query.to_lowercase();
    let results = records
        .iter()
        .filter_map(|record| {
            let score = score_record(record, &needle, range);
            (score > 0.0).then(|| QueryResult::new(record.clone(), score))
        })
        .collect();
    rank(results, top_k)
}

/// `needle` must already be lower-cased. Summed in f64 so both hits land exactly on 1.7f32.
fn score_record(record: &ImageRecord, needle: &str, range: &DateRange) -> f32 {
    let mut score = 0.0_f64;
    if record.caption.to_lowercase().contains(needle) {
        score += CAPTION_MATCH_SCORE;
    }
    if range.is_constrained() && is_date_in_range(&record.creation_date, range) {
        score += DATE_MATCH_SCORE;
    }
    score as f32
}

/// Keeps results inside `range`; an unconstrained range keeps everything.
pub fn filter_by_date(results: Vec<QueryResult>, range: &DateRange) -> Vec<QueryResult> {
    if !range.is_constrained() {
        return results;
    }
    results
        .into_iter()
        .filter(|r| is_date_in_range(&r.record.creation_date, range))
        .collect()
}

/// Stable sort by score, best first, then truncate.
fn rank(mut results: Vec<QueryResult>, top_k: usize) -> Vec<QueryResult> {
    results.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    results.truncate(top_k);
    results
}

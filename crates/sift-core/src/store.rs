//! In-memory vector store for caption document embeddings. Supports add and similarity search.
//! No persistence; the store is discarded when the process exits.

/// A text document to index. `id` is the image path it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
}

/// A document with its embedding, stored for similarity search.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub document: Document,
    /// Normalized embedding vector (unit length for cosine similarity via dot product).
    embedding: Vec<f32>,
}

/// In-memory vector store. Holds documents and their embeddings; supports similarity search.
#[derive(Debug, Default)]
pub struct VectorStore {
    items: Vec<IndexedDocument>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Add a document with its embedding. Embedding is normalized before storage.
    pub fn add(&mut self, document: Document, embedding: Vec<f32>) {
        let norm = normalize(&embedding);
        self.items.push(IndexedDocument {
            document,
            embedding: norm,
        });
    }

    /// Add documents with their embeddings. Extra items on either side are ignored.
    pub fn add_batch(&mut self, documents: Vec<Document>, embeddings: Vec<Vec<f32>>) {
        for (document, embedding) in documents.into_iter().zip(embeddings) {
            self.add(document, embedding);
        }
    }

    /// Drop every document with this id.
    pub fn remove(&mut self, id: &str) {
        self.items.retain(|d| d.document.id != id);
    }

    /// Search for documents most similar to the query embedding. Returns up to k results
    /// with cosine similarity scores, best first.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Vec<(Document, f32)> {
        if self.items.is_empty() || query_embedding.is_empty() {
            return Vec::new();
        }
        let q_norm = normalize(query_embedding);
        let mut scored: Vec<(Document, f32)> = self
            .items
            .iter()
            .map(|d| (d.document.clone(), dot(&q_norm, &d.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            text: format!("File Path: {id}"),
        }
    }

    #[test]
    fn search_ranks_by_cosine() {
        let mut store = VectorStore::new();
        store.add_batch(
            vec![doc("x"), doc("y"), doc("xy")],
            vec![vec![1.0, 0.0], vec![0.0, 3.0], vec![1.0, 1.0]],
        );
        let hits = store.search(&[2.0, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, "x");
        assert_eq!(hits[1].0.id, "xy");
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn remove_and_empty_query() {
        let mut store = VectorStore::new();
        store.add(doc("a"), vec![1.0]);
        store.add(doc("a"), vec![0.5]);
        store.add(doc("b"), vec![1.0]);
        store.remove("a");
        assert_eq!(store.len(), 1);
        assert!(store.search(&[], 5).is_empty());
    }
}

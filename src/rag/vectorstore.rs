//! Vector store: document ingest and similarity search (§4.4 "Similarity
//! metric").
//!
//! Cosine distance = `1 - (A·B)/(‖A‖·‖B‖)`, clamped so similarity stays in
//! `[-1, 1]`. A zero-magnitude vector on either side is treated as distance
//! `1.0` (no similarity) rather than dividing by zero.

use crate::types::Document;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::RwLock;

/// Holds embedded documents and answers similarity queries against them.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Ingests documents that already carry an embedding. Rejects any
    /// document with a null/empty embedding.
    async fn add_documents(&self, documents: Vec<Document>) -> Result<()>;

    /// Returns the `top_k` documents nearest `query_embedding`, each with
    /// `score = 1 - distance`, sorted by ascending distance (descending
    /// score).
    async fn similarity_search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<Document>>;
}

fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::vector_store(format!(
            "embedding dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(1.0);
    }

    let similarity = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    Ok(1.0 - similarity)
}

/// Linear-scan, in-memory reference implementation.
#[derive(Default)]
pub struct InMemoryVectorStore {
    documents: RwLock<Vec<Document>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_documents(&self, documents: Vec<Document>) -> Result<()> {
        for doc in &documents {
            match &doc.embedding {
                None => return Err(Error::vector_store(format!("document '{}' has no embedding", doc.id))),
                Some(v) if v.is_empty() => {
                    return Err(Error::vector_store(format!("document '{}' has an empty embedding", doc.id)))
                }
                Some(_) => {}
            }
        }
        self.documents.write().unwrap().extend(documents);
        Ok(())
    }

    async fn similarity_search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<Document>> {
        let documents = self.documents.read().unwrap();
        let mut scored = Vec::with_capacity(documents.len());

        for doc in documents.iter() {
            let Some(embedding) = &doc.embedding else { continue };
            let distance = cosine_distance(embedding, query_embedding)?;
            let mut scored_doc = doc.clone();
            scored_doc.score = Some(1.0 - distance);
            scored.push((distance, scored_doc));
        }

        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(scored.into_iter().take(top_k).map(|(_, doc)| doc).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, embedding: Vec<f32>) -> Document {
        let mut d = Document::new(id, format!("content for {id}"), "text");
        d.embedding = Some(embedding);
        d
    }

    #[tokio::test]
    async fn test_add_documents_rejects_missing_embedding() {
        let store = InMemoryVectorStore::new();
        let err = store.add_documents(vec![Document::new("1", "no embedding", "text")]).await.unwrap_err();
        assert!(matches!(err, Error::VectorStore(_)));
    }

    #[tokio::test]
    async fn test_similarity_search_orders_by_ascending_distance() {
        let store = InMemoryVectorStore::new();
        store
            .add_documents(vec![
                doc("close", vec![1.0, 0.0]),
                doc("far", vec![0.0, 1.0]),
                doc("exact", vec![2.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.similarity_search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score.unwrap() >= results[1].score.unwrap());
        assert!(results.iter().any(|d| d.id == "exact"));
    }

    #[tokio::test]
    async fn test_similarity_search_dimension_mismatch_errors() {
        let store = InMemoryVectorStore::new();
        store.add_documents(vec![doc("a", vec![1.0, 0.0, 0.0])]).await.unwrap();
        let err = store.similarity_search(&[1.0, 0.0], 5).await.unwrap_err();
        assert!(matches!(err, Error::VectorStore(_)));
    }

    #[test]
    fn test_cosine_distance_zero_vector_is_no_similarity() {
        let distance = cosine_distance(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        assert_eq!(distance, 1.0);
    }
}

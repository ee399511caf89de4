//! Embedding provider: turns document/query text into vectors for
//! similarity search (§4.4 step 1).

use crate::types::Document;
use crate::Result;
use async_trait::async_trait;

/// Produces embedding vectors for documents and queries.
///
/// Implementations call out to whatever embedding model/service is
/// configured; this crate ships no concrete implementation (no third-party
/// embedding API is bundled), matching the spec's "vectorstore/embedding
/// backends are pluggable" stance.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds each document's content in place on a defensive copy, leaving
    /// the input slice untouched.
    async fn embed_documents(&self, documents: &[Document]) -> Result<Vec<Document>>;

    /// Embeds a single query string.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>>;
}

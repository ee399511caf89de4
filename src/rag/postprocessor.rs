//! Post-processors: pluggable reordering/filtering steps run after
//! similarity search (§4.4 step 5, "Reference post-processors").

use crate::types::Document;
use crate::Result;
use async_trait::async_trait;

/// A step that may reorder, filter, or rescore retrieved documents.
#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn process(&self, question: &str, documents: Vec<Document>) -> Result<Vec<Document>>;
}

/// Drops any document scoring below `min_score`.
pub struct ScoreThresholdFilter {
    pub min_score: f32,
}

impl ScoreThresholdFilter {
    pub fn new(min_score: f32) -> Self {
        Self { min_score }
    }
}

#[async_trait]
impl PostProcessor for ScoreThresholdFilter {
    async fn process(&self, _question: &str, documents: Vec<Document>) -> Result<Vec<Document>> {
        Ok(documents
            .into_iter()
            .filter(|d| d.score.unwrap_or(0.0) >= self.min_score)
            .collect())
    }
}

/// Caps the result list at `n` documents, keeping the first `n` in whatever
/// order they arrive (run after a threshold filter per §4.4's ordering).
pub struct TopNLimiter {
    pub n: usize,
}

impl TopNLimiter {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

#[async_trait]
impl PostProcessor for TopNLimiter {
    async fn process(&self, _question: &str, documents: Vec<Document>) -> Result<Vec<Document>> {
        Ok(documents.into_iter().take(self.n).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, score: f32) -> Document {
        let mut d = Document::new(id, "content", "text");
        d.score = Some(score);
        d
    }

    #[tokio::test]
    async fn test_score_threshold_filter_drops_below_minimum() {
        let filter = ScoreThresholdFilter::new(0.5);
        let docs = vec![doc("a", 0.9), doc("b", 0.3), doc("c", 0.5)];
        let result = filter.process("q", docs).await.unwrap();
        let ids: Vec<_> = result.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_top_n_limiter_caps_count() {
        let limiter = TopNLimiter::new(2);
        let docs = vec![doc("a", 0.9), doc("b", 0.8), doc("c", 0.7)];
        let result = limiter.process("q", docs).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, "a");
    }
}

//! Vector-store access for the RAG tool.
//!
//! The vector store, the embedding service, and document ingestion are all
//! external collaborators — this crate only specifies the search boundary
//! and ships the REST client that talks to the real service. Tests use
//! in-crate mock implementations of [`VectorStore`].

pub mod rest;

pub use rest::RestVectorStoreClient;

use rl_domain::error::Result;
use serde::{Deserialize, Serialize};

/// One retrieved document chunk with its raw distance score.
///
/// `distance` is what the store reports (smaller = closer); relevance for
/// display is `1 − distance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub content: String,
    pub distance: f64,
}

impl ScoredDocument {
    pub fn relevance(&self) -> f64 {
        1.0 - self.distance
    }
}

/// Similarity search over the external document index.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Return up to `max_results` chunks, most relevant first.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<ScoredDocument>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_inverts_distance() {
        let doc = ScoredDocument {
            content: "x".into(),
            distance: 0.25,
        };
        assert!((doc.relevance() - 0.75).abs() < 1e-9);
    }
}

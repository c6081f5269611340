//! Knowledge-base search over the external vector store.

use std::sync::Arc;

use serde_json::Value;

use rl_domain::error::{Error, Result};
use rl_domain::message::ToolDefinition;
use rl_retrieval::VectorStore;

use crate::registry::Tool;

pub const RAG_TOOL_NAME: &str = "rag_search";

const DEFAULT_MAX_RESULTS: usize = 5;

/// Searches the document index and formats the hits for the model, one
/// paragraph per document, most relevant first.
pub struct RagSearchTool {
    store: Arc<dyn VectorStore>,
}

impl RagSearchTool {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Run a search directly (used by the orchestrator's pre-retrieval
    /// step, which bypasses argument-JSON plumbing).
    pub async fn search(&self, query: &str, max_results: usize) -> Result<String> {
        let docs = self
            .store
            .search(query, max_results)
            .await
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        let formatted: Vec<String> = docs
            .iter()
            .map(|doc| {
                format!(
                    "Document: {}\n(Relevance: {:.2})",
                    doc.content,
                    doc.relevance()
                )
            })
            .collect();

        Ok(formatted.join("\n\n"))
    }
}

#[async_trait::async_trait]
impl Tool for RagSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: RAG_TOOL_NAME.into(),
            description: "Search the knowledge base for documents relevant to a query. \
                          Returns the matching document chunks with relevance scores."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural-language search query"
                    },
                    "maxResults": {
                        "type": "integer",
                        "description": "Maximum number of documents to return (default 5)"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, arguments: &Value) -> Result<String> {
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| Error::InvalidRequest("query is required".into()))?;

        let max_results = arguments
            .get("maxResults")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        self.search(query, max_results).await
    }
}

//! Tools the reasoning service may call.
//!
//! The set of tools is closed: each capability is a [`ToolKind`] variant with
//! a fixed name, description, and JSON Schema for its parameters. The
//! [`ToolRegistry`] advertises the schemas and dispatches calls by name.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  ┌──────────────────┐ ┌────────────────┐ │
//! │  │ get_current_date │ │ retrieve_      │ │
//! │  │     (clock)      │ │ documents_tool │ │
//! │  └──────────────────┘ └───────┬────────┘ │
//! └───────────────────────────────┼──────────┘
//!                                 ▼
//!                        Retriever → VectorIndex
//! ```
//!
//! Failures come back as [`ToolError`] values; the orchestrator turns them
//! into textual tool results so the conversation can continue.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::error::ServiceError;
use crate::retriever::{Retrieval, Retriever};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    CurrentDate,
    RetrieveDocuments,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::CurrentDate, ToolKind::RetrieveDocuments];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::CurrentDate => "get_current_date",
            ToolKind::RetrieveDocuments => "retrieve_documents_tool",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::CurrentDate => {
                "Get the current date in ISO format (YYYY-MM-DD). Use this for questions about \
                 today's date, what day it is, date calculations, or determining if today is a weekend."
            }
            ToolKind::RetrieveDocuments => {
                "Search internal company documents, policies, product specifications, FAQs, or \
                 knowledge base using semantic search. Use this when the user asks about company \
                 policies, HR topics, product features, specifications, or any information that \
                 might be in internal documents."
            }
        }
    }

    pub fn parameters_schema(&self) -> Value {
        match self {
            ToolKind::CurrentDate => json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            ToolKind::RetrieveDocuments => json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to find relevant information in the documents"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Declarative description of a tool, as advertised to the reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    /// The OpenAI function-calling shape.
    pub fn to_function(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Successful tool result.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Retrieval(Retrieval),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: &'static str, reason: String },

    #[error("{tool} failed: {source}")]
    Execution {
        tool: &'static str,
        #[source]
        source: ServiceError,
    },
}

pub struct ToolRegistry {
    tools: Vec<ToolKind>,
    retriever: Arc<Retriever>,
}

impl ToolRegistry {
    /// Registry with every built-in tool.
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self {
            tools: ToolKind::ALL.to_vec(),
            retriever,
        }
    }

    pub fn tools(&self) -> &[ToolKind] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<ToolKind> {
        ToolKind::from_name(name).filter(|k| self.tools.contains(k))
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(ToolKind::schema).collect()
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    /// Run the tool registered under `name`.
    pub async fn execute(&self, name: &str, arguments: &Value) -> Result<ToolOutput, ToolError> {
        let kind = self
            .find(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        if !(arguments.is_object() || arguments.is_null()) {
            return Err(ToolError::InvalidArguments {
                tool: kind.name(),
                reason: format!("expected a JSON object, got {}", arguments),
            });
        }

        match kind {
            ToolKind::CurrentDate => Ok(ToolOutput::Text(current_date())),
            ToolKind::RetrieveDocuments => {
                let query = arguments
                    .get("query")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .ok_or_else(|| ToolError::InvalidArguments {
                        tool: kind.name(),
                        reason: "query must not be empty".to_string(),
                    })?;
                self.retriever
                    .retrieve(query)
                    .await
                    .map(ToolOutput::Retrieval)
                    .map_err(|source| ToolError::Execution {
                        tool: kind.name(),
                        source,
                    })
            }
        }
    }
}

/// Today's UTC date as `YYYY-MM-DD`.
pub fn current_date() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::index::{IndexHandle, VectorIndex};
    use async_trait::async_trait;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
            Err(ServiceError::Transient("model is loading".to_string()))
        }
    }

    fn registry() -> ToolRegistry {
        let retriever = Retriever::new(
            Arc::new(FailingEmbedder),
            IndexHandle::new(VectorIndex::new(2)),
            5,
            0.05,
        );
        ToolRegistry::new(Arc::new(retriever))
    }

    #[test]
    fn test_schemas_cover_builtins() {
        let names: Vec<String> = registry().schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["get_current_date", "retrieve_documents_tool"]);
    }

    #[test]
    fn test_function_shape() {
        let f = ToolKind::RetrieveDocuments.schema().to_function();
        assert_eq!(f["type"], "function");
        assert_eq!(f["function"]["name"], "retrieve_documents_tool");
        assert_eq!(f["function"]["parameters"]["required"][0], "query");
    }

    #[tokio::test]
    async fn test_clock_returns_iso_date() {
        let out = registry()
            .execute("get_current_date", &json!({}))
            .await
            .unwrap();
        match out {
            ToolOutput::Text(date) => {
                assert!(chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_ok());
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let err = registry().execute("launch_rockets", &json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(ref n) if n == "launch_rockets"));
        assert_eq!(err.to_string(), "Unknown tool: launch_rockets");
    }

    #[tokio::test]
    async fn test_retrieval_requires_query() {
        let err = registry()
            .execute("retrieve_documents_tool", &json!({ "query": "  " }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_undecodable_arguments_rejected() {
        let err = registry()
            .execute("retrieve_documents_tool", &json!("{not json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_execution_failure_is_a_value() {
        let err = registry()
            .execute("retrieve_documents_tool", &json!({ "query": "leave" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution { .. }));
        assert!(err.to_string().contains("model is loading"));
    }
}

//! Chat request handling at the application boundary.
//!
//! Owns session creation (a missing session id becomes a fresh UUID v4) and
//! the degradation policy: runtime failures turn into the fallback answer so
//! callers always receive a well-formed [`ChatResponse`]. The one exception
//! is a reasoning or embedding service that stayed unavailable through every
//! retry, which is reported as [`ServiceError::ServiceUnavailable`].

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::orchestrator::Orchestrator;
use crate::prompts::FALLBACK_ANSWER;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub source: Vec<String>,
    pub session_id: String,
}

/// Answer one query, creating a session id when none was supplied.
pub async fn process_chat(
    orchestrator: &Orchestrator,
    query: &str,
    session_id: Option<String>,
) -> Result<ChatResponse, ServiceError> {
    let session_id = session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    match orchestrator.answer(query, &session_id).await {
        Ok(result) => Ok(ChatResponse {
            answer: result.answer,
            source: result.sources,
            session_id,
        }),
        Err(e @ (ServiceError::ServiceUnavailable(_) | ServiceError::Transient(_))) => {
            log::error!("session {}: {}", session_id, e);
            Err(ServiceError::ServiceUnavailable(e.to_string()))
        }
        Err(e) => {
            log::error!("session {}: degrading to fallback answer: {}", session_id, e);
            Ok(ChatResponse {
                answer: FALLBACK_ANSWER.to_string(),
                source: Vec::new(),
                session_id,
            })
        }
    }
}

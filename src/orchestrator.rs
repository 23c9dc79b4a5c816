//! The agent orchestration loop.
//!
//! ```text
//! Start ──► AwaitModel ──► (ExecuteTools ──► AwaitModel)* ──► Finalize
//! ```
//!
//! - **Start**: system instructions, the session's stored history, then the
//!   new user message.
//! - **AwaitModel**: the full conversation plus the tool catalog goes to the
//!   [`ChatModel`]; one assistant message comes back.
//! - **ExecuteTools**: every requested call runs in received order and gets
//!   one tool message tagged with its call id. Tool failures become text.
//! - **Finalize**: the answer is the last non-empty assistant content of the
//!   run, or [`FALLBACK_ANSWER`]. The query and the answer are appended to
//!   session memory.
//!
//! At most `max_rounds` AwaitModel round trips happen per query, no matter
//! what the model asks for. A transient model failure uses up a round. Tool
//! calls requested on the last allowed round are not run, since no round
//! remains to read their results.
//!
//! Sources are tracked out of band: each retrieval result is passed through
//! [`filter_relevant_sources`] and only its chunk text is forwarded to the
//! model, never file names or scores.
//!
//! In [`AgentMode::Routed`] the loop is replaced by a classify-then-answer
//! pipeline with the same memory and source handling.

use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::{AgentMode, Config};
use crate::error::ServiceError;
use crate::llm::ChatModel;
use crate::memory::{MemoryStore, SessionLocks};
use crate::models::{ChunkScore, Message, Role};
use crate::prompts::{
    answer_prompt, ANSWER_SYSTEM_PROMPT, FALLBACK_ANSWER, NOT_FOUND_ANSWER, SYSTEM_PROMPT,
};
use crate::retriever::Retrieval;
use crate::router::{route_query, Route};
use crate::tools::{ToolOutput, ToolRegistry};

/// Tunables for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub mode: AgentMode,
    pub max_rounds: usize,
    pub temperature: f32,
    pub relevance_factor: f32,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.agent.mode,
            max_rounds: config.agent.max_rounds,
            temperature: config.llm.temperature,
            relevance_factor: config.retrieval.relevance_factor,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            mode: AgentMode::Agentic,
            max_rounds: 5,
            temperature: 0.3,
            relevance_factor: 0.5,
        }
    }
}

/// Result of one orchestrated query.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentAnswer {
    pub answer: String,
    /// Sorted, deduplicated source identifiers.
    pub sources: Vec<String>,
    /// Reasoning-service round trips used.
    pub rounds: usize,
    /// Tool names in invocation order.
    pub tools_invoked: Vec<String>,
}

pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    registry: Arc<ToolRegistry>,
    memory: Arc<dyn MemoryStore>,
    locks: SessionLocks,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        registry: Arc<ToolRegistry>,
        memory: Arc<dyn MemoryStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            model,
            registry,
            memory,
            locks: SessionLocks::new(),
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Answer `query` within `session_id`, then record the exchange.
    ///
    /// Runs on the same session are serialized. Memory is only written when
    /// an answer was produced.
    pub async fn answer(&self, query: &str, session_id: &str) -> Result<AgentAnswer, ServiceError> {
        let _guard = self.locks.acquire(session_id).await;
        let history = self.memory.get(session_id).await?;

        let result = match self.settings.mode {
            AgentMode::Agentic => self.run_agentic(query, history).await?,
            AgentMode::Routed => self.run_routed(query, history).await?,
        };

        self.memory.append(session_id, Role::User, query).await?;
        self.memory
            .append(session_id, Role::Assistant, &result.answer)
            .await?;

        log::info!(
            "session {} answered in {} round(s), tools: {:?}, sources: {:?}",
            session_id,
            result.rounds,
            result.tools_invoked,
            result.sources
        );
        Ok(result)
    }

    async fn run_agentic(
        &self,
        query: &str,
        history: Vec<Message>,
    ) -> Result<AgentAnswer, ServiceError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(SYSTEM_PROMPT));
        messages.extend(history);
        messages.push(Message::user(query));

        let schemas = self.registry.schemas();
        let mut sources = BTreeSet::new();
        let mut tools_invoked = Vec::new();
        let mut answer: Option<String> = None;
        let mut received = false;
        let mut last_failure = None;
        let mut rounds = 0;

        while rounds < self.settings.max_rounds {
            rounds += 1;
            log::debug!("round {}: sending {} messages", rounds, messages.len());

            let reply = match self
                .model
                .complete(&messages, &schemas, self.settings.temperature)
                .await
            {
                Ok(reply) => reply,
                Err(e) if e.is_transient() => {
                    log::warn!("round {}: model unavailable: {}", rounds, e);
                    last_failure = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            received = true;

            if let Some(content) = reply.non_empty_content() {
                answer = Some(content.to_string());
            }
            if reply.tool_calls.is_empty() {
                break;
            }
            if rounds == self.settings.max_rounds {
                log::warn!(
                    "round limit {} reached, skipping {} tool call(s)",
                    rounds,
                    reply.tool_calls.len()
                );
                break;
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in &calls {
                log::debug!("round {}: calling {} ({})", rounds, call.name, call.id);
                tools_invoked.push(call.name.clone());
                let content = match self.registry.execute(&call.name, &call.arguments).await {
                    Ok(ToolOutput::Text(text)) => text,
                    Ok(ToolOutput::Retrieval(retrieval)) => {
                        sources.extend(filter_relevant_sources(
                            &retrieval.chunk_metadata,
                            &retrieval.sources,
                            self.settings.relevance_factor,
                        ));
                        retrieval_payload(&retrieval)
                    }
                    Err(e) => {
                        log::warn!("tool {} failed: {}", call.name, e);
                        format!("Error executing tool: {}", e)
                    }
                };
                messages.push(Message::tool(call.id.clone(), content));
            }
        }

        if !received {
            let detail = last_failure
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no round trip completed".to_string());
            return Err(ServiceError::ServiceUnavailable(detail));
        }

        Ok(AgentAnswer {
            answer: answer.unwrap_or_else(|| FALLBACK_ANSWER.to_string()),
            sources: sources.into_iter().collect(),
            rounds,
            tools_invoked,
        })
    }

    async fn run_routed(
        &self,
        query: &str,
        history: Vec<Message>,
    ) -> Result<AgentAnswer, ServiceError> {
        let route = route_query(self.model.as_ref(), query)
            .await
            .map_err(exhausted)?;
        log::debug!("routed {:?} as {:?}", query, route);

        match route {
            Route::Direct => {
                let mut messages = history;
                messages.push(Message::user(query));
                let reply = self
                    .model
                    .complete(&messages, &[], self.settings.temperature)
                    .await
                    .map_err(exhausted)?;
                Ok(AgentAnswer {
                    answer: content_or_fallback(&reply),
                    sources: Vec::new(),
                    rounds: 2,
                    tools_invoked: Vec::new(),
                })
            }
            Route::Retrieve => {
                let retrieval = self
                    .registry
                    .retriever()
                    .retrieve(query)
                    .await
                    .map_err(exhausted)?;
                let tools_invoked = vec!["retrieve_documents_tool".to_string()];
                if retrieval.is_empty() {
                    return Ok(AgentAnswer {
                        answer: NOT_FOUND_ANSWER.to_string(),
                        sources: Vec::new(),
                        rounds: 1,
                        tools_invoked,
                    });
                }

                let context = retrieval.chunks.join("\n\n");
                let messages = [
                    Message::system(ANSWER_SYSTEM_PROMPT),
                    Message::user(answer_prompt(&context, query)),
                ];
                let reply = self
                    .model
                    .complete(&messages, &[], 0.0)
                    .await
                    .map_err(exhausted)?;

                let sources: BTreeSet<String> = filter_relevant_sources(
                    &retrieval.chunk_metadata,
                    &retrieval.sources,
                    self.settings.relevance_factor,
                )
                .into_iter()
                .collect();

                Ok(AgentAnswer {
                    answer: content_or_fallback(&reply),
                    sources: sources.into_iter().collect(),
                    rounds: 2,
                    tools_invoked,
                })
            }
        }
    }
}

fn content_or_fallback(reply: &Message) -> String {
    reply
        .non_empty_content()
        .unwrap_or(FALLBACK_ANSWER)
        .to_string()
}

/// Transient failures that reach this layer have already outlasted the
/// client's retries.
fn exhausted(err: ServiceError) -> ServiceError {
    match err {
        ServiceError::Transient(detail) => ServiceError::ServiceUnavailable(detail),
        other => other,
    }
}

/// What the model sees of a retrieval: chunk text and a count, nothing else.
pub fn retrieval_payload(retrieval: &Retrieval) -> String {
    let mut payload = json!({
        "chunks": retrieval.chunks,
        "num_results": retrieval.chunks.len(),
    });
    if retrieval.is_empty() {
        payload["message"] = json!(NOT_FOUND_ANSWER);
    }
    payload.to_string()
}

/// Keep the sources that matched strongly relative to the best hit.
///
/// Groups `metadata` by source with the maximum score per source, then keeps
/// sources whose maximum is at least `factor * top_score`. The best-scoring
/// source is always kept. With no metadata at all, every `reported` source
/// is kept. Output is in first-seen order.
pub fn filter_relevant_sources(
    metadata: &[ChunkScore],
    reported: &[String],
    factor: f32,
) -> Vec<String> {
    if metadata.is_empty() {
        return reported.to_vec();
    }

    let mut best: Vec<(&str, f32)> = Vec::new();
    for entry in metadata {
        match best.iter_mut().find(|(s, _)| *s == entry.source) {
            Some((_, score)) => *score = score.max(entry.score),
            None => best.push((entry.source.as_str(), entry.score)),
        }
    }

    let top = best
        .iter()
        .map(|(_, s)| *s)
        .fold(f32::NEG_INFINITY, f32::max);
    let threshold = factor * top;

    best.into_iter()
        .filter(|(_, score)| *score >= threshold || *score >= top)
        .map(|(source, _)| source.to_string())
        .collect()
}

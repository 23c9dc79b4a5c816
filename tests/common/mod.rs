#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use askdocs::config::Config;
use askdocs::context::AppContext;
use askdocs::embedding::{normalize, Embedder};
use askdocs::error::ServiceError;
use askdocs::index::{IndexHandle, VectorIndex};
use askdocs::llm::ChatModel;
use askdocs::memory::{InMemoryStore, MemoryStore};
use askdocs::models::{Chunk, Message, ToolCall};
use askdocs::orchestrator::{Orchestrator, OrchestratorSettings};
use askdocs::retriever::Retriever;
use askdocs::tools::{ToolRegistry, ToolSchema};

const VOCABULARY: &[&str] = &["leave", "travel", "salary", "holiday"];

/// Bag-of-keywords embedder: one dimension per vocabulary word.
///
/// Texts that mention no vocabulary word embed to the zero vector and score
/// 0.0 against everything.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = VOCABULARY
        .iter()
        .map(|w| lower.matches(w).count() as f32)
        .collect();
    normalize(&mut v);
    v
}

pub fn sample_chunks() -> Vec<Chunk> {
    let rows = [
        ("leave-policy.txt", "Annual leave is twenty days. Unused leave can be carried forward."),
        ("leave-policy.txt", "Sick leave requires a doctor's note after three days."),
        ("travel.txt", "Travel must be booked through the company portal."),
        ("handbook.pdf", "Salary is paid monthly and salary reviews happen yearly. Holiday pay follows the leave rules."),
    ];
    rows.iter()
        .enumerate()
        .map(|(i, (source, content))| Chunk {
            content: content.to_string(),
            source: source.to_string(),
            position: i,
        })
        .collect()
}

pub fn sample_index() -> IndexHandle {
    let chunks = sample_chunks();
    let vectors = chunks.iter().map(|c| keyword_vector(&c.content)).collect();
    let mut index = VectorIndex::new(VOCABULARY.len()).with_model("keyword");
    index.insert(vectors, chunks).unwrap();
    IndexHandle::new(index)
}

/// Plays back a fixed list of replies and records every request.
///
/// Once the script runs out it answers with plain text.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Message, ServiceError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<Message, ServiceError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(replies: Vec<Message>) -> Arc<Self> {
        Self::new(replies.into_iter().map(Ok).collect())
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, i: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
        _temperature: f32,
    ) -> Result<Message, ServiceError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Message::assistant("(end of script)")))
    }
}

/// Asks for the clock on every turn and never answers.
#[derive(Default)]
pub struct AlwaysToolModel {
    calls: Mutex<usize>,
}

impl AlwaysToolModel {
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ChatModel for AlwaysToolModel {
    fn model_name(&self) -> &str {
        "always-tool"
    }

    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[ToolSchema],
        _temperature: f32,
    ) -> Result<Message, ServiceError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        let id = format!("call-{}", *calls);
        Ok(tool_call_message(&id, "get_current_date", serde_json::json!({})))
    }
}

pub fn tool_call_message(id: &str, name: &str, arguments: Value) -> Message {
    Message::assistant_tool_calls(vec![ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }])
}

pub fn orchestrator_with(
    model: Arc<dyn ChatModel>,
    memory: Arc<dyn MemoryStore>,
    settings: OrchestratorSettings,
) -> Orchestrator {
    let retriever = Retriever::new(Arc::new(KeywordEmbedder), sample_index(), 5, 0.05);
    let registry = Arc::new(ToolRegistry::new(Arc::new(retriever)));
    Orchestrator::new(model, registry, memory, settings)
}

pub fn orchestrator(model: Arc<dyn ChatModel>) -> Orchestrator {
    orchestrator_with(
        model,
        Arc::new(InMemoryStore::new(6)),
        OrchestratorSettings::default(),
    )
}

pub fn test_config(extra: &str) -> Config {
    let text = format!("[index]\ndir = \"unused-index\"\n{}", extra);
    toml::from_str(&text).unwrap()
}

pub fn app_context(model: Arc<dyn ChatModel>) -> AppContext {
    AppContext::assemble(
        &test_config(""),
        sample_index(),
        Arc::new(KeywordEmbedder),
        model,
        Arc::new(InMemoryStore::new(6)),
    )
}

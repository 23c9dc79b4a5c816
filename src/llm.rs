//! Reasoning service client.
//!
//! The [`ChatModel`] trait is the seam between the orchestrator and the
//! language model: given the conversation so far and the tool catalog, it
//! returns exactly one assistant message, which either carries text or
//! requests tool calls.
//!
//! [`OpenAIChatModel`] speaks the OpenAI-compatible `POST /chat/completions`
//! protocol. Tool-call arguments travel as JSON-encoded strings on the wire
//! and are decoded here; an argument string that is not valid JSON is kept
//! as a `Value::String` so the tool can reject it with a readable error.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::embedding::{backoff, require_env};
use crate::error::ServiceError;
use crate::models::{Message, Role, ToolCall};
use crate::tools::ToolSchema;

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// One round trip. `tools` may be empty, in which case the model can only
    /// answer with text.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        temperature: f32,
    ) -> Result<Message, ServiceError>;
}

/// Chat model backed by an OpenAI-compatible API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIChatModel {
    model: String,
    base_url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self, ServiceError> {
        let api_key = require_env("OPENAI_API_KEY")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;
        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolSchema], temperature: f32) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages.iter().map(message_to_wire).collect::<Vec<_>>(),
            "temperature": temperature,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(ToolSchema::to_function).collect());
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

/// Render a [`Message`] in the chat-completions wire format.
pub fn message_to_wire(message: &Message) -> Value {
    let mut wire = json!({
        "role": message.role.as_str(),
        "content": message.content,
    });
    if !message.tool_calls.is_empty() {
        wire["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": encode_arguments(&call.arguments),
                    }
                })
            })
            .collect();
    }
    if let Some(id) = &message.tool_call_id {
        wire["tool_call_id"] = json!(id);
    }
    wire
}

fn encode_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn decode_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Extract `choices[0].message` from a chat-completions response.
pub fn parse_completion(json: &Value) -> Result<Message, ServiceError> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| ServiceError::MalformedResponse("missing choices[0].message".to_string()))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let id = call.get("id").and_then(Value::as_str).ok_or_else(|| {
                ServiceError::MalformedResponse("tool call without id".to_string())
            })?;
            let function = call.get("function").ok_or_else(|| {
                ServiceError::MalformedResponse("tool call without function".to_string())
            })?;
            let name = function.get("name").and_then(Value::as_str).ok_or_else(|| {
                ServiceError::MalformedResponse("tool call without function name".to_string())
            })?;
            let arguments = function
                .get("arguments")
                .and_then(Value::as_str)
                .map(decode_arguments)
                .unwrap_or_else(|| json!({}));
            tool_calls.push(ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            });
        }
    }

    Ok(Message {
        role: Role::Assistant,
        content,
        tool_calls,
        tool_call_id: None,
    })
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        temperature: f32,
    ) -> Result<Message, ServiceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(messages, tools, temperature);

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            let err = match resp {
                Ok(response) if response.status().is_success() => {
                    let json: Value = response
                        .json()
                        .await
                        .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;
                    return parse_completion(&json);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let text = response.text().await.unwrap_or_default();
                    ServiceError::from_status("Chat completions API", status, &text)
                }
                Err(e) => ServiceError::from(e),
            };

            if !err.is_transient() {
                return Err(err);
            }
            log::warn!("chat completion attempt {} failed: {}", attempt + 1, err);
            last_err = Some(err);
        }
        Err(last_err
            .unwrap_or_else(|| ServiceError::Transient("chat completion failed after retries".into())))
    }
}

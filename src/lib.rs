//! # askdocs
//!
//! Agentic question answering over a private document corpus.
//!
//! A language model answers each query either from general knowledge or by
//! calling tools: a clock and a semantic search over the indexed documents.
//! Per-session history keeps follow-up questions in context, and source
//! attribution is tracked beside the conversation so document names never
//! pass through the model.
//!
//! ## Architecture
//!
//! ```text
//!   offline                          serving
//! ┌──────────┐  ┌─────────┐    ┌──────────────┐   ┌────────────┐
//! │ extract  │─▶│ Chunker │    │ Orchestrator │──▶│ ChatModel  │
//! │ txt/pdf  │  └────┬────┘    └──┬────────┬──┘   └────────────┘
//! └──────────┘       ▼            ▼        ▼
//!               ┌─────────┐  ┌────────┐ ┌──────────────┐
//!               │Embedder │  │ Memory │ │ ToolRegistry │
//!               └────┬────┘  └────────┘ └──────┬───────┘
//!                    ▼                         ▼
//!              ┌─────────────┐           ┌───────────┐
//!              │ VectorIndex │◀──────────│ Retriever │
//!              └─────────────┘           └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Chunks, messages, tool calls |
//! | [`error`] | Service error taxonomy |
//! | [`chunk`] | Token-window chunking |
//! | [`embedding`] | Embedding service clients |
//! | [`index`] | Inner-product vector index and its artifacts |
//! | [`retriever`] | Similarity search with an absolute floor |
//! | [`tools`] | Built-in tools and their schemas |
//! | [`memory`] | Session memory and per-session locks |
//! | [`sqlite_memory`] | Durable session memory |
//! | [`llm`] | Chat-completions client |
//! | [`prompts`] | Prompt templates and fixed answers |
//! | [`router`] | Direct/retrieve classification |
//! | [`orchestrator`] | The tool-calling loop |
//! | [`chat`] | Session ids and error degradation |
//! | [`context`] | Application initialization |
//! | [`extract`] | Document loading |
//! | [`index_cmd`] | Offline index build |
//! | [`server`] | HTTP API |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod index_cmd;
pub mod llm;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod retriever;
pub mod router;
pub mod server;
pub mod sqlite_memory;
pub mod tools;

//! Explicit application initialization.
//!
//! [`AppContext::from_config`] builds every long-lived component once, in
//! dependency order, and fails fast on anything a query could never recover
//! from: missing API keys, an unknown provider, missing index artifacts, or
//! an index built by a different embedding model or dimensionality.
//! The resulting context is shared read-only by the CLI and the server.

use anyhow::{bail, Context, Result};
use std::sync::Arc;

use crate::config::{Config, EmbeddingConfig};
use crate::embedding::{self, Embedder};
use crate::index::{IndexHandle, VectorIndex};
use crate::llm::{ChatModel, OpenAIChatModel};
use crate::memory::{InMemoryStore, MemoryStore};
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::retriever::Retriever;
use crate::sqlite_memory::SqliteMemoryStore;
use crate::tools::ToolRegistry;

pub struct AppContext {
    pub config: Arc<Config>,
    pub index: IndexHandle,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppContext {
    /// Load the index and connect the collaborators named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::from(
            embedding::create_embedder(&config.embedding)
                .context("Failed to configure embedding service")?,
        );
        let model: Arc<dyn ChatModel> = Arc::new(
            OpenAIChatModel::new(&config.llm).context("Failed to configure reasoning service")?,
        );

        let index = VectorIndex::load(&config.index.dir)?;
        check_index(&index, &config.embedding)
            .with_context(|| format!("Index at {} is unusable", config.index.dir.display()))?;
        log::info!(
            "loaded index: {} chunks, {} dimensions, model {}",
            index.len(),
            index.dims(),
            config.embedding.model_name()
        );

        let memory = open_memory(config).await?;
        Ok(Self::assemble(config, IndexHandle::new(index), embedder, model, memory))
    }

    /// Wire pre-built collaborators together.
    pub fn assemble(
        config: &Config,
        index: IndexHandle,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        let retriever = Retriever::new(
            embedder,
            index.clone(),
            config.retrieval.top_k,
            config.retrieval.similarity_threshold,
        );
        let registry = Arc::new(ToolRegistry::new(Arc::new(retriever)));
        let orchestrator = Orchestrator::new(
            model,
            registry,
            memory,
            OrchestratorSettings::from_config(config),
        );
        Self {
            config: Arc::new(config.clone()),
            index,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Reload the index artifacts from disk and swap them in.
    pub fn reload_index(&self) -> Result<usize> {
        let index = VectorIndex::load(&self.config.index.dir)?;
        check_index(&index, &self.config.embedding)?;
        let len = index.len();
        self.index.replace(index);
        Ok(len)
    }
}

/// Reject an index built by another embedding model or dimensionality.
pub fn check_index(index: &VectorIndex, embedding: &EmbeddingConfig) -> Result<()> {
    let expected = embedding.model_name();
    match index.model() {
        Some(model) if model == expected => {}
        Some(model) => bail!(
            "index was built with embedding model '{}' but [embedding] uses '{}'. \
             Rebuild it with `askdocs index build`.",
            model,
            expected
        ),
        None => bail!(
            "index does not record its embedding model. Rebuild it with `askdocs index build`."
        ),
    }
    if let Some(dims) = embedding.dims {
        if !index.is_empty() && index.dims() != dims {
            bail!(
                "index has {} dimensions but [embedding] dims = {}. Rebuild the index.",
                index.dims(),
                dims
            );
        }
    }
    Ok(())
}

async fn open_memory(config: &Config) -> Result<Arc<dyn MemoryStore>> {
    let window = config.memory.window;
    match config.memory.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new(window))),
        "sqlite" => {
            let path = config
                .memory
                .path
                .as_deref()
                .context("[memory] path is required for the sqlite backend")?;
            Ok(Arc::new(SqliteMemoryStore::open(path, window).await?))
        }
        other => bail!("Unknown memory backend: {}", other),
    }
}

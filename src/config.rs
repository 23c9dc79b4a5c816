use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the index artifacts (`index.bin`, `meta.json`, `info.json`).
    pub dir: PathBuf,
    /// Directory scanned by `askdocs index build`.
    #[serde(default)]
    pub docs_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// `cl100k` (BPE) or `words` (Unicode word boundaries).
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
    /// Optional `tokenizer.json`; replaces `tokenizer` when set.
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            tokenizer: default_tokenizer(),
            tokenizer_path: None,
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_overlap() -> usize {
    100
}
fn default_tokenizer() -> String {
    "cl100k".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_relevance_factor")]
    pub relevance_factor: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            relevance_factor: default_relevance_factor(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_similarity_threshold() -> f32 {
    0.05
}
fn default_relevance_factor() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "huggingface".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    /// Model name, falling back to the provider's default model.
    pub fn model_name(&self) -> &str {
        match (&self.model, self.provider.as_str()) {
            (Some(m), _) => m,
            (None, "openai") => "text-embedding-3-small",
            (None, _) => "sentence-transformers/all-MiniLM-L6-v2",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            temperature: default_temperature(),
            base_url: default_llm_base_url(),
            max_retries: default_llm_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_max_retries() -> u32 {
    3
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// The model decides which tools to call, in a bounded loop.
    #[default]
    Agentic,
    /// A classifier picks direct answering or retrieval up front.
    Routed,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default)]
    pub mode: AgentMode,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: AgentMode::default(),
            max_rounds: default_max_rounds(),
        }
    }
}

fn default_max_rounds() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    #[serde(default = "default_window")]
    pub window: usize,
    /// SQLite file for the `sqlite` backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            window: default_window(),
            path: None,
        }
    }
}

fn default_memory_backend() -> String {
    "memory".to_string()
}
fn default_window() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check value ranges that serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }
    match config.chunking.tokenizer.as_str() {
        "cl100k" | "words" => {}
        other => anyhow::bail!("Unknown tokenizer: '{}'. Must be cl100k or words.", other),
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [-1.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.retrieval.relevance_factor) {
        anyhow::bail!("retrieval.relevance_factor must be in [0.0, 1.0]");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "huggingface" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be huggingface or openai.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0 when set");
    }

    // Validate agent
    if config.agent.max_rounds == 0 {
        anyhow::bail!("agent.max_rounds must be >= 1");
    }

    // Validate memory
    if config.memory.window == 0 {
        anyhow::bail!("memory.window must be >= 1");
    }
    match config.memory.backend.as_str() {
        "memory" => {}
        "sqlite" => {
            if config.memory.path.is_none() {
                anyhow::bail!("memory.path must be set when memory.backend is 'sqlite'");
            }
        }
        other => anyhow::bail!(
            "Unknown memory backend: '{}'. Must be memory or sqlite.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let text = format!("[index]\ndir = \"/tmp/idx\"\n{}", extra);
        let config: Config = toml::from_str(&text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.similarity_threshold - 0.05).abs() < 1e-6);
        assert!((config.retrieval.relevance_factor - 0.5).abs() < 1e-6);
        assert_eq!(config.agent.max_rounds, 5);
        assert_eq!(config.agent.mode, AgentMode::Agentic);
        assert_eq!(config.memory.window, 6);
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let err = parse("[chunking]\nchunk_size = 10\noverlap = 10\n").unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_unknown_tokenizer_rejected() {
        assert_eq!(parse("").unwrap().chunking.tokenizer, "cl100k");
        assert!(parse("[chunking]\ntokenizer = \"words\"\n").is_ok());
        assert!(parse("[chunking]\ntokenizer = \"gpt2\"\n").is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(parse("[embedding]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_sqlite_memory_needs_path() {
        assert!(parse("[memory]\nbackend = \"sqlite\"\n").is_err());
        assert!(parse("[memory]\nbackend = \"sqlite\"\npath = \"/tmp/m.sqlite\"\n").is_ok());
    }

    #[test]
    fn test_routed_mode() {
        let config = parse("[agent]\nmode = \"routed\"\nmax_rounds = 3\n").unwrap();
        assert_eq!(config.agent.mode, AgentMode::Routed);
        assert_eq!(config.agent.max_rounds, 3);
    }

    #[test]
    fn test_example_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/askdocs.example.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.embedding.dims, Some(384));
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }
}

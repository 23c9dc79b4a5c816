//! Offline index build: load → chunk → embed → insert → save.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::chunk::{create_tokenizer, Chunker};
use crate::config::Config;
use crate::embedding::{self, embed_in_batches, Embedder};
use crate::extract::{load_documents, SourceDocument};
use crate::index::VectorIndex;
use crate::models::Chunk;

/// Counters reported after a build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildStats {
    pub documents: usize,
    pub chunks: usize,
    pub dims: usize,
}

/// Chunk every document in order.
pub fn chunk_documents(chunker: &Chunker, documents: &[SourceDocument]) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for doc in documents {
        let doc_chunks = chunker
            .chunk_document(&doc.text, &doc.source)
            .with_context(|| format!("Failed to chunk {}", doc.source))?;
        log::debug!("{}: {} chunks", doc.source, doc_chunks.len());
        chunks.extend(doc_chunks);
    }
    Ok(chunks)
}

/// Build an in-memory index from already-loaded documents.
pub async fn build_index(
    documents: &[SourceDocument],
    chunker: &Chunker,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<(VectorIndex, BuildStats)> {
    let chunks = chunk_documents(chunker, documents)?;
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let vectors = embed_in_batches(embedder, &texts, batch_size).await?;

    let mut index = VectorIndex::new(0).with_model(embedder.model_name());
    index.insert(vectors, chunks)?;

    let stats = BuildStats {
        documents: documents.len(),
        chunks: index.len(),
        dims: index.dims(),
    };
    Ok((index, stats))
}

/// `askdocs index build`.
pub async fn run_index_build(
    config: &Config,
    docs_dir_override: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    let docs_dir = match docs_dir_override.or(config.index.docs_dir.as_deref()) {
        Some(dir) => dir.to_path_buf(),
        None => bail!("No documents directory. Set [index] docs_dir or pass --docs."),
    };

    let tokenizer = create_tokenizer(&config.chunking)?;
    let chunker = Chunker::new(
        tokenizer,
        config.chunking.chunk_size,
        config.chunking.overlap,
    )?;

    let documents = load_documents(&docs_dir)?;
    if documents.is_empty() {
        bail!("No .txt or .pdf documents found in {}", docs_dir.display());
    }

    if dry_run {
        let chunks = chunk_documents(&chunker, &documents)?;
        println!("index build (dry-run)");
        println!("  documents: {}", documents.len());
        println!("  chunks: {}", chunks.len());
        return Ok(());
    }

    let embedder: Arc<dyn Embedder> = Arc::from(embedding::create_embedder(&config.embedding)?);
    let (index, stats) = build_index(
        &documents,
        &chunker,
        embedder.as_ref(),
        config.embedding.batch_size,
    )
    .await?;

    index.save(&config.index.dir)?;

    println!("index build");
    println!("  documents: {}", stats.documents);
    println!("  chunks: {}", stats.chunks);
    println!("  dimensions: {}", stats.dims);
    println!("  model: {}", embedder.model_name());
    println!("  written to: {}", config.index.dir.display());
    Ok(())
}

//! Semantic retrieval over the vector index.
//!
//! Embeds the query with the corpus embedder, asks the index for `top_k`
//! neighbours, and drops every hit scoring below `similarity_threshold`.
//! The floor is absolute: it does not depend on the other hits.

use serde::Serialize;
use std::sync::Arc;

use crate::embedding::{embed_query, Embedder};
use crate::error::ServiceError;
use crate::index::IndexHandle;
use crate::models::ChunkScore;

/// Chunks that survived the similarity floor, best first.
///
/// An empty result means "not found in documents"; it is not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Retrieval {
    pub chunks: Vec<String>,
    /// Distinct source identifiers among `chunks`, in rank order.
    pub sources: Vec<String>,
    /// One entry per chunk, same order as `chunks`.
    pub chunk_metadata: Vec<ChunkScore>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: IndexHandle,
    top_k: usize,
    similarity_threshold: f32,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: IndexHandle,
        top_k: usize,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
            similarity_threshold,
        }
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    pub async fn retrieve(&self, query: &str) -> Result<Retrieval, ServiceError> {
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let index = self.index.snapshot();
        if !index.is_empty() && query_vec.len() != index.dims() {
            return Err(ServiceError::MalformedResponse(format!(
                "{} returned a {}-dimensional query vector for a {}-dimensional index",
                self.embedder.model_name(),
                query_vec.len(),
                index.dims()
            )));
        }

        let mut retrieval = Retrieval::default();
        for (score, chunk) in index.search(&query_vec, self.top_k) {
            if score < self.similarity_threshold {
                continue;
            }
            retrieval.chunks.push(chunk.content.clone());
            if !retrieval.sources.contains(&chunk.source) {
                retrieval.sources.push(chunk.source.clone());
            }
            retrieval.chunk_metadata.push(ChunkScore {
                source: chunk.source.clone(),
                score,
            });
        }

        log::debug!(
            "retrieved {} chunks from {} sources for query {:?}",
            retrieval.chunks.len(),
            retrieval.sources.len(),
            query
        );
        Ok(retrieval)
    }
}

//! Embedding service clients and vector utilities.
//!
//! Defines the [`Embedder`] trait and two HTTP implementations:
//! - **[`HuggingFaceEmbedder`]**: the Hugging Face Inference API
//!   feature-extraction pipeline (router endpoint, then the standard endpoint
//!   when the router refuses the token).
//! - **[`OpenAIEmbedder`]**: the OpenAI `POST /v1/embeddings` endpoint.
//!
//! Every embedder returns L2-normalized vectors, so the inner product of two
//! vectors is their cosine similarity. The vector index relies on this.
//!
//! # Retry Strategy
//!
//! - HTTP 429, 5xx (including 503 "model loading"), timeouts → retry
//! - HTTP 401 → authentication failure, fatal
//! - HTTP 403 → permission failure, fatal
//! - Unexpected response shape → malformed response, fatal
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::ServiceError;

const HF_ROUTER_URL: &str = "https://router.huggingface.co/hf-inference/models";
const HF_STANDARD_URL: &str = "https://api-inference.huggingface.co/models";
const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// A text embedding collaborator.
///
/// Given a batch of texts, returns one unit-normalized vector per text, in
/// input order, all with the same dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"sentence-transformers/all-MiniLM-L6-v2"`).
    fn model_name(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, ServiceError> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::MalformedResponse("empty embedding response".to_string()))
}

/// Embed many texts, `batch_size` per request, preserving order.
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, ServiceError> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let embedded = embedder.embed(batch).await?;
        if embedded.len() != batch.len() {
            return Err(ServiceError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                embedded.len()
            )));
        }
        vectors.extend(embedded);
        if texts.len() > batch_size {
            log::info!("embedded {}/{} texts", vectors.len(), texts.len());
        }
    }
    Ok(vectors)
}

/// Scale a vector to unit length. Zero vectors are left unchanged.
pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

/// Inner product of two vectors of equal length.
///
/// Equals cosine similarity when both inputs are unit length. Returns `0.0`
/// for empty vectors or vectors of different lengths.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Encode a float vector as little-endian f32 bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub(crate) fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

pub(crate) fn require_env(var: &str) -> Result<String, ServiceError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ServiceError::Configuration(format!("{} environment variable not set", var)))
}

/// Check count and dimensionality, then normalize every vector.
fn finish_vectors(
    mut vectors: Vec<Vec<f32>>,
    expected: usize,
    dims: Option<usize>,
) -> Result<Vec<Vec<f32>>, ServiceError> {
    if vectors.len() != expected {
        return Err(ServiceError::MalformedResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }
    for v in vectors.iter_mut() {
        if let Some(d) = dims {
            if v.len() != d {
                return Err(ServiceError::MalformedResponse(format!(
                    "expected {} dimensions, got {}",
                    d,
                    v.len()
                )));
            }
        }
        normalize(v);
    }
    Ok(vectors)
}

fn number_row(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|n| n.as_f64().map(|f| f as f32))
        .collect()
}

// ============ Hugging Face ============

/// Embedder using the Hugging Face Inference API.
///
/// Requires the `HUGGINGFACE_API_KEY` environment variable.
pub struct HuggingFaceEmbedder {
    model: String,
    dims: Option<usize>,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl HuggingFaceEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ServiceError> {
        let api_key = require_env("HUGGINGFACE_API_KEY")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;
        Ok(Self {
            model: config.model_name().to_string(),
            dims: config.dims,
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }

    fn endpoints(&self) -> [String; 2] {
        [
            format!(
                "{}/{}/pipeline/feature-extraction",
                HF_ROUTER_URL, self.model
            ),
            format!("{}/{}", HF_STANDARD_URL, self.model),
        ]
    }

    /// One attempt: router endpoint first, standard endpoint if the router
    /// answers 403.
    async fn post_once(&self, body: &Value) -> Result<Value, ServiceError> {
        let [router, standard] = self.endpoints();
        let mut last = None;
        for url in [router, standard] {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await?;
            let status = response.status();
            if status.is_success() {
                return response
                    .json::<Value>()
                    .await
                    .map_err(|e| ServiceError::MalformedResponse(e.to_string()));
            }
            let text = response.text().await.unwrap_or_default();
            let err = ServiceError::from_status("Hugging Face API", status.as_u16(), &text);
            if status.as_u16() == 403 && last.is_none() {
                log::debug!("router endpoint refused token, trying standard endpoint");
                last = Some(err);
                continue;
            }
            return Err(err);
        }
        Err(last.unwrap_or_else(|| {
            ServiceError::Transient("no Hugging Face endpoint answered".to_string())
        }))
    }
}

/// Parse the feature-extraction response: a list of vectors, or a single
/// flat vector when one text was sent.
fn parse_hf_response(json: &Value, expected: usize) -> Result<Vec<Vec<f32>>, ServiceError> {
    let rows = json.as_array().ok_or_else(|| {
        ServiceError::MalformedResponse("expected a JSON array of embeddings".to_string())
    })?;
    if expected == 1 && rows.iter().all(Value::is_number) && !rows.is_empty() {
        return number_row(json)
            .map(|v| vec![v])
            .ok_or_else(|| ServiceError::MalformedResponse("non-numeric embedding".to_string()));
    }
    rows.iter()
        .map(|row| {
            number_row(row).ok_or_else(|| {
                ServiceError::MalformedResponse("embedding row is not a list of numbers".to_string())
            })
        })
        .collect()
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let body = serde_json::json!({
            "inputs": texts,
            "options": { "wait_for_model": true },
        });

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }
            match self.post_once(&body).await {
                Ok(json) => {
                    let vectors = parse_hf_response(&json, texts.len())?;
                    return finish_vectors(vectors, texts.len(), self.dims);
                }
                Err(e) if e.is_transient() => {
                    log::warn!("embedding attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err
            .unwrap_or_else(|| ServiceError::Transient("embedding failed after retries".into())))
    }
}

// ============ OpenAI ============

/// Embedder using the OpenAI embeddings API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIEmbedder {
    model: String,
    dims: Option<usize>,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ServiceError> {
        let api_key = require_env("OPENAI_API_KEY")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;
        Ok(Self {
            model: config.model_name().to_string(),
            dims: config.dims,
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>, ServiceError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ServiceError::MalformedResponse("missing data array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let vec = item
            .get("embedding")
            .and_then(number_row)
            .ok_or_else(|| ServiceError::MalformedResponse("missing embedding".to_string()))?;
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vec));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }

            let resp = self
                .client
                .post(OPENAI_EMBEDDINGS_URL)
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
                    let vectors = parse_openai_response(&json)?;
                    return finish_vectors(vectors, texts.len(), self.dims);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let text = response.text().await.unwrap_or_default();
                    ServiceError::from_status("OpenAI API", status, &text)
                }
                Err(e) => ServiceError::from(e),
            };

            if !err.is_transient() {
                return Err(err);
            }
            log::warn!("embedding attempt {} failed: {}", attempt + 1, err);
            last_err = Some(err);
        }
        Err(last_err
            .unwrap_or_else(|| ServiceError::Transient("embedding failed after retries".into())))
    }
}

/// Create the [`Embedder`] named by `embedding.provider`.
///
/// # Errors
///
/// Returns [`ServiceError::Configuration`] for unknown providers or a
/// missing API key.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, ServiceError> {
    match config.provider.as_str() {
        "huggingface" => Ok(Box::new(HuggingFaceEmbedder::new(config)?)),
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config)?)),
        other => Err(ServiceError::Configuration(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_untouched() {
        let mut v = vec![0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn test_dot_mismatched_lengths() {
        assert_eq!(dot(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(dot(&[], &[]), 0.0);
    }

    #[test]
    fn test_parse_hf_batch() {
        let json = serde_json::json!([[1.0, 0.0], [0.0, 2.0]]);
        let vecs = parse_hf_response(&json, 2).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 2.0]]);
    }

    #[test]
    fn test_parse_hf_flat_single() {
        let json = serde_json::json!([0.5, 0.5, 0.0]);
        let vecs = parse_hf_response(&json, 1).unwrap();
        assert_eq!(vecs.len(), 1);
        assert_eq!(vecs[0].len(), 3);
    }

    #[test]
    fn test_parse_hf_malformed() {
        let json = serde_json::json!({ "error": "nope" });
        assert!(matches!(
            parse_hf_response(&json, 1),
            Err(ServiceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs[0], vec![1.0, 0.0]);
        assert_eq!(vecs[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_finish_vectors_checks_dims_and_normalizes() {
        let out = finish_vectors(vec![vec![0.0, 5.0]], 1, Some(2)).unwrap();
        assert!((out[0][1] - 1.0).abs() < 1e-6);
        assert!(finish_vectors(vec![vec![1.0]], 1, Some(2)).is_err());
        assert!(finish_vectors(vec![], 1, None).is_err());
    }
}

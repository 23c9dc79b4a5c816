//! In-memory inner-product vector index with row-aligned chunk metadata.
//!
//! Vectors must be L2-normalized before insertion, which makes the inner
//! product used for ranking equal to cosine similarity. The index is built
//! once per corpus version and read-only while serving; a rebuild produces a
//! new index that replaces the old one through [`IndexHandle::replace`].
//!
//! # Persisted artifacts
//!
//! | File | Contents |
//! |------|----------|
//! | `index.bin` | magic `AIDX`, format version, dims, row count, then little-endian f32 rows |
//! | `meta.json` | ordered list of chunks; row `i` describes vector `i` |
//! | `info.json` | embedding model, dims, row count and build time |

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::embedding::{blob_to_vec, dot, vec_to_blob};
use crate::models::Chunk;

pub const INDEX_FILE: &str = "index.bin";
pub const META_FILE: &str = "meta.json";
pub const INFO_FILE: &str = "info.json";

const MAGIC: &[u8; 4] = b"AIDX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dims: usize,
    /// Row-major, `dims` floats per row.
    data: Vec<f32>,
    chunks: Vec<Chunk>,
    /// Embedding model that produced the vectors.
    model: Option<String>,
}

/// Contents of `info.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub model: String,
    pub dims: usize,
    pub chunks: usize,
    pub built_at: DateTime<Utc>,
}

impl VectorIndex {
    /// An empty index for vectors of `dims` dimensions.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            data: Vec::new(),
            chunks: Vec::new(),
            model: None,
        }
    }

    /// Record the embedding model the vectors come from.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Append row-aligned vectors and chunks.
    ///
    /// Rejects the whole batch if the counts differ or any vector has the
    /// wrong dimensionality, so `vectors == chunks` always holds.
    pub fn insert(&mut self, vectors: Vec<Vec<f32>>, chunks: Vec<Chunk>) -> Result<()> {
        if vectors.len() != chunks.len() {
            bail!(
                "vector count ({}) does not match chunk count ({})",
                vectors.len(),
                chunks.len()
            );
        }
        if self.dims == 0 {
            if let Some(first) = vectors.first() {
                self.dims = first.len();
            }
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != self.dims) {
            bail!(
                "vector {} has {} dimensions, index expects {}",
                bad,
                vectors[bad].len(),
                self.dims
            );
        }
        for v in vectors {
            self.data.extend(v);
        }
        self.chunks.extend(chunks);
        Ok(())
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dims..(i + 1) * self.dims]
    }

    /// Up to `k` nearest rows by descending inner product.
    ///
    /// Exhaustive scan; ties keep insertion order. An empty index yields an
    /// empty list.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(f32, &Chunk)> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(f32, usize)> = (0..self.len())
            .map(|i| (dot(query, self.row(i)), i))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(score, i)| (score, &self.chunks[i]))
            .collect()
    }

    /// Write `index.bin`, `meta.json` and `info.json` into `dir`, creating it
    /// if needed. The index must carry its embedding model name.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let Some(model) = self.model.as_deref() else {
            bail!("index has no embedding model recorded");
        };
        let info = IndexInfo {
            model: model.to_string(),
            dims: self.dims,
            chunks: self.len(),
            built_at: Utc::now(),
        };

        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&vec_to_blob(&self.data));

        // Artifacts are renamed into place only once all are written.
        let artifacts = [
            (INDEX_FILE, bytes),
            (META_FILE, serde_json::to_vec(&self.chunks)?),
            (INFO_FILE, serde_json::to_vec_pretty(&info)?),
        ];
        for (name, contents) in &artifacts {
            let tmp = dir.join(format!("{}.tmp", name));
            std::fs::write(&tmp, contents)
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
        }
        for (name, _) in &artifacts {
            std::fs::rename(dir.join(format!("{}.tmp", name)), dir.join(name))?;
        }
        Ok(())
    }

    /// Load an index written by [`save`](VectorIndex::save).
    pub fn load(dir: &Path) -> Result<Self> {
        let index_path = dir.join(INDEX_FILE);
        let meta_path = dir.join(META_FILE);

        let bytes = std::fs::read(&index_path).with_context(|| {
            format!(
                "Failed to read {} (run `askdocs index build` first)",
                index_path.display()
            )
        })?;
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            bail!("{} is not an askdocs index file", index_path.display());
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            bail!("unsupported index format version {}", version);
        }
        let dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[12..HEADER_LEN]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        let data = blob_to_vec(&bytes[HEADER_LEN..]);
        if data.len() != dims * count {
            bail!(
                "{} is truncated: expected {} floats, found {}",
                index_path.display(),
                dims * count,
                data.len()
            );
        }

        let meta = std::fs::read(&meta_path)
            .with_context(|| format!("Failed to read {}", meta_path.display()))?;
        let chunks: Vec<Chunk> = serde_json::from_slice(&meta)
            .with_context(|| format!("Failed to parse {}", meta_path.display()))?;
        if chunks.len() != count {
            bail!(
                "index has {} vectors but metadata lists {} chunks",
                count,
                chunks.len()
            );
        }

        let info_path = dir.join(INFO_FILE);
        let info = std::fs::read(&info_path)
            .with_context(|| format!("Failed to read {}", info_path.display()))?;
        let info: IndexInfo = serde_json::from_slice(&info)
            .with_context(|| format!("Failed to parse {}", info_path.display()))?;
        if info.dims != dims || info.chunks != count {
            bail!(
                "{} describes {} rows of {} dimensions but the index has {} rows of {}",
                info_path.display(),
                info.chunks,
                info.dims,
                count,
                dims
            );
        }

        Ok(Self {
            dims,
            data,
            chunks,
            model: Some(info.model),
        })
    }
}

/// Shared, swappable reference to the serving index.
///
/// Readers take a cheap [`snapshot`](IndexHandle::snapshot) and search it
/// without holding any lock. [`replace`](IndexHandle::replace) swaps in a
/// fully built index; searches already in flight finish on the old one.
#[derive(Clone, Default)]
pub struct IndexHandle {
    current: Arc<RwLock<Arc<VectorIndex>>>,
}

impl IndexHandle {
    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    pub fn snapshot(&self) -> Arc<VectorIndex> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, index: VectorIndex) {
        let fresh = Arc::new(index);
        match self.current.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(source: &str, position: usize) -> Chunk {
        Chunk {
            content: format!("{} #{}", source, position),
            source: source.to_string(),
            position,
        }
    }

    fn sample() -> VectorIndex {
        let mut index = VectorIndex::new(2).with_model("mini");
        index
            .insert(
                vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]],
                vec![chunk("a", 0), chunk("b", 0), chunk("c", 0)],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_search_orders_by_inner_product() {
        let index = sample();
        let hits = index.search(&[1.0, 0.0], 3);
        let sources: Vec<&str> = hits.iter().map(|(_, c)| c.source.as_str()).collect();
        assert_eq!(sources, vec!["a", "c", "b"]);
        assert!((hits[0].0 - 1.0).abs() < 1e-6);
        assert!((hits[1].0 - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_search_caps_at_k_and_len() {
        let index = sample();
        assert_eq!(index.search(&[1.0, 0.0], 2).len(), 2);
        assert_eq!(index.search(&[1.0, 0.0], 10).len(), 3);
    }

    #[test]
    fn test_empty_index_returns_empty() {
        let index = VectorIndex::new(4);
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).is_empty());
    }

    #[test]
    fn test_insert_rejects_misaligned_batch() {
        let mut index = VectorIndex::new(2);
        assert!(index
            .insert(vec![vec![1.0, 0.0]], vec![chunk("a", 0), chunk("a", 1)])
            .is_err());
        assert!(index
            .insert(vec![vec![1.0, 0.0, 0.0]], vec![chunk("a", 0)])
            .is_err());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_insert_infers_dims() {
        let mut index = VectorIndex::new(0);
        index.insert(vec![vec![0.0, 0.0, 1.0]], vec![chunk("a", 0)]).unwrap();
        assert_eq!(index.dims(), 3);
    }

    #[test]
    fn test_save_load_preserves_rows() {
        let tmp = TempDir::new().unwrap();
        let index = sample();
        index.save(tmp.path()).unwrap();

        let loaded = VectorIndex::load(tmp.path()).unwrap();
        assert_eq!(loaded.model(), Some("mini"));
        assert_eq!(loaded.dims(), 2);
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.chunks(), index.chunks());
        let hits = loaded.search(&[0.0, 1.0], 1);
        assert_eq!(hits[0].1.source, "b");
    }

    #[test]
    fn test_load_detects_row_mismatch() {
        let tmp = TempDir::new().unwrap();
        sample().save(tmp.path()).unwrap();
        std::fs::write(tmp.path().join(META_FILE), b"[]").unwrap();
        let err = VectorIndex::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("metadata"));
    }

    #[test]
    fn test_save_requires_model() {
        let tmp = TempDir::new().unwrap();
        let mut index = VectorIndex::new(2);
        index.insert(vec![vec![1.0, 0.0]], vec![chunk("a", 0)]).unwrap();
        assert!(index.save(tmp.path()).is_err());
        assert!(!tmp.path().join(INDEX_FILE).exists());
    }

    #[test]
    fn test_load_requires_info() {
        let tmp = TempDir::new().unwrap();
        sample().save(tmp.path()).unwrap();
        std::fs::remove_file(tmp.path().join(INFO_FILE)).unwrap();
        let err = VectorIndex::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains(INFO_FILE));
    }

    #[test]
    fn test_load_missing_files() {
        let tmp = TempDir::new().unwrap();
        assert!(VectorIndex::load(tmp.path()).is_err());
    }

    #[test]
    fn test_handle_swap() {
        let handle = IndexHandle::new(VectorIndex::new(2));
        let before = handle.snapshot();
        handle.replace(sample());
        assert_eq!(before.len(), 0);
        assert_eq!(handle.snapshot().len(), 3);
    }
}

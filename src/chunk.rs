//! Token-window text chunker.
//!
//! Splits document text into sections on blank lines (`\n\n`), tokenizes each
//! section, and slides a fixed-size token window with a fixed overlap across
//! it. Each window becomes one [`Chunk`] whose content is the exact slice of
//! section text covered by the window's tokens.
//!
//! Chunking is deterministic: the same text, tokenizer, and parameters always
//! produce the same ordered chunks, which keeps rebuilt indexes reproducible.
//!
//! ```text
//! tokens:  [0 ............ 500)
//!                    [400 ............ 900)
//!                                 [800 ... 950)
//!          size = 500, overlap = 100, step = 400
//! ```

use anyhow::{bail, Result};
use std::ops::Range;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Splits text into tokens, reported as byte spans into the input.
///
/// Spans must be ordered and non-overlapping. Gaps between spans are allowed
/// (some vocabularies drop whitespace); they are kept when a window of tokens
/// is turned back into text.
pub trait Tokenizer: Send + Sync {
    fn spans(&self, text: &str) -> Result<Vec<Range<usize>>>;
}

/// OpenAI `cl100k_base` byte-pair encoding. The default tokenizer.
///
/// A token that ends inside a multi-byte character is merged with the
/// following tokens into one span; the merged tokens after the first get
/// empty spans at its end, so the token count stays exact and every window
/// still slices on a character boundary.
pub struct Cl100kTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

impl Cl100kTokenizer {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| anyhow::anyhow!("Failed to load cl100k_base encoding: {}", e))?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for Cl100kTokenizer {
    fn spans(&self, text: &str) -> Result<Vec<Range<usize>>> {
        let tokens = self.bpe.encode_ordinary(text);
        let mut spans = Vec::with_capacity(tokens.len());
        let mut offset = 0;
        let mut pending = Vec::new();
        for token in tokens {
            pending.push(token);
            let Ok(piece) = self.bpe.decode(pending.clone()) else {
                continue;
            };
            let end = offset + piece.len();
            spans.push(offset..end);
            spans.extend(std::iter::repeat(end..end).take(pending.len() - 1));
            offset = end;
            pending.clear();
        }
        if !pending.is_empty() || offset != text.len() {
            bail!("cl100k_base tokens do not cover the input text");
        }
        Ok(spans)
    }
}

/// Tokenizer based on Unicode word boundaries (UAX #29).
///
/// Words, whitespace runs, and punctuation marks each count as one token,
/// so a window holds roughly half as many words as a BPE window.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordBoundaryTokenizer;

impl Tokenizer for WordBoundaryTokenizer {
    fn spans(&self, text: &str) -> Result<Vec<Range<usize>>> {
        Ok(text
            .split_word_bound_indices()
            .map(|(start, piece)| start..start + piece.len())
            .collect())
    }
}

/// Sub-word tokenizer backed by a Hugging Face `tokenizer.json`.
#[cfg(feature = "hf-tokenizer")]
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

#[cfg(feature = "hf-tokenizer")]
impl HfTokenizer {
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer {}: {}", path.display(), e))?;
        Ok(Self { inner })
    }
}

#[cfg(feature = "hf-tokenizer")]
impl Tokenizer for HfTokenizer {
    fn spans(&self, text: &str) -> Result<Vec<Range<usize>>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        Ok(encoding
            .get_offsets()
            .iter()
            .filter(|(start, end)| end > start)
            .map(|&(start, end)| start..end)
            .collect())
    }
}

/// Build the tokenizer selected by `[chunking]`.
///
/// `tokenizer_path` wins over `tokenizer` when both are set.
pub fn create_tokenizer(config: &ChunkingConfig) -> Result<Arc<dyn Tokenizer>> {
    match config.tokenizer_path.as_deref() {
        #[cfg(feature = "hf-tokenizer")]
        Some(p) => return Ok(Arc::new(HfTokenizer::from_file(p)?)),
        #[cfg(not(feature = "hf-tokenizer"))]
        Some(p) => bail!(
            "chunking.tokenizer_path ({}) requires building with --features hf-tokenizer",
            p.display()
        ),
        None => {}
    }
    match config.tokenizer.as_str() {
        "cl100k" => Ok(Arc::new(Cl100kTokenizer::new()?)),
        "words" => Ok(Arc::new(WordBoundaryTokenizer)),
        other => bail!("Unknown tokenizer: '{}'. Must be cl100k or words.", other),
    }
}

/// Split text into paragraph-level sections, dropping blank ones.
pub fn split_sections(text: &str) -> Vec<&str> {
    text.split("\n\n")
        .filter(|section| !section.trim().is_empty())
        .collect()
}

/// Token index ranges of every window over a stream of `len` tokens.
///
/// Windows start at `0, step, 2*step, ...` where `step = size - overlap`,
/// and stop once the start passes the end of the stream. The last window
/// may be shorter than `size`.
pub fn token_windows(len: usize, size: usize, overlap: usize) -> Vec<Range<usize>> {
    debug_assert!(size > overlap);
    let mut windows = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + size).min(len);
        windows.push(start..end);
        start += size - overlap;
    }
    windows
}

pub struct Chunker {
    tokenizer: Arc<dyn Tokenizer>,
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk size must be > 0");
        }
        if overlap >= chunk_size {
            bail!(
                "overlap ({}) must be smaller than chunk size ({})",
                overlap,
                chunk_size
            );
        }
        Ok(Self {
            tokenizer,
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Number of tokens the configured tokenizer finds in `text`.
    pub fn token_count(&self, text: &str) -> Result<usize> {
        Ok(self.tokenizer.spans(text)?.len())
    }

    /// Chunk one section into window texts.
    pub fn window_section(&self, section: &str) -> Result<Vec<String>> {
        let spans = self.tokenizer.spans(section)?;
        Ok(token_windows(spans.len(), self.chunk_size, self.overlap)
            .into_iter()
            .map(|w| section[spans[w.start].start..spans[w.end - 1].end].to_string())
            .filter(|content| !content.is_empty())
            .collect())
    }

    /// Chunk a whole document. Positions are contiguous from 0 across sections.
    pub fn chunk_document(&self, text: &str, source: &str) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for section in split_sections(text) {
            for content in self.window_section(section)? {
                chunks.push(Chunk {
                    content,
                    source: source.to_string(),
                    position: chunks.len(),
                });
            }
        }
        Ok(chunks)
    }
}

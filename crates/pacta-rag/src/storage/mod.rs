//! Corpus store interface: vector similarity search plus full-corpus
//! snapshots for lexical indexing.

pub mod memory;

pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::types::Chunk;

/// One nearest-neighbor hit. `distance` is cosine distance; lower is closer.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Immutable view of the corpus taken at a single version, so one retrieval
/// round never observes a half-ingested document.
#[derive(Debug, Clone)]
pub struct CorpusSnapshot {
    version: u64,
    chunks: Arc<Vec<Chunk>>,
}

impl CorpusSnapshot {
    pub fn new(version: u64, chunks: Vec<Chunk>) -> Self {
        Self {
            version,
            chunks: Arc::new(chunks),
        }
    }

    pub(crate) fn from_shared(version: u64, chunks: Arc<Vec<Chunk>>) -> Self {
        Self { version, chunks }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Nearest-neighbor search over chunk embeddings.
    async fn vector_search(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Full corpus snapshot for lexical indexing.
    async fn get_all_chunks(&self) -> Result<CorpusSnapshot>;

    /// Ingestion boundary: append fully-formed chunks.
    async fn add_chunks(&self, chunks: Vec<Chunk>) -> Result<()>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize>;
}

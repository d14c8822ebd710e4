//! In-memory corpus store: brute-force cosine scan over an append-only chunk
//! list. Backs tests and embedded deployments.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use super::{CorpusSnapshot, CorpusStore, SearchHit};
use crate::types::Chunk;

pub struct MemoryStore {
    dimension: usize,
    inner: RwLock<StoreInner>,
}

struct StoreInner {
    version: u64,
    chunks: Arc<Vec<Chunk>>,
}

impl MemoryStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(StoreInner {
                version: 0,
                chunks: Arc::new(Vec::new()),
            }),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn validate(&self, existing: &[Chunk], incoming: &[Chunk]) -> Result<()> {
        let mut seen: HashSet<_> = existing.iter().map(|c| c.chunk_id.clone()).collect();
        for chunk in incoming {
            if chunk.text.trim().is_empty() {
                return Err(anyhow!("Chunk {} has empty text", chunk.chunk_id));
            }
            if chunk.embedding.len() != self.dimension {
                return Err(anyhow!(
                    "Chunk {} embedding dimension {} does not match store dimension {}",
                    chunk.chunk_id,
                    chunk.embedding.len(),
                    self.dimension
                ));
            }
            if !seen.insert(chunk.chunk_id.clone()) {
                return Err(anyhow!("Duplicate chunk id {}", chunk.chunk_id));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CorpusStore for MemoryStore {
    async fn vector_search(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let chunks = self.inner.read().chunks.clone();

        let mut hits: Vec<SearchHit> = chunks
            .iter()
            .map(|chunk| SearchHit {
                chunk: chunk.clone(),
                distance: 1.0 - cosine_similarity(embedding, &chunk.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn get_all_chunks(&self) -> Result<CorpusSnapshot> {
        let inner = self.inner.read();
        Ok(CorpusSnapshot::from_shared(inner.version, inner.chunks.clone()))
    }

    async fn add_chunks(&self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write();
        self.validate(&inner.chunks, &chunks)?;

        let mut merged = Vec::with_capacity(inner.chunks.len() + chunks.len());
        merged.extend(inner.chunks.iter().cloned());
        merged.extend(chunks);

        inner.chunks = Arc::new(merged);
        inner.version += 1;
        tracing::debug!(
            version = inner.version,
            total_chunks = inner.chunks.len(),
            "Corpus updated"
        );
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.read().chunks.len())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

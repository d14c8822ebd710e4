//! Shared test doubles: a scripted generation service and a deterministic
//! embedder so pipeline behavior is reproducible without network access.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::embeddings::EmbeddingModel;
use crate::llm::GenerationService;
use crate::types::{Chunk, ChunkId};

/// Generation service that replays a fixed queue of responses, mirroring how
/// the real service is called: one response per generate() call, in order.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, String>>>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.to_string())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a transport-level failure for one call.
    pub fn with_outcomes(outcomes: Vec<Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl GenerationService for ScriptedLlm {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .push((system_prompt.to_string(), user_prompt.to_string()));
        match self.responses.lock().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("ScriptedLlm exhausted")),
        }
    }
}

/// Deterministic bag-of-tokens embedder: each token hashes to a dimension, so
/// texts sharing words land near each other under cosine similarity.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let mut hash: u64 = 1469598103934665603;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingModel for HashEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Embedder that always fails, for exercising semantic-source failure paths.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingModel for FailingEmbedder {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Err(anyhow!("embedding service unavailable"))
    }

    async fn embed_document(&self, _text: &str) -> Result<Vec<f32>> {
        Err(anyhow!("embedding service unavailable"))
    }

    fn dimension(&self) -> usize {
        8
    }
}

pub fn make_chunk(doc: &str, page: u32, seq: u32, text: &str, embedding: Vec<f32>) -> Chunk {
    Chunk::new(
        ChunkId::new(doc, page, seq),
        format!("{doc}.pdf"),
        text,
        "Acme Corp; Beta LLC",
        embedding,
    )
}

pub async fn embed_chunk(embedder: &HashEmbedder, doc: &str, page: u32, seq: u32, text: &str) -> Chunk {
    let embedding = embedder.embed_document(text).await.unwrap();
    make_chunk(doc, page, seq, text, embedding)
}

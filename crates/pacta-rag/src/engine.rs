//! Top-level engine facade: owns the corpus store, the embedding and
//! generation services, and the refinement controller, and exposes the
//! ingest / answer / summarize operations callers build on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::embeddings::EmbeddingModel;
use crate::llm::{ExternalProvider, GenerationService};
use crate::pipeline::{CancelToken, PipelineState, RefinementController};
use crate::rag::{ContractSummarizer, ContractSummary};
use crate::search::HybridRetriever;
use crate::storage::{CorpusStore, MemoryStore};
use crate::types::{Chunk, ChunkId, QueryResponse, FALLBACK_ANSWER};

/// One pre-chunked span of document text with the page it came from.
/// Chunking itself happens upstream of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageChunk {
    pub page: u32,
    pub text: String,
}

impl PageChunk {
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
        }
    }
}

pub struct QaEngine {
    config: EngineConfig,
    store: Arc<dyn CorpusStore>,
    embedder: Arc<dyn EmbeddingModel>,
    controller: RefinementController,
    summarizer: ContractSummarizer,
}

impl QaEngine {
    /// Build an engine backed by the external provider named in the config
    /// and a fresh in-memory corpus store.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow!("Invalid engine configuration: {e}"))?;
        let provider = Arc::new(ExternalProvider::new(
            config.llm.clone(),
            config.embedding.dimension,
        )?);
        let store = Arc::new(MemoryStore::new(config.embedding.dimension));
        Ok(Self::with_components(
            config,
            store,
            provider.clone(),
            provider,
        ))
    }

    /// Build an engine from externally supplied components. This is the
    /// constructor tests and embedded deployments use.
    pub fn with_components(
        config: EngineConfig,
        store: Arc<dyn CorpusStore>,
        embedder: Arc<dyn EmbeddingModel>,
        llm: Arc<dyn GenerationService>,
    ) -> Self {
        let retriever =
            HybridRetriever::new(store.clone(), embedder.clone(), config.search.clone());
        let controller = RefinementController::new(
            llm.clone(),
            retriever,
            config.search.clone(),
            config.refinement.clone(),
        );
        let summarizer = ContractSummarizer::new(llm);
        Self {
            config,
            store,
            embedder,
            controller,
            summarizer,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Answer a query through the full self-correcting pipeline.
    pub async fn answer_query(&self, query: &str) -> QueryResponse {
        self.answer_query_with_cancel(query, &CancelToken::new())
            .await
    }

    /// Answer a query with a caller-held cancellation token. A cancelled
    /// query returns a well-formed fallback response, not an error.
    pub async fn answer_query_with_cancel(
        &self,
        query: &str,
        cancel: &CancelToken,
    ) -> QueryResponse {
        if query.trim().is_empty() {
            return QueryResponse::fallback(FALLBACK_ANSWER, "Empty query.");
        }
        let started = Instant::now();
        tracing::info!(query = %query, "Answering query");
        let mut response = self.controller.resume(PipelineState::new(query), cancel).await;
        response.metadata.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            attempts = response.metadata.attempts,
            expanded = response.metadata.expanded,
            duration_ms = response.metadata.duration_ms,
            confidence = response.confidence,
            "Query answered"
        );
        response
    }

    /// Resume a previously serialized pipeline state. The state continues at
    /// the stage it stopped at with its remaining attempt budget.
    pub async fn resume_query(&self, state: PipelineState, cancel: &CancelToken) -> QueryResponse {
        let started = Instant::now();
        let mut response = self.controller.resume(state, cancel).await;
        response.metadata.duration_ms = started.elapsed().as_millis() as u64;
        response
    }

    /// Ingest one document's pre-chunked page texts: embed each chunk
    /// document-side, assign compound chunk ids, and append to the corpus.
    /// Returns the generated document id.
    pub async fn ingest_document(
        &self,
        file_name: &str,
        parties: &str,
        chunks: &[PageChunk],
    ) -> Result<String> {
        if chunks.is_empty() {
            return Err(anyhow!("Document '{file_name}' has no chunks to ingest"));
        }
        let document_id = uuid::Uuid::new_v4().to_string();
        let mut seq_by_page: HashMap<u32, u32> = HashMap::new();
        let mut stored = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let text = chunk.text.trim();
            if text.is_empty() {
                continue;
            }
            let embedding = self
                .embedder
                .embed_document(text)
                .await
                .with_context(|| {
                    format!("Embedding failed for '{file_name}' page {}", chunk.page)
                })?;
            let seq = seq_by_page.entry(chunk.page).or_insert(0);
            let chunk_id = ChunkId::new(document_id.clone(), chunk.page, *seq);
            *seq += 1;
            stored.push(Chunk::new(chunk_id, file_name, text, parties, embedding));
        }
        if stored.is_empty() {
            return Err(anyhow!("Document '{file_name}' contained only empty chunks"));
        }
        let ingested = stored.len();
        self.store
            .add_chunks(stored)
            .await
            .with_context(|| format!("Storing chunks for '{file_name}' failed"))?;
        tracing::info!(
            document_id = %document_id,
            file = file_name,
            chunks = ingested,
            "Document ingested"
        );
        Ok(document_id)
    }

    /// Extract a structured summary from raw contract text. The summary's
    /// `parties` feeds the metadata written at ingestion.
    pub async fn summarize_contract(&self, text: &str) -> Result<ContractSummary> {
        self.summarizer.summarize(text).await
    }

    /// Number of chunks currently in the corpus.
    pub async fn corpus_size(&self) -> Result<usize> {
        self.store.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{HashEmbedder, ScriptedLlm};

    fn engine_with(llm: Arc<ScriptedLlm>) -> QaEngine {
        let config = EngineConfig::default();
        let store = Arc::new(MemoryStore::new(16));
        let embedder = Arc::new(HashEmbedder::new(16));
        QaEngine::with_components(config, store, embedder, llm)
    }

    #[tokio::test]
    async fn ingest_assigns_compound_ids_per_page() {
        let engine = engine_with(Arc::new(ScriptedLlm::new(vec![])));
        let chunks = vec![
            PageChunk::new(1, "Payment due within 30 days of invoice."),
            PageChunk::new(1, "Late fee 5% per month."),
            PageChunk::new(2, "Termination requires 60 days notice."),
        ];
        let document_id = engine
            .ingest_document("msa.pdf", "Acme Corp; Beta LLC", &chunks)
            .await
            .unwrap();

        assert_eq!(engine.corpus_size().await.unwrap(), 3);
        let snapshot = engine.store.get_all_chunks().await.unwrap();
        let ids: Vec<String> = snapshot
            .chunks()
            .iter()
            .map(|c| c.chunk_id.to_string())
            .collect();
        assert!(ids.contains(&format!("{document_id}_p001_c000")));
        assert!(ids.contains(&format!("{document_id}_p001_c001")));
        assert!(ids.contains(&format!("{document_id}_p002_c000")));
        assert!(snapshot.chunks().iter().all(|c| c.parties == "Acme Corp; Beta LLC"));
    }

    #[tokio::test]
    async fn ingest_rejects_empty_documents() {
        let engine = engine_with(Arc::new(ScriptedLlm::new(vec![])));
        assert!(engine.ingest_document("empty.pdf", "", &[]).await.is_err());

        let blank = vec![PageChunk::new(1, "   "), PageChunk::new(2, "")];
        assert!(engine
            .ingest_document("blank.pdf", "", &blank)
            .await
            .is_err());
        assert_eq!(engine.corpus_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn answer_query_feeds_retrieved_text_to_the_generator() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            r#"{"is_contract_related": true, "query_type": "general", "keywords": ["payment", "late fee"], "focus_areas": [], "contract_types": []}"#,
            r#"{"answer": "The late fee is 5% per month.", "references": [{"file_name": "msa.pdf", "page": 1, "document_name": "Master Agreement", "relevance": "States the late fee"}], "confidence": 0.85}"#,
            r#"{"score": 0.9, "feedback": "Supported by the cited chunk"}"#,
            r#"{"evaluation_score": 0.85, "feedback": "Complete", "suggestions_for_improvement": []}"#,
        ]));
        let engine = engine_with(llm.clone());
        engine
            .ingest_document(
                "msa.pdf",
                "Acme Corp; Beta LLC",
                &[PageChunk::new(
                    1,
                    "Payment due within 30 days of invoice, late fee 5% per month.",
                )],
            )
            .await
            .unwrap();

        let response = engine.answer_query("What is the late payment penalty?").await;
        assert!(response.answer.contains("5%"));
        assert_eq!(response.references[0].file_name, "msa.pdf");
        assert_eq!(response.metadata.attempts, 0);

        let calls = llm.calls.lock();
        let generate_prompt = &calls[1].1;
        assert!(generate_prompt.contains("late fee 5% per month"));
        assert!(generate_prompt.contains("msa.pdf"));
    }

    #[tokio::test]
    async fn empty_query_short_circuits_without_llm_calls() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let engine = engine_with(llm.clone());

        let response = engine.answer_query("   ").await;
        assert_eq!(response.answer, FALLBACK_ANSWER);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn summarize_contract_delegates_to_the_summarizer() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            r#"{"title": "Master Service Agreement", "parties": "Acme Corp; Beta LLC", "dates": [{"priority": "high", "date": "2026-01-15", "description": "Effective date"}]}"#,
        ]));
        let engine = engine_with(llm);

        let summary = engine
            .summarize_contract("This Master Service Agreement is made...")
            .await
            .unwrap();
        assert_eq!(summary.title, "Master Service Agreement");
        assert_eq!(summary.dates.len(), 1);
    }

    #[tokio::test]
    async fn invalid_configuration_is_rejected() {
        let mut config = EngineConfig::default();
        config.search.top_n = 0;
        let err = QaEngine::new(config).unwrap_err();
        assert!(err.to_string().contains("top_n"));
    }
}

//! Hybrid retrieval: vector-similarity and lexical results fused into one
//! ranked candidate list, deduplicated by chunk identity and boosted by
//! query-analysis signals.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::embeddings::EmbeddingModel;
use crate::search::lexical::{LexicalHit, LexicalRanker};
use crate::storage::{CorpusStore, SearchHit};
use crate::types::{ChunkId, ChunkMetadata, QueryAnalysis, RetrievalCandidate};

/// Combine weighted per-source contributions for one candidate. When both
/// sources are present the larger weighted contribution wins, so consensus
/// never scores below either source alone and nothing is double-counted.
pub fn fuse_contributions(
    semantic: Option<f32>,
    lexical: Option<f32>,
    semantic_weight: f32,
    lexical_weight: f32,
) -> f32 {
    let semantic_part = semantic.map(|s| semantic_weight * s);
    let lexical_part = lexical.map(|l| lexical_weight * l);
    match (semantic_part, lexical_part) {
        (Some(s), Some(l)) => s.max(l),
        (Some(s), None) => s,
        (None, Some(l)) => l,
        (None, None) => 0.0,
    }
}

/// Weighted count of analysis signals found in the candidate text
/// (case-insensitive substring match).
pub fn boost_count(text: &str, analysis: &QueryAnalysis, config: &SearchConfig) -> u32 {
    let lower = text.to_lowercase();
    let matched = |phrase: &String| {
        let phrase = phrase.trim().to_lowercase();
        !phrase.is_empty() && lower.contains(&phrase)
    };

    let mut count = 0;
    for keyword in &analysis.keywords {
        if matched(keyword) {
            count += config.keyword_boost;
        }
    }
    for focus in &analysis.focus_areas {
        if matched(focus) {
            count += config.focus_boost;
        }
    }
    for contract_type in &analysis.contract_types {
        if matched(contract_type) {
            count += config.contract_type_boost;
        }
    }
    count
}

pub struct HybridRetriever {
    store: Arc<dyn CorpusStore>,
    embedder: Arc<dyn EmbeddingModel>,
    config: SearchConfig,
    ranker: LexicalRanker,
}

struct CandidateAccum {
    chunk_id: ChunkId,
    text: String,
    metadata: ChunkMetadata,
    semantic: Option<f32>,
    lexical_raw: Option<f32>,
    lexical_norm: Option<f32>,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn CorpusStore>,
        embedder: Arc<dyn EmbeddingModel>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            ranker: LexicalRanker::new(),
        }
    }

    /// Retrieve the fused top-`top_n` candidates for an analyzed query.
    /// Either source may fail independently; the surviving source is used
    /// alone, and total failure yields an empty list.
    pub async fn retrieve(
        &self,
        query: &str,
        analysis: &QueryAnalysis,
        top_n: usize,
    ) -> Vec<RetrievalCandidate> {
        let terms = analysis.search_terms();
        if terms.trim().is_empty() {
            tracing::debug!("No search terms extracted; skipping retrieval");
            return Vec::new();
        }

        let fetch_k = top_n * self.config.candidate_multiplier;
        let semantic_hits = self.semantic_search(query, fetch_k).await;
        let (lexical_hits, lexical_texts) = self.lexical_search(&terms, fetch_k).await;

        let candidates = self.fuse(semantic_hits, lexical_hits, lexical_texts, analysis, top_n);
        tracing::debug!(
            candidates = candidates.len(),
            top_n,
            fetch_k,
            "Hybrid retrieval complete"
        );
        candidates
    }

    async fn semantic_search(&self, query: &str, fetch_k: usize) -> Vec<SearchHit> {
        let embedding = match self.embedder.embed_query(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(error = %e, "Query embedding failed; dropping semantic source");
                return Vec::new();
            }
        };

        match self.store.vector_search(&embedding, fetch_k).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "Vector search failed; dropping semantic source");
                Vec::new()
            }
        }
    }

    /// Lexical hits plus the chunk text/metadata backing each hit, pulled from
    /// one corpus snapshot so ranking and hydration agree.
    async fn lexical_search(
        &self,
        terms: &str,
        fetch_k: usize,
    ) -> (Vec<LexicalHit>, HashMap<ChunkId, (String, ChunkMetadata)>) {
        let snapshot = match self.store.get_all_chunks().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Corpus snapshot failed; dropping lexical source");
                return (Vec::new(), HashMap::new());
            }
        };

        let hits = self.ranker.rank(&snapshot, terms, fetch_k);
        let texts = hits
            .iter()
            .map(|hit| {
                let chunk = &snapshot.chunks()[hit.chunk_index];
                (
                    hit.chunk_id.clone(),
                    (chunk.text.clone(), chunk.metadata()),
                )
            })
            .collect();
        (hits, texts)
    }

    fn fuse(
        &self,
        semantic_hits: Vec<SearchHit>,
        lexical_hits: Vec<LexicalHit>,
        lexical_texts: HashMap<ChunkId, (String, ChunkMetadata)>,
        analysis: &QueryAnalysis,
        top_n: usize,
    ) -> Vec<RetrievalCandidate> {
        let mut order: Vec<CandidateAccum> = Vec::new();
        let mut index: HashMap<ChunkId, usize> = HashMap::new();

        for hit in semantic_hits {
            let component = (1.0 - hit.distance).clamp(0.0, 1.0);
            let id = hit.chunk.chunk_id.clone();
            if let Some(&i) = index.get(&id) {
                // Duplicate ids from one source keep their best component.
                let entry = &mut order[i];
                entry.semantic = Some(entry.semantic.map_or(component, |s| s.max(component)));
                continue;
            }
            index.insert(id.clone(), order.len());
            order.push(CandidateAccum {
                chunk_id: id,
                text: hit.chunk.text.clone(),
                metadata: hit.chunk.metadata(),
                semantic: Some(component),
                lexical_raw: None,
                lexical_norm: None,
            });
        }

        let max_lexical = lexical_hits
            .iter()
            .map(|h| h.score)
            .fold(0.0f32, f32::max);
        for hit in lexical_hits {
            let norm = if max_lexical > 0.0 {
                hit.score / max_lexical
            } else {
                0.0
            };
            if let Some(&i) = index.get(&hit.chunk_id) {
                let entry = &mut order[i];
                entry.lexical_raw = Some(hit.score);
                entry.lexical_norm = Some(norm);
                continue;
            }
            let (text, metadata) = match lexical_texts.get(&hit.chunk_id) {
                Some(found) => found.clone(),
                None => continue,
            };
            index.insert(hit.chunk_id.clone(), order.len());
            order.push(CandidateAccum {
                chunk_id: hit.chunk_id,
                text,
                metadata,
                semantic: None,
                lexical_raw: Some(hit.score),
                lexical_norm: Some(norm),
            });
        }

        let mut scored: Vec<(CandidateAccum, f32, f32)> = order
            .into_iter()
            .map(|accum| {
                let fused = fuse_contributions(
                    accum.semantic,
                    accum.lexical_norm,
                    self.config.semantic_weight,
                    self.config.lexical_weight,
                );
                let boosts = boost_count(&accum.text, analysis, &self.config);
                let boosted = fused * (1.0 + self.config.boost_step * boosts as f32);
                (accum, fused, boosted)
            })
            .collect();

        // Stable sort: ties fall back to pre-boost fused score, then to the
        // order candidates were first inserted.
        scored.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
        });
        scored.truncate(top_n);

        scored
            .into_iter()
            .map(|(accum, _fused, boosted)| RetrievalCandidate {
                chunk_id: accum.chunk_id,
                document_text: accum.text,
                metadata: accum.metadata,
                semantic_score: accum.semantic,
                lexical_score: accum.lexical_raw,
                fused_score: boosted,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::test_support::{embed_chunk, FailingEmbedder, HashEmbedder};
    use crate::types::QueryType;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    fn analysis(keywords: &[&str]) -> QueryAnalysis {
        QueryAnalysis {
            is_contract_related: true,
            query_type: QueryType::Detailed,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            focus_areas: Vec::new(),
            contract_types: Vec::new(),
        }
    }

    fn search_config() -> SearchConfig {
        crate::config::EngineConfig::default().search
    }

    async fn seeded_store(embedder: &HashEmbedder, texts: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new(embedder.dimension()));
        let mut chunks = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            chunks.push(embed_chunk(embedder, &format!("doc-{i}"), 1, 0, text).await);
        }
        store.add_chunks(chunks).await.unwrap();
        store
    }

    #[test]
    fn fusion_is_monotonic_in_each_component() {
        let weights = (0.7, 0.3);
        for base in [0.0f32, 0.2, 0.5, 0.9] {
            let mut last = fuse_contributions(Some(0.0), Some(base), weights.0, weights.1);
            for step in 1..=10 {
                let semantic = step as f32 / 10.0;
                let fused = fuse_contributions(Some(semantic), Some(base), weights.0, weights.1);
                assert!(fused >= last);
                last = fused;
            }

            let mut last = fuse_contributions(Some(base), Some(0.0), weights.0, weights.1);
            for step in 1..=10 {
                let lexical = step as f32 / 10.0;
                let fused = fuse_contributions(Some(base), Some(lexical), weights.0, weights.1);
                assert!(fused >= last);
                last = fused;
            }
        }
    }

    #[test]
    fn consensus_never_penalizes() {
        for semantic in [0.1f32, 0.5, 0.9] {
            for lexical in [0.1f32, 0.5, 0.9] {
                let both = fuse_contributions(Some(semantic), Some(lexical), 0.7, 0.3);
                let semantic_only = fuse_contributions(Some(semantic), None, 0.7, 0.3);
                let lexical_only = fuse_contributions(None, Some(lexical), 0.7, 0.3);
                assert!(both >= semantic_only);
                assert!(both >= lexical_only);
            }
        }
    }

    #[test]
    fn missing_source_contributes_nothing() {
        assert_eq!(fuse_contributions(None, None, 0.7, 0.3), 0.0);
        assert_eq!(fuse_contributions(Some(0.8), None, 0.7, 0.3), 0.7 * 0.8);
        assert_eq!(fuse_contributions(None, Some(1.0), 0.7, 0.3), 0.3);
    }

    #[test]
    fn boost_counts_are_weighted_by_signal_kind() {
        let config = search_config();
        let mut analysis = analysis(&["payment"]);
        analysis.focus_areas.push("late fee".into());
        analysis.contract_types.push("service agreement".into());

        let text = "This Service Agreement sets the payment schedule and late fee terms.";
        // keyword 1 + focus 2 + contract type 3
        assert_eq!(boost_count(text, &analysis, &config), 6);
        assert_eq!(boost_count("unrelated text", &analysis, &config), 0);
    }

    #[tokio::test]
    async fn whitespace_terms_short_circuit() {
        let embedder = HashEmbedder::new(16);
        let store = seeded_store(&embedder, &["Payment due within 30 days."]).await;
        let retriever = HybridRetriever::new(store, Arc::new(HashEmbedder::new(16)), search_config());

        let empty = analysis(&[]);
        assert!(retriever.retrieve("query", &empty, 5).await.is_empty());

        let blank = analysis(&["  ", "\t"]);
        assert!(retriever.retrieve("query", &blank, 5).await.is_empty());
    }

    #[tokio::test]
    async fn single_chunk_scores_positive() {
        let embedder = HashEmbedder::new(16);
        let store = seeded_store(
            &embedder,
            &["Payment due within 30 days of invoice, late fee 5% per month."],
        )
        .await;
        let retriever =
            HybridRetriever::new(store, Arc::new(HashEmbedder::new(16)), search_config());

        let mut analysis = analysis(&["payment", "late fee"]);
        analysis.query_type = QueryType::General;
        let candidates = retriever
            .retrieve("What is the late payment penalty?", &analysis, 5)
            .await;

        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].fused_score > 0.0);
        assert!(candidates[0].semantic_score.is_some());
        assert!(candidates[0].lexical_score.is_some());
    }

    #[tokio::test]
    async fn dual_source_candidates_keep_max_weighted_contribution() {
        let embedder = HashEmbedder::new(16);
        let store = seeded_store(
            &embedder,
            &[
                "Payment due within 30 days of invoice.",
                "Termination requires written notice.",
            ],
        )
        .await;
        let retriever =
            HybridRetriever::new(store, Arc::new(HashEmbedder::new(16)), search_config());

        let candidates = retriever
            .retrieve("payment due invoice", &analysis(&["payment", "invoice"]), 5)
            .await;

        let config = search_config();
        for candidate in &candidates {
            if let (Some(semantic), Some(_)) = (candidate.semantic_score, candidate.lexical_score) {
                let semantic_part = config.semantic_weight * semantic;
                // Boost factor only multiplies; the pre-boost fused score must
                // be at least the semantic contribution alone.
                assert!(candidate.fused_score >= semantic_part);
            }
        }
    }

    #[tokio::test]
    async fn contract_type_match_outranks_plain_match() {
        let embedder = HashEmbedder::new(32);
        let store = seeded_store(
            &embedder,
            &[
                "The payment terms are thirty days.",
                "This lease agreement sets payment terms of thirty days.",
            ],
        )
        .await;
        let retriever =
            HybridRetriever::new(store, Arc::new(HashEmbedder::new(32)), search_config());

        let mut analysis = analysis(&["payment terms"]);
        analysis.contract_types.push("lease agreement".into());
        let candidates = retriever
            .retrieve("payment terms", &analysis, 5)
            .await;

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].metadata.document_id, "doc-1");
    }

    struct BrokenStore;

    #[async_trait]
    impl CorpusStore for BrokenStore {
        async fn vector_search(&self, _embedding: &[f32], _k: usize) -> Result<Vec<SearchHit>> {
            Err(anyhow!("index offline"))
        }

        async fn get_all_chunks(&self) -> Result<crate::storage::CorpusSnapshot> {
            Err(anyhow!("store offline"))
        }

        async fn add_chunks(&self, _chunks: Vec<crate::types::Chunk>) -> Result<()> {
            Err(anyhow!("store offline"))
        }

        async fn count(&self) -> Result<usize> {
            Err(anyhow!("store offline"))
        }
    }

    #[tokio::test]
    async fn lexical_survives_semantic_failure() {
        let embedder = HashEmbedder::new(16);
        let store = seeded_store(&embedder, &["Payment due within 30 days."]).await;
        let retriever = HybridRetriever::new(store, Arc::new(FailingEmbedder), search_config());

        let candidates = retriever
            .retrieve("payment window", &analysis(&["payment"]), 5)
            .await;
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].semantic_score.is_none());
        assert!(candidates[0].lexical_score.is_some());
        assert!(candidates[0].fused_score > 0.0);
    }

    #[tokio::test]
    async fn total_source_failure_yields_empty_list() {
        let retriever = HybridRetriever::new(
            Arc::new(BrokenStore),
            Arc::new(FailingEmbedder),
            search_config(),
        );
        let candidates = retriever
            .retrieve("payment", &analysis(&["payment"]), 5)
            .await;
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn empty_corpus_yields_empty_list() {
        let store = Arc::new(MemoryStore::new(16));
        let retriever =
            HybridRetriever::new(store, Arc::new(HashEmbedder::new(16)), search_config());
        let candidates = retriever
            .retrieve("payment", &analysis(&["payment"]), 5)
            .await;
        assert!(candidates.is_empty());
    }
}

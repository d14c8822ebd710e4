pub mod config;
pub mod embeddings;
pub mod engine;
pub mod llm;
pub mod pipeline;
pub mod rag;
pub mod search;
pub mod storage;
pub mod types;

#[cfg(test)]
pub mod test_support;

// Re-export primary types for convenience
pub use config::{EmbeddingConfig, EngineConfig, LlmConfig, RefinementConfig, SearchConfig};
pub use engine::{PageChunk, QaEngine};
pub use pipeline::{CancelToken, PipelineStage, PipelineState, RefinementController};
pub use rag::{ContractSummary, SummaryCondition, SummaryDate};
pub use types::{
    AnswerReference, Chunk, ChunkId, ChunkMetadata, GeneratedAnswer, GroundednessResult,
    QueryAnalysis, QueryResponse, QueryType, ResponseMetadata, RetrievalCandidate,
    SelfEvaluationResult, FALLBACK_ANSWER,
};

// Re-export service traits and their concrete implementations
pub use embeddings::EmbeddingModel;
pub use llm::{ExternalProvider, GenerationService, ProviderError};
pub use search::HybridRetriever;
pub use storage::{CorpusSnapshot, CorpusStore, MemoryStore, SearchHit};

// Re-export common types
pub use anyhow::{Error, Result};

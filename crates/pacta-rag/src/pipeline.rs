//! The self-correcting answer pipeline: an explicit state machine over one
//! query's working record. Each stage absorbs its own failures into
//! conservative defaults, so the loop always terminates with a well-formed
//! response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{RefinementConfig, SearchConfig};
use crate::llm::GenerationService;
use crate::rag::{
    AnswerGenerator, GroundednessEvaluator, QueryAnalyzer, QueryRewriter, SelfEvaluator,
};
use crate::search::HybridRetriever;
use crate::types::{
    GeneratedAnswer, GroundednessResult, QueryAnalysis, QueryResponse, ResponseMetadata,
    RetrievalCandidate, SelfEvaluationResult, FALLBACK_ANSWER,
};

/// Where the pipeline stands. Serialized with [`PipelineState`] so a stored
/// state resumes at the stage it stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Analyze,
    Retrieve,
    Generate,
    CheckGroundedness,
    SelfEvaluate,
    Accept,
    RefineQuery,
    ExpandRetrieval,
    Fail,
}

/// Working record for one query, threaded through the state machine. The
/// attempt counter is shared by both refinement kinds; serializing and
/// reloading a state keeps the remaining budget intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub stage: PipelineStage,
    pub query: String,
    pub analysis: QueryAnalysis,
    pub candidates: Vec<RetrievalCandidate>,
    pub answer: GeneratedAnswer,
    pub groundedness: GroundednessResult,
    pub evaluation: SelfEvaluationResult,
    pub attempt_count: u32,
    pub expanded: bool,
}

impl PipelineState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            stage: PipelineStage::Analyze,
            query: query.into(),
            analysis: QueryAnalysis::unrelated(),
            candidates: Vec::new(),
            answer: GeneratedAnswer::fallback(),
            groundedness: GroundednessResult::unverified("Not yet checked."),
            evaluation: SelfEvaluationResult::neutral("Not yet evaluated."),
            attempt_count: 0,
            expanded: false,
        }
    }
}

/// Cooperative cancellation handle, checked at every stage transition.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub struct RefinementController {
    analyzer: QueryAnalyzer,
    retriever: HybridRetriever,
    generator: AnswerGenerator,
    groundedness: GroundednessEvaluator,
    evaluator: SelfEvaluator,
    rewriter: QueryRewriter,
    search: SearchConfig,
    refinement: RefinementConfig,
}

impl RefinementController {
    pub fn new(
        llm: Arc<dyn GenerationService>,
        retriever: HybridRetriever,
        search: SearchConfig,
        refinement: RefinementConfig,
    ) -> Self {
        Self {
            analyzer: QueryAnalyzer::new(llm.clone()),
            generator: AnswerGenerator::new(llm.clone()),
            groundedness: GroundednessEvaluator::new(llm.clone()),
            evaluator: SelfEvaluator::new(llm.clone()),
            rewriter: QueryRewriter::new(llm),
            retriever,
            search,
            refinement,
        }
    }

    pub async fn run(&self, query: &str) -> QueryResponse {
        self.resume(PipelineState::new(query), &CancelToken::new())
            .await
    }

    /// Drive a state to termination. The state may be freshly created or a
    /// deserialized one from an earlier session; processing picks up at
    /// `state.stage` with the recorded attempt budget.
    pub async fn resume(&self, mut state: PipelineState, cancel: &CancelToken) -> QueryResponse {
        loop {
            if cancel.is_cancelled() {
                tracing::info!(stage = ?state.stage, attempts = state.attempt_count, "Pipeline cancelled");
                let mut response =
                    QueryResponse::fallback(FALLBACK_ANSWER, "Pipeline cancelled before completion.");
                response.metadata.attempts = state.attempt_count;
                response.metadata.expanded = state.expanded;
                return response;
            }

            state.stage = match state.stage {
                PipelineStage::Analyze => {
                    state.analysis = self.analyzer.analyze(&state.query).await;
                    if state.analysis.is_contract_related {
                        PipelineStage::Retrieve
                    } else {
                        let reply = self.generator.conversational_reply(&state.query).await;
                        return conversational_response(reply, &state);
                    }
                }
                PipelineStage::Retrieve => {
                    let budget = if state.expanded {
                        self.search.expanded_top_n
                    } else {
                        self.search.top_n
                    };
                    state.candidates = self
                        .retriever
                        .retrieve(&state.query, &state.analysis, budget)
                        .await;
                    PipelineStage::Generate
                }
                PipelineStage::Generate => {
                    state.answer = self
                        .generator
                        .generate(&state.query, &state.candidates, state.analysis.query_type)
                        .await;
                    PipelineStage::CheckGroundedness
                }
                PipelineStage::CheckGroundedness => {
                    state.groundedness = self.groundedness.score(&state.answer).await;
                    PipelineStage::SelfEvaluate
                }
                PipelineStage::SelfEvaluate => {
                    state.evaluation = self
                        .evaluator
                        .score(&state.query, &state.answer, &state.candidates)
                        .await;
                    self.decide(&state)
                }
                PipelineStage::RefineQuery => {
                    let rewritten = self
                        .rewriter
                        .rewrite(&state.query, &state.answer, &state.evaluation)
                        .await;
                    if rewritten == state.query {
                        tracing::debug!("Query rewrite made no progress; accepting current answer");
                        PipelineStage::Accept
                    } else {
                        state.attempt_count += 1;
                        tracing::info!(
                            attempt = state.attempt_count,
                            rewritten = %rewritten,
                            "Refining with rewritten query"
                        );
                        state.query = rewritten;
                        PipelineStage::Analyze
                    }
                }
                PipelineStage::ExpandRetrieval => {
                    state.attempt_count += 1;
                    state.expanded = true;
                    tracing::info!(
                        attempt = state.attempt_count,
                        budget = self.search.expanded_top_n,
                        "Expanding retrieval budget"
                    );
                    PipelineStage::Retrieve
                }
                PipelineStage::Accept => {
                    tracing::debug!(
                        attempts = state.attempt_count,
                        confidence = state.answer.confidence,
                        groundedness = state.groundedness.score,
                        "Answer accepted"
                    );
                    return accepted_response(&state);
                }
                PipelineStage::Fail => {
                    let mut response = QueryResponse::fallback(
                        FALLBACK_ANSWER,
                        "Pipeline stopped in an unrecoverable state.",
                    );
                    response.metadata.attempts = state.attempt_count;
                    response.metadata.expanded = state.expanded;
                    return response;
                }
            };
        }
    }

    /// Post-evaluation routing. Both thresholds are checked on every pass and
    /// both remedies draw from the same attempt counter; low confidence is a
    /// query-wording problem (rewrite), low groundedness a coverage problem
    /// (expand).
    fn decide(&self, state: &PipelineState) -> PipelineStage {
        let attempts_left = state.attempt_count < self.refinement.max_attempts;
        if state.answer.confidence < self.refinement.confidence_threshold && attempts_left {
            return PipelineStage::RefineQuery;
        }
        if state.groundedness.score < self.refinement.groundedness_threshold && attempts_left {
            return PipelineStage::ExpandRetrieval;
        }
        PipelineStage::Accept
    }
}

fn conversational_response(reply: String, state: &PipelineState) -> QueryResponse {
    QueryResponse {
        answer: reply,
        references: Vec::new(),
        confidence: 1.0,
        groundedness: GroundednessResult {
            score: 1.0,
            feedback: "Conversational reply; no citations to verify.".into(),
        },
        evaluation: SelfEvaluationResult {
            evaluation_score: 1.0,
            feedback: "Conversational reply outside the document domain.".into(),
            suggestions: Vec::new(),
        },
        metadata: ResponseMetadata {
            attempts: state.attempt_count,
            expanded: state.expanded,
            duration_ms: 0,
        },
    }
}

fn accepted_response(state: &PipelineState) -> QueryResponse {
    QueryResponse {
        answer: state.answer.answer.clone(),
        references: state.answer.references.clone(),
        confidence: state.answer.confidence,
        groundedness: state.groundedness.clone(),
        evaluation: state.evaluation.clone(),
        metadata: ResponseMetadata {
            attempts: state.attempt_count,
            expanded: state.expanded,
            duration_ms: 0,
        },
    }
}

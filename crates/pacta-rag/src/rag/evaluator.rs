//! Two independent answer scorers. Groundedness judges the answer against
//! its own cited references; self-evaluation judges relevance and
//! completeness against the query and candidate set. Their failure defaults
//! differ on purpose: an unverifiable citation claim is presumed untrustworthy
//! (0.0), while an unscored relevance judgment is merely unknown (0.5).

use std::sync::Arc;

use crate::llm::GenerationService;
use crate::rag::generator::format_candidates;
use crate::rag::structured::parse_structured;
use crate::types::{
    AnswerReference, GeneratedAnswer, GroundednessResult, RetrievalCandidate,
    SelfEvaluationResult,
};

fn format_references(references: &[AnswerReference]) -> String {
    references
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[{}] {} (page {}) - {}: {}",
                i + 1,
                r.file_name,
                r.page,
                r.document_name,
                r.relevance
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct GroundednessEvaluator {
    llm: Arc<dyn GenerationService>,
}

impl GroundednessEvaluator {
    pub fn new(llm: Arc<dyn GenerationService>) -> Self {
        Self { llm }
    }

    /// Score how well the answer is supported by the references it cites.
    /// An answer with no citations has nothing to verify against and scores
    /// 0.0 without a generation call.
    pub async fn score(&self, answer: &GeneratedAnswer) -> GroundednessResult {
        if answer.references.is_empty() {
            return GroundednessResult::unverified(
                "Answer cites no references to verify against.",
            );
        }

        let user_prompt = format!(
            r#"You are checking whether an answer is supported by the references it cites.
Score ONLY the support relationship: does the cited material actually back
each claim in the answer? Fabricated or irrelevant citations score low.

Answer:
{answer}

Cited references:
{references}

Respond in JSON format:
{{
    "score": 0.0,
    "feedback": "Which claims are supported and which are not"
}}
Set score between 0.0 (unsupported) and 1.0 (fully supported)."#,
            answer = answer.answer,
            references = format_references(&answer.references)
        );

        let raw = match self
            .llm
            .generate(
                "You are a strict reviewer of answer groundedness for contract Q&A.",
                &user_prompt,
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Groundedness call failed; scoring 0.0");
                return GroundednessResult::unverified(format!(
                    "Groundedness check failed: {e}"
                ));
            }
        };

        match parse_structured::<GroundednessResult>(&raw) {
            Some(mut result) => {
                result.score = result.score.clamp(0.0, 1.0);
                tracing::debug!(score = result.score, "Groundedness scored");
                result
            }
            None => {
                tracing::warn!("Groundedness output was not parseable; scoring 0.0");
                GroundednessResult::unverified(
                    "Groundedness check returned no parseable score.",
                )
            }
        }
    }
}

pub struct SelfEvaluator {
    llm: Arc<dyn GenerationService>,
}

impl SelfEvaluator {
    pub fn new(llm: Arc<dyn GenerationService>) -> Self {
        Self { llm }
    }

    /// Score the answer's relevance, accuracy, and completeness for the query
    /// given the candidates it was generated from.
    pub async fn score(
        &self,
        query: &str,
        answer: &GeneratedAnswer,
        candidates: &[RetrievalCandidate],
    ) -> SelfEvaluationResult {
        let user_prompt = format!(
            r#"Evaluate the response to the user query for relevance, accuracy, and
completeness, given the search results it was based on.

User query: {query}

Response: {answer}

Search results:
{context}

Respond in JSON format:
{{
    "evaluation_score": 0.0,
    "feedback": "Overall assessment",
    "suggestions_for_improvement": ["suggestion1", "suggestion2"]
}}
Set evaluation_score between 0.0 and 1.0."#,
            query = query,
            answer = answer.answer,
            context = format_candidates(candidates)
        );

        let raw = match self
            .llm
            .generate(
                "You are an AI assistant specialized in evaluating answers about contracts.",
                &user_prompt,
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Self-evaluation call failed; scoring neutral 0.5");
                return SelfEvaluationResult::neutral(format!("Self-evaluation failed: {e}"));
            }
        };

        match parse_structured::<SelfEvaluationResult>(&raw) {
            Some(mut result) => {
                result.evaluation_score = result.evaluation_score.clamp(0.0, 1.0);
                tracing::debug!(
                    evaluation_score = result.evaluation_score,
                    suggestions = result.suggestions.len(),
                    "Self-evaluation scored"
                );
                result
            }
            None => {
                tracing::warn!("Self-evaluation output was not parseable; scoring neutral 0.5");
                SelfEvaluationResult::neutral(
                    "Self-evaluation returned no parseable score.",
                )
            }
        }
    }
}

//! Answer synthesis from fused retrieval candidates, conditioned on query
//! type. Output is always a well-formed [`GeneratedAnswer`]; generation and
//! parse failures substitute the canonical fallback.

use std::sync::Arc;

use crate::llm::GenerationService;
use crate::rag::structured::parse_structured;
use crate::types::{GeneratedAnswer, QueryType, RetrievalCandidate, FALLBACK_ANSWER};

pub struct AnswerGenerator {
    llm: Arc<dyn GenerationService>,
}

fn system_prompt(query_type: QueryType) -> &'static str {
    match query_type {
        QueryType::General => {
            "You are an AI assistant specialized in answering questions about contracts. \
             Answer concisely, citing only the sources you actually used."
        }
        QueryType::Summary => {
            "You are an AI assistant specialized in summarizing contract documents. \
             Give a structured overview of the relevant material, citing each source document."
        }
        QueryType::Detailed => {
            "You are an AI assistant specialized in answering detailed questions about contracts. \
             Quote or paraphrase the specific clauses that support each claim and cite every source."
        }
    }
}

/// Numbered context blocks, one per candidate, in fused rank order.
pub(crate) fn format_candidates(candidates: &[RetrievalCandidate]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "[{}] File: {} (page {})\nParties: {}\n{}",
                i + 1,
                c.metadata.file_name,
                c.metadata.page_number,
                c.metadata.parties,
                c.document_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn GenerationService>) -> Self {
        Self { llm }
    }

    /// Produce a structured answer from the candidate set. An empty candidate
    /// set returns the fallback directly; there is nothing to ground an
    /// answer in, so no generation call is made.
    pub async fn generate(
        &self,
        query: &str,
        candidates: &[RetrievalCandidate],
        query_type: QueryType,
    ) -> GeneratedAnswer {
        if candidates.is_empty() {
            tracing::debug!("No candidates to generate from; returning fallback answer");
            return GeneratedAnswer::fallback();
        }

        let user_prompt = format!(
            r#"Based on the user query and the search results below, provide an answer.
Only use information from the search results. For each reference, name the
source file, its page, and why it is relevant.

User query: {query}

Search results:
{context}

Respond in JSON format:
{{
    "answer": "Your answer here",
    "references": [
        {{"file_name": "contract.pdf", "page": 1, "document_name": "Service Agreement", "relevance": "Explanation of relevance"}}
    ],
    "confidence": 0.0,
    "summary": "One-sentence summary of the answer"
}}
Set confidence between 0.0 and 1.0."#,
            query = query,
            context = format_candidates(candidates)
        );

        let raw = match self
            .llm
            .generate(system_prompt(query_type), &user_prompt)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Answer generation call failed; returning fallback");
                return GeneratedAnswer::fallback();
            }
        };

        match parse_structured::<GeneratedAnswer>(&raw) {
            Some(mut answer) => {
                if answer.answer.trim().is_empty() {
                    tracing::warn!("Generated answer was empty; returning fallback");
                    return GeneratedAnswer::fallback();
                }
                answer.confidence = answer.confidence.clamp(0.0, 1.0);
                tracing::debug!(
                    confidence = answer.confidence,
                    references = answer.references.len(),
                    "Answer generated"
                );
                answer
            }
            None => {
                tracing::warn!("Answer generation returned no parseable JSON; returning fallback");
                GeneratedAnswer::fallback()
            }
        }
    }

    /// Plain-text reply for queries outside the contract domain. No JSON
    /// contract here; the raw response is the answer.
    pub async fn conversational_reply(&self, query: &str) -> String {
        let system = "You are a friendly assistant for a contract management workspace. \
                      The user's message is not about their documents; reply briefly and \
                      helpfully, and mention you can answer questions about their contracts.";
        match self.llm.generate(system, query).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => FALLBACK_ANSWER.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Conversational reply failed; returning fallback");
                FALLBACK_ANSWER.to_string()
            }
        }
    }
}

//! Query rewriting for the refinement loop. Given an unsatisfactory answer
//! and the evaluator's feedback, asks the generation service for a sharper
//! search query. Falls back to the original query on any failure, which the
//! controller's no-progress guard then treats as "nothing left to try".

use std::sync::Arc;

use crate::llm::GenerationService;
use crate::types::{GeneratedAnswer, SelfEvaluationResult};

pub struct QueryRewriter {
    llm: Arc<dyn GenerationService>,
}

/// First non-empty line, trimmed, with wrapping quotes and a leading
/// "Rewritten query:" label stripped.
fn clean_rewrite(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let line = line
        .strip_prefix("Rewritten query:")
        .or_else(|| line.strip_prefix("Rewritten Query:"))
        .unwrap_or(line)
        .trim();
    line.trim_matches('"').trim().to_string()
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn GenerationService>) -> Self {
        Self { llm }
    }

    pub async fn rewrite(
        &self,
        query: &str,
        answer: &GeneratedAnswer,
        evaluation: &SelfEvaluationResult,
    ) -> String {
        let suggestions = if evaluation.suggestions.is_empty() {
            "(none)".to_string()
        } else {
            evaluation.suggestions.join("; ")
        };

        let user_prompt = format!(
            r#"The search query below produced an unsatisfactory answer. Rewrite the
query so a document search is more likely to find the material the user needs.
Make it specific and self-contained. Reply with the rewritten query only, as a
single line of plain text.

Original query: {query}

Unsatisfactory answer: {answer}

Evaluator feedback: {feedback}
Improvement suggestions: {suggestions}"#,
            query = query,
            answer = answer.answer,
            feedback = evaluation.feedback,
            suggestions = suggestions
        );

        let raw = match self
            .llm
            .generate(
                "You are an AI assistant specialized in rewriting search queries about contracts.",
                &user_prompt,
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Query rewrite call failed; keeping original query");
                return query.to_string();
            }
        };

        let rewritten = clean_rewrite(&raw);
        if rewritten.is_empty() {
            tracing::warn!("Query rewrite returned empty text; keeping original query");
            return query.to_string();
        }

        tracing::debug!(original = %query, rewritten = %rewritten, "Query rewritten");
        rewritten
    }
}

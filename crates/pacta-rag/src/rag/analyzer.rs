//! Query understanding: domain classification plus structured search signals.

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::GenerationService;
use crate::rag::structured::parse_structured;
use crate::types::{QueryAnalysis, QueryType};

const SYSTEM_PROMPT: &str =
    "You are an AI assistant specialized in analyzing user queries about contracts.";

pub struct QueryAnalyzer {
    llm: Arc<dyn GenerationService>,
}

/// Loose wire shape for the classification call. Unknown `query_type` values
/// degrade to `general` instead of failing the whole parse.
#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    is_contract_related: bool,
    #[serde(default)]
    query_type: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    focus_areas: Vec<String>,
    #[serde(default)]
    contract_types: Vec<String>,
}

impl RawAnalysis {
    fn into_analysis(self) -> QueryAnalysis {
        if !self.is_contract_related {
            return QueryAnalysis::unrelated();
        }
        let query_type = match self.query_type.as_deref() {
            Some("summary") => QueryType::Summary,
            Some("detailed") => QueryType::Detailed,
            _ => QueryType::General,
        };
        QueryAnalysis {
            is_contract_related: true,
            query_type,
            keywords: dedup_signals(self.keywords),
            focus_areas: dedup_signals(self.focus_areas),
            contract_types: dedup_signals(self.contract_types),
        }
    }
}

/// Trim, drop empties, and deduplicate case-insensitively, keeping first
/// occurrence order.
fn dedup_signals(raw: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .filter_map(|s| {
            let trimmed = s.trim().to_string();
            if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
                None
            } else {
                Some(trimmed)
            }
        })
        .collect()
}

impl QueryAnalyzer {
    pub fn new(llm: Arc<dyn GenerationService>) -> Self {
        Self { llm }
    }

    /// Classify a query and extract its search signals. Any failure routes
    /// the query to the conversational path rather than risking retrieval
    /// against garbage signals.
    pub async fn analyze(&self, query: &str) -> QueryAnalysis {
        let user_prompt = format!(
            r#"Analyze the following user query and provide:
1. Whether the query is about contract documents at all
2. The query type: "general" for broad questions, "summary" for overview requests, "detailed" for clause-level questions
3. At least 5 keywords for searching
4. Key focus areas to look for in contracts
5. Possible related contract types

User query: {query}

Respond in JSON format:
{{
    "is_contract_related": true,
    "query_type": "general",
    "keywords": ["keyword1", "keyword2", "keyword3", "keyword4", "keyword5"],
    "focus_areas": ["area1", "area2", "area3"],
    "contract_types": ["type1", "type2"]
}}"#
        );

        let raw = match self.llm.generate(SYSTEM_PROMPT, &user_prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Query analysis call failed; treating query as general chat");
                return QueryAnalysis::unrelated();
            }
        };

        match parse_structured::<RawAnalysis>(&raw) {
            Some(parsed) => {
                let analysis = parsed.into_analysis();
                tracing::debug!(
                    is_contract_related = analysis.is_contract_related,
                    query_type = analysis.query_type.as_str(),
                    keywords = analysis.keywords.len(),
                    "Query analyzed"
                );
                analysis
            }
            None => {
                tracing::warn!("Query analysis returned no parseable JSON; treating query as general chat");
                QueryAnalysis::unrelated()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLlm;

    #[tokio::test]
    async fn parses_full_analysis() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            r#"{"is_contract_related": true, "query_type": "detailed", "keywords": ["payment", "late fee"], "focus_areas": ["penalties"], "contract_types": ["service agreement"]}"#,
        ]));
        let analyzer = QueryAnalyzer::new(llm);

        let analysis = analyzer.analyze("What is the late payment penalty?").await;
        assert!(analysis.is_contract_related);
        assert_eq!(analysis.query_type, QueryType::Detailed);
        assert_eq!(analysis.keywords, vec!["payment", "late fee"]);
        assert_eq!(analysis.focus_areas, vec!["penalties"]);
    }

    #[tokio::test]
    async fn unrelated_query_clears_signals() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            r#"{"is_contract_related": false, "query_type": "general", "keywords": ["weather", "today"], "focus_areas": [], "contract_types": []}"#,
        ]));
        let analyzer = QueryAnalyzer::new(llm);

        let analysis = analyzer.analyze("What's the weather today?").await;
        assert!(!analysis.is_contract_related);
        assert!(analysis.keywords.is_empty());
        assert!(analysis.contract_types.is_empty());
    }

    #[tokio::test]
    async fn unparseable_output_degrades_to_unrelated() {
        let llm = Arc::new(ScriptedLlm::new(vec!["I cannot classify that."]));
        let analyzer = QueryAnalyzer::new(llm);

        let analysis = analyzer.analyze("anything").await;
        assert!(!analysis.is_contract_related);
    }

    #[tokio::test]
    async fn generation_error_degrades_to_unrelated() {
        let llm = Arc::new(ScriptedLlm::with_outcomes(vec![Err("timeout".into())]));
        let analyzer = QueryAnalyzer::new(llm);

        let analysis = analyzer.analyze("anything").await;
        assert!(!analysis.is_contract_related);
    }

    #[tokio::test]
    async fn unknown_query_type_degrades_to_general() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            r#"{"is_contract_related": true, "query_type": "forensic", "keywords": ["audit"], "focus_areas": [], "contract_types": []}"#,
        ]));
        let analyzer = QueryAnalyzer::new(llm);

        let analysis = analyzer.analyze("audit rights?").await;
        assert!(analysis.is_contract_related);
        assert_eq!(analysis.query_type, QueryType::General);
    }

    #[test]
    fn signals_are_trimmed_and_deduped() {
        let signals = dedup_signals(vec![
            " payment ".into(),
            "Payment".into(),
            "".into(),
            "  ".into(),
            "late fee".into(),
        ]);
        assert_eq!(signals, vec!["payment", "late fee"]);
    }
}

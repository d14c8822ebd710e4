//! Offline evaluation harnesses.
//!
//! Two layers: retrieval metrics over a labeled query set (where do the
//! known-relevant chunks land in the fused ranking) and an end-to-end answer
//! harness that runs full queries through the engine and records the scored
//! responses.
//!
//! Retrieval metrics, binary relevance keyed by display-form chunk ids:
//! - MRR (Mean Reciprocal Rank): average 1/rank of the first relevant chunk
//! - Recall@K: fraction of relevant chunks retrieved in the top K
//! - Precision@K: fraction of the top K that are relevant
//! - Hit Rate@K: fraction of queries with at least one relevant chunk in top K

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::QaEngine;
use crate::search::lexical;
use crate::search::HybridRetriever;
use crate::types::{QueryAnalysis, QueryType, FALLBACK_ANSWER};

/// One labeled evaluation query. `relevant` holds chunk ids in display form
/// (`{document}_p{page:03}_c{seq:03}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalQuery {
    pub query: String,
    pub relevant: HashSet<String>,
}

/// Per-query breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub query: String,
    pub reciprocal_rank: f64,
    pub recall_at_k: HashMap<usize, f64>,
    pub precision_at_k: HashMap<usize, f64>,
    pub num_relevant: usize,
    pub num_retrieved_relevant: usize,
}

/// Aggregated metrics across the evaluation set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub num_queries: usize,
    pub mrr: f64,
    pub recall_at: HashMap<usize, f64>,
    pub precision_at: HashMap<usize, f64>,
    pub hit_rate_at: HashMap<usize, f64>,
    pub per_query: Vec<QueryMetrics>,
}

/// Load a labeled evaluation set from a JSON file:
/// `[{"query": "...", "relevant": ["doc_p001_c000", ...]}, ...]`
pub fn load_eval_set(path: impl AsRef<Path>) -> Result<Vec<EvalQuery>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read eval set from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse eval set JSON in {}", path.display()))
}

/// Score pre-collected ranked runs against their labels. `runs[i]` is the
/// ranked chunk-id list retrieved for `eval_set[i]`; a missing run counts as
/// an all-miss rather than being skipped.
pub fn evaluate_runs(
    eval_set: &[EvalQuery],
    runs: &[Vec<String>],
    k_values: &[usize],
) -> EvalMetrics {
    let mut per_query = Vec::with_capacity(eval_set.len());
    let mut mrr_sum = 0.0;
    let mut recall_sums: HashMap<usize, f64> = k_values.iter().map(|&k| (k, 0.0)).collect();
    let mut precision_sums: HashMap<usize, f64> = k_values.iter().map(|&k| (k, 0.0)).collect();
    let mut hit_sums: HashMap<usize, f64> = k_values.iter().map(|&k| (k, 0.0)).collect();

    static EMPTY_RUN: Vec<String> = Vec::new();
    for (i, eval_query) in eval_set.iter().enumerate() {
        let run = runs.get(i).unwrap_or(&EMPTY_RUN);
        let qm = evaluate_single(eval_query, run, k_values);

        mrr_sum += qm.reciprocal_rank;
        for &k in k_values {
            if let Some(&v) = qm.recall_at_k.get(&k) {
                if let Some(sum) = recall_sums.get_mut(&k) {
                    *sum += v;
                }
                if v > 0.0 {
                    if let Some(hits) = hit_sums.get_mut(&k) {
                        *hits += 1.0;
                    }
                }
            }
            if let Some(&v) = qm.precision_at_k.get(&k) {
                if let Some(sum) = precision_sums.get_mut(&k) {
                    *sum += v;
                }
            }
        }
        per_query.push(qm);
    }

    let n = eval_set.len().max(1) as f64;
    EvalMetrics {
        num_queries: eval_set.len(),
        mrr: mrr_sum / n,
        recall_at: recall_sums.into_iter().map(|(k, v)| (k, v / n)).collect(),
        precision_at: precision_sums
            .into_iter()
            .map(|(k, v)| (k, v / n))
            .collect(),
        hit_rate_at: hit_sums.into_iter().map(|(k, v)| (k, v / n)).collect(),
        per_query,
    }
}

fn evaluate_single(eval_query: &EvalQuery, run: &[String], k_values: &[usize]) -> QueryMetrics {
    let num_relevant = eval_query.relevant.len();

    let reciprocal_rank = run
        .iter()
        .position(|id| eval_query.relevant.contains(id))
        .map(|idx| 1.0 / (idx + 1) as f64)
        .unwrap_or(0.0);

    let mut recall_at_k = HashMap::new();
    let mut precision_at_k = HashMap::new();
    let mut num_retrieved_relevant = 0;

    for &k in k_values {
        let top_k = &run[..run.len().min(k)];
        let relevant_in_k = top_k
            .iter()
            .filter(|id| eval_query.relevant.contains(*id))
            .count();

        let recall = if num_relevant > 0 {
            relevant_in_k as f64 / num_relevant as f64
        } else {
            0.0
        };
        recall_at_k.insert(k, recall);
        precision_at_k.insert(k, relevant_in_k as f64 / top_k.len().max(1) as f64);

        if Some(&k) == k_values.iter().max() {
            num_retrieved_relevant = relevant_in_k;
        }
    }

    QueryMetrics {
        query: eval_query.query.clone(),
        reciprocal_rank,
        recall_at_k,
        precision_at_k,
        num_relevant,
        num_retrieved_relevant,
    }
}

/// Run the hybrid retriever over a labeled set and score the rankings.
///
/// Search signals are derived by tokenizing the raw query, so this measures
/// retrieval quality alone without a classification call in the loop.
pub async fn evaluate_retriever(
    retriever: &HybridRetriever,
    eval_set: &[EvalQuery],
    k_values: &[usize],
    top_n: usize,
) -> EvalMetrics {
    let mut runs = Vec::with_capacity(eval_set.len());
    for eval_query in eval_set {
        let analysis = keyword_analysis(&eval_query.query);
        let candidates = retriever
            .retrieve(&eval_query.query, &analysis, top_n)
            .await;
        runs.push(
            candidates
                .into_iter()
                .map(|c| c.chunk_id.to_string())
                .collect(),
        );
    }
    evaluate_runs(eval_set, &runs, k_values)
}

fn keyword_analysis(query: &str) -> QueryAnalysis {
    QueryAnalysis {
        is_contract_related: true,
        query_type: QueryType::General,
        keywords: lexical::tokenize(query),
        focus_areas: Vec::new(),
        contract_types: Vec::new(),
    }
}

/// Format evaluation metrics as a human-readable report.
pub fn format_report(metrics: &EvalMetrics) -> String {
    let mut report = String::new();

    report.push_str(&format!(
        "=== Retrieval Evaluation Report ({} queries) ===\n\n",
        metrics.num_queries
    ));
    report.push_str(&format!("MRR: {:.4}\n\n", metrics.mrr));

    let mut k_values: Vec<usize> = metrics.recall_at.keys().copied().collect();
    k_values.sort_unstable();

    report.push_str("| K  | Recall | Precision | Hit Rate |\n");
    report.push_str("|----|--------|-----------|----------|\n");
    for &k in &k_values {
        let recall = metrics.recall_at.get(&k).copied().unwrap_or(0.0);
        let precision = metrics.precision_at.get(&k).copied().unwrap_or(0.0);
        let hit_rate = metrics.hit_rate_at.get(&k).copied().unwrap_or(0.0);
        report.push_str(&format!(
            "| {:2} | {:.4} | {:.4}    | {:.4}   |\n",
            k, recall, precision, hit_rate
        ));
    }

    let failed: Vec<&QueryMetrics> = metrics
        .per_query
        .iter()
        .filter(|q| q.reciprocal_rank == 0.0)
        .collect();
    if !failed.is_empty() {
        report.push_str(&format!(
            "\n--- Failed queries ({}/{}) ---\n",
            failed.len(),
            metrics.num_queries
        ));
        for q in &failed {
            report.push_str(&format!(
                "  - \"{}\" (expected {} relevant chunks)\n",
                q.query, q.num_relevant
            ));
        }
    }

    report
}

/// One end-to-end evaluation case: a query with its expected answer for
/// side-by-side review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCase {
    pub query_id: String,
    pub query: String,
    pub gt_answer: String,
}

/// Scored record of one evaluated query, suitable for JSON export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRecord {
    pub query_id: String,
    pub query: String,
    pub gt_answer: String,
    pub response: String,
    pub retrieved_context: Vec<String>,
    pub confidence: f32,
    pub groundedness: f32,
    pub evaluation_score: f32,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

/// Aggregates over a batch of answer records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMetrics {
    pub num_queries: usize,
    /// Fraction of queries answered with something other than the fixed
    /// fallback text.
    pub answer_rate: f64,
    pub mean_confidence: f64,
    pub mean_groundedness: f64,
    pub mean_evaluation: f64,
}

/// Load evaluation cases from a JSON file:
/// `[{"query_id": "...", "query": "...", "gt_answer": "..."}, ...]`
pub fn load_eval_cases(path: impl AsRef<Path>) -> Result<Vec<EvalCase>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read eval cases from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse eval cases JSON in {}", path.display()))
}

/// Run every case through the full answer pipeline and record the scored
/// responses.
pub async fn evaluate_answers(engine: &QaEngine, cases: &[EvalCase]) -> Vec<EvalRecord> {
    let mut records = Vec::with_capacity(cases.len());
    for case in cases {
        let response = engine.answer_query(&case.query).await;
        let retrieved_context = response
            .references
            .iter()
            .map(|r| format!("{} (page {}): {}", r.file_name, r.page, r.relevance))
            .collect();
        records.push(EvalRecord {
            query_id: case.query_id.clone(),
            query: case.query.clone(),
            gt_answer: case.gt_answer.clone(),
            response: response.answer,
            retrieved_context,
            confidence: response.confidence,
            groundedness: response.groundedness.score,
            evaluation_score: response.evaluation.evaluation_score,
            attempts: response.metadata.attempts,
            timestamp: Utc::now(),
        });
    }
    records
}

/// Aggregate a batch of answer records.
pub fn summarize_records(records: &[EvalRecord]) -> AnswerMetrics {
    let n = records.len().max(1) as f64;
    let answered = records
        .iter()
        .filter(|r| r.response != FALLBACK_ANSWER)
        .count();
    AnswerMetrics {
        num_queries: records.len(),
        answer_rate: answered as f64 / n,
        mean_confidence: records.iter().map(|r| r.confidence as f64).sum::<f64>() / n,
        mean_groundedness: records.iter().map(|r| r.groundedness as f64).sum::<f64>() / n,
        mean_evaluation: records
            .iter()
            .map(|r| r.evaluation_score as f64)
            .sum::<f64>()
            / n,
    }
}

/// Format answer-harness aggregates as a human-readable report.
pub fn format_answer_report(metrics: &AnswerMetrics, records: &[EvalRecord]) -> String {
    let mut report = String::new();
    report.push_str(&format!(
        "=== Answer Evaluation Report ({} queries) ===\n\n",
        metrics.num_queries
    ));
    report.push_str(&format!("Answer rate:       {:.2}\n", metrics.answer_rate));
    report.push_str(&format!("Mean confidence:   {:.4}\n", metrics.mean_confidence));
    report.push_str(&format!("Mean groundedness: {:.4}\n", metrics.mean_groundedness));
    report.push_str(&format!("Mean evaluation:   {:.4}\n", metrics.mean_evaluation));

    let unanswered: Vec<&EvalRecord> = records
        .iter()
        .filter(|r| r.response == FALLBACK_ANSWER)
        .collect();
    if !unanswered.is_empty() {
        report.push_str(&format!(
            "\n--- Unanswered queries ({}/{}) ---\n",
            unanswered.len(),
            metrics.num_queries
        ));
        for r in &unanswered {
            report.push_str(&format!("  - [{}] \"{}\"\n", r.query_id, r.query));
        }
    }

    report
}

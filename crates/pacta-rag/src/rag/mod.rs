//! Generation-backed pipeline stages: query analysis, answer synthesis,
//! quality scoring, query rewriting, and contract summarization.

pub mod analyzer;
pub mod eval;
pub mod evaluator;
pub mod generator;
pub mod rewriter;
pub mod structured;
pub mod summarizer;

pub use analyzer::QueryAnalyzer;
pub use eval::{
    evaluate_answers, evaluate_retriever, evaluate_runs, format_answer_report, format_report,
    load_eval_cases, load_eval_set, summarize_records, AnswerMetrics, EvalCase, EvalMetrics,
    EvalQuery, EvalRecord, QueryMetrics,
};
pub use evaluator::{GroundednessEvaluator, SelfEvaluator};
pub use generator::AnswerGenerator;
pub use rewriter::QueryRewriter;
pub use structured::{extract_json_object, parse_structured};
pub use summarizer::{ContractSummarizer, ContractSummary, SummaryCondition, SummaryDate};

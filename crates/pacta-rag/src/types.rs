use serde::{Deserialize, Serialize};
use std::fmt;

pub const FALLBACK_ANSWER: &str = "Sorry, I couldn't generate a response.";

/// Compound identity of a retrievable chunk: document, page ordinal, sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub document_id: String,
    pub page: u32,
    pub seq: u32,
}

impl ChunkId {
    pub fn new(document_id: impl Into<String>, page: u32, seq: u32) -> Self {
        Self {
            document_id: document_id.into(),
            page,
            seq,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_p{:03}_c{:03}", self.document_id, self.page, self.seq)
    }
}

/// Chunk metadata passed through retrieval untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub file_name: String,
    pub page_number: u32,
    pub parties: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub document_id: String,
    pub file_name: String,
    pub page_number: u32,
    pub text: String,
    pub parties: String,
    pub embedding: Vec<f32>,
}

impl Chunk {
    pub fn new(
        chunk_id: ChunkId,
        file_name: impl Into<String>,
        text: impl Into<String>,
        parties: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        let document_id = chunk_id.document_id.clone();
        let page_number = chunk_id.page;
        Self {
            chunk_id,
            document_id,
            file_name: file_name.into(),
            page_number,
            text: text.into(),
            parties: parties.into(),
            embedding,
        }
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            document_id: self.document_id.clone(),
            file_name: self.file_name.clone(),
            page_number: self.page_number,
            parties: self.parties.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    #[default]
    General,
    Summary,
    Detailed,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Summary => "summary",
            Self::Detailed => "detailed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub is_contract_related: bool,
    pub query_type: QueryType,
    pub keywords: Vec<String>,
    pub focus_areas: Vec<String>,
    pub contract_types: Vec<String>,
}

impl QueryAnalysis {
    /// Default analysis for queries outside the contract domain, and the
    /// safe fallback when classification itself fails.
    pub fn unrelated() -> Self {
        Self {
            is_contract_related: false,
            query_type: QueryType::General,
            keywords: Vec::new(),
            focus_areas: Vec::new(),
            contract_types: Vec::new(),
        }
    }

    /// Concatenated lexical query: keywords first, then focus areas.
    pub fn search_terms(&self) -> String {
        let mut terms: Vec<&str> = Vec::new();
        terms.extend(self.keywords.iter().map(String::as_str));
        terms.extend(self.focus_areas.iter().map(String::as_str));
        terms.join(" ")
    }
}

impl Default for QueryAnalysis {
    fn default() -> Self {
        Self::unrelated()
    }
}

/// One fused retrieval result. `semantic_score` / `lexical_score` stay `None`
/// when the candidate did not come from that source; no value is imputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub chunk_id: ChunkId,
    pub document_text: String,
    pub metadata: ChunkMetadata,
    pub semantic_score: Option<f32>,
    pub lexical_score: Option<f32>,
    pub fused_score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerReference {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub document_name: String,
    #[serde(default)]
    pub relevance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    #[serde(default)]
    pub references: Vec<AnswerReference>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl GeneratedAnswer {
    /// Canonical fallback when generation fails or yields no parseable output.
    pub fn fallback() -> Self {
        Self {
            answer: FALLBACK_ANSWER.to_string(),
            references: Vec::new(),
            confidence: 0.0,
            summary: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundednessResult {
    pub score: f32,
    pub feedback: String,
}

impl GroundednessResult {
    /// Conservative default: an unverifiable answer is treated as ungrounded.
    pub fn unverified(feedback: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            feedback: feedback.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfEvaluationResult {
    pub evaluation_score: f32,
    pub feedback: String,
    #[serde(rename = "suggestions_for_improvement", default)]
    pub suggestions: Vec<String>,
}

impl SelfEvaluationResult {
    /// Neutral default: an unscored answer is unknown, not failing. Distinct
    /// from the groundedness default of 0.0.
    pub fn neutral(feedback: impl Into<String>) -> Self {
        Self {
            evaluation_score: 0.5,
            feedback: feedback.into(),
            suggestions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub attempts: u32,
    pub expanded: bool,
    pub duration_ms: u64,
}

/// Final result shape returned to callers. Every field is always populated;
/// failure paths fill in explanatory text instead of omitting fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub references: Vec<AnswerReference>,
    pub confidence: f32,
    pub groundedness: GroundednessResult,
    pub evaluation: SelfEvaluationResult,
    pub metadata: ResponseMetadata,
}

impl QueryResponse {
    pub fn fallback(message: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            answer: message.into(),
            references: Vec::new(),
            confidence: 0.0,
            groundedness: GroundednessResult {
                score: 0.0,
                feedback: reason.clone(),
            },
            evaluation: SelfEvaluationResult {
                evaluation_score: 0.0,
                feedback: reason,
                suggestions: Vec::new(),
            },
            metadata: ResponseMetadata::default(),
        }
    }
}

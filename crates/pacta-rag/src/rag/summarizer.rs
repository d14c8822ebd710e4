//! Contract summarization into a fixed structured shape: title, parties,
//! overview, prioritized conditions, and key dates.

use std::sync::Arc;
use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::llm::GenerationService;
use crate::rag::structured::parse_structured;

static ISO_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date regex is valid")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryCondition {
    #[serde(default)]
    pub priority: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryDate {
    #[serde(default)]
    pub priority: String,
    pub date: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSummary {
    pub title: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub parties: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub conditions: Vec<SummaryCondition>,
    #[serde(default)]
    pub dates: Vec<SummaryDate>,
}

impl ContractSummary {
    /// Drop date entries whose `date` is not a full YYYY-MM-DD value; models
    /// pad the list with vague entries like "upon signature" or slash-format
    /// dates that downstream calendar views cannot place.
    fn validate(mut self) -> Self {
        let before = self.dates.len();
        self.dates.retain(|d| ISO_DATE_RE.is_match(d.date.trim()));
        for date in &mut self.dates {
            date.date = date.date.trim().to_string();
        }
        if self.dates.len() < before {
            tracing::debug!(
                dropped = before - self.dates.len(),
                "Dropped summary dates without a YYYY-MM-DD value"
            );
        }
        self
    }
}

pub struct ContractSummarizer {
    llm: Arc<dyn GenerationService>,
}

impl ContractSummarizer {
    pub fn new(llm: Arc<dyn GenerationService>) -> Self {
        Self { llm }
    }

    /// Summarize raw contract text. Unlike the per-query pipeline stages this
    /// surfaces failures to the caller; there is no sensible fallback summary.
    pub async fn summarize(&self, text: &str) -> Result<ContractSummary> {
        let user_prompt = format!(
            r#"Please summarize the following text and structure your summary in JSON
format with the following elements:
{{
    "title": "The title of the contract",
    "number": "The contract number (if available)",
    "duration": "The duration of the contract",
    "parties": "The parties involved in the contract",
    "overview": "A brief overview of the contract's purpose around 4-5 sentences",
    "conditions": [
        {{"priority": "high", "text": "Important condition text"}}
    ],
    "dates": [
        {{"priority": "high", "date": "YYYY-MM-DD", "description": "Description of the date"}}
    ]
}}
Use "high", "medium", or "low" for each priority. Dates must be complete
YYYY-MM-DD values.

Here's the text to summarize:
{text}"#
        );

        let raw = self
            .llm
            .generate(
                "You are an AI assistant specialized in extracting key information \
                 from contracts and formatting it as structured JSON.",
                &user_prompt,
            )
            .await?;

        let summary: ContractSummary = parse_structured(&raw)
            .ok_or_else(|| anyhow!("Summarization returned no parseable JSON summary"))?;
        Ok(summary.validate())
    }
}

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub search: SearchConfig,
    pub refinement: RefinementConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Final candidate count per retrieval round.
    pub top_n: usize,
    /// Candidate count once retrieval has been expanded by the controller.
    pub expanded_top_n: usize,
    /// Each source fetches multiplier x N before fusion.
    pub candidate_multiplier: usize,
    pub semantic_weight: f32,
    pub lexical_weight: f32,
    pub keyword_boost: u32,
    pub focus_boost: u32,
    pub contract_type_boost: u32,
    /// Boosted score = fused x (1 + boost_step x boost_count).
    pub boost_step: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementConfig {
    pub confidence_threshold: f32,
    pub groundedness_threshold: f32,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub chat_model: String,
    pub query_embedding_model: String,
    pub document_embedding_model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub dimension: usize,
}

impl EngineConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.search.top_n == 0 {
            return Err("search.top_n must be > 0".into());
        }
        if self.search.expanded_top_n < self.search.top_n {
            return Err("search.expanded_top_n must be >= search.top_n".into());
        }
        if self.search.candidate_multiplier == 0 {
            return Err("search.candidate_multiplier must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.search.semantic_weight)
            || !(0.0..=1.0).contains(&self.search.lexical_weight)
        {
            return Err("search weights must be in [0.0, 1.0]".into());
        }
        if (self.search.semantic_weight + self.search.lexical_weight - 1.0).abs() > 1e-6 {
            return Err("search.semantic_weight + search.lexical_weight must equal 1.0".into());
        }
        if !(0.0..=1.0).contains(&self.search.boost_step) {
            return Err("search.boost_step must be in [0.0, 1.0]".into());
        }
        if !(0.0..=1.0).contains(&self.refinement.confidence_threshold) {
            return Err("refinement.confidence_threshold must be in [0.0, 1.0]".into());
        }
        if !(0.0..=1.0).contains(&self.refinement.groundedness_threshold) {
            return Err("refinement.groundedness_threshold must be in [0.0, 1.0]".into());
        }
        if self.refinement.max_attempts == 0 {
            return Err("refinement.max_attempts must be > 0".into());
        }
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.llm.base_url.is_empty() {
            return Err("llm.base_url must not be empty".into());
        }
        if self.llm.chat_model.is_empty() {
            return Err("llm.chat_model must not be empty".into());
        }
        if self.llm.max_tokens == 0 {
            return Err("llm.max_tokens must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig {
                top_n: 5,
                expanded_top_n: 10,
                candidate_multiplier: 2,
                semantic_weight: 0.7,
                lexical_weight: 0.3,
                keyword_boost: 1,
                focus_boost: 2,
                contract_type_boost: 3,
                boost_step: 0.1,
            },
            refinement: RefinementConfig {
                confidence_threshold: 0.55,
                groundedness_threshold: 0.75,
                max_attempts: 3,
            },
            llm: LlmConfig {
                base_url: "https://api.upstage.ai/v1/solar".to_string(),
                api_key_env: "UPSTAGE_API_KEY".to_string(),
                chat_model: "solar-1-mini-chat".to_string(),
                query_embedding_model: "solar-embedding-1-large-query".to_string(),
                document_embedding_model: "solar-embedding-1-large-passage".to_string(),
                max_tokens: 1024,
                temperature: 0.7,
                connect_timeout_secs: 15,
                request_timeout_secs: 300,
            },
            embedding: EmbeddingConfig { dimension: 4096 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let mut config = EngineConfig::default();
        config.search.semantic_weight = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_attempt_budget() {
        let mut config = EngineConfig::default();
        config.refinement.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_expanded_budget_below_base() {
        let mut config = EngineConfig::default();
        config.search.expanded_top_n = 2;
        assert!(config.validate().is_err());
    }
}

//! Generation service interface and the external API provider.

pub mod external;

pub use external::{ExternalProvider, ProviderError};

use anyhow::Result;
use async_trait::async_trait;

/// Core trait for the generation service. One call contract serves
/// classification, answer synthesis, query rewriting, both evaluators, and
/// summarization; callers vary only the prompts.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

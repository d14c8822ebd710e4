use anyhow::Result;
use async_trait::async_trait;

/// Unified embedding model trait. Query-side and document-side embeddings are
/// kept distinct so asymmetric models route text to the right representation.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a document/passage.
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embed documents for ingestion.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_document(text).await?);
        }
        Ok(vectors)
    }

    /// Embedding vector dimension.
    fn dimension(&self) -> usize;
}

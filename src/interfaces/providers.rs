use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domains::chat::ChatMessage;
use crate::domains::retrieval::{IndexRecord, RetrievalMatch};
use crate::error::Result;

/// Incremental text deltas of one completion, in generation order.
pub type TextStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Embeds every input with `model` (or the provider's embedding default),
    /// returning vectors in input order.
    async fn embed(&self, inputs: Vec<String>, model: Option<&str>) -> Result<Vec<Vec<f32>>>;

    /// Opens a streaming completion. Errors returned here happen before any
    /// delta is produced; errors inside the stream happen mid-reply.
    async fn chat_stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<RetrievalMatch>>;

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize>;
}

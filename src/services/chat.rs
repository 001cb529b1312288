use std::sync::Arc;

use async_stream::try_stream;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::domains::chat::ChatMessage;
use crate::domains::retrieval::RetrievalMatch;
use crate::error::{Result, RmpError, UpstreamStage};
use crate::interfaces::providers::{LlmProvider, TextStream, VectorIndex};
use crate::services::prompt::{assemble_messages, SYSTEM_PROMPT};

#[derive(Debug, Clone)]
pub struct RetrievalPolicy {
    pub top_k: usize,
    pub min_matches: usize,
    pub no_data_reply: String,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrievalPolicy {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            min_matches: config.min_matches,
            no_data_reply: config.no_data_reply.clone(),
        }
    }
}

/// The completion input built for one request, plus the matches it cites.
#[derive(Debug, Clone)]
pub struct PreparedReply {
    pub messages: Vec<ChatMessage>,
    pub matches: Vec<RetrievalMatch>,
}

pub struct ChatService {
    llm: Arc<dyn LlmProvider>,
    index: Arc<dyn VectorIndex>,
    policy: RetrievalPolicy,
    embedding_model: Option<String>,
}

impl ChatService {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        index: Arc<dyn VectorIndex>,
        policy: RetrievalPolicy,
    ) -> Self {
        Self {
            llm,
            index,
            policy,
            embedding_model: None,
        }
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// One embedding call followed by one index query.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievalMatch>> {
        let vector = embed_query(self.llm.as_ref(), query, self.embedding_model.as_deref())
            .await
            .map_err(|e| RmpError::upstream(UpstreamStage::Embedding, e))?;
        debug!(dims = vector.len(), "Embedded query");

        let mut matches = self
            .index
            .query(vector, self.policy.top_k)
            .await
            .map_err(|e| RmpError::upstream(UpstreamStage::VectorQuery, e))?;
        matches.truncate(self.policy.top_k);
        Ok(matches)
    }

    pub async fn prepare(&self, conversation: &[ChatMessage]) -> Result<PreparedReply> {
        let last = conversation
            .last()
            .ok_or_else(|| RmpError::MalformedInput("conversation is empty".to_string()))?;
        let matches = self.retrieve(&last.content).await?;
        let messages = assemble_messages(SYSTEM_PROMPT, conversation, &matches)?;
        Ok(PreparedReply { messages, matches })
    }

    /// Resolves retrieval and opens the completion before returning, so any
    /// upstream failure surfaces here rather than inside the reply stream.
    pub async fn respond(&self, conversation: Vec<ChatMessage>) -> Result<TextStream> {
        info!(turns = conversation.len(), "Handling chat request");
        let prepared = self.prepare(&conversation).await?;
        info!(matches = prepared.matches.len(), "Retrieved context");

        if prepared.matches.len() < self.policy.min_matches {
            info!(
                matches = prepared.matches.len(),
                min_matches = self.policy.min_matches,
                "Too few matches; replying without completion"
            );
            let reply = self.policy.no_data_reply.clone();
            let stream: TextStream =
                Box::pin(futures::stream::once(async move { Ok::<_, RmpError>(reply) }));
            return Ok(stream);
        }

        let mut upstream = self
            .llm
            .chat_stream(prepared.messages)
            .await
            .map_err(|e| RmpError::upstream(UpstreamStage::Completion, e))?;

        // Empty deltas carry no bytes, so an error after them still precedes the body.
        let first = loop {
            match upstream.next().await {
                Some(Ok(fragment)) if fragment.is_empty() => continue,
                Some(Ok(fragment)) => break Some(fragment),
                Some(Err(err)) => return Err(RmpError::upstream(UpstreamStage::Completion, err)),
                None => break None,
            }
        };

        let stream: TextStream = Box::pin(try_stream! {
            if let Some(fragment) = first {
                yield fragment;
            }
            while let Some(item) = upstream.next().await {
                let fragment = item.map_err(|err| {
                    warn!(error = %err, "Completion stream failed mid-reply");
                    match err {
                        RmpError::Stream(_) => err,
                        other => RmpError::Stream(other.to_string()),
                    }
                })?;
                if !fragment.is_empty() {
                    yield fragment;
                }
            }
            debug!("Completion stream finished");
        });
        Ok(stream)
    }
}

pub async fn embed_query(
    llm: &dyn LlmProvider,
    text: &str,
    model: Option<&str>,
) -> Result<Vec<f32>> {
    llm.embed(vec![text.to_string()], model)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| RmpError::Runtime("Empty embedding response".to_string()))
}

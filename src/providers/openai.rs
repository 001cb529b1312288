use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use async_openai::{
    config::OpenAIConfig,
    types::{
        chat::{
            ChatCompletionRequestAssistantMessageArgs,
            ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
            ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
            ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
        },
        embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput},
    },
    Client,
};

use crate::config::OpenAiConfig;
use crate::domains::chat::{ChatMessage, Role};
use crate::error::{Result, RmpError};
use crate::interfaces::providers::{LlmProvider, TextStream};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Clone)]
pub struct OpenAiProvider {
    chat_model: String,
    embedding_model: String,
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        chat_model: Option<String>,
        embedding_model: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        let chat_model = chat_model.unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        let embedding_model =
            embedding_model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);
        Self {
            chat_model,
            embedding_model,
            client: Client::with_config(config),
        }
    }

    pub fn from_config(config: &OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RmpError::Config("openai.api_key is required".to_string()))?;
        Ok(Self::new(
            api_key,
            config.chat_model.clone(),
            config.embedding_model.clone(),
            config.base_url.clone(),
        ))
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn build_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
        let built = match message.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.as_str())
                .build()
                .map(ChatCompletionRequestMessage::System),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Text(
                    message.content.clone(),
                ))
                .build()
                .map(ChatCompletionRequestMessage::User),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(ChatCompletionRequestAssistantMessageContent::Text(
                    message.content.clone(),
                ))
                .build()
                .map(ChatCompletionRequestMessage::Assistant),
        };
        built.map_err(|e| RmpError::Runtime(e.to_string()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn embed(&self, inputs: Vec<String>, model: Option<&str>) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let model = model.unwrap_or(&self.embedding_model).to_string();
        let request = CreateEmbeddingRequestArgs::default()
            .model(model)
            .input(EmbeddingInput::StringArray(inputs))
            .build()
            .map_err(|e| RmpError::Runtime(e.to_string()))?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| RmpError::Http(e.to_string()))?;
        let mut data = response.data;
        data.sort_by_key(|item| item.index);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }

    async fn chat_stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream> {
        let request_messages = messages
            .iter()
            .map(Self::build_message)
            .collect::<Result<Vec<_>>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.chat_model.clone())
            .messages(request_messages)
            .stream(true)
            .build()
            .map_err(|e| RmpError::Runtime(e.to_string()))?;

        debug!(model = %self.chat_model, messages = messages.len(), "Opening completion stream");
        let upstream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| RmpError::Http(e.to_string()))?;

        let deltas = upstream.filter_map(|item| async move {
            match item {
                Ok(chunk) => chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .filter(|text| !text.is_empty())
                    .map(Ok),
                Err(err) => Some(Err(RmpError::Stream(err.to_string()))),
            }
        });
        Ok(Box::pin(deltas))
    }
}

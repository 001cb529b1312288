//! Streaming consumer for the chat endpoint.
//!
//! [`Conversation`] owns the turn list and changes only through
//! [`Conversation::begin_exchange`] and [`Conversation::apply`]. Network reads
//! produce [`ConversationEvent`]s, either applied inline by
//! [`ChatClient::send`] or delivered over a channel by
//! [`ChatClient::spawn_reply`] for a UI loop to apply.

use async_stream::try_stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domains::chat::{ChatMessage, Role};
use crate::error::{Result, RmpError};
use crate::interfaces::providers::TextStream;

pub const GREETING: &str =
    "Hi I'm the Rate My Professor AI assistant. How can I assist you today?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// Decoded text to append to the open assistant message.
    Delta(String),
    /// The body closed normally.
    Completed,
    /// The request or body failed; partial content is kept.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    open: bool,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::with_greeting()
    }
}

impl Conversation {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            open: false,
        }
    }

    pub fn with_greeting() -> Self {
        Self::new(vec![ChatMessage::assistant(GREETING)])
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Appends the user turn and an empty assistant placeholder, opening it.
    /// Returns the request payload, which excludes the placeholder.
    pub fn begin_exchange(&mut self, text: &str) -> Result<Vec<ChatMessage>> {
        if self.open {
            return Err(RmpError::SendInFlight);
        }
        self.messages.push(ChatMessage::user(text));
        let payload = self.messages.clone();
        self.messages.push(ChatMessage::assistant(""));
        self.open = true;
        Ok(payload)
    }

    /// Single mutation point for streamed updates. Events that arrive while no
    /// reply is open are ignored.
    pub fn apply(&mut self, event: &ConversationEvent) {
        if !self.open {
            debug!(?event, "Ignoring event without an open reply");
            return;
        }
        match event {
            ConversationEvent::Delta(fragment) => {
                if let Some(last) = self.messages.last_mut() {
                    last.content.push_str(fragment);
                }
            }
            ConversationEvent::Completed | ConversationEvent::Failed(_) => {
                self.open = false;
            }
        }
    }
}

/// Incremental UTF-8 decoding: an incomplete trailing sequence is held until
/// the next chunk, so output does not depend on chunk boundaries.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                    }
                }
            }
        }
    }

    /// Flushes a dangling partial sequence as a replacement character.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ChatClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts the conversation and yields decoded text as it arrives.
    pub async fn stream_reply(&self, payload: &[ChatMessage]) -> Result<TextStream> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| RmpError::Http(format!("chat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(RmpError::Http(format!("chat request failed ({status}): {body}")));
        }

        let mut bytes = response.bytes_stream();
        let stream: TextStream = Box::pin(try_stream! {
            let mut decoder = Utf8StreamDecoder::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| RmpError::Stream(e.to_string()))?;
                let text = decoder.decode(&chunk);
                if !text.is_empty() {
                    yield text;
                }
            }
            let tail = decoder.finish();
            if !tail.is_empty() {
                yield tail;
            }
        });
        Ok(stream)
    }

    /// Runs one exchange against `conversation`, calling `on_update` after
    /// every applied event.
    pub async fn send<F>(&self, conversation: &mut Conversation, text: &str, mut on_update: F) -> Result<()>
    where
        F: FnMut(&ConversationEvent, &Conversation),
    {
        let payload = conversation.begin_exchange(text)?;
        let outcome = self.drive(&payload, |event| {
            conversation.apply(&event);
            on_update(&event, &*conversation);
        })
        .await;
        if let Err(err) = &outcome {
            warn!(error = %err, "Chat exchange failed");
        }
        outcome
    }

    /// Spawns the read loop and returns the event feed. The receiver always
    /// ends with `Completed` or `Failed`.
    pub fn spawn_reply(&self, payload: Vec<ChatMessage>) -> mpsc::UnboundedReceiver<ConversationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.clone();
        tokio::spawn(async move {
            let _ = client
                .drive(&payload, |event| {
                    let _ = tx.send(event);
                })
                .await;
        });
        rx
    }

    async fn drive<F>(&self, payload: &[ChatMessage], mut emit: F) -> Result<()>
    where
        F: FnMut(ConversationEvent),
    {
        let mut stream = match self.stream_reply(payload).await {
            Ok(stream) => stream,
            Err(err) => {
                emit(ConversationEvent::Failed(err.to_string()));
                return Err(err);
            }
        };
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => emit(ConversationEvent::Delta(fragment)),
                Err(err) => {
                    emit(ConversationEvent::Failed(err.to_string()));
                    return Err(err);
                }
            }
        }
        emit(ConversationEvent::Completed);
        Ok(())
    }
}

/// The role a rendered message is shown with.
pub fn speaker(message: &ChatMessage) -> &'static str {
    match message.role {
        Role::Assistant => "assistant",
        Role::User => "you",
        Role::System => "system",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(conversation: &mut Conversation, fragments: &[&str]) {
        for fragment in fragments {
            conversation.apply(&ConversationEvent::Delta(fragment.to_string()));
        }
    }

    #[test]
    fn begin_exchange_adds_user_and_open_placeholder() {
        let mut conversation = Conversation::with_greeting();
        let payload = conversation.begin_exchange("hello").unwrap();

        assert_eq!(conversation.messages().len(), 3);
        assert_eq!(conversation.messages()[1], ChatMessage::user("hello"));
        assert_eq!(conversation.messages()[2], ChatMessage::assistant(""));
        assert!(conversation.is_open());
        assert_eq!(
            payload,
            vec![ChatMessage::assistant(GREETING), ChatMessage::user("hello")]
        );
    }

    #[test]
    fn deltas_extend_only_the_last_message() {
        let mut conversation = Conversation::with_greeting();
        conversation.begin_exchange("best database professor?").unwrap();
        let before: Vec<_> = conversation.messages()[..2].to_vec();

        feed(&mut conversation, &["Prof", "essor A", " is great"]);
        conversation.apply(&ConversationEvent::Completed);

        assert_eq!(&conversation.messages()[..2], before.as_slice());
        assert_eq!(
            conversation.last().unwrap(),
            &ChatMessage::assistant("Professor A is great")
        );
        assert!(!conversation.is_open());
    }

    #[test]
    fn overlapping_send_is_rejected_without_changes() {
        let mut conversation = Conversation::with_greeting();
        conversation.begin_exchange("first").unwrap();
        let snapshot = conversation.clone();

        let err = conversation.begin_exchange("second").unwrap_err();
        assert!(matches!(err, RmpError::SendInFlight));
        assert_eq!(conversation, snapshot);

        conversation.apply(&ConversationEvent::Failed("reset".to_string()));
        assert!(conversation.begin_exchange("second").is_ok());
    }

    #[test]
    fn events_without_open_reply_are_ignored() {
        let mut conversation = Conversation::with_greeting();
        conversation.apply(&ConversationEvent::Delta("stray".to_string()));
        assert_eq!(conversation, Conversation::with_greeting());
    }

    #[test]
    fn failure_keeps_partial_content() {
        let mut conversation = Conversation::new(Vec::new());
        conversation.begin_exchange("q").unwrap();
        feed(&mut conversation, &["partial"]);
        conversation.apply(&ConversationEvent::Failed("reset".to_string()));
        assert_eq!(conversation.last().unwrap().content, "partial");
        assert!(!conversation.is_open());
    }

    #[test]
    fn decoder_is_independent_of_chunk_boundaries() {
        let text = "Profesora Núñez: 5★ in Datenbanken 数据库";
        let bytes = text.as_bytes();
        for size in 1..=bytes.len() {
            let mut decoder = Utf8StreamDecoder::new();
            let mut out = String::new();
            for chunk in bytes.chunks(size) {
                out.push_str(&decoder.decode(chunk));
            }
            out.push_str(&decoder.finish());
            assert_eq!(out, text, "chunk size {size}");
        }
    }

    #[test]
    fn decoder_replaces_invalid_bytes_and_dangling_tail() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(b"ok\xffgo"), "ok\u{FFFD}go");
        assert_eq!(decoder.decode(&[0xE2, 0x82]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn endpoint_joins_base_url() {
        assert_eq!(
            ChatClient::new("http://127.0.0.1:3000/").endpoint(),
            "http://127.0.0.1:3000/api/chat"
        );
    }
}

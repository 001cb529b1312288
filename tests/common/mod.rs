#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use serde_json::json;

use rmp_assistant::domains::chat::ChatMessage;
use rmp_assistant::domains::retrieval::{IndexRecord, RetrievalMatch};
use rmp_assistant::error::{Result, RmpError};
use rmp_assistant::interfaces::providers::{LlmProvider, TextStream, VectorIndex};

/// Where a scripted provider should break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Failure {
    #[default]
    None,
    Embed,
    Open,
    FirstItem,
    /// Errors after this many fragments have been yielded.
    AfterFragments(usize),
}

pub struct ScriptedLlmProvider {
    fragments: Vec<String>,
    failure: Failure,
    pub embed_calls: Mutex<Vec<Vec<String>>>,
    pub embed_models: Mutex<Vec<Option<String>>>,
    pub chat_calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlmProvider {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            failure: Failure::None,
            embed_calls: Mutex::new(Vec::new()),
            embed_models: Mutex::new(Vec::new()),
            chat_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.failure = failure;
        self
    }

    pub fn embed_count(&self) -> usize {
        self.embed_calls.lock().unwrap().len()
    }

    pub fn chat_count(&self) -> usize {
        self.chat_calls.lock().unwrap().len()
    }

    pub fn last_chat(&self) -> Vec<ChatMessage> {
        self.chat_calls.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

/// Deterministic toy embedding: keyword hits on a few subject words.
pub fn embedding_for(text: &str) -> Vec<f32> {
    let text = text.to_lowercase();
    ["database", "calculus", "physics", "history"]
        .iter()
        .map(|word| if text.contains(word) { 1.0 } else { 0.0 })
        .chain(std::iter::once(0.1))
        .collect()
}

#[async_trait]
impl LlmProvider for ScriptedLlmProvider {
    async fn embed(&self, inputs: Vec<String>, model: Option<&str>) -> Result<Vec<Vec<f32>>> {
        self.embed_calls.lock().unwrap().push(inputs.clone());
        self.embed_models
            .lock()
            .unwrap()
            .push(model.map(str::to_string));
        if self.failure == Failure::Embed {
            return Err(RmpError::Http("embedding quota exceeded".to_string()));
        }
        Ok(inputs.iter().map(|text| embedding_for(text)).collect())
    }

    async fn chat_stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream> {
        self.chat_calls.lock().unwrap().push(messages);
        let mut items: Vec<Result<String>> = Vec::new();
        match self.failure {
            Failure::Open => return Err(RmpError::Http("model unavailable".to_string())),
            Failure::FirstItem => {
                items.push(Err(RmpError::Stream("connection refused".to_string())));
            }
            Failure::AfterFragments(n) => {
                items.extend(self.fragments.iter().take(n).cloned().map(Ok));
                items.push(Err(RmpError::Stream("connection reset".to_string())));
            }
            Failure::None | Failure::Embed => {
                items.extend(self.fragments.iter().cloned().map(Ok));
            }
        }
        Ok(Box::pin(stream::iter(items)))
    }
}

pub struct StaticIndex {
    matches: Vec<RetrievalMatch>,
    fail: bool,
    pub query_calls: AtomicUsize,
    pub last_top_k: AtomicUsize,
    pub upserted: Mutex<Vec<IndexRecord>>,
}

impl StaticIndex {
    pub fn new(matches: Vec<RetrievalMatch>) -> Self {
        Self {
            matches,
            fail: false,
            query_calls: AtomicUsize::new(0),
            last_top_k: AtomicUsize::new(0),
            upserted: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn query_count(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for StaticIndex {
    async fn query(&self, _vector: Vec<f32>, top_k: usize) -> Result<Vec<RetrievalMatch>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.last_top_k.store(top_k, Ordering::SeqCst);
        if self.fail {
            return Err(RmpError::Http("pinecone returned 503".to_string()));
        }
        Ok(self.matches.clone())
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        let count = records.len();
        self.upserted.lock().unwrap().extend(records);
        Ok(count)
    }
}

pub fn professor_match(id: &str, subject: &str, stars: u8, review: &str) -> RetrievalMatch {
    let metadata = json!({"subject": subject, "stars": stars, "review": review});
    let mut hit = RetrievalMatch::new(id, metadata.as_object().cloned().unwrap_or_default());
    hit.score = Some(0.9);
    hit
}

pub fn sample_matches() -> Vec<RetrievalMatch> {
    vec![
        professor_match("Dr. Ada Park", "Databases", 5, "Clear lectures on indexing."),
        professor_match("Dr. Ben Ortiz", "Databases", 4, "Tough but fair exams."),
        professor_match("Dr. Cara Liu", "Data Systems", 4, "Great office hours."),
    ]
}

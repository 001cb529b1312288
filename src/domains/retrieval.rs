use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A nearest-neighbour hit returned by the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RetrievalMatch {
    pub fn new(id: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            score: None,
            metadata,
        }
    }

    pub fn subject(&self) -> Option<String> {
        self.scalar("subject")
    }

    pub fn stars(&self) -> Option<String> {
        self.scalar("stars")
    }

    pub fn review(&self) -> Option<String> {
        self.scalar("review")
    }

    fn scalar(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }
}

/// One vector plus metadata, as upserted into an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A single row of the review dataset used to seed the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfessorReview {
    pub professor: String,
    pub subject: String,
    pub stars: f64,
    pub review: String,
}

impl ProfessorReview {
    pub fn metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("subject".to_string(), Value::from(self.subject.clone()));
        metadata.insert("stars".to_string(), Value::from(self.stars));
        metadata.insert("review".to_string(), Value::from(self.review.clone()));
        metadata
    }
}

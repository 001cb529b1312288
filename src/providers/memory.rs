use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domains::retrieval::{IndexRecord, RetrievalMatch};
use crate::error::Result;
use crate::interfaces::providers::VectorIndex;

/// Brute-force cosine index held in process memory.
#[derive(Default)]
pub struct InMemoryIndex {
    records: RwLock<Vec<IndexRecord>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<RetrievalMatch>> {
        let records = self.records.read().await;
        let mut scored: Vec<(f32, &IndexRecord)> = records
            .iter()
            .map(|record| (cosine_similarity(&vector, &record.values), record))
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, record)| RetrievalMatch {
                id: record.id.clone(),
                score: Some(score),
                metadata: record.metadata.clone(),
            })
            .collect())
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        let count = records.len();
        let mut stored = self.records.write().await;
        for record in records {
            match stored.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record,
                None => stored.push(record),
            }
        }
        Ok(count)
    }
}

/// Returns `0.0` for empty, mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

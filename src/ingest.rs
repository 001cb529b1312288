//! Loads professor reviews and writes their embeddings into a vector index.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::domains::retrieval::{IndexRecord, ProfessorReview};
use crate::error::{Result, RmpError};
use crate::interfaces::providers::{LlmProvider, VectorIndex};

pub const DEFAULT_BATCH_SIZE: usize = 64;

#[derive(Deserialize)]
struct ReviewFile {
    reviews: Vec<ProfessorReview>,
}

pub fn load_reviews(path: &Path) -> Result<Vec<ProfessorReview>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| RmpError::Config(format!("failed to read {}: {e}", path.display())))?;
    let file: ReviewFile =
        serde_json::from_str(&raw).map_err(|e| RmpError::Serialization(e.to_string()))?;
    Ok(file.reviews)
}

/// Embeds review texts in batches and upserts one record per review, keyed by
/// professor name. Returns the number of records the index accepted.
pub async fn ingest_reviews(
    llm: &dyn LlmProvider,
    index: &dyn VectorIndex,
    reviews: &[ProfessorReview],
    embedding_model: Option<&str>,
    batch_size: usize,
) -> Result<usize> {
    let batch_size = batch_size.max(1);
    let mut upserted = 0;

    for (batch_no, batch) in reviews.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|review| review.review.clone()).collect();
        let vectors = llm.embed(texts, embedding_model).await?;
        if vectors.len() != batch.len() {
            return Err(RmpError::Runtime(format!(
                "embedding count mismatch: sent {} texts, received {} vectors",
                batch.len(),
                vectors.len()
            )));
        }

        let records = batch
            .iter()
            .zip(vectors)
            .map(|(review, values)| IndexRecord {
                id: review.professor.clone(),
                values,
                metadata: review.metadata(),
            })
            .collect();
        upserted += index.upsert(records).await?;
        info!(batch = batch_no, upserted, total = reviews.len(), "Ingested review batch");
    }

    Ok(upserted)
}

use std::fmt;

use thiserror::Error;

/// The external call that failed before any reply bytes were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStage {
    Embedding,
    VectorQuery,
    Completion,
}

impl fmt::Display for UpstreamStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Embedding => "embedding",
            Self::VectorQuery => "vector query",
            Self::Completion => "completion",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RmpError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("{stage} request failed: {message}")]
    Upstream {
        stage: UpstreamStage,
        message: String,
    },
    #[error("completion stream failed: {0}")]
    Stream(String),
    #[error("malformed conversation: {0}")]
    MalformedInput(String),
    #[error("a reply is still streaming; wait for it to finish before sending")]
    SendInFlight,
}

impl RmpError {
    pub fn upstream(stage: UpstreamStage, err: RmpError) -> Self {
        match err {
            already @ RmpError::Upstream { .. } => already,
            other => RmpError::Upstream {
                stage,
                message: other.to_string(),
            },
        }
    }
}

pub use crate::Result;

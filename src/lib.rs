pub mod client;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod server;

pub mod domains {
    pub mod chat;
    pub mod retrieval;
}

pub mod interfaces {
    pub mod providers;
}

pub mod providers {
    pub mod memory;
    pub mod openai;
    pub mod pinecone;
}

pub mod services {
    pub mod chat;
    pub mod prompt;
}

pub type Result<T> = std::result::Result<T, error::RmpError>;

/// Short commit of the build, or `dev` outside a git checkout. Reported by
/// `GET /health` as `<crate version>+<sha>`.
pub const GIT_SHA: &str = env!("RMP_GIT_SHA");

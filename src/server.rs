use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::{Config, IndexBackend};
use crate::domains::chat::ChatMessage;
use crate::error::{Result, RmpError};
use crate::ingest::{ingest_reviews, load_reviews, DEFAULT_BATCH_SIZE};
use crate::interfaces::providers::{LlmProvider, VectorIndex};
use crate::providers::memory::InMemoryIndex;
use crate::providers::openai::OpenAiProvider;
use crate::providers::pinecone::PineconeIndex;
use crate::services::chat::{ChatService, RetrievalPolicy};

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: format!("{}+{}", env!("CARGO_PKG_VERSION"), crate::GIT_SHA),
    })
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn status_for(err: &RmpError) -> StatusCode {
    match err {
        RmpError::MalformedInput(_) => StatusCode::BAD_REQUEST,
        RmpError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Vec<ChatMessage>>, JsonRejection>,
) -> Response {
    let Json(conversation) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected chat payload");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let mut reply = match state.chat.respond(conversation).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!(error = %err, "Chat request failed before streaming");
            return error_response(status_for(&err), err.to_string());
        }
    };

    let body = Body::from_stream(async_stream::stream! {
        while let Some(item) = reply.next().await {
            match item {
                Ok(fragment) => {
                    yield Ok::<Bytes, std::io::Error>(Bytes::from(fragment));
                }
                Err(err) => {
                    error!(error = %err, "Aborting reply stream");
                    yield Err(std::io::Error::other(err.to_string()));
                    break;
                }
            }
        }
    });

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Wires providers from configuration. The in-memory backend is seeded from
/// `index.seed_file` through the same path as `rmp-assistant ingest`.
pub async fn build_state(config: &Config) -> Result<AppState> {
    config.validate()?;
    let openai = OpenAiProvider::from_config(&config.openai)?;
    let embedding_model = openai.embedding_model().to_string();
    let llm: Arc<dyn LlmProvider> = Arc::new(openai);

    let index: Arc<dyn VectorIndex> = match config.index.backend {
        IndexBackend::Pinecone => Arc::new(PineconeIndex::from_config(&config.index)?),
        IndexBackend::Memory => {
            let index = InMemoryIndex::new();
            if let Some(seed) = &config.index.seed_file {
                let reviews = load_reviews(seed)?;
                let count = ingest_reviews(
                    llm.as_ref(),
                    &index,
                    &reviews,
                    Some(&embedding_model),
                    DEFAULT_BATCH_SIZE,
                )
                .await?;
                info!(seed = %seed.display(), records = count, "Seeded in-memory index");
            } else {
                warn!("In-memory index has no seed_file; every query will return zero matches");
            }
            Arc::new(index)
        }
    };

    let chat = ChatService::new(llm, index, RetrievalPolicy::from(&config.retrieval))
        .with_embedding_model(embedding_model);
    Ok(AppState {
        chat: Arc::new(chat),
    })
}

pub async fn run_with_shutdown<F>(config: &Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = build_state(config).await?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| RmpError::Runtime(format!("failed to bind {addr}: {e}")))?;
    info!(%addr, backend = ?config.index.backend, "Chat server listening");
    serve(listener, build_router(state), shutdown).await
}

pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RmpError::Runtime(e.to_string()))
}

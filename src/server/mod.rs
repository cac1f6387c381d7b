// HTTP front end
// Routes questions to the orchestrator and maps failures to status codes

pub mod errors;


use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::conversation::{Answer, Orchestrator, SessionStore};
use crate::index::storage;
use crate::{RagError, Result};

pub use errors::{ApiError, ErrorBody};

pub const MAX_QUESTION_CHARS: usize = 2000;
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Shared state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    orchestrator: Orchestrator,
    index_dir: PathBuf,
    dimension: usize,
}

impl AppState {
    /// `index_dir` and `dimension` are used when the index is reloaded
    #[inline]
    pub fn new(orchestrator: Orchestrator, index_dir: PathBuf, dimension: usize) -> Self {
        Self {
            orchestrator,
            index_dir,
            dimension,
        }
    }

    #[inline]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub vectors: usize,
}

/// Trimmed question, or why it cannot be asked
#[inline]
pub fn validate_question(question: &str) -> std::result::Result<&str, ApiError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(ApiError::invalid("question must not be empty"));
    }
    if question.chars().count() > MAX_QUESTION_CHARS {
        return Err(ApiError::invalid(format!(
            "question must be at most {} characters",
            MAX_QUESTION_CHARS
        )));
    }
    Ok(question)
}

#[inline]
pub fn validate_session_id(session_id: &str) -> std::result::Result<(), ApiError> {
    if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
        return Err(ApiError::invalid(format!(
            "session_id must be between 1 and {} characters",
            MAX_SESSION_ID_LEN
        )));
    }
    if !session_id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(ApiError::invalid(
            "session_id may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn ask(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AskRequest>, JsonRejection>,
) -> std::result::Result<Json<Answer>, ApiError> {
    let Json(request) = payload?;

    let question = validate_question(&request.question)?;
    if let Some(session_id) = &request.session_id {
        validate_session_id(session_id)?;
    }

    debug!(
        "Question received (session: {})",
        request.session_id.as_deref().unwrap_or("none")
    );

    let answer = state
        .orchestrator
        .ask(request.session_id.as_deref(), question)
        .await?;
    Ok(Json(answer))
}

async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    validate_session_id(&session_id)?;
    state.orchestrator.clear_session(&session_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn reload_index(
    State(state): State<AppState>,
) -> std::result::Result<Json<ReloadResponse>, ApiError> {
    let dir = state.index_dir.clone();
    let dimension = state.dimension;

    let index = tokio::task::spawn_blocking(move || storage::load(&dir, dimension))
        .await
        .map_err(|e| RagError::Other(anyhow::anyhow!("index reload task failed: {}", e)))??;

    let vectors = index.len();
    state
        .orchestrator
        .retriever()
        .index()
        .replace(index)
        .await;

    info!("Reloaded index with {} vectors", vectors);
    Ok(Json(ReloadResponse { vectors }))
}

#[inline]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ask", post(ask))
        .route("/sessions/{session_id}", delete(clear_session))
        .route("/admin/reload", post(reload_index))
        .with_state(state)
}

/// Periodically drop idle sessions until the returned task is aborted
#[inline]
pub fn spawn_session_sweeper(sessions: Arc<SessionStore>) -> JoinHandle<()> {
    let period = (sessions.ttl() / 2).clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sessions.evict_expired();
        }
    })
}

/// Serve on `listener` until `shutdown` resolves
#[inline]
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let sweeper = spawn_session_sweeper(Arc::clone(state.orchestrator.sessions()));

    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await;

    sweeper.abort();
    info!("Server stopped");
    result.map_err(RagError::Io)
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM
#[inline]
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

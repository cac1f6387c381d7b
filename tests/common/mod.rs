// Shared helpers for the integration tests: in-process services and a live server

#![allow(dead_code, reason = "each integration test binary uses a different subset")]

use async_trait::async_trait;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use events_rag::conversation::{Orchestrator, OrchestratorOptions, SessionStore};
use events_rag::embeddings::Embedder;
use events_rag::generation::{Generator, Prompt};
use events_rag::index::{PassageMetadata, SharedIndex, VectorIndex};
use events_rag::retriever::Retriever;
use events_rag::server::{self, AppState};
use events_rag::{RagError, Result};

/// Two axes: music and theatre
pub const DIMENSION: usize = 2;

/// Places text on a music/theatre plane by keyword
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    pub fn vector_for(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        let music = ["jazz", "concert", "musique"]
            .iter()
            .filter(|word| text.contains(*word))
            .count() as f32;
        let theatre = ["théâtre", "pièce", "comédie"]
            .iter()
            .filter(|word| text.contains(*word))
            .count() as f32;
        vec![music, theatre]
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| Self::vector_for(text)).collect())
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }
}

/// Every call is turned away as throttled
pub struct ThrottledEmbedder;

#[async_trait]
impl Embedder for ThrottledEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::RateLimit {
            service: "embedding".to_string(),
        })
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }
}

/// Fixed reply, or a fixed failure
pub struct ScriptedGenerator {
    reply: std::result::Result<String, fn() -> RagError>,
}

impl ScriptedGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
        }
    }

    pub fn failing(failure: fn() -> RagError) -> Self {
        Self {
            reply: Err(failure),
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn complete(&self, _prompt: &Prompt) -> Result<String> {
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(failure) => Err(failure()),
        }
    }
}

pub fn passage(event_id: &str, title: &str, text: &str) -> PassageMetadata {
    PassageMetadata {
        event_id: event_id.to_string(),
        chunk_index: 0,
        text: text.to_string(),
        title: title.to_string(),
        location: "Paris".to_string(),
        starts_at: None,
        ends_at: None,
    }
}

/// Two jazz concerts and a play
pub fn jazz_index() -> VectorIndex {
    let mut index = VectorIndex::new(DIMENSION).with_model("keywords");
    for (id, title, text) in [
        ("jazz-1", "Jazz au Sunset", "Concert de jazz samedi soir au Sunset."),
        ("jazz-2", "Nuit du jazz", "Grande nuit du jazz et de la musique live."),
        ("theatre-1", "Le Misanthrope", "Pièce de théâtre classique, une comédie de Molière."),
    ] {
        index
            .add(KeywordEmbedder::vector_for(text), passage(id, title, text))
            .expect("keyword vectors should match the index dimension");
    }
    index
}

pub fn orchestrator(index: VectorIndex, generator: impl Generator + 'static) -> Orchestrator {
    orchestrator_with(KeywordEmbedder, index, generator)
}

pub fn orchestrator_with(
    embedder: impl Embedder + 'static,
    index: VectorIndex,
    generator: impl Generator + 'static,
) -> Orchestrator {
    Orchestrator::new(
        Retriever::new(Arc::new(embedder), SharedIndex::new(index)),
        Arc::new(generator),
        Arc::new(SessionStore::new(std::time::Duration::from_secs(3600))),
        OrchestratorOptions {
            top_k: 2,
            ..OrchestratorOptions::default()
        },
    )
}

/// Server bound to an ephemeral port; dropping `shutdown` stops it
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: oneshot::Sender<()>,
    pub handle: JoinHandle<Result<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle
            .await
            .expect("server task should not panic")
            .expect("server should stop cleanly");
    }
}

pub async fn start_server(orchestrator: Orchestrator, index_dir: PathBuf) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind an ephemeral port");
    let addr = listener.local_addr().expect("should have a local address");

    let state = AppState::new(orchestrator, index_dir, DIMENSION);
    let (shutdown, signal) = oneshot::channel::<()>();
    let handle = tokio::spawn(server::serve(listener, state, async move {
        let _ = signal.await;
    }));

    TestServer {
        addr,
        shutdown,
        handle,
    }
}

/// Status code and JSON body (`Value::Null` when empty)
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

fn agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .into()
}

fn into_reply(response: std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error>) -> Reply {
    let mut response = response.expect("request should reach the server");
    let status = response.status().as_u16();
    let text = response
        .body_mut()
        .read_to_string()
        .expect("should read response body");
    let body = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).expect("response body should be JSON")
    };
    Reply { status, body }
}

pub async fn post_json(url: String, body: Value) -> Reply {
    let body = body.to_string();
    tokio::task::spawn_blocking(move || {
        into_reply(
            agent()
                .post(&url)
                .header("Content-Type", "application/json")
                .send(&body),
        )
    })
    .await
    .expect("request task should not panic")
}

pub async fn post_raw(url: String, body: &'static str) -> Reply {
    tokio::task::spawn_blocking(move || {
        into_reply(
            agent()
                .post(&url)
                .header("Content-Type", "application/json")
                .send(body),
        )
    })
    .await
    .expect("request task should not panic")
}

pub async fn post_empty(url: String) -> Reply {
    tokio::task::spawn_blocking(move || into_reply(agent().post(&url).send_empty()))
        .await
        .expect("request task should not panic")
}

pub async fn get(url: String) -> Reply {
    tokio::task::spawn_blocking(move || into_reply(agent().get(&url).call()))
        .await
        .expect("request task should not panic")
}

pub async fn delete(url: String) -> Reply {
    tokio::task::spawn_blocking(move || into_reply(agent().delete(&url).call()))
        .await
        .expect("request task should not panic")
}

// In-process stand-ins for the hosted services, shared by unit tests

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embeddings::Embedder;
use crate::generation::{Generator, Prompt};
use crate::index::{PassageMetadata, VectorIndex};
use crate::{RagError, Result};

type ErrorFactory = Box<dyn Fn() -> RagError + Send + Sync>;

/// Embeds documents from their length and every query to one fixed vector
pub(crate) struct StubEmbedder {
    dimension: usize,
    query_vector: Vec<f32>,
    failure: Option<ErrorFactory>,
    pub calls: AtomicUsize,
}

impl StubEmbedder {
    pub(crate) fn new(query_vector: Vec<f32>) -> Self {
        Self {
            dimension: query_vector.len(),
            query_vector,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(dimension: usize, failure: impl Fn() -> RagError + Send + Sync + 'static) -> Self {
        Self {
            dimension,
            query_vector: vec![0.0; dimension],
            failure: Some(Box::new(failure)),
            calls: AtomicUsize::new(0),
        }
    }

    fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.failure.as_ref().map_or(Ok(()), |make| Err(make()))
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.check()?;
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; self.dimension];
                if let Some(first) = vector.first_mut() {
                    *first = text.chars().count() as f32;
                }
                vector
            })
            .collect())
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        self.check()?;
        Ok(self.query_vector.clone())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Replies with a fixed answer and records every prompt it was given
pub(crate) struct StubGenerator {
    reply: String,
    failure: Option<ErrorFactory>,
    pub prompts: Mutex<Vec<Prompt>>,
}

impl StubGenerator {
    pub(crate) fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            failure: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(failure: impl Fn() -> RagError + Send + Sync + 'static) -> Self {
        Self {
            reply: String::new(),
            failure: Some(Box::new(failure)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn last_prompt(&self) -> Option<Prompt> {
        self.prompts
            .lock()
            .expect("prompt log should not be poisoned")
            .last()
            .cloned()
    }
}

#[async_trait]
impl Generator for StubGenerator {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log should not be poisoned")
            .push(prompt.clone());
        match &self.failure {
            Some(make) => Err(make()),
            None => Ok(self.reply.clone()),
        }
    }
}

pub(crate) fn passage(event_id: &str, text: &str) -> PassageMetadata {
    PassageMetadata {
        event_id: event_id.to_string(),
        chunk_index: 0,
        text: text.to_string(),
        title: format!("Événement {}", event_id),
        location: "Paris".to_string(),
        starts_at: None,
        ends_at: None,
    }
}

/// Two-dimensional index with one passage per `(event_id, text, vector)`
pub(crate) fn index_of(entries: &[(&str, &str, [f32; 2])]) -> VectorIndex {
    let mut index = VectorIndex::new(2);
    for (event_id, text, vector) in entries {
        index
            .add(vector.to_vec(), passage(event_id, text))
            .expect("stub vectors should match the index dimension");
    }
    index
}

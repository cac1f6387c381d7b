// Query-time retrieval: embed the question, search the current index snapshot


use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::embeddings::Embedder;
use crate::index::{SearchHit, SharedIndex};
use crate::{RagError, Result};

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalOptions {
    pub k: usize,
    /// Prefer passages of events still running at or after this instant
    pub upcoming_after: Option<DateTime<Utc>>,
}

impl Default for RetrievalOptions {
    #[inline]
    fn default() -> Self {
        Self::top(DEFAULT_TOP_K)
    }
}

impl RetrievalOptions {
    #[inline]
    pub fn top(k: usize) -> Self {
        Self {
            k,
            upcoming_after: None,
        }
    }

    #[inline]
    pub fn upcoming_after(mut self, instant: DateTime<Utc>) -> Self {
        self.upcoming_after = Some(instant);
        self
    }
}

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: SharedIndex,
}

impl std::fmt::Debug for Retriever {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("dimension", &self.embedder.dimension())
            .field("index", &self.index)
            .finish()
    }
}

impl Retriever {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, index: SharedIndex) -> Self {
        Self { embedder, index }
    }

    #[inline]
    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Top `k` passages for `query`, nearest first
    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.retrieve_with(query, &RetrievalOptions::top(k)).await
    }

    #[inline]
    pub async fn retrieve_with(&self, query: &str, options: &RetrievalOptions) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(RagError::Retrieval("query is empty".to_string()));
        }

        let snapshot = self.index.snapshot().await;
        if snapshot.is_empty() {
            return Err(RagError::Retrieval(
                "index is empty; run a reindex first".to_string(),
            ));
        }

        let query_vector = self.embedder.embed_query(query).await?;

        if let Some(instant) = options.upcoming_after {
            let hits = snapshot.search_filtered(&query_vector, options.k, |meta| {
                meta.is_upcoming(instant)
            })?;
            if !hits.is_empty() {
                debug!("Retrieved {} upcoming passages", hits.len());
                return Ok(hits);
            }
            debug!("No upcoming passages match, falling back to unfiltered search");
        }

        let hits = snapshot.search(&query_vector, options.k)?;
        debug!("Retrieved {} passages", hits.len());
        Ok(hits)
    }
}

// In-memory vector index with exact nearest-neighbour search
// Persisted by `storage`, shared between requests through `SharedIndex`

pub mod storage;


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{RagError, Result};

/// What the index knows about the passage behind a vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    pub event_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub title: String,
    pub location: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl PassageMetadata {
    /// Same rule as [`crate::catalog::Event::is_upcoming`]
    #[inline]
    pub fn is_upcoming(&self, instant: DateTime<Utc>) -> bool {
        self.ends_at
            .or(self.starts_at)
            .is_none_or(|date| date >= instant)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub vector: Vec<f32>,
    pub metadata: PassageMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub metadata: PassageMetadata,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

/// Flat index scanned linearly on every query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    embedding_model: String,
    records: Vec<VectorRecord>,
}

impl VectorIndex {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            embedding_model: String::new(),
            records: Vec::new(),
        }
    }

    /// Record which model produced the vectors
    #[inline]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn records(&self) -> &[VectorRecord] {
        &self.records
    }

    #[inline]
    pub fn add(&mut self, vector: Vec<f32>, metadata: PassageMetadata) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::Retrieval(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimension
            )));
        }
        self.records.push(VectorRecord { vector, metadata });
        Ok(())
    }

    /// The `k` records closest to `query`, nearest first
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.search_filtered(query, k, |_| true)
    }

    /// Like [`search`](Self::search) but only ranks records accepted by `predicate`
    #[inline]
    pub fn search_filtered<P>(&self, query: &[f32], k: usize, predicate: P) -> Result<Vec<SearchHit>>
    where
        P: Fn(&PassageMetadata) -> bool,
    {
        if query.len() != self.dimension {
            return Err(RagError::Retrieval(format!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(f32, usize)> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| predicate(&record.metadata))
            .map(|(position, record)| (squared_distance(query, &record.vector), position))
            .collect();

        if k == 0 || scored.is_empty() {
            return Ok(Vec::new());
        }

        // Insertion order breaks ties
        let by_distance = |a: &(f32, usize), b: &(f32, usize)| -> Ordering {
            a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
        };

        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, by_distance);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_distance);

        Ok(scored
            .into_iter()
            .map(|(distance, position)| SearchHit {
                metadata: self.records[position].metadata.clone(),
                distance,
            })
            .collect())
    }
}

#[inline]
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Current index snapshot shared by all request handlers
///
/// Readers clone the inner `Arc` and drop the lock straight away, so a
/// rebuild swapping in a new index never waits on in-flight searches.
#[derive(Debug, Clone, Default)]
pub struct SharedIndex {
    current: Arc<RwLock<Arc<VectorIndex>>>,
}

impl SharedIndex {
    #[inline]
    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    #[inline]
    pub async fn snapshot(&self) -> Arc<VectorIndex> {
        Arc::clone(&*self.current.read().await)
    }

    /// Swap in a new index, returning the one it replaced
    #[inline]
    pub async fn replace(&self, index: VectorIndex) -> Arc<VectorIndex> {
        let mut guard = self.current.write().await;
        std::mem::replace(&mut *guard, Arc::new(index))
    }
}

// Indexer module
// Offline pipeline turning the event catalog into a persisted vector index


use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::catalog::{Event, load_catalog};
use crate::config::Config;
use crate::embeddings::{ChunkingConfig, Embedder, segment};
use crate::index::{PassageMetadata, VectorIndex, storage};
use crate::{RagError, Result};

/// Statistics about one index build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub events_seen: usize,
    pub events_indexed: usize,
    /// Events with no indexable text
    pub events_skipped: usize,
    pub passages: usize,
    pub batches: usize,
    pub duration: Duration,
}

/// Segments events, embeds their passages and assembles a fresh index
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    batch_size: usize,
    embedding_model: String,
}

impl Indexer {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, chunking: ChunkingConfig, batch_size: usize) -> Self {
        Self {
            embedder,
            chunking,
            batch_size: batch_size.max(1),
            embedding_model: String::new(),
        }
    }

    #[inline]
    pub fn from_config(embedder: Arc<dyn Embedder>, config: &Config) -> Self {
        Self::new(
            embedder,
            config.chunking,
            config.embedding.batch_size as usize,
        )
        .with_model(config.embedding.model.as_str())
    }

    /// Model name recorded in the index manifest
    #[inline]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Build an index in memory; the caller decides when to swap it in
    #[inline]
    pub async fn build(&self, events: &[Event]) -> Result<(VectorIndex, IndexingStats)> {
        let start = Instant::now();
        let mut stats = IndexingStats {
            events_seen: events.len(),
            ..IndexingStats::default()
        };

        let mut pending: Vec<(String, PassageMetadata)> = Vec::new();
        for event in events {
            let text = event.indexable_text();
            if text.is_empty() {
                debug!("Event {} has no text, skipping", event.id);
                stats.events_skipped += 1;
                continue;
            }

            let location = event.location();
            for passage in segment(&text, &self.chunking) {
                pending.push((
                    passage.text.to_string(),
                    PassageMetadata {
                        event_id: event.id.clone(),
                        chunk_index: passage.index,
                        text: passage.text.to_string(),
                        title: event.title.clone(),
                        location: location.clone(),
                        starts_at: event.starts_at,
                        ends_at: event.closes_at(),
                    },
                ));
            }
            stats.events_indexed += 1;
        }

        info!(
            "Embedding {} passages from {} events",
            pending.len(),
            stats.events_indexed
        );

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(pending.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding passages")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut index =
            VectorIndex::new(self.embedder.dimension()).with_model(self.embedding_model.as_str());

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(text, _)| text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;

            if vectors.len() != batch.len() {
                bar.abandon();
                return Err(RagError::Service(format!(
                    "embedding service returned {} vectors for {} passages",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (vector, (_, metadata)) in vectors.into_iter().zip(batch) {
                index.add(vector, metadata.clone())?;
            }

            stats.batches += 1;
            bar.inc(batch.len() as u64);
        }

        bar.finish_and_clear();
        stats.passages = index.len();
        stats.duration = start.elapsed();

        info!(
            "Indexed {} passages from {} events in {:?}",
            stats.passages, stats.events_indexed, stats.duration
        );
        Ok((index, stats))
    }

    /// Rebuild from the catalog file and persist the result to `index_dir`
    #[inline]
    pub async fn rebuild(&self, catalog_path: &Path, index_dir: &Path) -> Result<(VectorIndex, IndexingStats)> {
        let catalog = load_catalog(catalog_path)?;
        let (index, stats) = self.build(&catalog.results).await?;
        storage::save(&index, index_dir)?;
        Ok((index, stats))
    }
}


use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{CatalogFile, Event, save_catalog};
use crate::config::CatalogConfig;
use crate::{RagError, Result};

/// Largest page the Opendatasoft records endpoint serves
pub const MAX_PAGE_SIZE: usize = 100;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RecordsPage {
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    results: Vec<Event>,
}

/// Pulls public events from the OpenAgenda dataset on Opendatasoft
#[derive(Debug, Clone)]
pub struct CatalogFetcher {
    agent: ureq::Agent,
    api_url: Url,
    city: String,
    since: String,
    limit: usize,
}

impl CatalogFetcher {
    #[inline]
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let api_url = Url::parse(&config.api_url)
            .map_err(|e| RagError::Config(format!("Invalid catalog URL: {}", e)))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(FETCH_TIMEOUT))
            .build()
            .into();

        Ok(Self {
            agent,
            api_url,
            city: config.city.clone(),
            since: config.since.clone(),
            limit: config.limit,
        })
    }

    /// Filter expression in the Opendatasoft query language
    #[inline]
    pub fn where_clause(&self) -> String {
        format!(
            "location_city:\"{}\" AND firstdate_begin >= \"{}\"",
            self.city.replace('"', ""),
            self.since.replace('"', "")
        )
    }

    /// Page through the dataset until `limit` events or the end of results
    #[inline]
    pub fn fetch(&self) -> Result<Vec<Event>> {
        let where_clause = self.where_clause();
        let mut events: Vec<Event> = Vec::with_capacity(self.limit.min(1000));

        info!("Fetching up to {} events for {}", self.limit, self.city);

        while events.len() < self.limit {
            let offset = events.len();
            let page_size = (self.limit - offset).min(MAX_PAGE_SIZE);
            let page = self.fetch_page(&where_clause, offset, page_size)?;

            debug!(
                "Fetched page at offset {}: {} events (total {})",
                offset,
                page.results.len(),
                page.total_count
            );

            if page.results.is_empty() {
                break;
            }

            let received = page.results.len();
            events.extend(page.results);

            if received < page_size || events.len() >= page.total_count {
                break;
            }
        }

        events.truncate(self.limit);

        let before = events.len();
        events.retain(|event| !event.id.trim().is_empty());
        if events.len() < before {
            warn!("Dropped {} events without an identifier", before - events.len());
        }

        info!("Fetched {} events", events.len());
        Ok(events)
    }

    /// Fetch and write the catalog file, replacing any previous one
    #[inline]
    pub fn fetch_to(&self, path: &Path) -> Result<CatalogFile> {
        let catalog = CatalogFile::new(self.fetch()?);
        save_catalog(path, &catalog)?;
        Ok(catalog)
    }

    fn fetch_page(&self, where_clause: &str, offset: usize, limit: usize) -> Result<RecordsPage> {
        let body = self
            .agent
            .get(self.api_url.as_str())
            .query("where", where_clause)
            .query("limit", limit.to_string())
            .query("offset", offset.to_string())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| RagError::Catalog(format!("Event API request failed: {}", e)))?;

        serde_json::from_str(&body)
            .map_err(|e| RagError::Catalog(format!("Failed to parse event API response: {}", e)))
    }
}

// Event catalog: the records questions are answered from
// Loaded from the JSON file written by the offline fetch step

pub mod fetch;
pub mod markup;


use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::{RagError, Result};

pub use fetch::CatalogFetcher;
pub use markup::clean_html;

/// A cultural event as published by OpenAgenda
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Empty when the record has no usable identifier
    #[serde(rename = "uid", default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "title_fr", default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(rename = "description_fr", default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(
        rename = "longdescription_fr",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub long_description: String,
    #[serde(rename = "conditions_fr", default, deserialize_with = "null_as_empty")]
    pub conditions: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub location_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub location_address: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub location_city: String,
    /// Start of the first occurrence
    #[serde(
        rename = "firstdate_begin",
        default,
        deserialize_with = "flexible_date"
    )]
    pub starts_at: Option<DateTime<Utc>>,
    /// Start of the last occurrence
    #[serde(rename = "lastdate_begin", default, deserialize_with = "flexible_date")]
    pub ends_at: Option<DateTime<Utc>>,
    /// End of the last occurrence
    #[serde(rename = "lastdate_end", default, deserialize_with = "flexible_date")]
    pub finishes_at: Option<DateTime<Utc>>,
    #[serde(rename = "keywords_fr", default, deserialize_with = "keyword_list")]
    pub keywords: Vec<String>,
}

impl Event {
    /// Text that gets segmented and embedded for this event
    ///
    /// Cleaned description, then the long description when it adds
    /// something, then the access conditions. Empty when the event has
    /// no text at all.
    #[inline]
    pub fn indexable_text(&self) -> String {
        let description = clean_html(&self.description);
        let long_description = clean_html(&self.long_description);
        let conditions = clean_html(&self.conditions);

        let mut parts = Vec::with_capacity(3);
        if !description.is_empty() {
            parts.push(description.clone());
        }
        if !long_description.is_empty() && long_description != description {
            parts.push(long_description);
        }
        if !conditions.is_empty() {
            parts.push(format!("Conditions: {}", conditions));
        }

        parts.join("\n\n")
    }

    /// Venue, address and city joined for display
    #[inline]
    pub fn location(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        for part in [
            self.location_name.trim(),
            self.location_address.trim(),
        ] {
            if !part.is_empty() {
                parts.push(part);
            }
        }

        let city = self.location_city.trim();
        if !city.is_empty() && !parts.iter().any(|p| p.contains(city)) {
            parts.push(city);
        }

        parts.join(", ")
    }

    /// When the event is over: the end of its last occurrence, else the
    /// start of that occurrence
    #[inline]
    pub fn closes_at(&self) -> Option<DateTime<Utc>> {
        self.finishes_at.or(self.ends_at)
    }

    /// Whether the event is still running at or after `instant`
    ///
    /// Uses the last occurrence when known, else the first one. Events
    /// without any date are treated as upcoming.
    #[inline]
    pub fn is_upcoming(&self, instant: DateTime<Utc>) -> bool {
        self.closes_at()
            .or(self.starts_at)
            .is_none_or(|date| date >= instant)
    }
}

/// On-disk shape of the fetched catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogFile {
    pub total_count: usize,
    pub results: Vec<Event>,
}

impl CatalogFile {
    #[inline]
    pub fn new(results: Vec<Event>) -> Self {
        Self {
            total_count: results.len(),
            results,
        }
    }
}

/// Read the catalog file written by [`save_catalog`]
#[inline]
pub fn load_catalog(path: &Path) -> Result<CatalogFile> {
    let content = fs::read_to_string(path).map_err(|e| {
        RagError::Catalog(format!("Failed to read catalog {}: {}", path.display(), e))
    })?;

    let catalog: CatalogFile = serde_json::from_str(&content).map_err(|e| {
        RagError::Catalog(format!("Failed to parse catalog {}: {}", path.display(), e))
    })?;

    debug!(
        "Loaded {} events from {}",
        catalog.results.len(),
        path.display()
    );
    Ok(catalog)
}

/// Write the catalog next to its final location, then move it into place
#[inline]
pub fn save_catalog(path: &Path, catalog: &CatalogFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(catalog)
        .map_err(|e| RagError::Catalog(format!("Failed to serialize catalog: {}", e)))?;

    let staging = path.with_extension("json.tmp");
    fs::write(&staging, content)?;
    fs::rename(&staging, path)?;

    info!(
        "Saved {} events to {}",
        catalog.results.len(),
        path.display()
    );
    Ok(())
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<StringOrNumber>::deserialize(deserializer)? {
        None => String::new(),
        Some(StringOrNumber::String(s)) => s,
        Some(StringOrNumber::Number(n)) => n.to_string(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Keywords {
    List(Vec<Option<String>>),
    Joined(String),
}

fn keyword_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let keywords = match Option::<Keywords>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Keywords::List(list)) => list.into_iter().flatten().collect(),
        Some(Keywords::Joined(joined)) => joined.split([',', ';']).map(str::to_string).collect(),
    };

    Ok(keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect())
}

fn flexible_date<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    parse_date(&raw).map_err(serde::de::Error::custom)
}

/// Parse an RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC)
/// or a bare `YYYY-MM-DD` (midnight UTC). Blank input is no date.
#[inline]
pub fn parse_date(raw: &str) -> std::result::Result<Option<DateTime<Utc>>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(date.with_timezone(&Utc)));
    }
    if let Ok(date) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Some(date.and_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(date.and_time(chrono::NaiveTime::MIN).and_utc()));
    }

    Err(format!("unrecognised date: {}", raw))
}

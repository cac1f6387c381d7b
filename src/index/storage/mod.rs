
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{PassageMetadata, VectorIndex, VectorRecord};
use crate::{RagError, Result};

pub const FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const VECTORS_FILE: &str = "vectors.bin";
const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub dimension: usize,
    pub count: usize,
    pub embedding_model: String,
    pub built_at: DateTime<Utc>,
}

/// Whether `dir` looks like a saved index
#[inline]
pub fn exists(dir: &Path) -> bool {
    has_manifest(&locate(dir))
}

/// Persist the index as a unit
///
/// Everything is written to a sibling staging directory first, which then
/// takes the place of `dir`; a reader never sees a half-written index.
/// The previous index is parked in `<dir>.old` while the staging directory
/// moves in; if that swap is interrupted, [`load`] reads `<dir>.old`.
#[inline]
pub fn save(index: &VectorIndex, dir: &Path) -> Result<()> {
    let staging = sibling(dir, "tmp")?;
    let previous = sibling(dir, "old")?;

    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        dimension: index.dimension(),
        count: index.len(),
        embedding_model: index.embedding_model().to_string(),
        built_at: Utc::now(),
    };
    write_json(&staging.join(MANIFEST_FILE), &manifest)?;

    let mut blob = Vec::with_capacity(index.len() * index.dimension() * 4);
    for record in index.records() {
        for value in &record.vector {
            blob.extend_from_slice(&value.to_le_bytes());
        }
    }
    fs::write(staging.join(VECTORS_FILE), blob)?;

    let metadata: Vec<&PassageMetadata> = index.records().iter().map(|r| &r.metadata).collect();
    write_json(&staging.join(METADATA_FILE), &metadata)?;

    if previous.exists() {
        fs::remove_dir_all(&previous)?;
    }
    if dir.exists() {
        fs::rename(dir, &previous)?;
    }
    fs::rename(&staging, dir)?;
    if previous.exists() {
        fs::remove_dir_all(&previous)?;
    }

    info!(
        "Saved index with {} vectors to {}",
        index.len(),
        dir.display()
    );
    Ok(())
}

/// Read an index saved by [`save`], checking it against the expected dimension
#[inline]
pub fn load(dir: &Path, expected_dimension: usize) -> Result<VectorIndex> {
    let dir = &locate(dir);
    let manifest = read_manifest(dir)?;

    if manifest.format_version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "unknown format version {}",
            manifest.format_version
        )));
    }

    if manifest.dimension == 0 {
        return Err(corrupt("manifest declares zero dimensions".to_string()));
    }

    if manifest.dimension != expected_dimension {
        return Err(corrupt(format!(
            "index has {} dimensions, embedding model produces {}",
            manifest.dimension, expected_dimension
        )));
    }

    let blob = fs::read(dir.join(VECTORS_FILE))
        .map_err(|e| corrupt(format!("cannot read {}: {}", VECTORS_FILE, e)))?;

    let expected_bytes = manifest
        .count
        .checked_mul(manifest.dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| corrupt("manifest sizes overflow".to_string()))?;
    if blob.len() != expected_bytes {
        return Err(corrupt(format!(
            "{} holds {} bytes, expected {}",
            VECTORS_FILE,
            blob.len(),
            expected_bytes
        )));
    }

    let metadata_json = fs::read_to_string(dir.join(METADATA_FILE))
        .map_err(|e| corrupt(format!("cannot read {}: {}", METADATA_FILE, e)))?;
    let metadata: Vec<PassageMetadata> = serde_json::from_str(&metadata_json)
        .map_err(|e| corrupt(format!("cannot parse {}: {}", METADATA_FILE, e)))?;

    if metadata.len() != manifest.count {
        return Err(corrupt(format!(
            "{} has {} entries, manifest says {}",
            METADATA_FILE,
            metadata.len(),
            manifest.count
        )));
    }

    let mut index = VectorIndex::new(manifest.dimension).with_model(manifest.embedding_model);
    for (row, meta) in blob.chunks_exact(manifest.dimension * 4).zip(metadata) {
        let vector = row
            .chunks_exact(4)
            .map(|bytes| {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                f32::from_le_bytes(raw)
            })
            .collect();
        index.records.push(VectorRecord {
            vector,
            metadata: meta,
        });
    }

    debug!(
        "Loaded index with {} vectors from {}",
        index.len(),
        dir.display()
    );
    Ok(index)
}

/// Read only the manifest, e.g. for status reporting
#[inline]
pub fn read_manifest(dir: &Path) -> Result<Manifest> {
    let path = locate(dir).join(MANIFEST_FILE);
    let content = fs::read_to_string(&path)
        .map_err(|e| corrupt(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| corrupt(format!("cannot parse {}: {}", MANIFEST_FILE, e)))
}

fn has_manifest(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

/// `dir`, or the index parked beside it by a [`save`] that never finished
fn locate(dir: &Path) -> PathBuf {
    if has_manifest(dir) {
        return dir.to_path_buf();
    }
    match sibling(dir, "old") {
        Ok(previous) if has_manifest(&previous) => {
            warn!(
                "No index at {}, using the previous one at {}",
                dir.display(),
                previous.display()
            );
            previous
        }
        _ => dir.to_path_buf(),
    }
}

fn corrupt(message: String) -> RagError {
    RagError::IndexCorrupt(message)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec(value)
        .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to serialize {}: {}", path.display(), e)))?;
    fs::write(path, content)?;
    Ok(())
}

fn sibling(dir: &Path, suffix: &str) -> Result<PathBuf> {
    let name = dir.file_name().ok_or_else(|| {
        RagError::Config(format!("Index path has no directory name: {}", dir.display()))
    })?;
    let mut sibling_name = name.to_os_string();
    sibling_name.push(format!(".{}", suffix));
    Ok(dir.with_file_name(sibling_name))
}

// src/file_manager.rs - SD file index
//
// The device offers no file listing, so the bridge keeps its own record of
// every file it uploaded: the name the host knows it by, the name the device
// assigned, and the size. The record is mirrored to a JSON document that is
// replaced atomically on every change.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

pub const SD_INDEX_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SdIndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdIndexEntry {
    pub display: String,
    pub remote: String,
    #[serde(default)]
    pub size: u64,
}

/// On-disk form of the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdIndexDocument {
    pub schema_version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub items: BTreeMap<String, SdIndexEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct SdIndex {
    path: Option<PathBuf>,
    // Keyed by lower-cased display name; entries keep the original case.
    entries: BTreeMap<String, SdIndexEntry>,
}

impl SdIndex {
    /// An index that lives only in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the index mirrored at `path`. A missing, malformed or
    /// wrong-version document yields an empty index.
    pub async fn load(path: Option<PathBuf>) -> Self {
        let mut index = Self { path, entries: BTreeMap::new() };
        let Some(path) = index.path.clone() else {
            return index;
        };
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return index,
            Err(e) => {
                tracing::warn!("Failed to read SD index {}: {}", path.display(), e);
                return index;
            }
        };
        let document: SdIndexDocument = match serde_json::from_str(&contents) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("Ignoring malformed SD index {}: {}", path.display(), e);
                return index;
            }
        };
        if document.schema_version != SD_INDEX_SCHEMA_VERSION {
            tracing::warn!(
                "Ignoring SD index {} with schema version {} (expected {})",
                path.display(),
                document.schema_version,
                SD_INDEX_SCHEMA_VERSION
            );
            return index;
        }
        for (key, mut entry) in document.items {
            if entry.remote.trim().is_empty() {
                continue;
            }
            if entry.display.trim().is_empty() {
                entry.display = key;
            }
            index.insert(entry);
        }
        tracing::info!("Loaded {} SD index entries from {}", index.len(), path.display());
        index
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add or replace an entry. Entries without a remote name are refused.
    pub fn insert(&mut self, entry: SdIndexEntry) -> bool {
        if entry.remote.trim().is_empty() {
            tracing::warn!("Refusing SD index entry '{}' without a remote name", entry.display);
            return false;
        }
        self.entries.insert(entry.display.to_lowercase(), entry);
        true
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn get(&self, display: &str) -> Option<&SdIndexEntry> {
        self.entries.get(&display.trim().to_lowercase())
    }

    pub fn find_by_remote(&self, remote: &str) -> Option<&SdIndexEntry> {
        let remote = remote.trim();
        self.entries
            .values()
            .find(|entry| entry.remote.eq_ignore_ascii_case(remote))
    }

    /// Entries sorted by display name, ignoring case.
    pub fn snapshot(&self) -> Vec<SdIndexEntry> {
        // Keys are already lower-cased display names
        self.entries.values().cloned().collect()
    }

    pub fn document(&self) -> SdIndexDocument {
        SdIndexDocument {
            schema_version: SD_INDEX_SCHEMA_VERSION,
            updated_at: Utc::now(),
            items: self
                .entries
                .values()
                .map(|entry| (entry.display.clone(), entry.clone()))
                .collect(),
        }
    }

    /// Persist to the configured path, if any.
    pub async fn save(&self) -> Result<(), SdIndexError> {
        match &self.path {
            Some(path) => save_document(path, &self.document()).await,
            None => Ok(()),
        }
    }
}

/// Write `document` next to `path` and rename it into place.
pub async fn save_document(path: &Path, document: &SdIndexDocument) -> Result<(), SdIndexError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let body = serde_json::to_vec_pretty(document)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).await?;
    fs::rename(&tmp, path).await?;
    tracing::debug!("Saved {} SD index entries to {}", document.items.len(), path.display());
    Ok(())
}

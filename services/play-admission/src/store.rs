use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Length of a content fingerprint in base64 characters.
pub const FINGERPRINT_LEN: usize = 16;

/// Fingerprint of a creation's HTML: the leading characters of its standard
/// base64 encoding.
pub fn fingerprint_of(html: &str) -> String {
    // 12 input bytes encode to exactly 16 characters.
    let bytes = html.as_bytes();
    let head = &bytes[..bytes.len().min(FINGERPRINT_LEN / 4 * 3)];
    let mut encoded = STANDARD.encode(head);
    encoded.truncate(FINGERPRINT_LEN);
    encoded
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write catalog {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("duplicate item id in catalog: {0}")]
    Duplicate(String),
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("play count overflow for {0}")]
    Overflow(String),
}

/// One creation as listed in the catalog file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub item_id: String,
    /// Current HTML; when absent the content check is skipped for this item.
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub play_count: u64,
}

/// What the admission controller needs to know about an item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayItem {
    pub item_id: String,
    pub expected_fingerprint: Option<String>,
    pub play_count: u64,
}

impl From<&CatalogEntry> for PlayItem {
    fn from(entry: &CatalogEntry) -> Self {
        PlayItem {
            item_id: entry.item_id.clone(),
            expected_fingerprint: entry.html.as_deref().map(fingerprint_of),
            play_count: entry.play_count,
        }
    }
}

/// Durable per-item play counter the controller writes admitted plays to.
pub trait PlayStore: Send + Sync {
    fn lookup(&self, item_id: &str) -> Result<Option<PlayItem>, StoreError>;

    /// Add one play. Returns the new count once it is stored.
    fn increment(&self, item_id: &str) -> Result<u64, StoreError>;
}

/// [`PlayStore`] over a JSON catalog file.
///
/// Every change is written back to the file before it is acknowledged, so
/// counts survive a restart. A store built with [`CatalogStore::from_entries`]
/// has no file and lives in memory only.
#[derive(Default)]
pub struct CatalogStore {
    path: Option<PathBuf>,
    items: Mutex<BTreeMap<String, CatalogEntry>>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self, StoreError> {
        let mut items = BTreeMap::new();
        for entry in entries {
            if items.contains_key(&entry.item_id) {
                return Err(StoreError::Duplicate(entry.item_id));
            }
            items.insert(entry.item_id.clone(), entry);
        }
        Ok(Self {
            path: None,
            items: Mutex::new(items),
        })
    }

    /// Load a catalog file holding a JSON array of [`CatalogEntry`]. Later
    /// changes are written back to the same file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let mut store = Self::from_entries(entries)?;
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Add or replace an item, keeping its play count when it already exists.
    pub fn upsert(&self, mut entry: CatalogEntry) -> Result<(), StoreError> {
        let mut items = self.items();
        let previous = items.get(&entry.item_id).cloned();
        if let Some(existing) = &previous {
            entry.play_count = existing.play_count;
        }
        let item_id = entry.item_id.clone();
        items.insert(item_id.clone(), entry);

        if let Err(err) = self.write_back(&items) {
            match previous {
                Some(previous) => items.insert(item_id, previous),
                None => items.remove(&item_id),
            };
            return Err(err);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn items(&self) -> MutexGuard<'_, BTreeMap<String, CatalogEntry>> {
        match self.items.lock() {
            Ok(items) => items,
            Err(poisoned) => {
                tracing::warn!("play store lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Replace the catalog file atomically: write a sibling temp file, then
    /// rename it over the original.
    fn write_back(&self, items: &BTreeMap<String, CatalogEntry>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let write_err = |source: std::io::Error| StoreError::Write {
            path: path.clone(),
            source,
        };

        let entries: Vec<&CatalogEntry> = items.values().collect();
        let encoded =
            serde_json::to_vec_pretty(&entries).map_err(|err| write_err(err.into()))?;

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir).map_err(write_err)?;
        file.write_all(&encoded).map_err(write_err)?;
        file.as_file().sync_all().map_err(write_err)?;
        file.persist(path).map_err(|err| write_err(err.error))?;
        Ok(())
    }
}

impl PlayStore for CatalogStore {
    fn lookup(&self, item_id: &str) -> Result<Option<PlayItem>, StoreError> {
        Ok(self.items().get(item_id).map(PlayItem::from))
    }

    fn increment(&self, item_id: &str) -> Result<u64, StoreError> {
        let mut items = self.items();
        let entry = items
            .get_mut(item_id)
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;
        let previous = entry.play_count;
        let play_count = previous
            .checked_add(1)
            .ok_or_else(|| StoreError::Overflow(item_id.to_string()))?;
        entry.play_count = play_count;

        if let Err(err) = self.write_back(&items) {
            if let Some(entry) = items.get_mut(item_id) {
                entry.play_count = previous;
            }
            return Err(err);
        }
        Ok(play_count)
    }
}

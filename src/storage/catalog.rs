// Streamkeep - offline playback core for mobile video clients
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Offline catalog of downloaded top-level items
//!
//! One JSON document keyed by top-level content id (series, playlist or a
//! lone episode). Persistence is best-effort: a failed write is logged and
//! the in-memory map stays authoritative for the rest of the run. A missing
//! or corrupt file loads as an empty catalog.
//!
//! `record_created` materializes metadata at most once per id per process.
//! Entries loaded from disk are refreshed on their first record of a run;
//! after that, upstream changes (new seasons, new episodes) are not picked
//! up until the next start.

use crate::error::{Result, StreamkeepError};
use crate::models::ContentId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Series,
    Playlist,
    Episode,
}

/// Metadata produced by the materialization step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMetadata {
    pub title: String,
    pub episode_ids: Vec<ContentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: ContentId,
    pub kind: CatalogKind,
    pub title: String,
    pub episode_ids: Vec<ContentId>,
    pub created_at: DateTime<Utc>,
}

type CatalogMap = BTreeMap<ContentId, CatalogEntry>;

pub struct OfflineCatalog {
    path: Option<PathBuf>,
    entries: Mutex<CatalogMap>,
    /// Ids materialized by this process
    recorded: Mutex<HashSet<ContentId>>,
    /// Serializes snapshot writes so the newest state lands last
    write_lock: tokio::sync::Mutex<()>,
}

impl OfflineCatalog {
    /// Catalog backed by `path`, loaded from it when present
    pub async fn open<P: AsRef<Path>>(path: P) -> Self {
        let catalog = Self::with_path(Some(path.as_ref().to_path_buf()));
        catalog.load_from_disk().await;
        catalog
    }

    /// Catalog that never touches the disk
    pub fn in_memory() -> Self {
        Self::with_path(None)
    }

    fn with_path(path: Option<PathBuf>) -> Self {
        Self {
            path,
            entries: Mutex::new(BTreeMap::new()),
            recorded: Mutex::new(HashSet::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a downloaded top-level item
    ///
    /// `materialize` runs only if this process has not recorded `id` yet.
    /// Returns true if it ran and the entry was written.
    pub async fn record_created<F, Fut>(&self, id: ContentId, kind: CatalogKind, materialize: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CatalogMetadata>>,
    {
        if !self.recorded.lock().insert(id) {
            debug!(content_id = %id, "catalog entry already recorded this run");
            return Ok(false);
        }

        let metadata = match materialize().await {
            Ok(metadata) => metadata,
            Err(err) => {
                self.recorded.lock().remove(&id);
                return Err(err);
            }
        };

        let entry = CatalogEntry {
            id,
            kind,
            title: metadata.title,
            episode_ids: metadata.episode_ids,
            created_at: Utc::now(),
        };
        self.entries.lock().insert(id, entry);
        self.persist().await;
        Ok(true)
    }

    /// Drop a top-level entry; returns it if present
    pub async fn remove(&self, id: ContentId) -> Option<CatalogEntry> {
        self.recorded.lock().remove(&id);
        let removed = self.entries.lock().remove(&id);
        if removed.is_some() {
            self.persist().await;
        }
        removed
    }

    pub fn get(&self, id: ContentId) -> Option<CatalogEntry> {
        self.entries.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: ContentId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Entries ordered by id
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Write the whole map, replacing the previous file
    ///
    /// Goes through a temp file and rename so a crash never leaves half a
    /// document behind.
    pub async fn snapshot_to_disk(&self) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let json = {
            let entries = self.entries.lock();
            serde_json::to_vec_pretty(&*entries)?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &json).await?;
        tokio::fs::rename(&temp_path, path).await.map_err(|e| {
            StreamkeepError::FileIo(format!("Failed to replace catalog {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), bytes = json.len(), "catalog snapshot written");
        Ok(())
    }

    /// Replace the in-memory map with the file's content
    ///
    /// Missing or unreadable files yield an empty catalog.
    pub async fn load_from_disk(&self) {
        let Some(path) = self.path.as_ref() else {
            return;
        };

        let loaded = match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<CatalogMap>(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt catalog, starting empty");
                    CatalogMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CatalogMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable catalog, starting empty");
                CatalogMap::new()
            }
        };

        debug!(entries = loaded.len(), "catalog loaded");
        *self.entries.lock() = loaded;
    }

    async fn persist(&self) {
        if let Err(e) = self.snapshot_to_disk().await {
            warn!(error = %e, "catalog snapshot failed, keeping in-memory state");
        }
    }
}

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


//! Download tree orchestration
//!
//! # Flow
//! 1. `start_download` inserts a node for the id (no-op if one is active)
//! 2. Leaf: Download-mode key exchange, then the platform transfer
//! 3. Composite: one leaf per unsaved episode, all started together
//! 4. Leaf completion marks the descriptor saved and updates the parent
//! 5. Once the top-level item has something on disk, the catalog records it
//!
//! Cancellation runs top-down only. A composite whose children were all
//! cancelled or failed cancels itself.
//!
//! # Example
//! ```rust,no_run
//! use streamkeep_core::download::{DownloadKind, DownloadTree};
//! use streamkeep_core::models::ContentId;
//!
//! # async fn example(tree: DownloadTree) -> streamkeep_core::error::Result<()> {
//! let mut progress = tree.subscribe();
//! let handle = tree.spawn_download(ContentId(42), DownloadKind::Season);
//!
//! while let Ok(update) = progress.recv().await {
//!     println!("{}", update.display_string());
//!     if update.content_id == ContentId(42) && update.state.is_terminal() {
//!         break;
//!     }
//! }
//! # let _ = handle.await;
//! # Ok(())
//! # }
//! ```

use crate::cache::MetadataCache;
use crate::config::DownloadConfig;
use crate::crypto::{DrmContext, KeyExchangeSession, SessionMode};
use crate::download::node::{ChildProgress, DownloadNode, NodeKind};
use crate::download::progress::{DownloadProgress, DownloadState};
use crate::download::transfer::{TransferClient, TransferEvent, TransferRequest};
use crate::error::{Result, StreamkeepError};
use crate::models::{ContainerKind, ContentId, EpisodeContainer, MediaDescriptor};
use crate::storage::{CatalogKind, CatalogMetadata, OfflineCatalog};
use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;

/// What a download id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadKind {
    Episode,
    Season,
    Playlist,
}

impl DownloadKind {
    fn container(&self) -> Option<ContainerKind> {
        match self {
            DownloadKind::Episode => None,
            DownloadKind::Season => Some(ContainerKind::Season),
            DownloadKind::Playlist => Some(ContainerKind::Playlist),
        }
    }
}

/// How a `start_download` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed,
    /// Everything was on disk already
    AlreadySaved,
    /// A node for the id is already running
    AlreadyActive,
    Cancelled,
    /// Composite where some children did not complete
    Partial { completed: usize, failed: usize },
}

/// Top-level catalog item a download belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatalogTarget {
    Series(ContentId),
    /// Season without a series, recorded as a series of its own
    Season(ContentId),
    Playlist(ContentId),
    Episode(ContentId),
}

impl CatalogTarget {
    fn id(&self) -> ContentId {
        match self {
            CatalogTarget::Series(id)
            | CatalogTarget::Season(id)
            | CatalogTarget::Playlist(id)
            | CatalogTarget::Episode(id) => *id,
        }
    }

    fn kind(&self) -> CatalogKind {
        match self {
            CatalogTarget::Series(_) | CatalogTarget::Season(_) => CatalogKind::Series,
            CatalogTarget::Playlist(_) => CatalogKind::Playlist,
            CatalogTarget::Episode(_) => CatalogKind::Episode,
        }
    }
}

struct TreeInner {
    nodes: Mutex<HashMap<ContentId, Arc<DownloadNode>>>,
    metadata: Arc<MetadataCache>,
    drm: DrmContext,
    transfer: Arc<dyn TransferClient>,
    catalog: Arc<OfflineCatalog>,
    config: DownloadConfig,
    events: broadcast::Sender<DownloadProgress>,
}

/// Active downloads, keyed by content id
#[derive(Clone)]
pub struct DownloadTree {
    inner: Arc<TreeInner>,
}

impl DownloadTree {
    pub fn new(
        metadata: Arc<MetadataCache>,
        drm: DrmContext,
        transfer: Arc<dyn TransferClient>,
        catalog: Arc<OfflineCatalog>,
        config: DownloadConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(TreeInner {
                nodes: Mutex::new(HashMap::new()),
                metadata,
                drm,
                transfer,
                catalog,
                config,
                events,
            }),
        }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &Arc<OfflineCatalog> {
        &self.inner.catalog
    }

    /// Progress stream for every node
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadProgress> {
        self.inner.events.subscribe()
    }

    pub fn progress(&self, id: ContentId) -> Option<DownloadProgress> {
        self.node(id).map(|node| node.snapshot())
    }

    pub fn state(&self, id: ContentId) -> Option<DownloadState> {
        self.node(id).map(|node| node.state())
    }

    pub fn is_active(&self, id: ContentId) -> bool {
        self.inner.nodes.lock().contains_key(&id)
    }

    pub fn active_ids(&self) -> Vec<ContentId> {
        let mut ids: Vec<ContentId> = self.inner.nodes.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Run [`DownloadTree::start_download`] on the runtime
    pub fn spawn_download(&self, id: ContentId, kind: DownloadKind) -> JoinHandle<Result<DownloadOutcome>> {
        let tree = self.clone();
        tokio::spawn(async move { tree.start_download(id, kind).await })
    }

    /// Download an episode, season or playlist
    ///
    /// Resolves when the node reaches a terminal state. A failed leaf
    /// returns [`StreamkeepError::DownloadFailed`]; a composite only fails
    /// if none of its children completed.
    pub async fn start_download(&self, id: ContentId, kind: DownloadKind) -> Result<DownloadOutcome> {
        match kind.container() {
            None => self.start_episode(id).await,
            Some(container) => self.start_composite(id, container).await,
        }
    }

    async fn start_episode(&self, id: ContentId) -> Result<DownloadOutcome> {
        let media = self.inner.metadata.episode(id).await?;
        if media.is_saved() {
            return Ok(DownloadOutcome::AlreadySaved);
        }

        let Some(node) = self.insert_node(id, NodeKind::Leaf, None, &media.title) else {
            debug!(content_id = %id, "download already active");
            return Ok(DownloadOutcome::AlreadyActive);
        };

        let outcome = self.run_leaf(node, Arc::clone(&media)).await?;
        if outcome == DownloadOutcome::Completed {
            let target = self.episode_target(&media).await;
            self.record_catalog(target).await;
        }
        Ok(outcome)
    }

    async fn start_composite(&self, id: ContentId, kind: ContainerKind) -> Result<DownloadOutcome> {
        let container = self.inner.metadata.container(id, kind).await?;
        let episodes = self.inner.metadata.episodes_of(&container).await?;
        let target = container_target(&container);

        let pending: Vec<Arc<MediaDescriptor>> = episodes.into_iter().filter(|media| !media.is_saved()).collect();
        if pending.is_empty() {
            self.record_catalog(target).await;
            return Ok(DownloadOutcome::AlreadySaved);
        }

        let Some(parent) = self.insert_node(id, NodeKind::Composite, None, container.title()) else {
            debug!(content_id = %id, "download already active");
            return Ok(DownloadOutcome::AlreadyActive);
        };

        let children = self.adopt_children(&parent, pending);
        if children.is_empty() {
            self.detach(&parent);
            if parent.is_cancelled() {
                return Ok(DownloadOutcome::Cancelled);
            }
            return Ok(DownloadOutcome::AlreadyActive);
        }
        parent.set_children(children.iter().map(|(node, _)| node.id()));
        parent.set_state(DownloadState::Downloading);
        self.emit(&parent);

        info!(content_id = %id, episodes = children.len(), "starting composite download");
        // The catalog entry appears with the first episode on disk
        let results = join_all(children.into_iter().map(|(node, media)| async move {
            let result = self.run_leaf(node, media).await;
            if matches!(result, Ok(DownloadOutcome::Completed)) {
                self.record_catalog(target).await;
            }
            result
        }))
        .await;

        let completed = results
            .iter()
            .filter(|result| matches!(result, Ok(DownloadOutcome::Completed)))
            .count();
        let failed = results.iter().filter(|result| result.is_err()).count();
        let cancelled = results.len() - completed - failed;

        if completed > 0 {
            self.record_catalog(target).await;
        }

        let outcome = if parent.is_cancelled() && failed == 0 {
            DownloadOutcome::Cancelled
        } else if completed == 0 && failed > 0 {
            let cause = results
                .into_iter()
                .find_map(|result| result.err())
                .map(|err| err.to_string())
                .unwrap_or_default();
            parent.mark_failed(cause.clone());
            self.detach(&parent);
            self.emit(&parent);
            return Err(StreamkeepError::DownloadFailed { content_id: id, cause });
        } else if failed > 0 || cancelled > 0 {
            DownloadOutcome::Partial { completed, failed }
        } else {
            DownloadOutcome::Completed
        };

        match outcome {
            DownloadOutcome::Partial { failed, .. } if failed > 0 => {
                parent.mark_failed(format!("{} of {} episodes failed", failed, results.len()));
            }
            DownloadOutcome::Cancelled => {}
            _ => {
                parent.mark_completed();
            }
        }
        self.detach(&parent);
        self.emit(&parent);

        info!(content_id = %id, ?outcome, "composite download finished");
        Ok(outcome)
    }

    /// Insert a leaf under `parent` for every pending episode
    ///
    /// Episodes already downloading on their own keep their own node. Comes
    /// back empty if `parent` was cancelled before its children were all in
    /// place; any leaves inserted by then are cancelled with it.
    fn adopt_children(
        &self,
        parent: &Arc<DownloadNode>,
        pending: Vec<Arc<MediaDescriptor>>,
    ) -> Vec<(Arc<DownloadNode>, Arc<MediaDescriptor>)> {
        let mut children = Vec::with_capacity(pending.len());
        for media in pending {
            match self.insert_node(media.id, NodeKind::Leaf, Some(parent.id()), &media.title) {
                Some(node) => children.push((node, media)),
                None => debug!(content_id = %media.id, "episode already active, skipping"),
            }
        }

        if !parent.is_cancelled() {
            return children;
        }
        debug!(content_id = %parent.id(), "composite cancelled while adding episodes");
        for (node, _) in children {
            if node.mark_cancelled() {
                self.emit(&node);
            }
            self.detach(&node);
        }
        Vec::new()
    }

    /// Key exchange, then transfer, until the leaf is terminal
    async fn run_leaf(&self, node: Arc<DownloadNode>, media: Arc<MediaDescriptor>) -> Result<DownloadOutcome> {
        node.set_state(DownloadState::Fetching);
        self.emit(&node);

        let mut session = KeyExchangeSession::new(SessionMode::Download, &media, self.inner.drm.clone());
        let handshake = tokio::select! {
            result = session.run() => result,
            _ = node.cancelled() => return Ok(DownloadOutcome::Cancelled),
        };
        if let Err(err) = handshake {
            return Err(self.fail_leaf(&node, err));
        }

        let request = TransferRequest {
            content_id: media.id,
            url: media.manifest_url.clone(),
            destination: self.inner.config.destination_for(media.id),
        };
        node.set_transfer(request.clone());
        if node.is_cancelled() {
            return Ok(DownloadOutcome::Cancelled);
        }

        let mut events = match self.inner.transfer.start(&request).await {
            Ok(events) => events,
            Err(err) => return Err(self.fail_leaf(&node, err)),
        };
        if node.is_cancelled() {
            // Cancelled while the transfer was starting
            if let Err(err) = self.inner.transfer.cancel(&request).await {
                warn!(content_id = %media.id, error = %err, "failed to stop transfer");
            }
            return Ok(DownloadOutcome::Cancelled);
        }

        node.set_state(DownloadState::Downloading);
        self.emit(&node);

        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = node.cancelled() => return Ok(DownloadOutcome::Cancelled),
            };

            match event {
                Some(TransferEvent::Progress(fraction)) => {
                    if node.set_progress(fraction) {
                        self.emit(&node);
                        self.notify_parent(&node, ChildProgress::Active(node.progress()));
                    } else if node.state().is_terminal() {
                        warn!(content_id = %node.id(), fraction, "dropping late progress");
                    }
                }
                Some(TransferEvent::Completed) => return Ok(self.complete_leaf(&node, &media)),
                Some(TransferEvent::Failed(message)) => {
                    return Err(self.fail_leaf(&node, StreamkeepError::transport(message, false)));
                }
                None if node.is_cancelled() => return Ok(DownloadOutcome::Cancelled),
                None => {
                    let err = StreamkeepError::internal("Transfer ended without completing");
                    return Err(self.fail_leaf(&node, err));
                }
            }
        }
    }

    fn complete_leaf(&self, node: &Arc<DownloadNode>, media: &MediaDescriptor) -> DownloadOutcome {
        if !node.mark_completed() {
            return DownloadOutcome::Cancelled;
        }
        if media.mark_saved() {
            info!(content_id = %media.id, title = %media.title, "download saved");
        }
        self.detach(node);
        self.emit(node);
        self.notify_parent(node, ChildProgress::Completed);
        DownloadOutcome::Completed
    }

    fn fail_leaf(&self, node: &Arc<DownloadNode>, err: StreamkeepError) -> StreamkeepError {
        if !node.mark_failed(err.user_message()) {
            return err;
        }
        warn!(content_id = %node.id(), error = %err, "download failed");
        self.detach(node);
        self.emit(node);
        self.notify_parent(node, ChildProgress::Excluded);
        StreamkeepError::DownloadFailed {
            content_id: node.id(),
            cause: err.to_string(),
        }
    }

    /// Feed a child update into its composite
    fn notify_parent(&self, child: &DownloadNode, update: ChildProgress) {
        let Some(parent_id) = child.parent_id() else {
            return;
        };
        let parent = self.inner.nodes.lock().get(&parent_id).cloned();
        let Some(parent) = parent else {
            return;
        };
        if parent.state().is_terminal() {
            return;
        }

        let aggregate = parent.update_child(child.id(), update);
        self.emit(&parent);

        if aggregate.all_excluded() && parent.mark_cancelled() {
            debug!(content_id = %parent_id, "no children left, cancelling composite");
            self.detach(&parent);
            self.emit(&parent);
        }
    }

    /// Cancel a node; composites take their children with them
    ///
    /// Returns false if nothing was active under `id`.
    pub async fn cancel(&self, id: ContentId) -> Result<bool> {
        let removed = {
            let mut nodes = self.inner.nodes.lock();
            let Some(node) = nodes.remove(&id) else {
                return Ok(false);
            };
            let mut removed = vec![node];
            if removed[0].kind() == NodeKind::Composite {
                let children: Vec<ContentId> = nodes
                    .iter()
                    .filter(|(_, child)| child.parent_id() == Some(id))
                    .map(|(child_id, _)| *child_id)
                    .collect();
                removed.extend(children.iter().filter_map(|child_id| nodes.remove(child_id)));
            }
            removed
        };

        // Nodes that finished in the meantime keep their outcome
        let cancelled: Vec<Arc<DownloadNode>> = removed.into_iter().filter(|node| node.mark_cancelled()).collect();
        if cancelled.is_empty() {
            return Ok(false);
        }

        for node in &cancelled {
            self.emit(node);
            if node.kind() == NodeKind::Leaf {
                self.discard_leaf(node).await;
            }
        }
        info!(content_id = %id, nodes = cancelled.len(), "download cancelled");

        // A leaf cancelled on its own still counts against its composite
        let first = &cancelled[0];
        if first.id() == id && first.kind() == NodeKind::Leaf {
            self.notify_parent(first, ChildProgress::Excluded);
        }
        Ok(true)
    }

    /// Stop the transfer and drop whatever the leaf left behind
    async fn discard_leaf(&self, node: &DownloadNode) {
        if let Some(request) = node.transfer() {
            if let Err(err) = self.inner.transfer.cancel(&request).await {
                warn!(content_id = %node.id(), error = %err, "failed to stop transfer");
            }
        }
        remove_file_if_exists(&self.inner.config.destination_for(node.id())).await;
        if let Err(err) = self.inner.drm.store.remove(node.id()).await {
            warn!(content_id = %node.id(), error = %err, "failed to remove persisted key");
        }
    }

    /// Suspend a running leaf transfer
    pub async fn pause(&self, id: ContentId) -> Result<()> {
        let (node, request) = self.active_transfer(id, DownloadState::Downloading)?;
        self.inner.transfer.pause(&request).await?;
        if node.set_state(DownloadState::Paused) {
            self.emit(&node);
        }
        debug!(content_id = %id, "download paused");
        Ok(())
    }

    pub async fn resume(&self, id: ContentId) -> Result<()> {
        let (node, request) = self.active_transfer(id, DownloadState::Paused)?;
        self.inner.transfer.resume(&request).await?;
        if node.set_state(DownloadState::Downloading) {
            self.emit(&node);
        }
        debug!(content_id = %id, "download resumed");
        Ok(())
    }

    fn active_transfer(&self, id: ContentId, expected: DownloadState) -> Result<(Arc<DownloadNode>, TransferRequest)> {
        let node = self
            .node(id)
            .ok_or_else(|| StreamkeepError::not_found(format!("Active download {}", id)))?;
        if node.kind() != NodeKind::Leaf {
            return Err(StreamkeepError::invalid_state("Only episode downloads can be paused"));
        }
        let state = node.state();
        if state != expected {
            return Err(StreamkeepError::invalid_state(format!(
                "Download {} is {:?}, expected {:?}",
                id, state, expected
            )));
        }
        let request = node
            .transfer()
            .ok_or_else(|| StreamkeepError::invalid_state(format!("Download {} has no transfer", id)))?;
        Ok((node, request))
    }

    /// Delete saved episodes under `id`
    ///
    /// Files and persisted keys go; the catalog entry goes once nothing
    /// under the top-level item is left on disk. Returns the number of
    /// episodes removed.
    pub async fn remove(&self, id: ContentId, kind: DownloadKind) -> Result<usize> {
        if self.is_active(id) {
            return Err(StreamkeepError::invalid_state(format!(
                "Download {} is still running",
                id
            )));
        }

        let (episodes, target) = match kind.container() {
            None => {
                let media = self.inner.metadata.episode(id).await?;
                let target = self.episode_target(&media).await;
                (vec![media], target)
            }
            Some(container_kind) => {
                let container = self.inner.metadata.container(id, container_kind).await?;
                let episodes = self.inner.metadata.episodes_of(&container).await?;
                (episodes, container_target(&container))
            }
        };

        let mut removed = 0;
        for media in episodes.iter().filter(|media| media.is_saved()) {
            if self.is_active(media.id) {
                continue;
            }
            remove_file_if_exists(&self.inner.config.destination_for(media.id)).await;
            self.inner.drm.store.remove(media.id).await?;
            if media.mark_removed() {
                removed += 1;
            }
        }

        match target {
            CatalogTarget::Playlist(playlist_id) => {
                self.inner.catalog.remove(playlist_id).await;
            }
            _ => self.prune_catalog(target.id()).await,
        }

        info!(content_id = %id, removed, "removed downloads");
        Ok(removed)
    }

    /// Drop a catalog entry with no episode left on disk
    async fn prune_catalog(&self, id: ContentId) {
        let Some(entry) = self.inner.catalog.get(id) else {
            return;
        };
        for episode_id in &entry.episode_ids {
            let path = self.inner.config.destination_for(*episode_id);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return;
            }
        }
        self.inner.catalog.remove(id).await;
    }

    async fn record_catalog(&self, target: CatalogTarget) {
        let result = self
            .inner
            .catalog
            .record_created(target.id(), target.kind(), || self.materialize(target))
            .await;
        if let Err(err) = result {
            warn!(content_id = %target.id(), error = %err, "failed to record catalog entry");
        }
    }

    async fn materialize(&self, target: CatalogTarget) -> Result<CatalogMetadata> {
        let metadata = &self.inner.metadata;
        match target {
            CatalogTarget::Series(id) => {
                let series = metadata.series(id).await?;
                let mut episode_ids = Vec::new();
                for season_id in &series.season_ids {
                    episode_ids.extend(metadata.season(*season_id).await?.episode_ids.iter().copied());
                }
                Ok(CatalogMetadata {
                    title: series.title.clone(),
                    episode_ids,
                })
            }
            CatalogTarget::Season(id) => {
                let season = metadata.season(id).await?;
                Ok(CatalogMetadata {
                    title: season.title.clone(),
                    episode_ids: season.episode_ids.clone(),
                })
            }
            CatalogTarget::Playlist(id) => {
                let playlist = metadata.playlist(id).await?;
                Ok(CatalogMetadata {
                    title: playlist.title.clone(),
                    episode_ids: playlist.episode_ids.clone(),
                })
            }
            CatalogTarget::Episode(id) => {
                let media = metadata.episode(id).await?;
                Ok(CatalogMetadata {
                    title: media.title.clone(),
                    episode_ids: vec![id],
                })
            }
        }
    }

    /// Series (or lone season) an episode belongs to
    async fn episode_target(&self, media: &MediaDescriptor) -> CatalogTarget {
        if let Some(parent_id) = media.parent_id {
            if let Ok(season) = self.inner.metadata.season(parent_id).await {
                return match season.series_id {
                    Some(series_id) => CatalogTarget::Series(series_id),
                    None => CatalogTarget::Season(season.id),
                };
            }
        }
        CatalogTarget::Episode(media.id)
    }

    fn node(&self, id: ContentId) -> Option<Arc<DownloadNode>> {
        self.inner.nodes.lock().get(&id).cloned()
    }

    /// Insert a fresh node unless a live one exists
    fn insert_node(
        &self,
        id: ContentId,
        kind: NodeKind,
        parent_id: Option<ContentId>,
        title: &str,
    ) -> Option<Arc<DownloadNode>> {
        let mut nodes = self.inner.nodes.lock();
        if let Some(existing) = nodes.get(&id) {
            if !existing.is_cancelled() {
                return None;
            }
        }
        let node = Arc::new(DownloadNode::new(id, kind, parent_id, title));
        nodes.insert(id, Arc::clone(&node));
        Some(node)
    }

    /// Remove `node` from the active set if it is still the one registered
    fn detach(&self, node: &Arc<DownloadNode>) {
        let mut nodes = self.inner.nodes.lock();
        if nodes.get(&node.id()).is_some_and(|current| Arc::ptr_eq(current, node)) {
            nodes.remove(&node.id());
        }
    }

    fn emit(&self, node: &DownloadNode) {
        // No subscribers is fine
        let _ = self.inner.events.send(node.snapshot());
    }
}

fn container_target(container: &EpisodeContainer) -> CatalogTarget {
    match container {
        EpisodeContainer::Season(season) => match season.series_id {
            Some(series_id) => CatalogTarget::Series(series_id),
            None => CatalogTarget::Season(season.id),
        },
        EpisodeContainer::Playlist(playlist) => CatalogTarget::Playlist(playlist.id),
    }
}

async fn remove_file_if_exists(path: &std::path::Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "failed to remove file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CertificateRequest, DrmTransport, LicenseMaterial, LicenseRequest, LicenseResponse};
    use crate::cache::MetadataClient;
    use crate::crypto::{PersistableKey, PlatformKeyModule};
    use crate::models::{Playlist, Season, Series};
    use crate::storage::MemoryLicenseStore;
    use async_trait::async_trait;
    use std::path::Path;
    use tokio::sync::mpsc;

    /// Every collaborator; nothing here is expected to be called
    struct Unreachable;

    fn unreachable<T>() -> Result<T> {
        Err(StreamkeepError::internal("unexpected call"))
    }

    #[async_trait]
    impl MetadataClient for Unreachable {
        async fn fetch_series(&self, _id: ContentId) -> Result<Series> {
            unreachable()
        }

        async fn fetch_season(&self, _id: ContentId) -> Result<Season> {
            unreachable()
        }

        async fn fetch_episode(&self, _id: ContentId) -> Result<MediaDescriptor> {
            unreachable()
        }

        async fn fetch_playlist(&self, _id: ContentId) -> Result<Playlist> {
            unreachable()
        }
    }

    #[async_trait]
    impl DrmTransport for Unreachable {
        async fn fetch_certificate(&self, _request: &CertificateRequest) -> Result<Vec<u8>> {
            unreachable()
        }

        async fn fetch_license(&self, _request: &LicenseRequest) -> Result<LicenseResponse> {
            unreachable()
        }
    }

    #[async_trait]
    impl PlatformKeyModule for Unreachable {
        async fn make_key_request(&self, _certificate: &[u8], _content_id: &str, _persistable: bool) -> Result<Vec<u8>> {
            unreachable()
        }

        async fn make_persistable_key(&self, _license: &LicenseMaterial) -> Result<PersistableKey> {
            unreachable()
        }

        async fn deliver(&self, _license: LicenseMaterial) -> Result<()> {
            unreachable()
        }

        async fn deliver_persistable(&self, _key: PersistableKey) -> Result<()> {
            unreachable()
        }
    }

    #[async_trait]
    impl TransferClient for Unreachable {
        async fn start(&self, _request: &TransferRequest) -> Result<mpsc::Receiver<TransferEvent>> {
            unreachable()
        }

        async fn pause(&self, _request: &TransferRequest) -> Result<()> {
            unreachable()
        }

        async fn resume(&self, _request: &TransferRequest) -> Result<()> {
            unreachable()
        }

        async fn cancel(&self, _request: &TransferRequest) -> Result<()> {
            unreachable()
        }
    }

    async fn offline_tree(dir: &Path) -> DownloadTree {
        let offline = Arc::new(Unreachable);
        let drm = DrmContext::new(
            offline.clone(),
            offline.clone(),
            Arc::new(MemoryLicenseStore::new()),
            "com.apple.fps",
        );
        let config = DownloadConfig {
            output_directory: dir.join("downloads"),
            file_extension: "mp4".to_string(),
        };
        DownloadTree::new(
            Arc::new(MetadataCache::new(offline.clone())),
            drm,
            offline,
            Arc::new(OfflineCatalog::open(dir.join("catalog.json")).await),
            config,
        )
    }

    fn episodes(ids: &[u64]) -> Vec<Arc<MediaDescriptor>> {
        ids.iter()
            .map(|id| {
                let url = format!("https://cdn.example.com/{}/master.m3u8", id);
                Arc::new(MediaDescriptor::new(ContentId(*id), format!("Episode {}", id), 600.0, url))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_adopted_children_are_registered() {
        let dir = tempfile::tempdir().unwrap();
        let tree = offline_tree(dir.path()).await;

        let parent = tree.insert_node(ContentId(10), NodeKind::Composite, None, "Season 1").unwrap();
        let children = tree.adopt_children(&parent, episodes(&[11, 12]));

        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|(node, _)| node.parent_id() == Some(ContentId(10))));
        assert_eq!(tree.active_ids(), vec![ContentId(10), ContentId(11), ContentId(12)]);
    }

    #[tokio::test]
    async fn test_cancel_before_children_are_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let tree = offline_tree(dir.path()).await;
        let mut events = tree.subscribe();

        // Cancel lands between inserting the composite and its episodes
        let parent = tree.insert_node(ContentId(10), NodeKind::Composite, None, "Season 1").unwrap();
        assert!(tree.cancel(ContentId(10)).await.unwrap());
        let children = tree.adopt_children(&parent, episodes(&[11, 12]));

        assert!(children.is_empty());
        assert!(tree.active_ids().is_empty());

        let mut cancelled = Vec::new();
        while let Ok(update) = events.try_recv() {
            if update.state == DownloadState::Cancelled {
                cancelled.push(update.content_id);
            }
        }
        assert_eq!(cancelled, vec![ContentId(10), ContentId(11), ContentId(12)]);
    }

    #[test]
    fn test_container_target() {
        let season = Season {
            id: ContentId(10),
            series_id: Some(ContentId(1)),
            number: 1,
            title: "Season 1".to_string(),
            episode_ids: vec![ContentId(11)],
        };
        assert_eq!(
            container_target(&EpisodeContainer::Season(season.clone())),
            CatalogTarget::Series(ContentId(1))
        );

        let orphan = Season { series_id: None, ..season };
        let target = container_target(&EpisodeContainer::Season(orphan));
        assert_eq!(target, CatalogTarget::Season(ContentId(10)));
        assert_eq!(target.kind(), CatalogKind::Series);

        let playlist = Playlist {
            id: ContentId(20),
            title: "Favourites".to_string(),
            episode_ids: vec![],
        };
        let target = container_target(&EpisodeContainer::Playlist(playlist));
        assert_eq!(target.id(), ContentId(20));
        assert_eq!(target.kind(), CatalogKind::Playlist);
    }

    #[test]
    fn test_download_kind_container() {
        assert_eq!(DownloadKind::Episode.container(), None);
        assert_eq!(DownloadKind::Season.container(), Some(ContainerKind::Season));
        assert_eq!(DownloadKind::Playlist.container(), Some(ContainerKind::Playlist));
    }
}

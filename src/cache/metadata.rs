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


//! Memoized series/season/episode/playlist lookups
//!
//! The catalog layer supplies a [`MetadataClient`]; every screen and the
//! download pipeline go through [`MetadataCache`] so the same season is never
//! fetched twice concurrently.

use crate::cache::fetch::FetchCache;
use crate::error::Result;
use crate::models::{ContainerKind, ContentId, EpisodeContainer, MediaDescriptor, Playlist, Season, Series};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use std::sync::Arc;

/// Catalog REST client, provided by the host app
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn fetch_series(&self, id: ContentId) -> Result<Series>;
    async fn fetch_season(&self, id: ContentId) -> Result<Season>;
    async fn fetch_episode(&self, id: ContentId) -> Result<MediaDescriptor>;
    async fn fetch_playlist(&self, id: ContentId) -> Result<Playlist>;
}

/// Single-flight caches over a [`MetadataClient`]
pub struct MetadataCache {
    client: Arc<dyn MetadataClient>,
    series: FetchCache<ContentId, Arc<Series>>,
    seasons: FetchCache<ContentId, Arc<Season>>,
    episodes: FetchCache<ContentId, Arc<MediaDescriptor>>,
    playlists: FetchCache<ContentId, Arc<Playlist>>,
}

impl MetadataCache {
    pub fn new(client: Arc<dyn MetadataClient>) -> Self {
        Self {
            client,
            series: FetchCache::new(),
            seasons: FetchCache::new(),
            episodes: FetchCache::new(),
            playlists: FetchCache::new(),
        }
    }

    pub async fn series(&self, id: ContentId) -> Result<Arc<Series>> {
        let client = Arc::clone(&self.client);
        self.series
            .get(id, move || async move { client.fetch_series(id).await.map(Arc::new) })
            .await
    }

    pub async fn season(&self, id: ContentId) -> Result<Arc<Season>> {
        let client = Arc::clone(&self.client);
        self.seasons
            .get(id, move || async move { client.fetch_season(id).await.map(Arc::new) })
            .await
    }

    /// Episode descriptors are shared: the `saved` flag set by a download is
    /// visible to every later lookup in this process.
    pub async fn episode(&self, id: ContentId) -> Result<Arc<MediaDescriptor>> {
        let client = Arc::clone(&self.client);
        self.episodes
            .get(id, move || async move { client.fetch_episode(id).await.map(Arc::new) })
            .await
    }

    pub async fn playlist(&self, id: ContentId) -> Result<Arc<Playlist>> {
        let client = Arc::clone(&self.client);
        self.playlists
            .get(id, move || async move { client.fetch_playlist(id).await.map(Arc::new) })
            .await
    }

    pub async fn container(&self, id: ContentId, kind: ContainerKind) -> Result<EpisodeContainer> {
        match kind {
            ContainerKind::Season => Ok(EpisodeContainer::Season((*self.season(id).await?).clone())),
            ContainerKind::Playlist => Ok(EpisodeContainer::Playlist((*self.playlist(id).await?).clone())),
        }
    }

    /// Descriptors for every episode of a container, in container order
    pub async fn episodes_of(&self, container: &EpisodeContainer) -> Result<Vec<Arc<MediaDescriptor>>> {
        try_join_all(container.episodes().iter().map(|id| self.episode(*id))).await
    }

    /// Drop everything (logout, profile switch)
    pub fn clear(&self) {
        self.series.clear();
        self.seasons.clear();
        self.episodes.clear();
        self.playlists.clear();
    }
}

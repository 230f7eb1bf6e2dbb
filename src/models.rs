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


//! Content model shared by playback, download and catalog code
//!
//! Containers (series, seasons, playlists) own ordered lists of child ids.
//! An episode's `parent_id` is a lookup hint only, never ownership.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Opaque identifier of an episode or a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub u64);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ContentId {
    fn from(id: u64) -> Self {
        ContentId(id)
    }
}

/// External subtitle track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    /// BCP-47 language code ("en", "pt-BR")
    pub language: String,
    /// File format, lowercase extension ("vtt", "srt")
    pub format: String,
    pub url: String,
}

impl Subtitle {
    pub fn new<L: Into<String>, F: Into<String>, U: Into<String>>(language: L, format: F, url: U) -> Self {
        Self {
            language: language.into(),
            format: format.into(),
            url: url.into(),
        }
    }
}

/// Immutable metadata for a playable unit
///
/// Shared behind `Arc` by playback, download and catalog code. The only
/// mutable field is `saved`, owned by the download pipeline.
#[derive(Debug)]
pub struct MediaDescriptor {
    pub id: ContentId,
    pub title: String,
    /// Season or playlist this episode was fetched through
    pub parent_id: Option<ContentId>,
    /// Total duration in seconds
    pub duration_secs: f64,
    pub subtitles: Vec<Subtitle>,
    /// Encrypted-stream manifest URL (real scheme)
    pub manifest_url: String,
    /// DRM endpoint for certificate and license legs
    pub drm_url: Option<String>,
    /// Per-manifest JWT used for DRM auth
    pub drm_token: Option<String>,
    /// Key identifier as it appears on the wire, scheme tag included ("skd://1234")
    pub key_identifier: String,
    saved: AtomicBool,
}

impl MediaDescriptor {
    pub fn new<T: Into<String>, M: Into<String>>(id: ContentId, title: T, duration_secs: f64, manifest_url: M) -> Self {
        Self {
            id,
            title: title.into(),
            parent_id: None,
            duration_secs,
            subtitles: Vec::new(),
            manifest_url: manifest_url.into(),
            drm_url: None,
            drm_token: None,
            key_identifier: format!("skd://{}", id),
            saved: AtomicBool::new(false),
        }
    }

    pub fn with_parent(mut self, parent_id: ContentId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_subtitles(mut self, subtitles: Vec<Subtitle>) -> Self {
        self.subtitles = subtitles;
        self
    }

    pub fn with_drm<U: Into<String>, T: Into<String>>(mut self, drm_url: U, drm_token: T) -> Self {
        self.drm_url = Some(drm_url.into());
        self.drm_token = Some(drm_token.into());
        self
    }

    pub fn with_key_identifier<S: Into<String>>(mut self, key_identifier: S) -> Self {
        self.key_identifier = key_identifier.into();
        self
    }

    /// Descriptor for an item already on disk (restored from a previous run)
    pub fn already_saved(self) -> Self {
        self.saved.store(true, Ordering::Release);
        self
    }

    pub fn is_saved(&self) -> bool {
        self.saved.load(Ordering::Acquire)
    }

    /// Flip `saved` to true; returns false if it was already set
    pub fn mark_saved(&self) -> bool {
        self.saved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear `saved` after the backing file was deleted
    pub fn mark_removed(&self) -> bool {
        self.saved
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub id: ContentId,
    pub title: String,
    pub season_ids: Vec<ContentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: ContentId,
    pub series_id: Option<ContentId>,
    pub number: u32,
    pub title: String,
    pub episode_ids: Vec<ContentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: ContentId,
    pub title: String,
    pub episode_ids: Vec<ContentId>,
}

/// Which kind of container an id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Season,
    Playlist,
}

/// A container that exposes an ordered episode list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeContainer {
    Season(Season),
    Playlist(Playlist),
}

impl EpisodeContainer {
    pub fn id(&self) -> ContentId {
        match self {
            EpisodeContainer::Season(season) => season.id,
            EpisodeContainer::Playlist(playlist) => playlist.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            EpisodeContainer::Season(season) => &season.title,
            EpisodeContainer::Playlist(playlist) => &playlist.title,
        }
    }

    pub fn episodes(&self) -> &[ContentId] {
        match self {
            EpisodeContainer::Season(season) => &season.episode_ids,
            EpisodeContainer::Playlist(playlist) => &playlist.episode_ids,
        }
    }

    /// Series a season belongs to; playlists have no parent
    pub fn parent_id(&self) -> Option<ContentId> {
        match self {
            EpisodeContainer::Season(season) => season.series_id,
            EpisodeContainer::Playlist(_) => None,
        }
    }

    pub fn kind(&self) -> ContainerKind {
        match self {
            EpisodeContainer::Season(_) => ContainerKind::Season,
            EpisodeContainer::Playlist(_) => ContainerKind::Playlist,
        }
    }
}

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


//! Core configuration
//!
//! Every section has sensible defaults; a host app usually only sets paths.
//! `CoreConfig::load` reads a JSON file where any missing field falls back
//! to its default.

use crate::error::{Result, StreamkeepError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP / DRM client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub user_agent: String,
    /// DRM system name carried in the `X-Drm-Info` descriptor
    pub drm_system: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: concat!("streamkeep-core/", env!("CARGO_PKG_VERSION")).to_string(),
            drm_system: "com.apple.fps".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }
}

/// Builder for ClientConfig
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn drm_system<S: Into<String>>(mut self, drm_system: S) -> Self {
        self.config.drm_system = drm_system.into();
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Manifest rewriting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriterConfig {
    /// Scheme handed to the player for every stream URL
    pub asset_scheme: String,
    /// Scheme of synthesized per-language subtitle manifests
    pub subtitle_scheme: String,
    /// Scheme the synthetic URLs map back to
    pub real_scheme: String,
    /// Extension identifying playlists
    pub playlist_extension: String,
    /// Only subtitle tracks in this format are injected
    pub subtitle_format: String,
    /// GROUP-ID shared by the subtitle renditions
    pub subtitle_group: String,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            asset_scheme: "asset".to_string(),
            subtitle_scheme: "subtitle".to_string(),
            real_scheme: "https".to_string(),
            playlist_extension: "m3u8".to_string(),
            subtitle_format: "vtt".to_string(),
            subtitle_group: "subs".to_string(),
        }
    }
}

/// Download configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Output directory for downloaded streams
    pub output_directory: PathBuf,
    /// Extension of downloaded files
    pub file_extension: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("downloads"),
            file_extension: "mp4".to_string(),
        }
    }
}

impl DownloadConfig {
    /// Destination of a leaf download
    pub fn destination_for(&self, id: crate::models::ContentId) -> PathBuf {
        self.output_directory.join(format!("{}.{}", id, self.file_extension))
    }
}

/// Everything the core needs, in one document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub client: ClientConfig,
    pub rewriter: RewriterConfig,
    pub downloads: DownloadConfig,
    /// JSON snapshot of the offline catalog
    pub catalog_path: PathBuf,
    /// SQLite database holding persisted keys
    pub license_db_path: PathBuf,
}

impl CoreConfig {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            StreamkeepError::FileIo(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let mut config: CoreConfig = serde_json::from_str(&json)?;
        if config.catalog_path.as_os_str().is_empty() {
            config.catalog_path = config.downloads.output_directory.join("catalog.json");
        }
        if config.license_db_path.as_os_str().is_empty() {
            config.license_db_path = config.downloads.output_directory.join("licenses.db");
        }
        Ok(config)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

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


//! Resource loader for intercepted player requests
//!
//! | Request                      | Answer                                   |
//! |------------------------------|------------------------------------------|
//! | `asset://…/x.m3u8`           | fetched master playlist with subtitles   |
//! | `subtitle://…/en.m3u8`       | synthesized one-segment VOD playlist     |
//! | any other `asset://…`        | 302 to the `https` URL, no bytes proxied |
//!
//! Subtitle playlists are never redirected: the player cannot address a
//! bare `.vtt` as a segment.

use crate::api::client::ManifestSource;
use crate::config::RewriterConfig;
use crate::error::{Result, StreamkeepError};
use crate::manifest::playlist::{is_master_playlist, rewrite_master, subtitle_playlist};
use crate::manifest::scheme::{RequestKind, SchemeMapper};
use crate::models::MediaDescriptor;
use std::sync::Arc;
use tracing::debug;
use url::Url;

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Answer to an intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderResponse {
    Data { content_type: &'static str, body: Vec<u8> },
    Redirect { status: u16, location: Url },
}

pub struct ManifestRewriter {
    mapper: SchemeMapper,
    source: Arc<dyn ManifestSource>,
}

impl ManifestRewriter {
    pub fn new(config: RewriterConfig, source: Arc<dyn ManifestSource>) -> Self {
        Self {
            mapper: SchemeMapper::new(config),
            source,
        }
    }

    pub fn mapper(&self) -> &SchemeMapper {
        &self.mapper
    }

    /// URL to hand to the player for `media`
    pub fn player_url(&self, media: &MediaDescriptor) -> Result<String> {
        self.mapper.to_asset(&media.manifest_url)
    }

    /// Answer one intercepted request for `media`
    pub async fn handle(&self, request_url: &str, media: &MediaDescriptor) -> Result<LoaderResponse> {
        match self.mapper.classify(request_url)? {
            RequestKind::Playlist => {
                let real = self.mapper.restore(request_url)?;
                let bytes = self.source.fetch(&real).await?;
                let body = self.rewrite(bytes, media)?;
                Ok(LoaderResponse::Data {
                    content_type: PLAYLIST_CONTENT_TYPE,
                    body: body.into_bytes(),
                })
            }
            RequestKind::SubtitlePlaylist => {
                let subtitle_url = self.subtitle_source(request_url, media)?;
                debug!(content_id = %media.id, "synthesizing subtitle playlist");
                Ok(LoaderResponse::Data {
                    content_type: PLAYLIST_CONTENT_TYPE,
                    body: subtitle_playlist(subtitle_url.as_str(), media.duration_secs).into_bytes(),
                })
            }
            RequestKind::Passthrough => Ok(LoaderResponse::Redirect {
                status: 302,
                location: self.mapper.restore(request_url)?,
            }),
        }
    }

    /// Decode and rewrite a fetched playlist
    ///
    /// Media playlists come back unchanged.
    pub fn rewrite(&self, bytes: Vec<u8>, media: &MediaDescriptor) -> Result<String> {
        let master = is_master_playlist(&bytes);
        let text = String::from_utf8(bytes)?;
        if !master {
            return Ok(text);
        }

        let rewritten = rewrite_master(&text, &media.subtitles, &self.mapper)?;
        debug!(
            content_id = %media.id,
            subtitles = media.subtitles.len(),
            "rewrote master playlist"
        );
        Ok(rewritten)
    }

    /// Real subtitle file for a synthetic subtitle playlist URL
    fn subtitle_source(&self, request_url: &str, media: &MediaDescriptor) -> Result<Url> {
        let known = media.subtitles.iter().find(|subtitle| {
            self.mapper
                .to_subtitle_playlist(&subtitle.url)
                .map(|synthetic| synthetic == request_url)
                .unwrap_or(false)
        });

        match known {
            Some(subtitle) => Url::parse(&subtitle.url)
                .map_err(|e| StreamkeepError::InvalidInput(format!("Invalid subtitle URL: {}", e))),
            None => self.mapper.subtitle_source(request_url),
        }
    }
}

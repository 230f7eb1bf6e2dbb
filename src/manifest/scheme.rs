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


//! Synthetic URL schemes
//!
//! The player only sees `asset://` and `subtitle://` URLs so that every
//! request it makes reaches the resource loader. Schemes are swapped on the
//! string: `url::Url::set_scheme` refuses to move between special (`https`)
//! and non-special (`asset`) schemes.

use crate::config::RewriterConfig;
use crate::error::{Result, StreamkeepError};
use url::Url;

/// What the loader should do with an intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Top-level playlist: fetch and rewrite
    Playlist,
    /// Per-language subtitle playlist: synthesize in memory
    SubtitlePlaylist,
    /// Segment or nested resource: redirect to the real URL
    Passthrough,
}

/// Replace `from://` with `to://`; `None` if `url` is not under `from`
pub fn swap_scheme(url: &str, from: &str, to: &str) -> Option<String> {
    let rest = url.strip_prefix(from)?.strip_prefix(':')?;
    Some(format!("{}:{}", to, rest))
}

/// Replace the extension of the URL's last path segment, keeping query and fragment
pub fn swap_extension(url: &str, extension: &str) -> String {
    let split_at = url.find(['?', '#'].as_slice()).unwrap_or(url.len());
    let (path, suffix) = url.split_at(split_at);
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let stem_end = match path[segment_start..].rfind('.') {
        Some(dot) => segment_start + dot,
        None => path.len(),
    };
    format!("{}.{}{}", &path[..stem_end], extension, suffix)
}

/// Extension of the URL's last path segment, lowercase
pub fn path_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#'].as_slice()).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    segment
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Scheme mapping for one rewriter configuration
#[derive(Debug, Clone)]
pub struct SchemeMapper {
    config: RewriterConfig,
}

impl SchemeMapper {
    pub fn new(config: RewriterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewriterConfig {
        &self.config
    }

    /// Real URL as handed to the player
    pub fn to_asset(&self, real_url: &str) -> Result<String> {
        swap_scheme(real_url, &self.config.real_scheme, &self.config.asset_scheme).ok_or_else(|| {
            StreamkeepError::InvalidInput(format!(
                "URL does not use the {} scheme",
                self.config.real_scheme
            ))
        })
    }

    /// Synthetic subtitle playlist URL for a real subtitle file URL
    pub fn to_subtitle_playlist(&self, subtitle_url: &str) -> Result<String> {
        let synthetic = swap_scheme(subtitle_url, &self.config.real_scheme, &self.config.subtitle_scheme)
            .ok_or_else(|| {
                StreamkeepError::InvalidInput(format!(
                    "Subtitle URL does not use the {} scheme",
                    self.config.real_scheme
                ))
            })?;
        Ok(swap_extension(&synthetic, &self.config.playlist_extension))
    }

    /// Subtitle file URL behind a synthetic subtitle playlist URL
    pub fn subtitle_source(&self, subtitle_playlist_url: &str) -> Result<Url> {
        let real = swap_scheme(subtitle_playlist_url, &self.config.subtitle_scheme, &self.config.real_scheme)
            .ok_or_else(|| StreamkeepError::UnsupportedRequest(subtitle_playlist_url.to_string()))?;
        parse(&swap_extension(&real, &self.config.subtitle_format))
    }

    /// Real URL behind any synthetic URL
    pub fn restore(&self, url: &str) -> Result<Url> {
        let real = swap_scheme(url, &self.config.asset_scheme, &self.config.real_scheme)
            .or_else(|| swap_scheme(url, &self.config.subtitle_scheme, &self.config.real_scheme))
            .ok_or_else(|| StreamkeepError::UnsupportedRequest(url.to_string()))?;
        parse(&real)
    }

    /// Classify an intercepted request; errors on schemes we do not own
    pub fn classify(&self, url: &str) -> Result<RequestKind> {
        let scheme = url.split_once(':').map(|(scheme, _)| scheme).unwrap_or_default();

        if scheme == self.config.subtitle_scheme {
            Ok(RequestKind::SubtitlePlaylist)
        } else if scheme == self.config.asset_scheme {
            if path_extension(url).as_deref() == Some(self.config.playlist_extension.as_str()) {
                Ok(RequestKind::Playlist)
            } else {
                Ok(RequestKind::Passthrough)
            }
        } else {
            Err(StreamkeepError::UnsupportedRequest(url.to_string()))
        }
    }
}

fn parse(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| StreamkeepError::InvalidInput(format!("Invalid URL {}: {}", url, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> SchemeMapper {
        SchemeMapper::new(RewriterConfig::default())
    }

    #[test]
    fn test_swap_scheme() {
        assert_eq!(
            swap_scheme("https://cdn.example.com/a.m3u8", "https", "asset").as_deref(),
            Some("asset://cdn.example.com/a.m3u8")
        );
        assert_eq!(swap_scheme("http://cdn.example.com/a.m3u8", "https", "asset"), None);
        assert_eq!(swap_scheme("httpsx://cdn", "https", "asset"), None);
    }

    #[test]
    fn test_swap_extension_keeps_query() {
        assert_eq!(
            swap_extension("subtitle://cdn.example.com/subs/en.vtt?sig=abc", "m3u8"),
            "subtitle://cdn.example.com/subs/en.m3u8?sig=abc"
        );
        assert_eq!(swap_extension("https://cdn.example.com/v1.2/en", "vtt"), "https://cdn.example.com/v1.2/en.vtt");
    }

    #[test]
    fn test_subtitle_playlist_round_trip() {
        let mapper = mapper();
        let synthetic = mapper.to_subtitle_playlist("https://cdn.example.com/subs/en.vtt").unwrap();
        assert_eq!(synthetic, "subtitle://cdn.example.com/subs/en.m3u8");
        assert_eq!(
            mapper.subtitle_source(&synthetic).unwrap().as_str(),
            "https://cdn.example.com/subs/en.vtt"
        );
    }

    #[test]
    fn test_classify() {
        let mapper = mapper();
        assert_eq!(mapper.classify("asset://cdn.example.com/1/master.m3u8").unwrap(), RequestKind::Playlist);
        assert_eq!(mapper.classify("asset://cdn.example.com/1/seg0.ts").unwrap(), RequestKind::Passthrough);
        assert_eq!(
            mapper.classify("subtitle://cdn.example.com/subs/en.m3u8").unwrap(),
            RequestKind::SubtitlePlaylist
        );
        assert!(matches!(
            mapper.classify("https://cdn.example.com/1/master.m3u8"),
            Err(StreamkeepError::UnsupportedRequest(_))
        ));
    }

    #[test]
    fn test_restore() {
        let mapper = mapper();
        let real = mapper.restore("asset://cdn.example.com/1/seg0.ts?t=1").unwrap();
        assert_eq!(real.as_str(), "https://cdn.example.com/1/seg0.ts?t=1");
        assert_eq!(mapper.to_asset(real.as_str()).unwrap(), "asset://cdn.example.com/1/seg0.ts?t=1");
        assert!(mapper.to_asset("ftp://cdn.example.com/x").is_err());
    }
}

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


//! Playlist text transforms
//!
//! Only two kinds of lines are ever touched in a master playlist:
//! - `#EXTM3U`: subtitle renditions are appended right after it
//! - `#EXT-X-STREAM-INF:`: the subtitle group is attached
//!
//! Everything else is copied verbatim.

use crate::config::RewriterConfig;
use crate::error::Result;
use crate::manifest::scheme::SchemeMapper;
use crate::models::Subtitle;
use std::fmt::Write as _;
use tracing::debug;

const HEADER_TAG: &str = "#EXTM3U";
const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF:";
const SUBTITLES_ATTRIBUTE: &str = "SUBTITLES=";
const BYTE_ORDER_MARK: char = '\u{feff}';

/// True for master playlists (the ones with variant streams)
///
/// A playlist m3u8-rs rejects still counts if it has a stream-info line.
/// Media playlists are passed through.
pub fn is_master_playlist(bytes: &[u8]) -> bool {
    if matches!(m3u8_rs::parse_playlist(bytes), Ok((_, m3u8_rs::Playlist::MasterPlaylist(ref master))) if !master.variants.is_empty())
    {
        return true;
    }

    let has_variants = String::from_utf8_lossy(bytes)
        .lines()
        .any(|line| strip_bom(line).starts_with(STREAM_INF_TAG));
    if has_variants {
        debug!("m3u8-rs rejected a playlist with stream-info lines, treating it as master");
    }
    has_variants
}

fn strip_bom(line: &str) -> &str {
    line.trim_start_matches(BYTE_ORDER_MARK)
}

/// Stream-info line pointing at `group`
///
/// An existing `SUBTITLES` value is replaced, otherwise the attribute is
/// appended.
fn with_subtitle_group(line: &str, group: &str) -> String {
    let line = line.trim_end();
    let attribute = format!("{}\"{}\"", SUBTITLES_ATTRIBUTE, group);

    let existing = line.match_indices(SUBTITLES_ATTRIBUTE).map(|(start, _)| start).find(|start| {
        matches!(line[..*start].chars().last(), Some(',') | Some(':'))
    });
    let Some(start) = existing else {
        return format!("{},{}", line, attribute);
    };

    let rest = &line[start + SUBTITLES_ATTRIBUTE.len()..];
    let value_len = match rest.strip_prefix('"') {
        Some(quoted) => quoted.find('"').map_or(rest.len(), |end| end + 2),
        None => rest.find(',').unwrap_or(rest.len()),
    };
    format!("{}{}{}", &line[..start], attribute, &rest[value_len..])
}

/// Subtitle tracks the player can consume, in descriptor order
pub fn supported_subtitles<'a>(subtitles: &'a [Subtitle], config: &RewriterConfig) -> Vec<&'a Subtitle> {
    subtitles
        .iter()
        .filter(|subtitle| subtitle.format.eq_ignore_ascii_case(&config.subtitle_format))
        .collect()
}

/// `#EXT-X-MEDIA` rendition line for one subtitle track
pub fn subtitle_media_line(subtitle: &Subtitle, uri: &str, group: &str) -> String {
    format!(
        "#EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"{}\",NAME=\"{}\",LANGUAGE=\"{}\",AUTOSELECT=YES,DEFAULT=NO,FORCED=NO,URI=\"{}\"",
        group,
        language_display_name(&subtitle.language),
        subtitle.language,
        uri
    )
}

/// Inject subtitle renditions into a master playlist
///
/// Unsupported formats are skipped. With nothing to inject the text is
/// returned unchanged.
pub fn rewrite_master(text: &str, subtitles: &[Subtitle], mapper: &SchemeMapper) -> Result<String> {
    let config = mapper.config();
    let tracks = supported_subtitles(subtitles, config);
    if tracks.is_empty() {
        return Ok(text.to_string());
    }

    let mut media_lines = Vec::with_capacity(tracks.len());
    for subtitle in tracks {
        let uri = mapper.to_subtitle_playlist(&subtitle.url)?;
        media_lines.push(subtitle_media_line(subtitle, &uri, &config.subtitle_group));
    }
    let mut output = String::with_capacity(text.len() + media_lines.iter().map(|l| l.len() + 1).sum::<usize>());
    for line in text.lines() {
        if strip_bom(line).trim_end() == HEADER_TAG {
            output.push_str(line);
            output.push('\n');
            for media_line in &media_lines {
                output.push_str(media_line);
                output.push('\n');
            }
        } else if strip_bom(line).starts_with(STREAM_INF_TAG) {
            output.push_str(&with_subtitle_group(line, &config.subtitle_group));
            output.push('\n');
        } else {
            output.push_str(line);
            output.push('\n');
        }
    }

    if !text.ends_with('\n') {
        output.pop();
    }
    Ok(output)
}

/// Single-segment VOD playlist wrapping a subtitle file
pub fn subtitle_playlist(subtitle_url: &str, duration_secs: f64) -> String {
    let duration = duration_secs.max(0.0);
    let mut playlist = String::new();
    let _ = writeln!(playlist, "#EXTM3U");
    let _ = writeln!(playlist, "#EXT-X-VERSION:3");
    let _ = writeln!(playlist, "#EXT-X-MEDIA-SEQUENCE:1");
    let _ = writeln!(playlist, "#EXT-X-PLAYLIST-TYPE:VOD");
    let _ = writeln!(playlist, "#EXT-X-TARGETDURATION:{}", duration.ceil() as u64);
    let _ = writeln!(playlist, "#EXTINF:{:.3},", duration);
    let _ = writeln!(playlist, "{}", subtitle_url);
    let _ = writeln!(playlist, "#EXT-X-ENDLIST");
    playlist
}

/// Display name of a language in that language, falling back to the code
pub fn language_display_name(code: &str) -> String {
    let lookup = |tag: &str| {
        LANGUAGE_NAMES
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(tag))
            .map(|(_, name)| (*name).to_string())
    };

    lookup(code)
        .or_else(|| code.split(['-', '_'].as_slice()).next().and_then(lookup))
        .unwrap_or_else(|| code.to_string())
}

const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("ar", "العربية"),
    ("da", "Dansk"),
    ("de", "Deutsch"),
    ("en", "English"),
    ("es", "Español"),
    ("fi", "Suomi"),
    ("fr", "Français"),
    ("it", "Italiano"),
    ("ja", "日本語"),
    ("ko", "한국어"),
    ("nb", "Norsk bokmål"),
    ("nl", "Nederlands"),
    ("no", "Norsk"),
    ("pl", "Polski"),
    ("pt", "Português"),
    ("pt-BR", "Português (Brasil)"),
    ("ru", "Русский"),
    ("sv", "Svenska"),
    ("tr", "Türkçe"),
    ("zh", "中文"),
];

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


//! HLS manifest interception
//!
//! - [`scheme`] - synthetic `asset://` / `subtitle://` URLs
//! - [`playlist`] - master playlist rewriting and subtitle playlists
//! - [`rewriter`] - the resource loader tying them together

pub mod playlist;
pub mod rewriter;
pub mod scheme;

pub use rewriter::{LoaderResponse, ManifestRewriter, PLAYLIST_CONTENT_TYPE};
pub use scheme::{RequestKind, SchemeMapper};

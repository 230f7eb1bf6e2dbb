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


//! Download management
//!
//! - [`tree`] - active downloads, composites and their children
//! - [`node`] - per-node state and progress aggregation
//! - [`transfer`] - platform transfer seam and the HTTP implementation
//! - [`progress`] - progress snapshots and byte counters

pub mod node;
pub mod progress;
pub mod transfer;
pub mod tree;

pub use node::{ChildProgress, DownloadNode, NodeKind};
pub use progress::{ByteProgress, DownloadProgress, DownloadState};
pub use transfer::{HttpTransferClient, TransferClient, TransferEvent, TransferRequest};
pub use tree::{DownloadKind, DownloadOutcome, DownloadTree};

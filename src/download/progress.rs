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


//! Download progress tracking and reporting
//!
//! # Progress Information
//! - Content id, tree parent and title for identification
//! - Fraction complete (0.0 - 1.0)
//! - Download state (Idle, Fetching, Downloading, Paused, ...)
//! - Error message for failed leaves

use crate::models::ContentId;
use serde::{Deserialize, Serialize};

/// Lifecycle of a download node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadState {
    /// Created, nothing started yet
    Idle,
    /// Fetching metadata or running the key exchange
    Fetching,
    /// Transfer running
    Downloading,
    /// Transfer suspended by user
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadState {
    /// Completed, Failed or Cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::Failed | DownloadState::Cancelled
        )
    }
}

/// Progress snapshot for one node, broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub content_id: ContentId,

    /// Composite this node belongs to, if any
    pub parent_id: Option<ContentId>,

    /// Title for display
    pub title: String,

    /// Fraction complete (0.0 - 1.0)
    pub progress: f64,

    pub state: DownloadState,

    /// Optional error message if state is Failed
    pub error_message: Option<String>,
}

impl DownloadProgress {
    pub fn percent_complete(&self) -> f64 {
        self.progress * 100.0
    }

    /// Format progress as display string
    pub fn display_string(&self) -> String {
        match self.state {
            DownloadState::Idle => format!("{}: Queued", self.title),
            DownloadState::Fetching => format!("{}: Preparing", self.title),
            DownloadState::Downloading => format!("{}: {:.1}%", self.title, self.percent_complete()),
            DownloadState::Paused => format!("{}: Paused at {:.1}%", self.title, self.percent_complete()),
            DownloadState::Completed => format!("{}: Completed", self.title),
            DownloadState::Failed => format!(
                "{}: Failed - {}",
                self.title,
                self.error_message.as_deref().unwrap_or("Unknown error")
            ),
            DownloadState::Cancelled => format!("{}: Cancelled", self.title),
        }
    }
}

/// Byte counter that turns positions into throttled fractions
///
/// Reports when the fraction moved by at least `step`, and always at the end.
#[derive(Debug, Clone)]
pub struct ByteProgress {
    bytes_downloaded: u64,
    total_bytes: u64,
    last_reported: f64,
    step: f64,
}

impl ByteProgress {
    pub fn new(bytes_downloaded: u64, total_bytes: u64) -> Self {
        Self {
            bytes_downloaded,
            total_bytes,
            last_reported: -1.0,
            step: 0.01,
        }
    }

    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_downloaded as f64 / self.total_bytes as f64).min(1.0)
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Record `bytes` more; returns the fraction if it should be reported
    pub fn advance(&mut self, bytes: u64) -> Option<f64> {
        self.bytes_downloaded += bytes;
        let fraction = self.fraction();
        if self.total_bytes == 0 {
            return None;
        }
        if fraction - self.last_reported >= self.step || (fraction >= 1.0 && self.last_reported < 1.0) {
            self.last_reported = fraction;
            Some(fraction)
        } else {
            None
        }
    }

    /// Format bytes as human-readable string (e.g., "45.2 MB")
    pub fn bytes_string(bytes: u64) -> String {
        let mb = bytes as f64 / 1_000_000.0;
        format!("{:.1} MB", mb)
    }
}

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


//! One node of the download tree
//!
//! A node's own lock guards its state and progress; the tree's map lock is
//! only needed to insert or remove nodes.

use crate::download::progress::{DownloadProgress, DownloadState};
use crate::download::transfer::TransferRequest;
use crate::models::ContentId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// One episode, one transfer
    Leaf,
    /// Season or playlist, progress aggregated from its children
    Composite,
}

/// How a child counts toward its composite's aggregate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChildProgress {
    Active(f64),
    /// Counts as 1.0
    Completed,
    /// Cancelled or failed, left out of the mean
    Excluded,
}

/// Composite aggregate after a child update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    /// Mean over non-excluded children
    pub progress: f64,
    pub total: usize,
    pub completed: usize,
    pub excluded: usize,
}

impl Aggregate {
    /// Every child was cancelled or failed
    pub fn all_excluded(&self) -> bool {
        self.total > 0 && self.excluded == self.total
    }

    /// Every child reached a terminal state
    pub fn is_settled(&self) -> bool {
        self.completed + self.excluded == self.total
    }
}

#[derive(Debug)]
struct NodeInner {
    state: DownloadState,
    progress: f64,
    error: Option<String>,
    children: BTreeMap<ContentId, ChildProgress>,
}

#[derive(Debug)]
pub struct DownloadNode {
    id: ContentId,
    kind: NodeKind,
    parent_id: Option<ContentId>,
    title: String,
    inner: Mutex<NodeInner>,
    transfer: Mutex<Option<TransferRequest>>,
    cancel_tx: watch::Sender<bool>,
}

impl DownloadNode {
    pub fn new<T: Into<String>>(id: ContentId, kind: NodeKind, parent_id: Option<ContentId>, title: T) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            id,
            kind,
            parent_id,
            title: title.into(),
            inner: Mutex::new(NodeInner {
                state: DownloadState::Idle,
                progress: 0.0,
                error: None,
                children: BTreeMap::new(),
            }),
            transfer: Mutex::new(None),
            cancel_tx,
        }
    }

    pub fn id(&self) -> ContentId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn parent_id(&self) -> Option<ContentId> {
        self.parent_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn state(&self) -> DownloadState {
        self.inner.lock().state
    }

    pub fn progress(&self) -> f64 {
        self.inner.lock().progress
    }

    pub fn error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == DownloadState::Cancelled
    }

    /// Move to a non-terminal state; refused once the node is terminal
    pub fn set_state(&self, state: DownloadState) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = state;
        true
    }

    /// Record leaf progress
    ///
    /// Clamped to 0.0..=1.0 and never moves backwards. Updates arriving
    /// after the node became terminal are dropped. Returns true if the
    /// stored value changed.
    pub fn set_progress(&self, progress: f64) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return false;
        }
        let progress = progress.clamp(0.0, 1.0);
        if progress <= inner.progress {
            return false;
        }
        inner.progress = progress;
        true
    }

    /// Returns false if the node already ended another way
    pub fn mark_completed(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = DownloadState::Completed;
        inner.progress = 1.0;
        true
    }

    pub fn mark_failed<S: Into<String>>(&self, message: S) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = DownloadState::Failed;
        inner.error = Some(message.into());
        true
    }

    /// Cancel and wake everything waiting in [`DownloadNode::cancelled`]
    pub fn mark_cancelled(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return false;
            }
            inner.state = DownloadState::Cancelled;
        }
        self.cancel_tx.send_replace(true);
        true
    }

    /// Resolves once the node is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    pub fn set_children<I: IntoIterator<Item = ContentId>>(&self, children: I) {
        let mut inner = self.inner.lock();
        inner.children = children.into_iter().map(|id| (id, ChildProgress::Active(0.0))).collect();
    }

    pub fn child_ids(&self) -> Vec<ContentId> {
        self.inner.lock().children.keys().copied().collect()
    }

    /// Apply one child's update and recompute the mean
    ///
    /// A child that completed or was excluded stays that way.
    pub fn update_child(&self, child: ContentId, update: ChildProgress) -> Aggregate {
        let mut inner = self.inner.lock();
        if let Some(current) = inner.children.get_mut(&child) {
            if matches!(current, ChildProgress::Active(_)) {
                *current = update;
            }
        }

        let mut sum = 0.0;
        let mut completed = 0;
        let mut excluded = 0;
        for progress in inner.children.values() {
            match progress {
                ChildProgress::Active(value) => sum += value,
                ChildProgress::Completed => {
                    sum += 1.0;
                    completed += 1;
                }
                ChildProgress::Excluded => excluded += 1,
            }
        }

        let total = inner.children.len();
        let counted = total - excluded;
        let progress = if counted == 0 { inner.progress } else { sum / counted as f64 };
        if !inner.state.is_terminal() {
            inner.progress = progress;
        }

        Aggregate {
            progress,
            total,
            completed,
            excluded,
        }
    }

    pub fn transfer(&self) -> Option<TransferRequest> {
        self.transfer.lock().clone()
    }

    pub fn set_transfer(&self, request: TransferRequest) {
        *self.transfer.lock() = Some(request);
    }

    pub fn snapshot(&self) -> DownloadProgress {
        let inner = self.inner.lock();
        DownloadProgress {
            content_id: self.id,
            parent_id: self.parent_id,
            title: self.title.clone(),
            progress: inner.progress,
            state: inner.state,
            error_message: inner.error.clone(),
        }
    }
}

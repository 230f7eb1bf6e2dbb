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


//! Single-flight memoizing fetch cache
//!
//! `FetchCache::get` returns the cached value for a key, joins a fetch that is
//! already running for it, or starts a new one. At most one computation per
//! key runs at a time.
//!
//! - Success: the value is kept until [`FetchCache::clear`].
//! - Failure: the entry is evicted and every joined caller receives the same
//!   error wrapped in `CacheComputeFailed`. The next `get` computes again.
//!
//! The map lock covers only the read-modify-write of the entry. The fetch
//! itself runs outside of it, so unrelated keys never wait on each other.

use crate::error::{Result, StreamkeepError};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type SharedResult<V> = std::result::Result<V, Arc<StreamkeepError>>;
type InFlight<V> = Shared<BoxFuture<'static, SharedResult<V>>>;

enum Entry<V> {
    /// Fetch running; `generation` tells a stale completion from the current one
    Pending { generation: u64, fetch: InFlight<V> },
    Ready(V),
}

/// Async memoizing cache with single-flight semantics per key
pub struct FetchCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    generation: AtomicU64,
}

impl<K, V> FetchCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Get the value for `key`, running `compute` only if nothing is cached or in flight
    ///
    /// `compute` is called while the entry is being registered and must only
    /// build the future; the work happens when the future is awaited.
    pub async fn get<F, Fut>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let (generation, fetch) = {
            let mut entries = self.entries.lock();
            match entries.get(&key) {
                Some(Entry::Ready(value)) => return Ok(value.clone()),
                Some(Entry::Pending { generation, fetch }) => {
                    debug!(key = ?key, "joining in-flight fetch");
                    (*generation, fetch.clone())
                }
                None => {
                    debug!(key = ?key, "cache miss, starting fetch");
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let fetch = compute().map(|result| result.map_err(Arc::new)).boxed().shared();
                    entries.insert(
                        key.clone(),
                        Entry::Pending {
                            generation,
                            fetch: fetch.clone(),
                        },
                    );
                    (generation, fetch)
                }
            }
        };

        let result = fetch.await;
        self.settle(&key, generation, &result);
        result.map_err(|cause| StreamkeepError::CacheComputeFailed { cause })
    }

    /// Replace a finished pending entry with its value, or evict it on failure
    ///
    /// Every joined caller runs this; only the first one for the current
    /// generation changes anything. Entries dropped by `clear` stay dropped.
    fn settle(&self, key: &K, generation: u64, result: &SharedResult<V>) {
        let mut entries = self.entries.lock();
        let is_current = matches!(
            entries.get(key),
            Some(Entry::Pending { generation: current, .. }) if *current == generation
        );
        if !is_current {
            return;
        }

        match result {
            Ok(value) => {
                entries.insert(key.clone(), Entry::Ready(value.clone()));
            }
            Err(cause) => {
                debug!(key = ?key, error = %cause, "fetch failed, evicting");
                entries.remove(key);
            }
        }
    }

    /// Drop every entry (logout, profile switch)
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// True if a value is cached or a fetch is running for `key`
    pub fn contains(&self, key: &K) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<K, V> Default for FetchCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

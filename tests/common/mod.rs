//! Fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use streamkeep_core::api::{CertificateRequest, DrmTransport, LicenseMaterial, LicenseRequest, LicenseResponse};
use streamkeep_core::cache::{MetadataCache, MetadataClient};
use streamkeep_core::config::DownloadConfig;
use streamkeep_core::crypto::{DrmContext, PersistableKey, PlatformKeyModule};
use streamkeep_core::download::{DownloadTree, TransferClient, TransferEvent, TransferRequest};
use streamkeep_core::error::{Result, StreamkeepError};
use streamkeep_core::models::{ContentId, MediaDescriptor, Playlist, Season, Series};
use streamkeep_core::storage::{MemoryLicenseStore, OfflineCatalog};
use tokio::sync::mpsc;

/// In-memory catalog REST API
#[derive(Default)]
pub struct FakeMetadata {
    series: Mutex<HashMap<ContentId, Series>>,
    seasons: Mutex<HashMap<ContentId, Season>>,
    playlists: Mutex<HashMap<ContentId, Playlist>>,
    /// id -> (title, parent)
    episodes: Mutex<HashMap<ContentId, (String, Option<ContentId>)>>,
}

impl FakeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_series(&self, id: u64, title: &str, season_ids: &[u64]) {
        self.series.lock().insert(
            ContentId(id),
            Series {
                id: ContentId(id),
                title: title.to_string(),
                season_ids: season_ids.iter().copied().map(ContentId).collect(),
            },
        );
    }

    /// Season plus one episode per id
    pub fn add_season(&self, id: u64, series_id: Option<u64>, episode_ids: &[u64]) {
        self.seasons.lock().insert(
            ContentId(id),
            Season {
                id: ContentId(id),
                series_id: series_id.map(ContentId),
                number: 1,
                title: format!("Season {}", id),
                episode_ids: episode_ids.iter().copied().map(ContentId).collect(),
            },
        );
        for episode_id in episode_ids {
            self.add_episode(*episode_id, Some(id));
        }
    }

    pub fn add_playlist(&self, id: u64, title: &str, episode_ids: &[u64]) {
        self.playlists.lock().insert(
            ContentId(id),
            Playlist {
                id: ContentId(id),
                title: title.to_string(),
                episode_ids: episode_ids.iter().copied().map(ContentId).collect(),
            },
        );
    }

    pub fn add_episode(&self, id: u64, parent_id: Option<u64>) {
        self.episodes
            .lock()
            .insert(ContentId(id), (format!("Episode {}", id), parent_id.map(ContentId)));
    }
}

#[async_trait]
impl MetadataClient for FakeMetadata {
    async fn fetch_series(&self, id: ContentId) -> Result<Series> {
        self.series
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| StreamkeepError::not_found(format!("Series {}", id)))
    }

    async fn fetch_season(&self, id: ContentId) -> Result<Season> {
        self.seasons
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| StreamkeepError::not_found(format!("Season {}", id)))
    }

    async fn fetch_episode(&self, id: ContentId) -> Result<MediaDescriptor> {
        let (title, parent_id) = self
            .episodes
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| StreamkeepError::not_found(format!("Episode {}", id)))?;

        let mut media = MediaDescriptor::new(id, title, 600.0, format!("https://cdn.example.com/{}/master.m3u8", id))
            .with_drm("https://drm.example.com/fps", format!("jwt-{}", id));
        if let Some(parent_id) = parent_id {
            media = media.with_parent(parent_id);
        }
        Ok(media)
    }

    async fn fetch_playlist(&self, id: ContentId) -> Result<Playlist> {
        self.playlists
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| StreamkeepError::not_found(format!("Playlist {}", id)))
    }
}

/// DRM server that grants every license
pub struct FakeDrmServer;

#[async_trait]
impl DrmTransport for FakeDrmServer {
    async fn fetch_certificate(&self, _request: &CertificateRequest) -> Result<Vec<u8>> {
        Ok(b"cert".to_vec())
    }

    async fn fetch_license(&self, _request: &LicenseRequest) -> Result<LicenseResponse> {
        Ok(LicenseResponse {
            response: "bGljZW5zZQ==".to_string(),
            duration: None,
            persistence: Some(true),
        })
    }
}

pub struct FakePlatform;

#[async_trait]
impl PlatformKeyModule for FakePlatform {
    async fn make_key_request(&self, _certificate: &[u8], _content_id: &str, _persistable: bool) -> Result<Vec<u8>> {
        Ok(b"spc".to_vec())
    }

    async fn make_persistable_key(&self, license: &LicenseMaterial) -> Result<PersistableKey> {
        Ok(PersistableKey(license.as_bytes().to_vec()))
    }

    async fn deliver(&self, _license: LicenseMaterial) -> Result<()> {
        Ok(())
    }

    async fn deliver_persistable(&self, _key: PersistableKey) -> Result<()> {
        Ok(())
    }
}

/// Transfer client driven by the test through [`ScriptedTransfer::emit`]
#[derive(Default)]
pub struct ScriptedTransfer {
    senders: Mutex<HashMap<ContentId, mpsc::Sender<TransferEvent>>>,
    pub started: Mutex<Vec<ContentId>>,
    pub paused: Mutex<Vec<ContentId>>,
    pub resumed: Mutex<Vec<ContentId>>,
    pub cancelled: Mutex<Vec<ContentId>>,
}

impl ScriptedTransfer {
    pub fn is_started(&self, id: u64) -> bool {
        self.senders.lock().contains_key(&ContentId(id))
    }

    pub async fn emit(&self, id: u64, event: TransferEvent) {
        let sender = self.senders.lock().get(&ContentId(id)).cloned();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    /// Report full progress, then completion
    pub async fn finish(&self, id: u64) {
        self.emit(id, TransferEvent::Progress(1.0)).await;
        self.emit(id, TransferEvent::Completed).await;
    }
}

#[async_trait]
impl TransferClient for ScriptedTransfer {
    async fn start(&self, request: &TransferRequest) -> Result<mpsc::Receiver<TransferEvent>> {
        let (tx, rx) = mpsc::channel(16);
        self.senders.lock().insert(request.content_id, tx);
        self.started.lock().push(request.content_id);
        Ok(rx)
    }

    async fn pause(&self, request: &TransferRequest) -> Result<()> {
        self.paused.lock().push(request.content_id);
        Ok(())
    }

    async fn resume(&self, request: &TransferRequest) -> Result<()> {
        self.resumed.lock().push(request.content_id);
        Ok(())
    }

    async fn cancel(&self, request: &TransferRequest) -> Result<()> {
        self.senders.lock().remove(&request.content_id);
        self.cancelled.lock().push(request.content_id);
        Ok(())
    }
}

/// Everything a download tree test needs
pub struct Harness {
    pub tree: DownloadTree,
    pub metadata: Arc<MetadataCache>,
    pub transfer: Arc<ScriptedTransfer>,
    pub store: Arc<MemoryLicenseStore>,
    pub catalog: Arc<OfflineCatalog>,
}

impl Harness {
    /// Tree over `client` with its catalog and downloads under `dir`
    pub async fn new(client: Arc<FakeMetadata>, dir: &Path) -> Self {
        let metadata = Arc::new(MetadataCache::new(client));
        let transfer = Arc::new(ScriptedTransfer::default());
        let store = Arc::new(MemoryLicenseStore::new());
        let catalog = Arc::new(OfflineCatalog::open(dir.join("catalog.json")).await);
        let drm = DrmContext::new(Arc::new(FakeDrmServer), Arc::new(FakePlatform), store.clone(), "com.apple.fps");
        let config = DownloadConfig {
            output_directory: dir.join("downloads"),
            file_extension: "mp4".to_string(),
        };

        let tree = DownloadTree::new(metadata.clone(), drm, transfer.clone(), catalog.clone(), config);
        Self {
            tree,
            metadata,
            transfer,
            store,
            catalog,
        }
    }
}

/// Poll until `condition` holds; panics after five seconds
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

//! Offline catalog across process restarts

mod common;

use common::{wait_until, FakeMetadata, Harness};
use std::sync::Arc;
use streamkeep_core::download::{DownloadKind, DownloadOutcome};
use streamkeep_core::models::ContentId;
use streamkeep_core::storage::{CatalogKind, OfflineCatalog};

async fn download_season(harness: &Harness, season: u64, episodes: &[u64]) {
    let handle = harness.tree.spawn_download(ContentId(season), DownloadKind::Season);
    wait_until(|| episodes.iter().all(|id| harness.transfer.is_started(*id))).await;
    for id in episodes {
        harness.transfer.finish(*id).await;
    }
    assert_eq!(handle.await.unwrap().unwrap(), DownloadOutcome::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_catalog_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(FakeMetadata::new());
    metadata.add_series(1, "Show", &[10]);
    metadata.add_season(10, Some(1), &[11, 12]);

    {
        let harness = Harness::new(metadata.clone(), dir.path()).await;
        download_season(&harness, 10, &[11, 12]).await;
        assert!(harness.catalog.contains(ContentId(1)));
    }

    let restarted = OfflineCatalog::open(dir.path().join("catalog.json")).await;
    let entry = restarted.get(ContentId(1)).unwrap();
    assert_eq!(entry.kind, CatalogKind::Series);
    assert_eq!(entry.episode_ids, vec![ContentId(11), ContentId(12)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_seasons_appear_only_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(FakeMetadata::new());
    metadata.add_series(1, "Show", &[10]);
    metadata.add_season(10, Some(1), &[11]);

    let harness = Harness::new(metadata.clone(), dir.path()).await;
    download_season(&harness, 10, &[11]).await;

    // A second season ships upstream while the app is running
    metadata.add_series(1, "Show", &[10, 20]);
    metadata.add_season(20, Some(1), &[21]);
    harness.metadata.clear();

    download_season(&harness, 20, &[21]).await;
    let entry = harness.catalog.get(ContentId(1)).unwrap();
    assert_eq!(entry.episode_ids, vec![ContentId(11)]);

    // Next launch records the series afresh
    let relaunched = Harness::new(metadata, dir.path()).await;
    assert_eq!(relaunched.catalog.get(ContentId(1)).unwrap().episode_ids, vec![ContentId(11)]);
    download_season(&relaunched, 20, &[21]).await;
    assert_eq!(
        relaunched.catalog.get(ContentId(1)).unwrap().episode_ids,
        vec![ContentId(11), ContentId(21)]
    );
}

#[tokio::test]
async fn test_corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    tokio::fs::write(&path, b"[1, 2").await.unwrap();

    let catalog = OfflineCatalog::open(&path).await;
    assert!(catalog.is_empty());
}

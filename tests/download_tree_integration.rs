//! Download tree behaviour with scripted transfers
//!
//! Every collaborator is faked (tests/common); downloads never touch the
//! network.

mod common;

use common::{wait_until, FakeMetadata, Harness};
use std::sync::Arc;
use streamkeep_core::download::{DownloadKind, DownloadOutcome, DownloadState, TransferEvent};
use streamkeep_core::error::StreamkeepError;
use streamkeep_core::models::ContentId;
use streamkeep_core::storage::CatalogKind;

fn approx(actual: Option<f64>, expected: f64) -> bool {
    actual.is_some_and(|value| (value - expected).abs() < 1e-9)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_children_leave_the_composite_mean() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(FakeMetadata::new());
    metadata.add_series(1, "Show", &[10]);
    metadata.add_season(10, Some(1), &[11, 12, 13]);
    let harness = Harness::new(metadata, dir.path()).await;
    let tree = &harness.tree;
    let transfer = &harness.transfer;

    let handle = tree.spawn_download(ContentId(10), DownloadKind::Season);
    wait_until(|| transfer.is_started(11) && transfer.is_started(12) && transfer.is_started(13)).await;

    transfer.emit(11, TransferEvent::Progress(0.2)).await;
    transfer.emit(12, TransferEvent::Progress(0.6)).await;
    transfer.emit(13, TransferEvent::Progress(0.4)).await;
    wait_until(|| approx(tree.progress(ContentId(13)).map(|p| p.progress), 0.4)).await;
    wait_until(|| approx(tree.progress(ContentId(12)).map(|p| p.progress), 0.6)).await;
    wait_until(|| approx(tree.progress(ContentId(11)).map(|p| p.progress), 0.2)).await;

    assert!(tree.cancel(ContentId(11)).await.unwrap());
    assert!(tree.cancel(ContentId(12)).await.unwrap());

    let composite = tree.progress(ContentId(10)).unwrap();
    assert!(approx(Some(composite.progress), 0.4));
    assert_eq!(composite.state, DownloadState::Downloading);
    assert_eq!(tree.active_ids(), vec![ContentId(10), ContentId(13)]);

    // Last child gone: the composite cancels itself
    assert!(tree.cancel(ContentId(13)).await.unwrap());
    assert!(!tree.is_active(ContentId(10)));
    assert!(tree.active_ids().is_empty());

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome, DownloadOutcome::Cancelled);
    assert_eq!(transfer.cancelled.lock().len(), 3);
    assert!(harness.store.is_empty());
    assert!(harness.catalog.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelling_composite_cancels_children() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(FakeMetadata::new());
    metadata.add_season(10, None, &[11, 12]);
    let harness = Harness::new(metadata, dir.path()).await;
    let tree = &harness.tree;

    let handle = tree.spawn_download(ContentId(10), DownloadKind::Season);
    wait_until(|| harness.transfer.is_started(11) && harness.transfer.is_started(12)).await;

    assert!(tree.cancel(ContentId(10)).await.unwrap());
    assert!(tree.active_ids().is_empty());
    assert_eq!(handle.await.unwrap().unwrap(), DownloadOutcome::Cancelled);

    // Nothing left to cancel
    assert!(!tree.cancel(ContentId(10)).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completed_leaf_is_saved_once() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(FakeMetadata::new());
    metadata.add_episode(21, None);
    let harness = Harness::new(metadata, dir.path()).await;
    let tree = &harness.tree;
    let mut events = tree.subscribe();

    let handle = tree.spawn_download(ContentId(21), DownloadKind::Episode);
    wait_until(|| harness.transfer.is_started(21)).await;
    harness.transfer.emit(21, TransferEvent::Progress(0.5)).await;
    harness.transfer.finish(21).await;

    assert_eq!(handle.await.unwrap().unwrap(), DownloadOutcome::Completed);
    assert!(!tree.active_ids().contains(&ContentId(21)));

    let media = harness.metadata.episode(ContentId(21)).await.unwrap();
    assert!(media.is_saved());
    assert_eq!(harness.store.len(), 1);

    let mut completions = 0;
    while let Ok(update) = events.try_recv() {
        if update.content_id == ContentId(21) && update.state == DownloadState::Completed {
            assert_eq!(update.progress, 1.0);
            completions += 1;
        }
    }
    assert_eq!(completions, 1);

    // Lone episode without a season gets its own catalog entry
    let entry = harness.catalog.get(ContentId(21)).unwrap();
    assert_eq!(entry.kind, CatalogKind::Episode);

    let again = tree.start_download(ContentId(21), DownloadKind::Episode).await.unwrap();
    assert_eq!(again, DownloadOutcome::AlreadySaved);
    assert_eq!(harness.transfer.started.lock().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_composite_completion_records_series() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(FakeMetadata::new());
    metadata.add_series(1, "Show", &[10, 20]);
    metadata.add_season(10, Some(1), &[11, 12]);
    metadata.add_season(20, Some(1), &[21]);
    let harness = Harness::new(metadata, dir.path()).await;
    let tree = &harness.tree;

    let handle = tree.spawn_download(ContentId(10), DownloadKind::Season);
    wait_until(|| harness.transfer.is_started(11) && harness.transfer.is_started(12)).await;

    harness.transfer.finish(11).await;
    wait_until(|| !tree.is_active(ContentId(11))).await;
    assert!(approx(tree.progress(ContentId(10)).map(|p| p.progress), 0.5));

    harness.transfer.finish(12).await;
    assert_eq!(handle.await.unwrap().unwrap(), DownloadOutcome::Completed);
    assert!(tree.active_ids().is_empty());

    let entry = harness.catalog.get(ContentId(1)).unwrap();
    assert_eq!(entry.kind, CatalogKind::Series);
    assert_eq!(entry.title, "Show");
    assert_eq!(entry.episode_ids, vec![ContentId(11), ContentId(12), ContentId(21)]);

    // Everything under the season is saved now
    let again = tree.start_download(ContentId(10), DownloadKind::Season).await.unwrap();
    assert_eq!(again, DownloadOutcome::AlreadySaved);

    let removed = tree.remove(ContentId(10), DownloadKind::Season).await.unwrap();
    assert_eq!(removed, 2);
    assert!(harness.store.is_empty());
    assert!(!harness.metadata.episode(ContentId(11)).await.unwrap().is_saved());
    assert!(!harness.catalog.contains(ContentId(1)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_leaf_surfaces_error() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(FakeMetadata::new());
    metadata.add_episode(21, None);
    let harness = Harness::new(metadata, dir.path()).await;
    let tree = &harness.tree;

    let handle = tree.spawn_download(ContentId(21), DownloadKind::Episode);
    wait_until(|| harness.transfer.is_started(21)).await;
    harness
        .transfer
        .emit(21, TransferEvent::Failed("connection reset".to_string()))
        .await;

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, StreamkeepError::DownloadFailed { content_id: ContentId(21), .. }));
    assert!(!tree.is_active(ContentId(21)));
    assert!(!harness.metadata.episode(ContentId(21)).await.unwrap().is_saved());
    assert!(harness.catalog.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_first_saved_episode_records_series() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(FakeMetadata::new());
    metadata.add_series(1, "Show", &[10]);
    metadata.add_season(10, Some(1), &[11, 12, 13]);
    let harness = Harness::new(metadata, dir.path()).await;
    let tree = &harness.tree;

    let handle = tree.spawn_download(ContentId(10), DownloadKind::Season);
    wait_until(|| (11..=13).all(|id| harness.transfer.is_started(id))).await;

    harness.transfer.finish(11).await;
    wait_until(|| harness.catalog.contains(ContentId(1))).await;
    assert!(tree.is_active(ContentId(12)) && tree.is_active(ContentId(13)));
    assert_eq!(harness.catalog.get(ContentId(1)).unwrap().kind, CatalogKind::Series);

    // Abandoning the rest keeps the entry for the saved episode
    assert!(tree.cancel(ContentId(10)).await.unwrap());
    assert_eq!(handle.await.unwrap().unwrap(), DownloadOutcome::Cancelled);
    assert!(harness.catalog.contains(ContentId(1)));
    assert!(harness.metadata.episode(ContentId(11)).await.unwrap().is_saved());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_all_children_failing_fails_composite() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(FakeMetadata::new());
    metadata.add_season(10, None, &[11, 12]);
    let harness = Harness::new(metadata, dir.path()).await;
    let tree = &harness.tree;
    let mut events = tree.subscribe();

    let handle = tree.spawn_download(ContentId(10), DownloadKind::Season);
    wait_until(|| harness.transfer.is_started(11) && harness.transfer.is_started(12)).await;
    harness.transfer.emit(11, TransferEvent::Failed("gone".to_string())).await;
    harness.transfer.emit(12, TransferEvent::Failed("gone".to_string())).await;

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, StreamkeepError::DownloadFailed { content_id: ContentId(10), .. }));
    assert!(tree.active_ids().is_empty());
    assert!(harness.catalog.is_empty());

    // Excluding the last child cancelled the composite before it could fail
    let mut last = None;
    while let Ok(update) = events.try_recv() {
        if update.content_id == ContentId(10) {
            last = Some(update.state);
        }
    }
    assert_eq!(last, Some(DownloadState::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_child_leaves_partial_composite() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(FakeMetadata::new());
    metadata.add_playlist(30, "Mix", &[31, 32]);
    metadata.add_episode(31, None);
    metadata.add_episode(32, None);
    let harness = Harness::new(metadata, dir.path()).await;

    let handle = harness.tree.spawn_download(ContentId(30), DownloadKind::Playlist);
    wait_until(|| harness.transfer.is_started(31) && harness.transfer.is_started(32)).await;
    harness.transfer.emit(31, TransferEvent::Failed("gone".to_string())).await;
    harness.transfer.finish(32).await;

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome, DownloadOutcome::Partial { completed: 1, failed: 1 });

    let entry = harness.catalog.get(ContentId(30)).unwrap();
    assert_eq!(entry.kind, CatalogKind::Playlist);
    assert_eq!(entry.episode_ids, vec![ContentId(31), ContentId(32)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_and_resume_keep_progress() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(FakeMetadata::new());
    metadata.add_episode(21, None);
    let harness = Harness::new(metadata, dir.path()).await;
    let tree = &harness.tree;

    let handle = tree.spawn_download(ContentId(21), DownloadKind::Episode);
    wait_until(|| tree.state(ContentId(21)) == Some(DownloadState::Downloading)).await;
    harness.transfer.emit(21, TransferEvent::Progress(0.3)).await;
    wait_until(|| approx(tree.progress(ContentId(21)).map(|p| p.progress), 0.3)).await;

    tree.pause(ContentId(21)).await.unwrap();
    assert_eq!(tree.state(ContentId(21)), Some(DownloadState::Paused));
    assert!(matches!(
        tree.pause(ContentId(21)).await,
        Err(StreamkeepError::InvalidState(_))
    ));

    tree.resume(ContentId(21)).await.unwrap();
    let progress = tree.progress(ContentId(21)).unwrap();
    assert_eq!(progress.state, DownloadState::Downloading);
    assert!(approx(Some(progress.progress), 0.3));
    assert_eq!(*harness.transfer.paused.lock(), vec![ContentId(21)]);
    assert_eq!(*harness.transfer.resumed.lock(), vec![ContentId(21)]);

    // Key was persisted by the handshake; cancelling a never-completed leaf drops it
    assert_eq!(harness.store.len(), 1);
    tree.cancel(ContentId(21)).await.unwrap();
    assert_eq!(handle.await.unwrap().unwrap(), DownloadOutcome::Cancelled);
    assert!(harness.store.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_rejects_composites_and_unknown_ids() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(FakeMetadata::new());
    metadata.add_season(10, None, &[11]);
    let harness = Harness::new(metadata, dir.path()).await;
    let tree = &harness.tree;

    assert!(matches!(
        tree.pause(ContentId(99)).await,
        Err(StreamkeepError::RecordNotFound(_))
    ));

    let handle = tree.spawn_download(ContentId(10), DownloadKind::Season);
    wait_until(|| harness.transfer.is_started(11)).await;
    assert!(matches!(
        tree.pause(ContentId(10)).await,
        Err(StreamkeepError::InvalidState(_))
    ));

    // Second start for a running id is a no-op
    let duplicate = tree.start_download(ContentId(10), DownloadKind::Season).await.unwrap();
    assert_eq!(duplicate, DownloadOutcome::AlreadyActive);

    tree.cancel(ContentId(10)).await.unwrap();
    assert_eq!(handle.await.unwrap().unwrap(), DownloadOutcome::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remove_refuses_active_downloads() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(FakeMetadata::new());
    metadata.add_episode(21, None);
    let harness = Harness::new(metadata, dir.path()).await;
    let tree = &harness.tree;

    let handle = tree.spawn_download(ContentId(21), DownloadKind::Episode);
    wait_until(|| harness.transfer.is_started(21)).await;
    assert!(matches!(
        tree.remove(ContentId(21), DownloadKind::Episode).await,
        Err(StreamkeepError::InvalidState(_))
    ));

    harness.transfer.finish(21).await;
    assert_eq!(handle.await.unwrap().unwrap(), DownloadOutcome::Completed);

    assert_eq!(tree.remove(ContentId(21), DownloadKind::Episode).await.unwrap(), 1);
    assert!(!harness.catalog.contains(ContentId(21)));
}

mod common;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use common::*;
use treewatch::fs::mock::MockFileSystem;
use treewatch::{FileChangeEvent, FileSystemWatcher, WatchError};

fn dirs(paths: &[&str]) -> BTreeSet<PathBuf> {
    paths.iter().map(PathBuf::from).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watch_registers_a_handle_per_directory() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("/r/a/b/file");
    fs.add_file("/r/top");
    let (watcher, backend, _inject) = mock_native(&fs, &native_config())?;

    watcher.watch_path(Path::new("/r"), RecordingCallback::new().shared())?;

    assert_eq!(backend.watched(), dirs(&["/r", "/r/a", "/r/a/b"]));
    assert_eq!(watcher.watched_dirs(Path::new("/r")), vec![
        PathBuf::from("/r"),
        PathBuf::from("/r/a"),
        PathBuf::from("/r/a/b"),
    ]);
    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn add_modify_remove_in_one_batch_becomes_one_modify() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/r");
    let (watcher, _backend, inject) = mock_native(&fs, &native_config())?;
    let rec = RecordingCallback::new();
    watcher.watch_path(Path::new("/r"), rec.shared())?;

    inject.created_file("/r/x");
    inject.modified("/r/x");
    inject.removed("/r/x");

    assert!(rec.wait_for_batches(1, TEST_TIMEOUT).await);
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(rec.batches(), vec![vec![FileChangeEvent::modified("/r/x")]]);

    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn add_then_remove_in_one_batch_invokes_nothing() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/r");
    let (watcher, _backend, inject) = mock_native(&fs, &native_config())?;
    let rec = RecordingCallback::new();
    watcher.watch_path(Path::new("/r"), rec.shared())?;

    inject.created_file("/r/tmp");
    inject.removed("/r/tmp");
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(rec.batch_count(), 0);

    // The loop is still alive and delivering.
    inject.modified("/r/marker");
    assert!(rec.wait_for_batches(1, TEST_TIMEOUT).await);
    assert_eq!(rec.batches(), vec![vec![FileChangeEvent::modified("/r/marker")]]);

    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn created_directories_are_tracked_and_pruned_on_removal() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/r");
    let (watcher, backend, inject) = mock_native(&fs, &native_config())?;
    let rec = RecordingCallback::new();
    watcher.watch_path(Path::new("/r"), rec.shared())?;

    // mkdir -p: the nested directory exists by the time the event is seen.
    fs.add_dir("/r/new/inner");
    inject.created_dir("/r/new");
    assert!(rec.wait_for_batches(1, TEST_TIMEOUT).await);
    assert!(backend.is_watching("/r/new"));
    assert!(backend.is_watching("/r/new/inner"));

    fs.add_file("/r/new/inner/f");
    inject.created_file("/r/new/inner/f");
    assert!(rec.wait_for_batches(2, TEST_TIMEOUT).await);

    fs.remove("/r/new");
    inject.removed("/r/new");
    assert!(rec.wait_for_batches(3, TEST_TIMEOUT).await);
    assert_eq!(backend.watched(), dirs(&["/r"]));
    assert_eq!(watcher.active_handles(), 1);

    assert_eq!(
        rec.all_events(),
        vec![
            FileChangeEvent::added("/r/new"),
            FileChangeEvent::added("/r/new/inner/f"),
            FileChangeEvent::removed("/r/new"),
        ]
    );
    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn renames_and_exclusions_are_translated() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/r");
    let config = native_config().with_exclude(["**/*.swp"]);
    let (watcher, _backend, inject) = mock_native(&fs, &config)?;
    let rec = RecordingCallback::new();
    watcher.watch_path(Path::new("/r"), rec.shared())?;

    fs.add_file("/r/new");
    inject.created_file("/r/.new.swp");
    inject.renamed("/r/old", "/r/new");

    assert!(rec.wait_for_batches(1, TEST_TIMEOUT).await);
    assert_eq!(
        rec.batches()[0],
        vec![FileChangeEvent::removed("/r/old"), FileChangeEvent::added("/r/new")]
    );
    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queue_errors_are_survived() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/r");
    let (watcher, _backend, inject) = mock_native(&fs, &native_config())?;
    let rec = RecordingCallback::new();
    watcher.watch_path(Path::new("/r"), rec.shared())?;

    inject.error("event queue overflow");
    tokio::time::sleep(QUIET_PERIOD).await;
    inject.created_file("/r/after");

    assert!(rec.wait_for_batches(1, TEST_TIMEOUT).await);
    assert_eq!(rec.all_events(), vec![FileChangeEvent::added("/r/after")]);
    assert!(watcher.is_running());
    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overflow_rescans_watched_roots() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/r");
    let (watcher, backend, inject) = mock_native(&fs, &native_config())?;
    let rec = RecordingCallback::new();
    watcher.watch_path(Path::new("/r"), rec.shared())?;

    // Created while the queue was overflowing; no creation event arrives.
    fs.add_dir("/r/missed/deep");
    inject.overflow();
    assert!(eventually(|| backend.is_watching("/r/missed/deep")).await);
    assert_eq!(backend.watched(), dirs(&["/r", "/r/missed", "/r/missed/deep"]));

    inject.modified("/r/missed/deep/f");
    assert!(rec.wait_for_batches(1, TEST_TIMEOUT).await);
    assert_eq!(rec.all_events(), vec![FileChangeEvent::modified("/r/missed/deep/f")]);
    assert!(watcher.is_running());
    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unwatch_then_rewatch_acquires_handles_afresh() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/r/a");
    let (watcher, backend, inject) = mock_native(&fs, &native_config())?;
    let rec = RecordingCallback::new();

    watcher.watch_path(Path::new("/r"), rec.shared())?;
    watcher.unwatch_path(Path::new("/r"), &rec.shared());
    assert!(backend.watched().is_empty());
    assert!(watcher.watched_roots().is_empty());

    inject.created_file("/r/x");
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(rec.batch_count(), 0);

    fs.add_dir("/r/b");
    watcher.watch_path(Path::new("/r"), rec.shared())?;
    assert_eq!(backend.watched(), dirs(&["/r", "/r/a", "/r/b"]));
    assert_eq!(
        backend.calls().iter().filter(|c| c.as_str() == "watch /r").count(),
        2
    );

    inject.modified("/r/b/f");
    assert!(rec.wait_for_batches(1, TEST_TIMEOUT).await);
    assert_eq!(rec.batches(), vec![vec![FileChangeEvent::modified("/r/b/f")]]);
    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handles_are_released_with_the_last_callback() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/r/a");
    let (watcher, backend, _inject) = mock_native(&fs, &native_config())?;
    let first = RecordingCallback::new();
    let second = RecordingCallback::new();
    let nested = RecordingCallback::new();

    watcher.watch_path(Path::new("/r"), first.shared())?;
    watcher.watch_path(Path::new("/r"), second.shared())?;
    watcher.watch_path(Path::new("/r/a"), nested.shared())?;

    watcher.unwatch_path(Path::new("/r"), &first.shared());
    assert_eq!(backend.watched(), dirs(&["/r", "/r/a"]));

    // /r/a is shared with the nested root and survives.
    watcher.unwatch_path(Path::new("/r"), &second.shared());
    assert_eq!(backend.watched(), dirs(&["/r/a"]));

    watcher.unwatch_path(Path::new("/r/a"), &nested.shared());
    assert!(backend.watched().is_empty());
    assert_eq!(watcher.active_handles(), 0);
    assert_eq!(
        backend.calls().iter().filter(|c| c.starts_with("watch ")).count(),
        2,
        "shared directories are registered with the backend once"
    );

    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn events_reach_every_enclosing_root() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/r/a");
    let (watcher, _backend, inject) = mock_native(&fs, &native_config())?;
    let outer = RecordingCallback::new();
    let inner = RecordingCallback::new();
    watcher.watch_path(Path::new("/r"), outer.shared())?;
    watcher.watch_path(Path::new("/r/a"), inner.shared())?;

    inject.modified("/r/a/f");
    inject.modified("/r/g");

    assert!(outer.wait_until(TEST_TIMEOUT, |e| e.len() >= 2).await);
    assert!(inner.wait_for_batches(1, TEST_TIMEOUT).await);
    assert_eq!(inner.all_events(), vec![FileChangeEvent::modified("/r/a/f")]);
    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_releases_everything_and_rejects_new_roots() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/r/a");
    let (watcher, _backend, inject) = mock_native(&fs, &native_config())?;
    let rec = RecordingCallback::new();
    watcher.watch_path(Path::new("/r"), rec.shared())?;

    watcher.close();
    assert!(watcher.is_closed());
    assert_eq!(watcher.active_handles(), 0);
    assert!(watcher.watched_roots().is_empty());
    assert!(eventually(|| !watcher.is_running()).await);

    inject.created_file("/r/late");
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(rec.batch_count(), 0);

    let err = watcher.watch_path(Path::new("/r"), rec.shared()).unwrap_err();
    assert!(matches!(err, WatchError::Closed));
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn real_notifications_follow_new_subdirectories() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path().canonicalize()?;
    let watcher = treewatch::NativeWatcher::new(&native_config())?;
    let rec = RecordingCallback::new();
    watcher.watch_path(&root, rec.shared())?;

    let sub = root.join("sub");
    std::fs::create_dir(&sub)?;
    assert!(
        rec.wait_until(TEST_TIMEOUT, |events| events.contains(&FileChangeEvent::added(&sub)))
            .await
    );
    assert!(watcher.watched_dirs(&root).contains(&sub));

    let file = sub.join("f.txt");
    std::fs::write(&file, b"content")?;
    assert!(
        rec.wait_until(TEST_TIMEOUT, |events| events.iter().any(|e| e.path == file))
            .await
    );

    watcher.close();
    Ok(())
}

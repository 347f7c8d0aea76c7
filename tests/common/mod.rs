#![allow(dead_code)]

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use treewatch::fs::mock::MockFileSystem;
use treewatch::watch::NativeWatcher;
use treewatch::{PollingWatcher, WatchMode, WatcherConfig};
use treewatch_test_utils::{fake_native_parts, EventInjector, FakeDirBackend};

pub use treewatch_test_utils::{init_tracing, with_timeout, RecordingCallback, TEST_TIMEOUT};

pub type TestResult = Result<(), Box<dyn Error>>;

/// How long to keep watching when asserting that nothing happens.
pub const QUIET_PERIOD: Duration = Duration::from_millis(150);

pub fn polling_config() -> WatcherConfig {
    WatcherConfig::default()
        .with_mode(WatchMode::Polling)
        .with_poll_interval(Duration::from_millis(20))
        .with_name("test-polling")
}

pub fn native_config() -> WatcherConfig {
    WatcherConfig::default()
        .with_mode(WatchMode::Native)
        .with_batch_window(Duration::from_millis(30))
        .with_name("test-native")
}

/// Polling watcher over an in-memory tree.
pub fn mock_polling(fs: &MockFileSystem) -> treewatch::Result<PollingWatcher> {
    PollingWatcher::with_fs(&polling_config(), Arc::new(fs.clone()))
}

/// Native watcher over an in-memory tree, fed by injected events.
pub fn mock_native(
    fs: &MockFileSystem,
    config: &WatcherConfig,
) -> treewatch::Result<(NativeWatcher, FakeDirBackend, EventInjector)> {
    let (backend, injector, rx) = fake_native_parts();
    let watcher = NativeWatcher::from_parts(config, Arc::new(fs.clone()), Box::new(backend.clone()), rx)?;
    Ok((watcher, backend, injector))
}

/// Poll `cond` until it holds or the test timeout passes.
pub async fn eventually<F>(cond: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

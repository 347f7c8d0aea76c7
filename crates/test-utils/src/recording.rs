use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use treewatch::{FileChangeCallback, FileChangeEvent, SharedCallback};

/// How a [`RecordingCallback`] answers after recording a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Ok,
    Fail,
    Panic,
}

/// A callback that:
/// - records every batch it receives
/// - wakes anyone waiting in [`RecordingCallback::wait_for_batches`]
/// - optionally fails or panics afterwards, to exercise fault isolation.
pub struct RecordingCallback {
    batches: Mutex<Vec<Vec<FileChangeEvent>>>,
    delivered: Notify,
    reply: Reply,
}

impl RecordingCallback {
    fn with_reply(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
            delivered: Notify::new(),
            reply,
        })
    }

    pub fn new() -> Arc<Self> {
        Self::with_reply(Reply::Ok)
    }

    /// Records, then returns an error.
    pub fn failing() -> Arc<Self> {
        Self::with_reply(Reply::Fail)
    }

    /// Records, then panics.
    pub fn panicking() -> Arc<Self> {
        Self::with_reply(Reply::Panic)
    }

    /// The same allocation as a `SharedCallback`, so repeated calls yield
    /// handles the watcher treats as one listener.
    pub fn shared(self: &Arc<Self>) -> SharedCallback {
        Arc::clone(self) as SharedCallback
    }

    pub fn batches(&self) -> Vec<Vec<FileChangeEvent>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    /// Every received event, flattened in delivery order.
    pub fn all_events(&self) -> Vec<FileChangeEvent> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    /// Wait until at least `count` batches have arrived or `timeout`
    /// elapses. Returns whether the count was reached.
    pub async fn wait_for_batches(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.delivered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.batch_count() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.batch_count() >= count;
            }
        }
    }

    /// Wait until the recorded events satisfy `pred`, or `timeout` elapses.
    pub async fn wait_until<P>(&self, timeout: Duration, pred: P) -> bool
    where
        P: Fn(&[FileChangeEvent]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.delivered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if pred(self.all_events().as_slice()) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return pred(self.all_events().as_slice());
            }
        }
    }
}

impl FileChangeCallback for RecordingCallback {
    fn handle_changes(&self, changes: &[FileChangeEvent]) -> anyhow::Result<()> {
        self.batches.lock().unwrap().push(changes.to_vec());
        self.delivered.notify_waiters();

        match self.reply {
            Reply::Ok => Ok(()),
            Reply::Fail => Err(anyhow::anyhow!("recording callback told to fail")),
            Reply::Panic => panic!("recording callback told to panic"),
        }
    }
}

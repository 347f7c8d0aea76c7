// src/watch/worker.rs

//! Lifecycle of a watcher's single background task.
//!
//! RUNNING -> STOPPED is the only transition. `stop` may be called from
//! any thread any number of times; only the first call has an effect.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::errors::{Result, WatchError};

/// Receiving side handed to the loop; resolves once a stop is requested.
#[derive(Debug, Clone)]
pub(crate) struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub(crate) fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until a stop has been requested (or the controller is gone).
    pub(crate) async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct WorkerControl {
    stopped: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerControl {
    /// Spawn `make_loop(signal)` on the ambient tokio runtime inside a
    /// span named after the watcher.
    pub(crate) fn spawn<F, Fut>(name: &str, make_loop: F) -> Result<Self>
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|e| WatchError::NoRuntime(e.to_string()))?;
        let (shutdown_tx, rx) = watch::channel(false);

        let span = tracing::info_span!("watcher", name = %name);
        let task = runtime.spawn(make_loop(ShutdownSignal { rx }).instrument(span));

        Ok(Self {
            stopped: AtomicBool::new(false),
            shutdown_tx,
            task,
        })
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Request the loop to exit. Returns true for the call that actually
    /// performed the transition.
    pub(crate) fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shutdown_tx.send_replace(true);
        true
    }

    /// True while the background task has not finished.
    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

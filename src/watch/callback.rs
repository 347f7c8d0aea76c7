// src/watch/callback.rs

//! Listener capability and safe delivery.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::types::FileChangeEvent;

/// Receives batches of changes for a watched root.
///
/// Invoked only from the watcher's background loop, never from the thread
/// that registered it, and never concurrently for the same root. Every
/// batch is non-empty.
///
/// Errors and panics are contained by the watcher: they are logged and
/// delivery continues with the next callback.
pub trait FileChangeCallback: Send + Sync {
    fn handle_changes(&self, changes: &[FileChangeEvent]) -> anyhow::Result<()>;
}

impl<F> FileChangeCallback for F
where
    F: Fn(&[FileChangeEvent]) -> anyhow::Result<()> + Send + Sync,
{
    fn handle_changes(&self, changes: &[FileChangeEvent]) -> anyhow::Result<()> {
        self(changes)
    }
}

/// Shared handle to a callback. Identity is the allocation, so registering
/// the same `Arc` twice is recognised as the same listener.
pub type SharedCallback = Arc<dyn FileChangeCallback>;

fn same_callback(a: &SharedCallback, b: &SharedCallback) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Set of callbacks, keyed by `Arc` identity, in registration order.
#[derive(Clone, Default)]
pub struct CallbackSet {
    callbacks: Vec<SharedCallback>,
}

impl std::fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSet")
            .field("len", &self.callbacks.len())
            .finish()
    }
}

impl CallbackSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `callback` was already present.
    pub fn insert(&mut self, callback: SharedCallback) -> bool {
        if self.contains(&callback) {
            return false;
        }
        self.callbacks.push(callback);
        true
    }

    /// Returns false if `callback` was not present.
    pub fn remove(&mut self, callback: &SharedCallback) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|c| !same_callback(c, callback));
        self.callbacks.len() != before
    }

    pub fn contains(&self, callback: &SharedCallback) -> bool {
        self.callbacks.iter().any(|c| same_callback(c, callback))
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Clone the current members so they can be invoked without holding
    /// the registry lock.
    pub fn to_vec(&self) -> Vec<SharedCallback> {
        self.callbacks.clone()
    }
}

/// Deliver `events` to every callback, isolating failures.
///
/// Does nothing for an empty batch.
pub fn dispatch(root: &Path, callbacks: &[SharedCallback], events: &[FileChangeEvent]) {
    if events.is_empty() {
        return;
    }

    debug!(?root, events = events.len(), callbacks = callbacks.len(), "delivering change batch");

    for callback in callbacks {
        let id = format!("{:p}", Arc::as_ptr(callback));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback.handle_changes(events)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(
                    ?root,
                    callback = %id,
                    events = events.len(),
                    error = %err,
                    "file change callback failed"
                );
            }
            Err(payload) => {
                error!(
                    ?root,
                    callback = %id,
                    events = events.len(),
                    panic = %panic_message(payload.as_ref()),
                    "file change callback panicked"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn counting() -> (SharedCallback, Arc<Mutex<usize>>) {
        let count = Arc::new(Mutex::new(0usize));
        let seen = Arc::clone(&count);
        let cb: SharedCallback = Arc::new(move |_: &[FileChangeEvent]| -> anyhow::Result<()> {
            *seen.lock().unwrap() += 1;
            Ok(())
        });
        (cb, count)
    }

    #[test]
    fn set_is_keyed_by_arc_identity() {
        let (a, _) = counting();
        let (b, _) = counting();
        let mut set = CallbackSet::new();

        assert!(set.insert(Arc::clone(&a)));
        assert!(!set.insert(Arc::clone(&a)));
        assert!(set.insert(Arc::clone(&b)));
        assert_eq!(set.len(), 2);

        assert!(set.remove(&a));
        assert!(!set.remove(&a));
        assert!(set.contains(&b));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn failing_and_panicking_callbacks_do_not_stop_delivery() {
        let failing: SharedCallback = Arc::new(|_: &[FileChangeEvent]| -> anyhow::Result<()> {
            Err(anyhow::anyhow!("listener broke"))
        });
        let panicking: SharedCallback = Arc::new(|_: &[FileChangeEvent]| -> anyhow::Result<()> {
            panic!("listener exploded")
        });
        let (healthy, count) = counting();

        let events = vec![FileChangeEvent::added("/r/a")];
        dispatch(Path::new("/r"), &[failing, panicking, healthy], &events);

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn empty_batches_are_not_delivered() {
        let (cb, count) = counting();
        dispatch(Path::new("/r"), &[cb], &[]);
        assert_eq!(*count.lock().unwrap(), 0);
    }
}

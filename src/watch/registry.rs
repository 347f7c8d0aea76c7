// src/watch/registry.rs

//! Bookkeeping shared by both watcher variants.
//!
//! A [`Registry`] maps each watched root to exactly one [`Registration`],
//! which owns the per-root observation state `S` (a snapshot for the
//! polling watcher, a set of watched directories for the native one) and
//! the set of interested callbacks. It is not itself synchronised: each
//! watcher keeps its registry behind one mutex.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::watch::callback::{CallbackSet, SharedCallback};

/// Result of [`Registry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    /// First interest in this root; its state was seeded.
    NewRoot,
    /// Root already watched; the callback joined its set.
    CallbackAdded,
    /// The same callback was already registered for this root.
    AlreadyPresent,
}

/// Result of [`Registry::unregister`].
#[derive(Debug)]
pub enum Unregistered<S> {
    /// Nothing is registered under this root.
    UnknownRoot,
    /// The root is watched but not by this callback.
    UnknownCallback,
    /// The callback left; others still watch the root.
    CallbackRemoved,
    /// The last callback left; the registration is gone and its state is
    /// handed back for teardown.
    RootReleased(S),
}

/// One watched root.
#[derive(Debug)]
pub struct Registration<S> {
    root: PathBuf,
    state: S,
    callbacks: CallbackSet,
    generation: u64,
}

impl<S> Registration<S> {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Swap in a new state wholesale, returning the previous one.
    pub fn replace_state(&mut self, state: S) -> S {
        std::mem::replace(&mut self.state, state)
    }

    pub fn callbacks(&self) -> &CallbackSet {
        &self.callbacks
    }

    /// Distinguishes this registration from any earlier one for the same
    /// root. Generations are never reused within a registry.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
pub struct Registry<S> {
    entries: HashMap<PathBuf, Registration<S>>,
    next_generation: u64,
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_generation: 1,
        }
    }
}

impl<S> Registry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `callback` to `root`'s set, creating the registration (and
    /// seeding its state with `seed`) if this is the first interest.
    ///
    /// `seed` only runs for a new root.
    pub fn register<F>(&mut self, root: PathBuf, callback: SharedCallback, seed: F) -> Registered
    where
        F: FnOnce(&Path) -> S,
    {
        if let Some(reg) = self.entries.get_mut(&root) {
            return if reg.callbacks.insert(callback) {
                debug!(?root, callbacks = reg.callbacks.len(), "callback added to watched root");
                Registered::CallbackAdded
            } else {
                debug!(?root, "callback already registered for root; ignoring");
                Registered::AlreadyPresent
            };
        }

        let state = seed(&root);
        let mut callbacks = CallbackSet::new();
        callbacks.insert(callback);
        let generation = self.next_generation;
        self.next_generation += 1;

        debug!(?root, generation, "registering new watched root");
        self.entries.insert(
            root.clone(),
            Registration {
                root,
                state,
                callbacks,
                generation,
            },
        );
        Registered::NewRoot
    }

    /// Remove `callback` from `root`. The registration is discarded only
    /// when its last callback leaves.
    pub fn unregister(&mut self, root: &Path, callback: &SharedCallback) -> Unregistered<S> {
        let Some(reg) = self.entries.get_mut(root) else {
            return Unregistered::UnknownRoot;
        };
        if !reg.callbacks.remove(callback) {
            return Unregistered::UnknownCallback;
        }
        if !reg.callbacks.is_empty() {
            debug!(?root, remaining = reg.callbacks.len(), "callback removed from watched root");
            return Unregistered::CallbackRemoved;
        }

        match self.entries.remove(root) {
            Some(reg) => {
                debug!(?root, generation = reg.generation, "last callback gone; releasing root");
                Unregistered::RootReleased(reg.state)
            }
            None => Unregistered::UnknownRoot,
        }
    }

    pub fn contains(&self, root: &Path) -> bool {
        self.entries.contains_key(root)
    }

    pub fn get(&self, root: &Path) -> Option<&Registration<S>> {
        self.entries.get(root)
    }

    pub fn get_mut(&mut self, root: &Path) -> Option<&mut Registration<S>> {
        self.entries.get_mut(root)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Registration<S>> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Registration<S>> {
        self.entries.values_mut()
    }

    /// Consistent view of which roots exist right now, for one loop
    /// iteration to work through.
    pub fn roots(&self) -> Vec<(PathBuf, u64)> {
        self.entries
            .values()
            .map(|reg| (reg.root.clone(), reg.generation))
            .collect()
    }

    /// Drop every registration, handing back their states.
    pub fn drain(&mut self) -> Vec<S> {
        self.entries.drain().map(|(_, reg)| reg.state).collect()
    }

    /// Pick the registered key for a root the caller may have spelled
    /// differently: the canonical form if registered, else the raw form.
    pub fn resolve(&self, canonical: &Path, raw: &Path) -> PathBuf {
        if self.entries.contains_key(canonical) || !self.entries.contains_key(raw) {
            canonical.to_path_buf()
        } else {
            raw.to_path_buf()
        }
    }
}

/// Lock a watcher's shared state, recovering it if a previous holder
/// panicked.
pub(crate) fn lock_state<'a, T>(mutex: &'a Mutex<T>, what: &'static str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(lock = what, "watcher state mutex poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

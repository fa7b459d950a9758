/// Asset request broker - asynchronous requests fulfilled exactly once

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use crate::asset::AssetSource;
use crate::utils::lock;
use crate::{engine_debug, engine_warn};

new_key_type! {
    /// Key of a pending request
    pub struct RequestKey;
}

/// Callback invoked with the asset id and the resolved reference
pub type AssetCallback<R> = Box<dyn FnOnce(&str, R) + Send>;

/// Broker shared between the modules that request and the module that resolves
pub type SharedBroker<R> = Arc<Mutex<AssetBroker<R>>>;

struct PendingRequest<R> {
    id: String,
    callback: AssetCallback<R>,
    /// Set when the asset was cached at request time
    ready: Option<R>,
}

/// Requests whose callbacks are due, taken out of the broker
///
/// Dispatch after releasing the broker lock: callbacks may request again.
pub struct Fulfilled<R> {
    entries: Vec<(String, R, AssetCallback<R>)>,
}

impl<R> Fulfilled<R> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke every callback once, in request order
    pub fn dispatch(self) -> usize {
        let count = self.entries.len();
        for (id, reference, callback) in self.entries {
            callback(&id, reference);
        }
        count
    }
}

/// FIFO of pending asset requests with a resolved-reference cache
pub struct AssetBroker<R: Clone> {
    label: String,
    pending: SlotMap<RequestKey, PendingRequest<R>>,
    order: VecDeque<RequestKey>,
    cache: FxHashMap<String, R>,
}

impl<R: Clone> AssetBroker<R> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pending: SlotMap::with_key(),
            order: VecDeque::new(),
            cache: FxHashMap::default(),
        }
    }

    /// Wrap a new broker for sharing
    pub fn shared(label: impl Into<String>) -> SharedBroker<R> {
        Arc::new(Mutex::new(Self::new(label)))
    }

    /// Queue a request; the callback never runs inside this call
    pub fn request<F>(&mut self, id: impl Into<String>, callback: F) -> RequestKey
    where
        F: FnOnce(&str, R) + Send + 'static,
    {
        let id = id.into();
        let ready = self.cache.get(&id).cloned();
        let key = self.pending.insert(PendingRequest { id, callback: Box::new(callback), ready });
        self.order.push_back(key);
        key
    }

    /// Drop an unfulfilled request without invoking it
    pub fn cancel(&mut self, key: RequestKey) -> bool {
        let removed = self.pending.remove(key).is_some();
        if removed {
            self.order.retain(|k| *k != key);
        }
        removed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: RequestKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn cached(&self, id: &str) -> Option<R> {
        self.cache.get(id).cloned()
    }

    /// Seed the cache directly
    pub fn insert(&mut self, id: impl Into<String>, reference: R) {
        self.cache.insert(id.into(), reference);
    }

    /// Forget a cached reference; later requests load it again
    pub fn evict(&mut self, id: &str) -> Option<R> {
        self.cache.remove(id)
    }

    /// One resolution pass
    ///
    /// Every request that is ready (cached, or loadable by `source` now) leaves
    /// the pending table before its callback is handed back. The source is
    /// asked at most once per id per pass. Requests it cannot satisfy stay
    /// queued in order for the next pass.
    pub fn resolve(&mut self, source: &mut dyn AssetSource<R>) -> Fulfilled<R> {
        let mut entries = Vec::new();
        let mut retained = VecDeque::with_capacity(self.order.len());
        let mut unavailable: Vec<String> = Vec::new();

        while let Some(key) = self.order.pop_front() {
            let Some(request) = self.pending.get_mut(key) else {
                continue;
            };

            let reference = match request.ready.take() {
                Some(reference) => Some(reference),
                None => match self.cache.get(&request.id) {
                    Some(reference) => Some(reference.clone()),
                    None if unavailable.contains(&request.id) => None,
                    None => match source.load(&request.id) {
                        Ok(Some(reference)) => {
                            self.cache.insert(request.id.clone(), reference.clone());
                            Some(reference)
                        }
                        Ok(None) => {
                            unavailable.push(request.id.clone());
                            None
                        }
                        Err(err) => {
                            engine_warn!("loom::AssetBroker", "[{}] loading '{}' failed: {}", self.label, request.id, err);
                            unavailable.push(request.id.clone());
                            None
                        }
                    },
                },
            };

            match reference {
                Some(reference) => {
                    if let Some(request) = self.pending.remove(key) {
                        entries.push((request.id, reference, request.callback));
                    }
                }
                None => retained.push_back(key),
            }
        }

        self.order = retained;
        if !entries.is_empty() {
            engine_debug!(
                "loom::AssetBroker",
                "[{}] fulfilled {} request(s), {} pending",
                self.label, entries.len(), self.pending.len()
            );
        }
        Fulfilled { entries }
    }

    /// Resolve a shared broker and dispatch with the lock released
    pub fn resolve_shared(broker: &SharedBroker<R>, source: &mut dyn AssetSource<R>) -> usize {
        let fulfilled = lock(broker).resolve(source);
        fulfilled.dispatch()
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;

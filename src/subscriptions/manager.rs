//! Observer registries and the notification pass.
//!
//! Registry locks are never held while a selector or callback runs. A pass
//! reads its source and takes a numbered snapshot of the observers under the
//! lock, derives with the lock released, then writes results back. A result
//! is applied only if no later pass has already updated that observer.

use crate::equality::deep_equal_opt;
use parking_lot::Mutex;
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{Callback, Derive, ObserverId};

/// Internal observer state.
struct Observer {
    id: ObserverId,
    derive: Derive,
    callback: Callback,
    /// Most recently delivered derived value.
    last: Option<Value>,
    /// Pass that produced `last`.
    seen: u64,
}

/// Observers of a single source, kept in registration order.
#[derive(Default)]
struct ObserverList {
    observers: Vec<Observer>,
}

impl ObserverList {
    fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| o.id != id);
        self.observers.len() != before
    }

    fn snapshot(&self) -> Vec<(ObserverId, Derive)> {
        self.observers
            .iter()
            .map(|o| (o.id, o.derive.clone()))
            .collect()
    }

    /// Write back values derived by pass `epoch`, queueing callbacks whose
    /// value changed since the last delivery.
    fn apply(&mut self, epoch: u64, derived: Vec<Derived>, fired: &mut Vec<Callback>) {
        let mut cursor = 0;
        for (id, next) in derived {
            // Snapshot order is a subsequence of the current order.
            let remaining = &self.observers[cursor..];
            let Some(offset) = remaining.iter().position(|o| o.id == id) else {
                continue;
            };
            cursor += offset;
            let observer = &mut self.observers[cursor];
            if observer.seen >= epoch {
                continue;
            }
            observer.seen = epoch;
            if !deep_equal_opt(next.as_ref(), observer.last.as_ref()) {
                observer.last = next;
                fired.push(observer.callback.clone());
            }
        }
    }

    fn len(&self) -> usize {
        self.observers.len()
    }

    fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

type Derived = (ObserverId, Option<Value>);

/// Evaluate a snapshot against `source`. Runs with no lock held.
fn derive_all(snapshot: Vec<(ObserverId, Derive)>, source: Option<&Value>) -> Vec<Derived> {
    snapshot
        .into_iter()
        .map(|(id, derive)| (id, derive(source)))
        .collect()
}

fn source_ref<V: Borrow<Value>>(source: &Option<V>) -> Option<&Value> {
    source.as_ref().map(|v| <V as Borrow<Value>>::borrow(v))
}

/// Run queued callbacks. Called with no registry lock held so callbacks may
/// read, dispatch, or unsubscribe.
fn fire(callbacks: Vec<Callback>) -> usize {
    let count = callbacks.len();
    for callback in callbacks {
        callback();
    }
    count
}

struct Registry {
    list: ObserverList,
    epoch: u64,
}

/// Observers of one engine-scoped source (whole state, size, or key list).
///
/// Sources are passed as `read` closures that are called under the registry
/// lock, so every pass sees commits in the order it was numbered.
pub struct SubscriptionManager {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                list: ObserverList::default(),
                epoch: 0,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register an observer. Its cached value is derived from the source as
    /// of registration, retried if a pass runs while it is being derived.
    pub fn subscribe<R, V>(&self, derive: Derive, callback: Callback, read: R) -> ObserverId
    where
        R: Fn() -> Option<V>,
        V: Borrow<Value>,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        loop {
            let (epoch, source) = {
                let registry = self.registry.lock();
                (registry.epoch, read())
            };
            let last = derive(source_ref(&source));

            let mut registry = self.registry.lock();
            if registry.epoch == epoch {
                registry.list.observers.push(Observer {
                    id,
                    derive,
                    callback,
                    last,
                    seen: epoch,
                });
                return id;
            }
        }
    }

    /// Remove an observer. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.registry.lock().list.remove(id)
    }

    /// Run the notification pass against the source returned by `read`.
    /// Returns how many callbacks fired.
    pub fn notify<R, V>(&self, read: R) -> usize
    where
        R: FnOnce() -> Option<V>,
        V: Borrow<Value>,
    {
        let (epoch, source, snapshot) = {
            let mut registry = self.registry.lock();
            registry.epoch += 1;
            (registry.epoch, read(), registry.list.snapshot())
        };
        let derived = derive_all(snapshot, source_ref(&source));

        let mut fired = Vec::new();
        self.registry.lock().list.apply(epoch, derived, &mut fired);
        fire(fired)
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.registry.lock().list.len()
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

struct KeyedRegistry {
    buckets: HashMap<String, ObserverList>,
    epoch: u64,
}

/// Observers bucketed by collection key.
///
/// Empty buckets are removed as soon as their last observer unsubscribes.
pub struct KeyedSubscriptionManager {
    registry: Mutex<KeyedRegistry>,
    next_id: AtomicU64,
}

impl KeyedSubscriptionManager {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(KeyedRegistry {
                buckets: HashMap::new(),
                epoch: 0,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<R, V>(
        &self,
        key: &str,
        derive: Derive,
        callback: Callback,
        read: R,
    ) -> ObserverId
    where
        R: Fn() -> Option<V>,
        V: Borrow<Value>,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        loop {
            let (epoch, source) = {
                let registry = self.registry.lock();
                (registry.epoch, read())
            };
            let last = derive(source_ref(&source));

            let mut registry = self.registry.lock();
            if registry.epoch == epoch {
                registry
                    .buckets
                    .entry(key.to_string())
                    .or_default()
                    .observers
                    .push(Observer {
                        id,
                        derive,
                        callback,
                        last,
                        seen: epoch,
                    });
                return id;
            }
        }
    }

    pub fn unsubscribe(&self, key: &str, id: ObserverId) -> bool {
        let mut registry = self.registry.lock();
        let Some(bucket) = registry.buckets.get_mut(key) else {
            return false;
        };
        let removed = bucket.remove(id);
        if bucket.is_empty() {
            registry.buckets.remove(key);
        }
        removed
    }

    /// Notification pass for a single key.
    pub fn notify_key<R, V>(&self, key: &str, read: R) -> usize
    where
        R: FnOnce() -> Option<V>,
        V: Borrow<Value>,
    {
        let (epoch, source, snapshot) = {
            let mut registry = self.registry.lock();
            registry.epoch += 1;
            let Some(bucket) = registry.buckets.get(key) else {
                return 0;
            };
            let snapshot = bucket.snapshot();
            (registry.epoch, read(), snapshot)
        };
        let derived = derive_all(snapshot, source_ref(&source));

        let mut fired = Vec::new();
        if let Some(bucket) = self.registry.lock().buckets.get_mut(key) {
            bucket.apply(epoch, derived, &mut fired);
        }
        fire(fired)
    }

    /// Notification pass over every bucket, resolving each key's source via `lookup`.
    pub fn notify_all<F>(&self, lookup: F) -> usize
    where
        F: Fn(&str) -> Option<Value>,
    {
        let (epoch, pending) = {
            let mut registry = self.registry.lock();
            registry.epoch += 1;
            let pending: Vec<_> = registry
                .buckets
                .iter()
                .map(|(key, bucket)| (key.clone(), lookup(key.as_str()), bucket.snapshot()))
                .collect();
            (registry.epoch, pending)
        };
        let derived: Vec<_> = pending
            .into_iter()
            .map(|(key, source, snapshot)| (key, derive_all(snapshot, source.as_ref())))
            .collect();

        let mut fired = Vec::new();
        {
            let mut registry = self.registry.lock();
            for (key, derived) in derived {
                if let Some(bucket) = registry.buckets.get_mut(&key) {
                    bucket.apply(epoch, derived, &mut fired);
                }
            }
        }
        fire(fired)
    }

    /// Total observers across all keys.
    pub fn subscription_count(&self) -> usize {
        self.registry
            .lock()
            .buckets
            .values()
            .map(ObserverList::len)
            .sum()
    }

    /// Number of keys with at least one observer.
    pub fn bucket_count(&self) -> usize {
        self.registry.lock().buckets.len()
    }
}

impl Default for KeyedSubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

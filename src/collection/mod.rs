//! Keyed collection: a map of independently observable records.
//!
//! Three observer scopes exist side by side:
//!
//! 1. Per-key observers, re-evaluated when that entry is set, dispatched,
//!    removed, cleared, or reset
//! 2. Size observers, re-evaluated when membership changes
//! 3. Key-list observers, same trigger, compared order-sensitively
//!
//! Dispatching an action against one entry never touches size or key-list
//! observers.

mod view;

pub use view::KeyView;

use crate::binding::Binding;
use crate::definition::{Action, ActionTable, CollectionDefinition, Entries, SelectorTable};
use crate::devtools::DevtoolsBridge;
use crate::equality::deep_equal;
use crate::error::{Result, StoreError};
use crate::subscriptions::{
    derive_from, identity, Callback, Derive, KeyedSubscriptionManager, Subscription,
    SubscriptionManager,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

struct CollectionInner {
    name: String,
    entries: RwLock<Entries>,
    initial: Entries,
    actions: ActionTable,
    selectors: SelectorTable,
    key_observers: KeyedSubscriptionManager,
    size_observers: SubscriptionManager,
    keys_observers: SubscriptionManager,
    devtools: Option<DevtoolsBridge>,
}

/// A reactive keyed collection.
///
/// Cloning a `Collection` creates a new handle to the **same** entries.
/// Concurrent dispatches against one key follow the same last-commit-wins
/// rule as [`Store`](crate::Store).
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

impl Collection {
    /// Build a collection from its definition, populated with its initial entries.
    pub fn new(definition: CollectionDefinition) -> Result<Self> {
        let CollectionDefinition {
            initial,
            actions,
            selectors,
            config,
        } = definition;

        let name = config.name.clone().unwrap_or_else(|| "collection".to_string());
        let actions = ActionTable::build(actions)?;
        let selectors = SelectorTable::build(selectors)?;
        let devtools = DevtoolsBridge::connect(&config, &name, &Value::Object(initial.clone()));
        tracing::debug!(
            collection = %name,
            entries = initial.len(),
            devtools = devtools.is_some(),
            "created collection"
        );

        Ok(Self {
            inner: Arc::new(CollectionInner {
                name,
                entries: RwLock::new(initial.clone()),
                initial,
                actions,
                selectors,
                key_observers: KeyedSubscriptionManager::new(),
                size_observers: SubscriptionManager::new(),
                keys_observers: SubscriptionManager::new(),
                devtools,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Per-key façade bound to `id`.
    pub fn key(&self, id: impl Into<String>) -> KeyView {
        KeyView::new(self.clone(), id.into())
    }

    // --- Reads ---

    /// The record at `key`, if present.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.entries.read().get(key).cloned()
    }

    /// Apply `selector` to the record at `key`. The selector is not invoked
    /// for a missing key.
    pub fn get_with<T>(&self, key: &str, selector: impl FnOnce(&Value) -> T) -> Option<T> {
        self.get(key).map(|record| selector(&record))
    }

    /// Evaluate a registered selector against the record at `key`.
    ///
    /// Fails with `SelectorNotFound` for an unregistered name; yields `None`
    /// for a missing key.
    pub fn select(&self, key: &str, name: &str, payload: Value) -> Result<Option<Value>> {
        let selector = self.inner.selectors.get(name)?;
        Ok(self.get_with(key, |record| selector.apply(record, &payload)))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.entries.read().contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.read().keys().cloned().collect()
    }

    /// Snapshot of every entry.
    pub fn entries(&self) -> Entries {
        self.inner.entries.read().clone()
    }

    // --- Membership ---

    /// Insert or overwrite the record at `key`. Returns the previous record.
    ///
    /// Size and key-list observers are re-evaluated only for a new key.
    pub fn set(&self, key: impl Into<String>, record: Value) -> Option<Value> {
        let key = key.into();
        let previous = self.inner.entries.write().insert(key.clone(), record);

        self.send_devtools(&format!("set/{key}"));
        self.notify_key(&key);
        if previous.is_none() {
            self.notify_membership();
        }
        previous
    }

    /// Alias for [`set`](Self::set).
    pub fn insert(&self, key: impl Into<String>, record: Value) -> Option<Value> {
        self.set(key, record)
    }

    /// Remove the record at `key`. Returns it if it was present.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.inner.entries.write().shift_remove(key);
        if removed.is_some() {
            self.send_devtools(&format!("remove/{key}"));
            self.notify_key(key);
            self.notify_membership();
        }
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let previous = std::mem::take(&mut *self.inner.entries.write());
        if previous.is_empty() {
            return;
        }
        self.send_devtools("clear");
        self.notify_everything();
    }

    /// Restore the entries given at construction (empty if none were given).
    pub fn reset(&self) {
        self.reset_with(true);
    }

    fn reset_with(&self, forward: bool) {
        let initial = self.inner.initial.clone();
        let previous = std::mem::replace(&mut *self.inner.entries.write(), initial);
        tracing::debug!(collection = %self.inner.name, "reset");

        if forward {
            self.send_devtools("reset");
        }
        if !entries_equal(&previous, &self.inner.initial) {
            self.notify_everything();
        }
    }

    // --- Observation ---

    /// Observe the whole record at `key`; absence is observed as `None`.
    pub fn subscribe_key<C>(&self, key: &str, callback: C) -> Subscription
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.register_key(key, identity(), Arc::new(callback))
    }

    /// Observe a derived slice of the record at `key`.
    pub fn observe<S, C>(&self, key: &str, selector: S, callback: C) -> Subscription
    where
        S: Fn(&Value) -> Value + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.register_key(key, derive_from(selector), Arc::new(callback))
    }

    /// Observe the number of entries.
    pub fn observe_size<C>(&self, callback: C) -> Subscription
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.register_size(Arc::new(callback))
    }

    /// Observe the ordered key list.
    pub fn observe_keys<C>(&self, callback: C) -> Subscription
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.register_keys(Arc::new(callback))
    }

    /// Subscribe/snapshot pair for `selector` over the record at `key`.
    pub fn binding<S>(&self, key: &str, selector: S) -> Binding
    where
        S: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let selector = Arc::new(selector);
        let key = key.to_string();
        let subscribe_collection = self.clone();
        let subscribe_selector = Arc::clone(&selector);
        let subscribe_key = key.clone();
        let snapshot_collection = self.clone();

        Binding::new(
            move |callback| {
                let selector = Arc::clone(&subscribe_selector);
                subscribe_collection.register_key(
                    &subscribe_key,
                    derive_from(move |record| selector(record)),
                    callback,
                )
            },
            move || snapshot_collection.get_with(&key, |record| selector(record)),
        )
    }

    /// Subscribe/snapshot pair for the entry count.
    pub fn size_binding(&self) -> Binding {
        let subscribe_collection = self.clone();
        let snapshot_collection = self.clone();
        Binding::new(
            move |callback| subscribe_collection.register_size(callback),
            move || Some(Value::from(snapshot_collection.size())),
        )
    }

    /// Subscribe/snapshot pair for the ordered key list.
    pub fn keys_binding(&self) -> Binding {
        let subscribe_collection = self.clone();
        let snapshot_collection = self.clone();
        Binding::new(
            move |callback| subscribe_collection.register_keys(callback),
            move || Some(snapshot_collection.key_list()),
        )
    }

    /// Observers across all scopes.
    pub fn subscription_count(&self) -> usize {
        self.inner.key_observers.subscription_count()
            + self.inner.size_observers.subscription_count()
            + self.inner.keys_observers.subscription_count()
    }

    /// Keys with at least one per-key observer.
    pub fn bucket_count(&self) -> usize {
        self.inner.key_observers.bucket_count()
    }

    fn register_key(&self, key: &str, derive: Derive, callback: Callback) -> Subscription {
        let id = self
            .inner
            .key_observers
            .subscribe(key, derive, callback, || self.get(key));
        let weak = Arc::downgrade(&self.inner);
        let key = key.to_string();
        Subscription::new(id, move || {
            if let Some(inner) = weak.upgrade() {
                inner.key_observers.unsubscribe(&key, id);
            }
        })
    }

    fn register_size(&self, callback: Callback) -> Subscription {
        let id = self
            .inner
            .size_observers
            .subscribe(identity(), callback, || Some(self.size_value()));
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(inner) = weak.upgrade() {
                inner.size_observers.unsubscribe(id);
            }
        })
    }

    fn register_keys(&self, callback: Callback) -> Subscription {
        let id = self
            .inner
            .keys_observers
            .subscribe(identity(), callback, || Some(self.key_list()));
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(inner) = weak.upgrade() {
                inner.keys_observers.unsubscribe(id);
            }
        })
    }

    // --- Dispatch ---

    /// Run a synchronous action against the record at `key`.
    ///
    /// Fails with `ActionNotFound`, `KeyNotFound`, or `AsyncAction` before
    /// anything runs. Only that key's observers are notified.
    pub fn dispatch(&self, key: &str, action: &str, payload: Value) -> Result<Value> {
        self.dispatch_with(key, action, payload, true)
    }

    /// Like [`dispatch`](Self::dispatch) but without the notification pass.
    pub fn dispatch_silent(&self, key: &str, action: &str, payload: Value) -> Result<Value> {
        self.dispatch_with(key, action, payload, false)
    }

    /// Run a synchronous or asynchronous action against the record at `key`.
    ///
    /// # Errors
    ///
    /// Besides the lookup and action errors of [`dispatch`](Self::dispatch),
    /// returns `KeyNotFound` if the entry is removed before the action
    /// resolves. Nothing is committed in that case and the action's output
    /// is discarded.
    pub async fn dispatch_async(&self, key: &str, action: &str, payload: Value) -> Result<Value> {
        self.dispatch_async_with(key, action, payload, true).await
    }

    /// Like [`dispatch_async`](Self::dispatch_async) but without the notification pass.
    pub async fn dispatch_async_silent(
        &self,
        key: &str,
        action: &str,
        payload: Value,
    ) -> Result<Value> {
        self.dispatch_async_with(key, action, payload, false).await
    }

    fn dispatch_with(&self, key: &str, name: &str, payload: Value, notify: bool) -> Result<Value> {
        let body = match self.inner.actions.get(name)? {
            Action::Sync(body) => body,
            Action::Future(_) => return Err(StoreError::AsyncAction(name.to_string())),
        };

        let mut draft = self.draft(key)?;
        let output = body(&mut draft, &payload)?;
        self.commit_entry(key, name, draft, notify)?;
        Ok(output)
    }

    async fn dispatch_async_with(
        &self,
        key: &str,
        name: &str,
        payload: Value,
        notify: bool,
    ) -> Result<Value> {
        let action = self.inner.actions.get(name)?.clone();
        let mut draft = self.draft(key)?;

        let output = match action {
            Action::Sync(body) => body(&mut draft, &payload)?,
            Action::Future(body) => {
                let (record, output) = body(draft, payload).await?;
                draft = record;
                output
            }
        };

        self.commit_entry(key, name, draft, notify)?;
        Ok(output)
    }

    fn draft(&self, key: &str) -> Result<Value> {
        self.get(key)
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    /// Fails with `KeyNotFound` if the entry was removed after the draft was taken.
    fn commit_entry(&self, key: &str, action: &str, record: Value, notify: bool) -> Result<()> {
        {
            let mut entries = self.inner.entries.write();
            let Some(slot) = entries.get_mut(key) else {
                tracing::debug!(
                    collection = %self.inner.name,
                    key,
                    action,
                    "entry removed before commit"
                );
                return Err(StoreError::KeyNotFound(key.to_string()));
            };
            *slot = record;
        }
        tracing::trace!(collection = %self.inner.name, key, action, notify, "committed");

        self.send_devtools(&format!("{key}/{action}"));
        if notify {
            self.notify_key(key);
        }
        Ok(())
    }

    // --- Devtools ---

    /// Apply control messages queued by the debugging tool.
    ///
    /// Jump snapshots must be JSON objects of entries; anything else is
    /// logged and skipped.
    pub fn process_devtools_commands(&self) -> usize {
        let Some(bridge) = &self.inner.devtools else {
            return 0;
        };
        bridge.process(
            |snapshot| match snapshot {
                Value::Object(entries) => {
                    *self.inner.entries.write() = entries;
                    self.notify_everything();
                    Ok(())
                }
                _ => Err(StoreError::Deserialization(
                    "collection snapshot must be an object of entries".to_string(),
                )),
            },
            || self.reset_with(false),
        )
    }

    fn send_devtools(&self, action: &str) {
        if let Some(bridge) = &self.inner.devtools {
            let snapshot = Value::Object(self.entries());
            bridge.send(action, &snapshot);
        }
    }

    // --- Notification ---

    fn size_value(&self) -> Value {
        Value::from(self.size())
    }

    fn key_list(&self) -> Value {
        keys_value(&self.inner.entries.read())
    }

    fn notify_key(&self, key: &str) -> usize {
        self.inner.key_observers.notify_key(key, || self.get(key))
    }

    fn notify_membership(&self) -> usize {
        self.inner.size_observers.notify(|| Some(self.size_value()))
            + self.inner.keys_observers.notify(|| Some(self.key_list()))
    }

    fn notify_everything(&self) -> usize {
        let fired = self
            .inner
            .key_observers
            .notify_all(|key| self.get(key))
            + self.notify_membership();
        tracing::trace!(collection = %self.inner.name, fired, "notified observers");
        fired
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.inner.name)
            .field("keys", &self.keys())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

fn keys_value(entries: &Entries) -> Value {
    Value::Array(entries.keys().cloned().map(Value::String).collect())
}

/// Order-sensitive comparison: same keys in the same order with deep-equal records.
fn entries_equal(a: &Entries, b: &Entries) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|((ka, va), (kb, vb))| ka == kb && deep_equal(va, vb))
}

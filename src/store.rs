//! Value store: one shared state record with actions, selectors, and observers.

use crate::binding::Binding;
use crate::definition::{Action, ActionTable, SelectorTable, StoreDefinition};
use crate::devtools::{DevtoolsBridge, DevtoolsExtension};
use crate::equality::deep_equal;
use crate::error::{Result, StoreError};
use crate::subscriptions::{
    derive_from, identity, Callback, Derive, Subscription, SubscriptionManager,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Engine configuration.
#[derive(Clone, Default)]
pub struct StoreConfig {
    /// Name reported to the debugging tool and in logs.
    pub name: Option<String>,

    /// Whether to connect to the debugging tool.
    pub devtools: bool,

    /// The debugging tool, if one is present in this process.
    pub extension: Option<Arc<dyn DevtoolsExtension>>,
}

impl StoreConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Enable the bridge to `extension`.
    pub fn with_devtools(mut self, extension: Arc<dyn DevtoolsExtension>) -> Self {
        self.devtools = true;
        self.extension = Some(extension);
        self
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("name", &self.name)
            .field("devtools", &self.devtools)
            .field("extension", &self.extension.is_some())
            .finish()
    }
}

struct StoreInner {
    name: String,
    /// Replaced wholesale on every commit.
    current: RwLock<Arc<Value>>,
    initial: Value,
    actions: ActionTable,
    selectors: SelectorTable,
    observers: SubscriptionManager,
    devtools: Option<DevtoolsBridge>,
}

/// A reactive value store.
///
/// Cloning a `Store` creates a new handle to the **same** state.
///
/// # Concurrency
///
/// Dispatches are not serialized. Each one drafts from whatever state is
/// current when it starts; an asynchronous dispatch that finishes later
/// overwrites anything committed in between.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Build a store from its definition.
    pub fn new(definition: StoreDefinition) -> Result<Self> {
        let StoreDefinition {
            states,
            actions,
            selectors,
            config,
        } = definition;

        let name = config.name.clone().unwrap_or_else(|| "store".to_string());
        let actions = ActionTable::build(actions)?;
        let selectors = SelectorTable::build(selectors)?;
        let devtools = DevtoolsBridge::connect(&config, &name, &states);
        tracing::debug!(store = %name, devtools = devtools.is_some(), "created store");

        Ok(Self {
            inner: Arc::new(StoreInner {
                name,
                initial: states.clone(),
                current: RwLock::new(Arc::new(states)),
                actions,
                selectors,
                observers: SubscriptionManager::new(),
                devtools,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // --- Reads ---

    /// The current state record.
    pub fn get(&self) -> Arc<Value> {
        Arc::clone(&self.inner.current.read())
    }

    /// Apply `selector` to the current state.
    pub fn get_with<T>(&self, selector: impl FnOnce(&Value) -> T) -> T {
        let state = self.get();
        selector(&*state)
    }

    /// Evaluate a registered selector.
    pub fn select(&self, name: &str, payload: Value) -> Result<Value> {
        let selector = self.inner.selectors.get(name)?;
        let state = self.get();
        Ok(selector.apply(&state, &payload))
    }

    // --- Observation ---

    /// Observe the whole state record.
    pub fn subscribe<C>(&self, callback: C) -> Subscription
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.register(identity(), Arc::new(callback))
    }

    /// Observe a derived slice of the state.
    ///
    /// `callback` fires only when `selector`'s result changes.
    pub fn observe<S, C>(&self, selector: S, callback: C) -> Subscription
    where
        S: Fn(&Value) -> Value + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.register(derive_from(selector), Arc::new(callback))
    }

    /// Subscribe/snapshot pair for `selector`, for UI bindings.
    pub fn binding<S>(&self, selector: S) -> Binding
    where
        S: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let selector = Arc::new(selector);
        let subscribe_store = self.clone();
        let subscribe_selector = Arc::clone(&selector);
        let snapshot_store = self.clone();

        Binding::new(
            move |callback| {
                let selector = Arc::clone(&subscribe_selector);
                subscribe_store.register(derive_from(move |s| selector(s)), callback)
            },
            move || Some(snapshot_store.get_with(|s| selector(s))),
        )
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.inner.observers.subscription_count()
    }

    fn register(&self, derive: Derive, callback: Callback) -> Subscription {
        let id = self
            .inner
            .observers
            .subscribe(derive, callback, || Some(self.get()));
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(inner) = weak.upgrade() {
                inner.observers.unsubscribe(id);
            }
        })
    }

    // --- Dispatch ---

    /// Run a synchronous action and notify observers.
    ///
    /// Returns the action's output. Fails with `ActionNotFound` for an
    /// unregistered name and `AsyncAction` for an asynchronous one; in both
    /// cases and when the body fails, nothing is committed.
    pub fn dispatch(&self, action: &str, payload: Value) -> Result<Value> {
        self.dispatch_with(action, payload, true)
    }

    /// Like [`dispatch`](Self::dispatch) but without the notification pass.
    ///
    /// Observers see the new state the next time a pass runs.
    pub fn dispatch_silent(&self, action: &str, payload: Value) -> Result<Value> {
        self.dispatch_with(action, payload, false)
    }

    /// Run a synchronous or asynchronous action and notify observers.
    ///
    /// The draft is taken when this is called; the commit happens once the
    /// action resolves. Reads in between see the previous state.
    pub async fn dispatch_async(&self, action: &str, payload: Value) -> Result<Value> {
        self.dispatch_async_with(action, payload, true).await
    }

    /// Like [`dispatch_async`](Self::dispatch_async) but without the notification pass.
    pub async fn dispatch_async_silent(&self, action: &str, payload: Value) -> Result<Value> {
        self.dispatch_async_with(action, payload, false).await
    }

    fn dispatch_with(&self, name: &str, payload: Value, notify: bool) -> Result<Value> {
        let body = match self.inner.actions.get(name)? {
            Action::Sync(body) => body,
            Action::Future(_) => return Err(StoreError::AsyncAction(name.to_string())),
        };

        let mut draft = self.draft();
        let output = body(&mut draft, &payload)?;
        self.commit(name, draft, notify);
        Ok(output)
    }

    async fn dispatch_async_with(&self, name: &str, payload: Value, notify: bool) -> Result<Value> {
        let action = self.inner.actions.get(name)?.clone();
        let mut draft = self.draft();

        let output = match action {
            Action::Sync(body) => body(&mut draft, &payload)?,
            Action::Future(body) => {
                let (state, output) = body(draft, payload).await?;
                draft = state;
                output
            }
        };

        self.commit(name, draft, notify);
        Ok(output)
    }

    fn draft(&self) -> Value {
        Value::clone(&self.inner.current.read())
    }

    fn commit(&self, label: &str, next: Value, notify: bool) {
        let next = Arc::new(next);
        *self.inner.current.write() = Arc::clone(&next);
        tracing::trace!(store = %self.inner.name, action = label, notify, "committed");

        if let Some(bridge) = &self.inner.devtools {
            bridge.send(label, &next);
        }
        if notify {
            self.notify_observers();
        }
    }

    // --- Reset ---

    /// Restore the state captured at construction.
    ///
    /// Observers are notified only if the state actually changed.
    pub fn reset(&self) {
        self.reset_with(true);
    }

    fn reset_with(&self, forward: bool) {
        let initial = Arc::new(self.inner.initial.clone());
        let previous = std::mem::replace(&mut *self.inner.current.write(), Arc::clone(&initial));
        tracing::debug!(store = %self.inner.name, "reset");

        if let Some(bridge) = self.inner.devtools.as_ref().filter(|_| forward) {
            bridge.send("reset", &initial);
        }
        if !deep_equal(&previous, &initial) {
            self.notify_observers();
        }
    }

    // --- Devtools ---

    /// Apply control messages queued by the debugging tool.
    ///
    /// Returns how many were applied. Snapshots that fail to parse are
    /// logged and skipped.
    pub fn process_devtools_commands(&self) -> usize {
        let Some(bridge) = &self.inner.devtools else {
            return 0;
        };
        bridge.process(
            |snapshot| {
                *self.inner.current.write() = Arc::new(snapshot);
                self.notify_observers();
                Ok(())
            },
            || self.reset_with(false),
        )
    }

    /// Notification pass over every observer.
    fn notify_observers(&self) -> usize {
        let fired = self.inner.observers.notify(|| Some(self.get()));
        tracing::trace!(store = %self.inner.name, fired, "notified observers");
        fired
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("state", &self.get())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Selector;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_store() -> Store {
        Store::new(
            StoreDefinition::new(json!({"count": 0, "label": "a"}))
                .action(
                    "increment",
                    Action::sync(|s, _| {
                        let n = s["count"].as_i64().unwrap_or(0);
                        s["count"] = json!(n + 1);
                        Ok(Value::Null)
                    }),
                )
                .action(
                    "rename",
                    Action::sync(|s, p| {
                        s["label"] = p.clone();
                        Ok(Value::Null)
                    }),
                )
                .selector(
                    "scaled",
                    Selector::new(|s, p| {
                        json!(s["count"].as_i64().unwrap_or(0) * p.as_i64().unwrap_or(1))
                    }),
                ),
        )
        .unwrap()
    }

    fn hits() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let cb = hits.clone();
        (hits, move || {
            cb.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_dispatch_updates_state() {
        let store = counter_store();
        store.dispatch("increment", Value::Null).unwrap();
        assert_eq!(store.get()["count"], 1);
    }

    #[test]
    fn test_selector_observer_ignores_unrelated_changes() {
        let store = counter_store();
        let (count, callback) = hits();
        store.observe(|s| s["count"].clone(), callback);

        store.dispatch("rename", json!("b")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        store.dispatch("increment", Value::Null).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_silent_dispatch_defers_notification() {
        let store = counter_store();
        let (count, callback) = hits();
        store.observe(|s| s["count"].clone(), callback);

        store.dispatch_silent("increment", Value::Null).unwrap();
        assert_eq!(store.get()["count"], 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // The next pass picks up the silent change.
        store.dispatch("rename", json!("b")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_named_selector() {
        let store = counter_store();
        store.dispatch("increment", Value::Null).unwrap();
        assert_eq!(store.select("scaled", json!(10)).unwrap(), json!(10));
        assert!(matches!(
            store.select("missing", Value::Null),
            Err(StoreError::SelectorNotFound(_))
        ));
    }

    #[test]
    fn test_reset_notifies_only_on_change() {
        let store = counter_store();
        let (count, callback) = hits();
        store.subscribe(callback);

        store.reset();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        store.dispatch("increment", Value::Null).unwrap();
        store.reset();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(*store.get(), json!({"count": 0, "label": "a"}));
    }

    #[test]
    fn test_callback_may_read_store() {
        let store = counter_store();
        let seen = Arc::new(AtomicUsize::new(0));
        let reader = store.clone();
        let seen_in_cb = seen.clone();
        store.subscribe(move || {
            let n = reader.get()["count"].as_u64().unwrap_or(0) as usize;
            seen_in_cb.store(n, Ordering::SeqCst);
        });

        store.dispatch("increment", Value::Null).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}

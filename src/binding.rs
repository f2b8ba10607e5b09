//! Subscribe/snapshot pairs for reactive UI layers.
//!
//! A UI runtime that re-renders on external store changes needs two things:
//! a way to register a change callback and a side-effect free way to read
//! the current value. [`Binding`] bundles both for one observed value.

use crate::subscriptions::{Callback, Subscription};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type SubscribeFn = Arc<dyn Fn(Callback) -> Subscription + Send + Sync>;
type SnapshotFn = Arc<dyn Fn() -> Option<Value> + Send + Sync>;

/// One observed value exposed as `subscribe` + `snapshot`.
#[derive(Clone)]
pub struct Binding {
    subscribe: SubscribeFn,
    snapshot: SnapshotFn,
}

impl Binding {
    pub(crate) fn new<Sub, Snap>(subscribe: Sub, snapshot: Snap) -> Self
    where
        Sub: Fn(Callback) -> Subscription + Send + Sync + 'static,
        Snap: Fn() -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            subscribe: Arc::new(subscribe),
            snapshot: Arc::new(snapshot),
        }
    }

    /// Register `callback`; it fires at most once per change per notification pass.
    pub fn subscribe<C>(&self, callback: C) -> Subscription
    where
        C: Fn() + Send + Sync + 'static,
    {
        (self.subscribe)(Arc::new(callback))
    }

    /// Current value. `None` when the observed collection entry is absent.
    pub fn snapshot(&self) -> Option<Value> {
        (self.snapshot)()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

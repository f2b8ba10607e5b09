//! Per-key convenience façade.

use crate::binding::Binding;
use crate::error::Result;
use crate::subscriptions::Subscription;
use serde_json::Value;

use super::Collection;

/// A [`Collection`] with one key fixed. Every method behaves exactly like
/// the collection method of the same name called with that key.
#[derive(Clone, Debug)]
pub struct KeyView {
    collection: Collection,
    key: String,
}

impl KeyView {
    pub(crate) fn new(collection: Collection, key: String) -> Self {
        Self { collection, key }
    }

    pub fn id(&self) -> &str {
        &self.key
    }

    pub fn exists(&self) -> bool {
        self.collection.contains_key(&self.key)
    }

    pub fn get(&self) -> Option<Value> {
        self.collection.get(&self.key)
    }

    pub fn get_with<T>(&self, selector: impl FnOnce(&Value) -> T) -> Option<T> {
        self.collection.get_with(&self.key, selector)
    }

    pub fn select(&self, name: &str, payload: Value) -> Result<Option<Value>> {
        self.collection.select(&self.key, name, payload)
    }

    pub fn subscribe<C>(&self, callback: C) -> Subscription
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.collection.subscribe_key(&self.key, callback)
    }

    pub fn observe<S, C>(&self, selector: S, callback: C) -> Subscription
    where
        S: Fn(&Value) -> Value + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.collection.observe(&self.key, selector, callback)
    }

    pub fn binding<S>(&self, selector: S) -> Binding
    where
        S: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.collection.binding(&self.key, selector)
    }

    pub fn set(&self, record: Value) -> Option<Value> {
        self.collection.set(self.key.clone(), record)
    }

    pub fn remove(&self) -> Option<Value> {
        self.collection.remove(&self.key)
    }

    pub fn dispatch(&self, action: &str, payload: Value) -> Result<Value> {
        self.collection.dispatch(&self.key, action, payload)
    }

    pub fn dispatch_silent(&self, action: &str, payload: Value) -> Result<Value> {
        self.collection.dispatch_silent(&self.key, action, payload)
    }

    pub async fn dispatch_async(&self, action: &str, payload: Value) -> Result<Value> {
        self.collection.dispatch_async(&self.key, action, payload).await
    }

    pub async fn dispatch_async_silent(&self, action: &str, payload: Value) -> Result<Value> {
        self.collection
            .dispatch_async_silent(&self.key, action, payload)
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::definition::{Action, CollectionDefinition};
    use crate::Collection;
    use serde_json::{json, Value};

    #[test]
    fn test_view_matches_direct_calls() {
        let collection = Collection::new(CollectionDefinition::new().action(
            "bump",
            Action::sync(|r, _| {
                let n = r["n"].as_i64().unwrap_or(0);
                r["n"] = json!(n + 1);
                Ok(json!(n + 1))
            }),
        ))
        .unwrap();

        let view = collection.key("a");
        assert!(!view.exists());
        assert!(view.get().is_none());

        view.set(json!({"n": 1}));
        assert_eq!(view.dispatch("bump", Value::Null).unwrap(), json!(2));
        assert_eq!(collection.get("a"), Some(json!({"n": 2})));
        assert_eq!(view.get_with(|r| r["n"].clone()), Some(json!(2)));

        assert_eq!(view.remove(), Some(json!({"n": 2})));
        assert!(!collection.contains_key("a"));
    }
}

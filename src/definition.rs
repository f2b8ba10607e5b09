//! Actions, selectors, and the construction input for both engines.

use crate::error::{ActionError, Result, StoreError};
use crate::store::StoreConfig;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Insertion-ordered backing map of a collection.
pub type Entries = Map<String, Value>;

/// Result of a synchronous action body.
pub type ActionResult = std::result::Result<Value, ActionError>;

type SyncBody = Arc<dyn Fn(&mut Value, &Value) -> ActionResult + Send + Sync>;
type FutureBody = Arc<
    dyn Fn(Value, Value) -> BoxFuture<'static, std::result::Result<(Value, Value), ActionError>>
        + Send
        + Sync,
>;

/// A named mutation applied to a draft of the current state.
#[derive(Clone)]
pub enum Action {
    /// Mutates the draft in place and returns its output.
    Sync(SyncBody),
    /// Takes ownership of the draft and resolves to `(draft, output)`.
    Future(FutureBody),
}

impl Action {
    /// Wrap a synchronous body `(draft, payload) -> output`.
    pub fn sync<F>(body: F) -> Self
    where
        F: Fn(&mut Value, &Value) -> ActionResult + Send + Sync + 'static,
    {
        Action::Sync(Arc::new(body))
    }

    /// Wrap an asynchronous body.
    ///
    /// The draft is moved into the future and must be handed back together
    /// with the action's output; it is committed only if the future resolves
    /// to `Ok`.
    pub fn future<F, Fut>(body: F) -> Self
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(Value, Value), ActionError>> + Send + 'static,
    {
        Action::Future(Arc::new(move |draft, payload| body(draft, payload).boxed()))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Action::Future(_))
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Sync(_) => write!(f, "Action::Sync"),
            Action::Future(_) => write!(f, "Action::Future"),
        }
    }
}

/// A named pure derivation `(state, payload) -> value`.
#[derive(Clone)]
pub struct Selector(Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>);

impl Selector {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    {
        Selector(Arc::new(body))
    }

    pub fn apply(&self, state: &Value, payload: &Value) -> Value {
        (self.0)(state, payload)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector")
    }
}

/// Name-indexed actions, validated once at engine construction.
#[derive(Clone, Debug, Default)]
pub(crate) struct ActionTable(HashMap<String, Action>);

impl ActionTable {
    pub(crate) fn build(actions: Vec<(String, Action)>) -> Result<Self> {
        let mut table = HashMap::with_capacity(actions.len());
        for (name, action) in actions {
            if table.contains_key(&name) {
                return Err(StoreError::ActionExists(name));
            }
            table.insert(name, action);
        }
        Ok(Self(table))
    }

    pub(crate) fn get(&self, name: &str) -> Result<&Action> {
        self.0
            .get(name)
            .ok_or_else(|| StoreError::ActionNotFound(name.to_string()))
    }
}

/// Name-indexed selectors, validated once at engine construction.
#[derive(Clone, Debug, Default)]
pub(crate) struct SelectorTable(HashMap<String, Selector>);

impl SelectorTable {
    pub(crate) fn build(selectors: Vec<(String, Selector)>) -> Result<Self> {
        let mut table = HashMap::with_capacity(selectors.len());
        for (name, selector) in selectors {
            if table.contains_key(&name) {
                return Err(StoreError::SelectorExists(name));
            }
            table.insert(name, selector);
        }
        Ok(Self(table))
    }

    pub(crate) fn get(&self, name: &str) -> Result<&Selector> {
        self.0
            .get(name)
            .ok_or_else(|| StoreError::SelectorNotFound(name.to_string()))
    }
}

/// Construction input for a [`Store`](crate::Store).
#[derive(Clone, Debug)]
pub struct StoreDefinition {
    pub(crate) states: Value,
    pub(crate) actions: Vec<(String, Action)>,
    pub(crate) selectors: Vec<(String, Selector)>,
    pub(crate) config: StoreConfig,
}

impl StoreDefinition {
    pub fn new(states: Value) -> Self {
        Self {
            states,
            actions: Vec::new(),
            selectors: Vec::new(),
            config: StoreConfig::default(),
        }
    }

    pub fn action(mut self, name: impl Into<String>, action: Action) -> Self {
        self.actions.push((name.into(), action));
        self
    }

    pub fn selector(mut self, name: impl Into<String>, selector: Selector) -> Self {
        self.selectors.push((name.into(), selector));
        self
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }
}

/// Construction input for a [`Collection`](crate::Collection).
///
/// Actions and selectors operate on a single entry's record.
#[derive(Clone, Debug, Default)]
pub struct CollectionDefinition {
    pub(crate) initial: Entries,
    pub(crate) actions: Vec<(String, Action)>,
    pub(crate) selectors: Vec<(String, Selector)>,
    pub(crate) config: StoreConfig,
}

impl CollectionDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries restored by `reset`. Without this the collection resets to empty.
    pub fn initial_entries(mut self, entries: Entries) -> Self {
        self.initial = entries;
        self
    }

    pub fn action(mut self, name: impl Into<String>, action: Action) -> Self {
        self.actions.push((name.into(), action));
        self
    }

    pub fn selector(mut self, name: impl Into<String>, selector: Selector) -> Self {
        self.selectors.push((name.into(), selector));
        self
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicate_action_rejected() {
        let noop = Action::sync(|_, _| Ok(Value::Null));
        let result = ActionTable::build(vec![
            ("inc".to_string(), noop.clone()),
            ("inc".to_string(), noop),
        ]);
        assert!(matches!(result, Err(StoreError::ActionExists(name)) if name == "inc"));
    }

    #[test]
    fn test_unknown_selector_is_not_found() {
        let table = SelectorTable::build(vec![(
            "double".to_string(),
            Selector::new(|s, _| json!(s["n"].as_i64().unwrap_or(0) * 2)),
        )])
        .unwrap();

        assert_eq!(table.get("double").unwrap().apply(&json!({"n": 4}), &Value::Null), json!(8));
        let err = table.get("triple").unwrap_err();
        assert!(err.is_not_found());
    }
}

//! # statekeep
//!
//! Reactive state containers with selector-based change notification.
//!
//! ## Core Concepts
//!
//! - **Store**: one shared state record, mutated only through named actions
//! - **Collection**: a keyed map of records, each independently observable
//! - **Observers**: `(selector, callback)` pairs notified only when the
//!   selected value changes structurally
//! - **Copy-on-write**: actions run against a draft that replaces the
//!   committed state wholesale
//!
//! ## Example
//!
//! ```ignore
//! use statekeep::{Action, Store, StoreDefinition};
//! use serde_json::{json, Value};
//!
//! let store = Store::new(
//!     StoreDefinition::new(json!({"count": 0})).action(
//!         "increment",
//!         Action::sync(|s, _| {
//!             s["count"] = json!(s["count"].as_i64().unwrap_or(0) + 1);
//!             Ok(Value::Null)
//!         }),
//!     ),
//! )?;
//!
//! let sub = store.observe(|s| s["count"].clone(), || println!("count changed"));
//! store.dispatch("increment", Value::Null)?;
//! sub.unsubscribe();
//! ```

pub mod binding;
pub mod collection;
pub mod definition;
pub mod devtools;
pub mod equality;
pub mod error;
pub mod scoped;
pub mod store;
pub mod subscriptions;

// Re-exports
pub use binding::Binding;
pub use collection::{Collection, KeyView};
pub use definition::{
    Action, ActionResult, CollectionDefinition, Entries, Selector, StoreDefinition,
};
pub use devtools::{
    DevtoolsCommand, DevtoolsConnection, DevtoolsEvent, DevtoolsExtension, DevtoolsLink,
    MemoryDevtools,
};
pub use equality::{deep_equal, deep_equal_opt};
pub use error::{ActionError, Result, StoreError};
pub use scoped::{ScopedStore, StoreFactory};
pub use store::{Store, StoreConfig};
pub use subscriptions::{
    Callback, Derive, KeyedSubscriptionManager, ObserverId, Subscription, SubscriptionManager,
};

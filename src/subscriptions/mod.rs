//! Observer bookkeeping and change notification.
//!
//! Every observer is a `(derive, callback, last)` triple. After a committed
//! change the owning engine runs a notification pass: each observer's
//! derivation is re-evaluated against the new source and compared with
//! [`deep_equal_opt`](crate::equality::deep_equal_opt) to the last delivered
//! value. The callback fires only when they differ.
//!
//! Two registries exist:
//! - [`SubscriptionManager`] for engine-scoped sources (whole state, size, keys)
//! - [`KeyedSubscriptionManager`] for per-key collection observers
//!
//! Derivations and callbacks both run with the registry lock released.
//!
//! # Example
//!
//! ```ignore
//! let sub = store.observe(|s| s["count"].clone(), || println!("count changed"));
//! store.dispatch("increment", Value::Null)?;
//! sub.unsubscribe();
//! sub.unsubscribe(); // no-op
//! ```

mod manager;
mod types;

pub use manager::{KeyedSubscriptionManager, SubscriptionManager};
pub use types::{Callback, Derive, ObserverId, Subscription};
pub(crate) use types::{derive_from, identity};

//! Observer and subscription handle types.

use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Callback fired when an observer's derived value changes.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Derivation evaluated against the observed source.
///
/// The source is `None` when the observed collection entry is absent; the
/// result is `None` when the derived value is undefined.
pub type Derive = Arc<dyn Fn(Option<&Value>) -> Option<Value> + Send + Sync>;

/// Unique identifier for an observer within one registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Handle returned by every `observe`/`subscribe` call.
///
/// Dropping the handle does **not** unsubscribe; call
/// [`unsubscribe`](Subscription::unsubscribe), which may be called any number
/// of times.
pub struct Subscription {
    id: ObserverId,
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub(crate) fn new(id: ObserverId, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Remove the observer. Only the first call has an effect.
    pub fn unsubscribe(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Whether `unsubscribe` has already run.
    pub fn is_closed(&self) -> bool {
        self.cancel.lock().is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Wrap a whole-record selector into a [`Derive`].
///
/// A missing record derives to `None` without invoking the selector.
pub(crate) fn derive_from<F>(selector: F) -> Derive
where
    F: Fn(&Value) -> Value + Send + Sync + 'static,
{
    Arc::new(move |source: Option<&Value>| source.map(&selector))
}

/// Derivation returning the source itself.
pub(crate) fn identity() -> Derive {
    Arc::new(|source: Option<&Value>| source.cloned())
}

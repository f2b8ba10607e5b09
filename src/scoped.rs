//! Stores tied to a scope's lifetime.
//!
//! A [`StoreFactory`] keeps a definition and builds a fresh [`Store`] each
//! time a scope is entered. The returned [`ScopedStore`] resets its store when
//! dropped, which is the scope-exit hook.

use crate::definition::StoreDefinition;
use crate::error::Result;
use crate::store::Store;
use std::ops::Deref;

/// Builds one independent store per scope.
#[derive(Clone, Debug)]
pub struct StoreFactory {
    definition: StoreDefinition,
}

impl StoreFactory {
    pub fn new(definition: StoreDefinition) -> Self {
        Self { definition }
    }

    /// Enter a scope with a freshly constructed store.
    pub fn enter(&self) -> Result<ScopedStore> {
        let store = Store::new(self.definition.clone())?;
        tracing::debug!(store = store.name(), "entered store scope");
        Ok(ScopedStore { store })
    }
}

/// A store owned by one scope. Dereferences to [`Store`].
#[derive(Debug)]
pub struct ScopedStore {
    store: Store,
}

impl ScopedStore {
    /// A handle to the same store that may outlive the scope. The store is
    /// still reset when the scope exits.
    pub fn handle(&self) -> Store {
        self.store.clone()
    }
}

impl Deref for ScopedStore {
    type Target = Store;

    fn deref(&self) -> &Store {
        &self.store
    }
}

impl Drop for ScopedStore {
    fn drop(&mut self) {
        tracing::debug!(store = self.store.name(), "leaving store scope");
        self.store.reset();
    }
}

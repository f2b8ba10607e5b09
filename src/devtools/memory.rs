//! In-process debugging tool that records traffic and injects commands.

use crate::error::Result;
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::bridge::{DevtoolsCommand, DevtoolsConnection, DevtoolsExtension, DevtoolsLink};

/// Outbound traffic observed by [`MemoryDevtools`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DevtoolsEvent {
    Init {
        store: String,
        state: Value,
    },
    Send {
        store: String,
        action: String,
        state: Value,
    },
}

#[derive(Default)]
struct Shared {
    events: Mutex<Vec<DevtoolsEvent>>,
    senders: Mutex<Vec<(String, Sender<DevtoolsCommand>)>>,
}

/// A [`DevtoolsExtension`] living in the same process.
///
/// Cloning yields another handle to the same recorded history.
#[derive(Clone, Default)]
pub struct MemoryDevtools {
    shared: Arc<Shared>,
}

impl MemoryDevtools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in order.
    pub fn events(&self) -> Vec<DevtoolsEvent> {
        self.shared.events.lock().clone()
    }

    /// Actions forwarded via `send`, in order.
    pub fn actions(&self) -> Vec<String> {
        self.shared
            .events
            .lock()
            .iter()
            .filter_map(|event| match event {
                DevtoolsEvent::Send { action, .. } => Some(action.clone()),
                DevtoolsEvent::Init { .. } => None,
            })
            .collect()
    }

    /// Queue a command for every connection opened under `store`.
    ///
    /// Returns how many connections received it.
    pub fn inject(&self, store: &str, command: DevtoolsCommand) -> usize {
        let senders = self.shared.senders.lock();
        senders
            .iter()
            .filter(|(name, _)| name == store)
            .filter(|(_, sender)| sender.send(command.clone()).is_ok())
            .count()
    }

    /// Parse a raw JSON message and queue it like [`inject`](Self::inject).
    pub fn inject_raw(&self, store: &str, raw: &str) -> Result<usize> {
        let command = DevtoolsCommand::from_json(raw)?;
        Ok(self.inject(store, command))
    }
}

impl DevtoolsExtension for MemoryDevtools {
    fn connect(&self, name: &str) -> Option<DevtoolsLink> {
        let (sender, receiver) = unbounded();
        self.shared.senders.lock().push((name.to_string(), sender));
        let connection = MemoryConnection {
            store: name.to_string(),
            shared: Arc::clone(&self.shared),
        };
        Some((Box::new(connection), receiver))
    }
}

struct MemoryConnection {
    store: String,
    shared: Arc<Shared>,
}

impl DevtoolsConnection for MemoryConnection {
    fn init(&self, state: &Value) {
        self.shared.events.lock().push(DevtoolsEvent::Init {
            store: self.store.clone(),
            state: state.clone(),
        });
    }

    fn send(&self, action: &str, state: &Value) {
        self.shared.events.lock().push(DevtoolsEvent::Send {
            store: self.store.clone(),
            action: action.to_string(),
            state: state.clone(),
        });
    }
}

//! Connection lifecycle and inbound command handling.

use crate::error::{Result, StoreError};
use crate::store::StoreConfig;
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control message sent by the debugging tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DevtoolsCommand {
    /// Time-travel to the state recorded after an action.
    JumpToAction {
        /// JSON-encoded state snapshot.
        state: String,
    },
    /// Time-travel to an arbitrary recorded state.
    JumpToState {
        /// JSON-encoded state snapshot.
        state: String,
    },
    /// Restore the engine's initial state.
    Reset,
    /// Any message kind the bridge does not handle.
    #[serde(other)]
    Unsupported,
}

impl DevtoolsCommand {
    /// Parse a raw JSON control message.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| StoreError::Deserialization(e.to_string()))
    }
}

/// An open connection to the debugging tool.
pub trait DevtoolsConnection: Send + Sync {
    /// Initial snapshot, sent once right after connecting.
    fn init(&self, state: &Value);

    /// A committed mutation and the state it produced.
    fn send(&self, action: &str, state: &Value);
}

/// An open connection plus the channel its inbound commands arrive on.
pub type DevtoolsLink = (Box<dyn DevtoolsConnection>, Receiver<DevtoolsCommand>);

/// The debugging tool's entry point.
pub trait DevtoolsExtension: Send + Sync {
    /// Open a connection for the engine called `name`.
    ///
    /// Returns `None` when the tool declines the connection.
    fn connect(&self, name: &str) -> Option<DevtoolsLink>;
}

/// Per-engine connection state.
pub(crate) struct DevtoolsBridge {
    connection: Box<dyn DevtoolsConnection>,
    commands: Receiver<DevtoolsCommand>,
}

impl DevtoolsBridge {
    /// Connect if the config enables devtools and an extension is present.
    pub(crate) fn connect(config: &StoreConfig, name: &str, state: &Value) -> Option<Self> {
        if !config.devtools {
            return None;
        }
        let Some(extension) = config.extension.as_ref() else {
            tracing::debug!(store = name, "devtools enabled but no extension present");
            return None;
        };
        let (connection, commands) = extension.connect(name)?;
        connection.init(state);
        tracing::debug!(store = name, "connected to devtools");

        Some(Self {
            connection,
            commands,
        })
    }

    /// Forward a committed mutation.
    pub(crate) fn send(&self, action: &str, state: &Value) {
        self.connection.send(action, state);
    }

    /// Drain and apply queued commands. Returns how many were applied.
    ///
    /// `replace` receives a parsed snapshot; `reset` runs the engine reset.
    /// Neither may forward its own commit back through [`send`](Self::send).
    /// Snapshot errors are logged and leave the state untouched.
    pub(crate) fn process<R, S>(&self, mut replace: R, mut reset: S) -> usize
    where
        R: FnMut(Value) -> Result<()>,
        S: FnMut(),
    {
        let mut applied = 0;
        for command in self.commands.try_iter() {
            match command {
                DevtoolsCommand::JumpToAction { state }
                | DevtoolsCommand::JumpToState { state } => {
                    let outcome = parse_snapshot(&state).and_then(&mut replace);
                    match outcome {
                        Ok(()) => applied += 1,
                        Err(e) => tracing::warn!(error = %e, "ignoring devtools snapshot"),
                    }
                }
                DevtoolsCommand::Reset => {
                    reset();
                    applied += 1;
                }
                DevtoolsCommand::Unsupported => {
                    tracing::trace!("ignoring unsupported devtools command");
                }
            }
        }
        applied
    }
}

fn parse_snapshot(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| StoreError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let raw = r#"{"type":"JUMP_TO_STATE","state":"{\"n\":1}"}"#;
        let cmd = DevtoolsCommand::from_json(raw).unwrap();
        assert_eq!(
            cmd,
            DevtoolsCommand::JumpToState {
                state: r#"{"n":1}"#.to_string()
            }
        );

        let cmd = DevtoolsCommand::from_json(r#"{"type":"RESET"}"#).unwrap();
        assert_eq!(cmd, DevtoolsCommand::Reset);

        let cmd = DevtoolsCommand::from_json(r#"{"type":"COMMIT"}"#).unwrap();
        assert_eq!(cmd, DevtoolsCommand::Unsupported);
    }

    #[test]
    fn test_malformed_command() {
        let result = DevtoolsCommand::from_json("not json");
        assert!(matches!(result, Err(StoreError::Deserialization(_))));
    }

    #[test]
    fn test_bad_snapshot_is_deserialization_error() {
        assert!(matches!(parse_snapshot("{oops"), Err(StoreError::Deserialization(_))));
    }
}

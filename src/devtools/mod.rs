//! Bridge to an external state-debugging tool.
//!
//! An engine whose [`StoreConfig`](crate::StoreConfig) enables `devtools` and
//! carries a [`DevtoolsExtension`] connects on construction, sends an `init`
//! snapshot, and forwards every committed mutation as `send(action, state)`.
//!
//! Inbound control messages ([`DevtoolsCommand`]) are queued on a channel and
//! applied when the owner calls `process_devtools_commands()` on the engine:
//!
//! - `JUMP_TO_ACTION` / `JUMP_TO_STATE`: replace the state wholesale from the
//!   serialized snapshot and run a full notification pass
//! - `RESET`: run the engine's own `reset`
//!
//! Applying an inbound command never sends that commit back to the tool.
//! Every other commit is forwarded, including ones made from other threads
//! while a command is being applied.

mod bridge;
mod memory;

pub use bridge::{DevtoolsCommand, DevtoolsConnection, DevtoolsExtension, DevtoolsLink};
pub(crate) use bridge::DevtoolsBridge;
pub use memory::{DevtoolsEvent, MemoryDevtools};

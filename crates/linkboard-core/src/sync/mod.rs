//! Real-time collaboration over a WebSocket relay.
//!
//! The relay forwards whole entities between the clients of a board and keeps
//! a last-writer-wins copy so late joiners start from the current state.

mod engine;
#[cfg(not(target_arch = "wasm32"))]
mod native;
mod protocol;
mod transport;

pub use engine::{SessionState, SyncEngine, SyncError, SyncEvent};
#[cfg(not(target_arch = "wasm32"))]
pub use native::NativeWebSocket;
pub use protocol::{ClientMessage, Collaborator, CursorPosition, ServerMessage, UserInfo};
pub use transport::{MemoryTransport, Transport, TransportError, TransportEvent};

//! Linkboard Core Library
//!
//! Platform-agnostic diagram model for the Linkboard collaborative whiteboard:
//! shapes and connectors, the geometry that keeps connectors attached to
//! shapes, per-client undo/redo and the relay sync protocol.

pub mod board;
pub mod config;
pub mod geometry;
pub mod history;
pub mod interaction;
pub mod presence;
pub mod render;
pub mod session;
pub mod shapes;
pub mod snap;
pub mod storage;
pub mod sync;

pub use board::{Board, BoardError, BoardResult};
pub use config::SessionConfig;
pub use geometry::{AnchorPoint, Axis, Edge, EdgeSet, ExtrudableEdge, GeometryError};
pub use history::{EntitySnapshot, HistoryAction, HistoryManager, HistoryOutcome, HistoryRecord};
pub use interaction::{DragTarget, Selection, ToolKind};
pub use presence::{PresenceThrottle, Roster};
pub use render::SceneRenderer;
pub use session::{AccessPolicy, BoardSession, BoardSnapshot, Command, DispatchOutcome, Permission, SessionError};
pub use shapes::{
    AnchorBinding, Connector, ConnectorEnd, ConnectorId, ConnectorPatch, EntityId, EntityKind, Shape, ShapeId,
    ShapeKind, ShapePatch,
};
pub use snap::{AnchorHit, SNAP_THRESHOLD, find_nearest_anchor};
pub use storage::{EntityRecord, MemoryStorage, PersistedBoard, Storage, StorageError, StorageResult};
pub use sync::{SessionState, SyncEngine, SyncError, SyncEvent, Transport, TransportEvent};

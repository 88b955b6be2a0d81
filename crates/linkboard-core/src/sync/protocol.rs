//! Relay wire protocol.
//!
//! Messages are JSON objects tagged by `type`:
//! ```json
//! { "type": "join", "board": "board-id", "user": { "name": "Ada", "color": "#3366ff" } }
//! { "type": "update_shape", "id": "<uuid>", "shape": { ... } }
//! { "type": "presence", "cursor": { "x": 100, "y": 200 } }
//! ```
//! Entities always travel whole; there are no diffs.

use crate::shapes::{Connector, ConnectorId, EntityId, Shape, ShapeId};
use serde::{Deserialize, Serialize};

/// Messages sent to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a board's room
    Join { board: String, user: UserInfo },
    /// Leave the current room
    Leave,
    AddShape { shape: Shape },
    UpdateShape { id: ShapeId, shape: Shape },
    AddConnector { connector: Connector },
    UpdateConnector { id: ConnectorId, connector: Connector },
    /// Cursor position in world coordinates
    Presence { cursor: CursorPosition },
}

impl ClientMessage {
    /// Entity carried by this message, if any.
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            ClientMessage::AddShape { shape } => Some(EntityId::Shape(shape.id())),
            ClientMessage::UpdateShape { id, .. } => Some(EntityId::Shape(*id)),
            ClientMessage::AddConnector { connector } => Some(EntityId::Connector(connector.id())),
            ClientMessage::UpdateConnector { id, .. } => Some(EntityId::Connector(*id)),
            ClientMessage::Join { .. } | ClientMessage::Leave | ClientMessage::Presence { .. } => None,
        }
    }
}

/// Messages received from the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join confirmation with the room's current state
    Joined {
        board: String,
        session_id: String,
        roster: Vec<Collaborator>,
        #[serde(default)]
        shapes: Vec<Shape>,
        #[serde(default)]
        connectors: Vec<Connector>,
    },
    /// Someone joined, left or disconnected
    RosterChanged { roster: Vec<Collaborator> },
    AddShape { from: String, shape: Shape },
    UpdateShape { from: String, id: ShapeId, shape: Shape },
    AddConnector { from: String, connector: Connector },
    UpdateConnector { from: String, id: ConnectorId, connector: Connector },
    Presence { from: String, cursor: CursorPosition },
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub color: String,
}

impl Default for UserInfo {
    fn default() -> Self {
        Self {
            name: "Anonymous".to_string(),
            color: "#3366ff".to_string(),
        }
    }
}

/// A connected user as seen by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaborator {
    pub session_id: String,
    pub user: UserInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
}

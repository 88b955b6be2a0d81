//! Rooms: one per board, holding the roster and the latest copy of every entity.

use dashmap::DashMap;
use linkboard_core::shapes::{Connector, ConnectorId, Shape, ShapeId};
use linkboard_core::sync::{ClientMessage, Collaborator, CursorPosition, ServerMessage, UserInfo};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// A message fanned out to a room, tagged with the sending session.
pub type Envelope = (String, ServerMessage);

/// Insertion-ordered last-writer-wins store.
struct Latest<K, V> {
    index: HashMap<K, usize>,
    values: Vec<V>,
}

impl<K: std::hash::Hash + Eq, V: Clone> Latest<K, V> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            values: Vec::new(),
        }
    }

    fn put(&mut self, key: K, value: V) {
        match self.index.get(&key) {
            Some(&i) => self.values[i] = value,
            None => {
                self.index.insert(key, self.values.len());
                self.values.push(value);
            }
        }
    }

    fn to_vec(&self) -> Vec<V> {
        self.values.clone()
    }
}

/// State of one board's room.
pub struct Room {
    tx: broadcast::Sender<Envelope>,
    members: BTreeMap<String, Collaborator>,
    shapes: Latest<ShapeId, Shape>,
    connectors: Latest<ConnectorId, Connector>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            members: BTreeMap::new(),
            shapes: Latest::new(),
            connectors: Latest::new(),
        }
    }

    fn roster(&self) -> Vec<Collaborator> {
        self.members.values().cloned().collect()
    }

    /// Join confirmation for `session_id` carrying the current room state.
    fn joined(&self, board: &str, session_id: &str) -> ServerMessage {
        ServerMessage::Joined {
            board: board.to_string(),
            session_id: session_id.to_string(),
            roster: self.roster(),
            shapes: self.shapes.to_vec(),
            connectors: self.connectors.to_vec(),
        }
    }

    fn broadcast(&self, from: &str, message: ServerMessage) {
        // No receivers is fine: the sender may be alone in the room.
        let _ = self.tx.send((from.to_string(), message));
    }
}

/// All rooms served by this relay.
pub struct Relay {
    rooms: DashMap<String, Room>,
    capacity: usize,
}

impl Relay {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Add a session to a board's room. Returns the room subscription and the
    /// join confirmation carrying the roster and current entities.
    pub fn join(&self, board: &str, session_id: &str, user: UserInfo) -> (broadcast::Receiver<Envelope>, ServerMessage) {
        let mut room = self
            .rooms
            .entry(board.to_string())
            .or_insert_with(|| Room::new(self.capacity));
        room.members.insert(
            session_id.to_string(),
            Collaborator {
                session_id: session_id.to_string(),
                user,
                cursor: None,
            },
        );
        let rx = room.tx.subscribe();
        room.broadcast(session_id, ServerMessage::RosterChanged { roster: room.roster() });
        let joined = room.joined(board, session_id);
        info!("Session {} joined board {} ({} members)", session_id, board, room.members.len());
        (rx, joined)
    }

    /// Fresh room state for a member that fell behind the broadcast buffer.
    pub fn resync(&self, board: &str, session_id: &str) -> Option<ServerMessage> {
        let room = self.rooms.get(board)?;
        if !room.members.contains_key(session_id) {
            return None;
        }
        Some(room.joined(board, session_id))
    }

    /// Remove a session. Empty rooms are dropped; others get the new roster.
    pub fn leave(&self, board: &str, session_id: &str) {
        let Some(mut room) = self.rooms.get_mut(board) else {
            return;
        };
        if room.members.remove(session_id).is_none() {
            return;
        }
        if room.members.is_empty() {
            drop(room);
            self.rooms.remove_if(board, |_, room| room.members.is_empty());
            info!("Board {} closed", board);
            return;
        }
        let roster = room.roster();
        room.broadcast(session_id, ServerMessage::RosterChanged { roster });
        info!("Session {} left board {}", session_id, board);
    }

    /// Apply a client message from a joined session and fan it out.
    /// Returns an error message for the sender when the message is rejected.
    pub fn relay(&self, board: &str, session_id: &str, message: ClientMessage) -> Option<ServerMessage> {
        let Some(mut room) = self.rooms.get_mut(board) else {
            return Some(error("board is not open"));
        };
        let from = session_id.to_string();
        let outgoing = match message {
            ClientMessage::AddShape { shape } => {
                room.shapes.put(shape.id(), shape.clone());
                ServerMessage::AddShape { from, shape }
            }
            ClientMessage::UpdateShape { id, shape } => {
                if id != shape.id() {
                    return Some(error(&format!("update for shape {} carries shape {}", id, shape.id())));
                }
                room.shapes.put(id, shape.clone());
                ServerMessage::UpdateShape { from, id, shape }
            }
            ClientMessage::AddConnector { connector } => {
                room.connectors.put(connector.id(), connector.clone());
                ServerMessage::AddConnector { from, connector }
            }
            ClientMessage::UpdateConnector { id, connector } => {
                if id != connector.id() {
                    return Some(error(&format!(
                        "update for connector {} carries connector {}",
                        id,
                        connector.id()
                    )));
                }
                room.connectors.put(id, connector.clone());
                ServerMessage::UpdateConnector { from, id, connector }
            }
            ClientMessage::Presence { cursor } => {
                set_cursor(&mut room, session_id, cursor);
                ServerMessage::Presence { from, cursor }
            }
            ClientMessage::Join { .. } | ClientMessage::Leave => {
                return Some(error("join and leave are handled by the connection"));
            }
        };
        debug!("Relaying {} from {} on board {}", outgoing_kind(&outgoing), session_id, board);
        room.broadcast(session_id, outgoing);
        None
    }
}

fn set_cursor(room: &mut Room, session_id: &str, cursor: CursorPosition) {
    if let Some(member) = room.members.get_mut(session_id) {
        member.cursor = Some(cursor);
    }
}

fn outgoing_kind(message: &ServerMessage) -> &'static str {
    match message {
        ServerMessage::Joined { .. } => "joined",
        ServerMessage::RosterChanged { .. } => "roster_changed",
        ServerMessage::AddShape { .. } => "add_shape",
        ServerMessage::UpdateShape { .. } => "update_shape",
        ServerMessage::AddConnector { .. } => "add_connector",
        ServerMessage::UpdateConnector { .. } => "update_connector",
        ServerMessage::Presence { .. } => "presence",
        ServerMessage::Error { .. } => "error",
    }
}

pub fn error(message: &str) -> ServerMessage {
    ServerMessage::Error {
        message: message.to_string(),
    }
}

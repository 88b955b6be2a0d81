//! Board session state machine over a [`Transport`].
//!
//! `Disconnected -> Joining -> Joined -> (Leaving) -> Disconnected`.
//!
//! Local mutations are optimistic: they are sent when joined and queued
//! otherwise (or when a send fails). The queue holds at most one message per
//! entity and is replayed after the next successful join.

use super::protocol::{ClientMessage, Collaborator, CursorPosition, ServerMessage, UserInfo};
use super::transport::{Transport, TransportError, TransportEvent};
use crate::presence::PresenceThrottle;
use crate::shapes::{Connector, EntityId, Shape};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Sync engine errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Connection state of a board session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Joining,
    Joined,
    Leaving,
}

/// Events produced by [`SyncEngine::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Joined the room. Entities with pending local changes are left out.
    Joined {
        session_id: String,
        roster: Vec<Collaborator>,
        shapes: Vec<Shape>,
        connectors: Vec<Connector>,
    },
    RosterChanged(Vec<Collaborator>),
    ShapeReceived { from: String, shape: Shape },
    ConnectorReceived { from: String, connector: Connector },
    CursorMoved { from: String, cursor: CursorPosition },
    /// The connection dropped unexpectedly.
    Disconnected,
    Error(String),
}

/// Serializes local edits into protocol messages and decodes remote ones.
pub struct SyncEngine<T: Transport> {
    transport: T,
    url: String,
    board_id: String,
    user: UserInfo,
    state: SessionState,
    session_id: Option<String>,
    pending: Vec<(EntityId, ClientMessage)>,
    throttle: PresenceThrottle,
}

impl<T: Transport> SyncEngine<T> {
    pub fn new(
        transport: T,
        url: impl Into<String>,
        board_id: impl Into<String>,
        user: UserInfo,
        presence_interval: Duration,
    ) -> Self {
        Self {
            transport,
            url: url.into(),
            board_id: board_id.into(),
            user,
            state: SessionState::Disconnected,
            session_id: None,
            pending: Vec::new(),
            throttle: PresenceThrottle::new(presence_interval),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session id assigned by the relay on join.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    /// Number of queued optimistic messages.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Open the transport. The join request goes out once it reports connected.
    pub fn connect(&mut self) -> Result<(), SyncError> {
        if self.state != SessionState::Disconnected {
            return Ok(());
        }
        self.transport.connect(&self.url)?;
        self.state = SessionState::Joining;
        log::info!("Connecting to {} for board {}", self.url, self.board_id);
        Ok(())
    }

    /// Drop the connection and connect again. Pending messages are kept and
    /// replayed after the rejoin.
    pub fn reconnect(&mut self) -> Result<(), SyncError> {
        // Also abandons a connect attempt that never completed.
        self.transport.disconnect();
        // Events left over from the old connection would tear down the new one.
        let stale = self.transport.poll_events();
        if !stale.is_empty() {
            log::debug!("Discarding {} events from the previous connection", stale.len());
        }
        self.state = SessionState::Disconnected;
        self.session_id = None;
        log::info!("Reconnecting board {} ({} pending)", self.board_id, self.pending.len());
        self.connect()
    }

    /// Leave the board and close the transport. Pending messages are discarded.
    pub fn leave(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.state = SessionState::Leaving;
        if self.transport.is_connected() {
            if let Err(e) = self.send_now(&ClientMessage::Leave) {
                log::debug!("Leave message not delivered: {}", e);
            }
        }
        self.transport.disconnect();
        // Our own disconnect is not an event for the owner.
        let _ = self.transport.poll_events();
        self.pending.clear();
        self.session_id = None;
        self.throttle.reset();
        self.state = SessionState::Disconnected;
        log::info!("Left board {}", self.board_id);
    }

    pub fn send_add_shape(&mut self, shape: &Shape) -> Result<(), SyncError> {
        self.send_entity(ClientMessage::AddShape { shape: shape.clone() })
    }

    pub fn send_update_shape(&mut self, shape: &Shape) -> Result<(), SyncError> {
        self.send_entity(ClientMessage::UpdateShape {
            id: shape.id(),
            shape: shape.clone(),
        })
    }

    pub fn send_add_connector(&mut self, connector: &Connector) -> Result<(), SyncError> {
        self.send_entity(ClientMessage::AddConnector {
            connector: connector.clone(),
        })
    }

    pub fn send_update_connector(&mut self, connector: &Connector) -> Result<(), SyncError> {
        self.send_entity(ClientMessage::UpdateConnector {
            id: connector.id(),
            connector: connector.clone(),
        })
    }

    /// Send a cursor update if joined and the throttle allows it. Presence is
    /// lossy: a failed send is dropped, never queued.
    pub fn send_cursor(&mut self, x: f64, y: f64, now: Instant) -> Result<bool, SyncError> {
        if self.state != SessionState::Joined || !self.throttle.should_send(now) {
            return Ok(false);
        }
        match self.send_now(&ClientMessage::Presence {
            cursor: CursorPosition { x, y },
        }) {
            Ok(()) => Ok(true),
            Err(SyncError::Transport(e)) => {
                log::debug!("Dropping cursor update: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn send_entity(&mut self, message: ClientMessage) -> Result<(), SyncError> {
        let Some(entity) = message.entity() else {
            return self.send_now(&message);
        };
        if self.state == SessionState::Joined {
            match self.send_now(&message) {
                Ok(()) => return Ok(()),
                Err(SyncError::Transport(e)) => log::warn!("Send of {} failed, queueing: {}", entity, e),
                Err(e) => return Err(e),
            }
        }
        self.queue(entity, message);
        Ok(())
    }

    fn send_now(&mut self, message: &ClientMessage) -> Result<(), SyncError> {
        let json = serde_json::to_string(message)?;
        self.transport.send(&json)?;
        Ok(())
    }

    /// Queue a message, replacing any earlier one for the same entity.
    fn queue(&mut self, entity: EntityId, message: ClientMessage) {
        match self.pending.iter_mut().find(|(id, _)| *id == entity) {
            Some(slot) => slot.1 = message,
            None => self.pending.push((entity, message)),
        }
    }

    fn discard_pending(&mut self, entity: EntityId) {
        self.pending.retain(|(id, _)| *id != entity);
    }

    fn flush_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        let mut remaining = pending.into_iter();
        for (entity, message) in remaining.by_ref() {
            if let Err(e) = self.send_now(&message) {
                log::warn!("Replay of {} failed: {}", entity, e);
                self.pending.push((entity, message));
                break;
            }
        }
        self.pending.extend(remaining);
    }

    /// Drain transport events and decode relay messages.
    pub fn poll(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        for event in self.transport.poll_events() {
            match event {
                TransportEvent::Connected => {
                    if self.state == SessionState::Joining {
                        let join = ClientMessage::Join {
                            board: self.board_id.clone(),
                            user: self.user.clone(),
                        };
                        if let Err(e) = self.send_now(&join) {
                            log::warn!("Failed to send join: {}", e);
                            events.push(SyncEvent::Error(e.to_string()));
                        }
                    }
                }
                TransportEvent::Disconnected => {
                    if self.state != SessionState::Disconnected {
                        log::warn!("Connection to relay lost for board {}", self.board_id);
                        self.state = SessionState::Disconnected;
                        self.session_id = None;
                        events.push(SyncEvent::Disconnected);
                    }
                }
                TransportEvent::Error(message) => {
                    log::warn!("Transport error: {}", message);
                    events.push(SyncEvent::Error(message));
                }
                TransportEvent::Message(text) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => events.extend(self.handle_message(message)),
                    Err(e) => log::warn!("Dropping malformed relay message: {}", e),
                },
            }
        }
        events
    }

    fn handle_message(&mut self, message: ServerMessage) -> Option<SyncEvent> {
        match message {
            ServerMessage::Joined {
                board,
                session_id,
                roster,
                mut shapes,
                mut connectors,
            } => {
                if board != self.board_id {
                    log::warn!("Ignoring join confirmation for board {}", board);
                    return None;
                }
                log::info!("Joined board {} as {}", board, session_id);
                self.state = SessionState::Joined;
                self.session_id = Some(session_id.clone());
                // Local pending edits are newer than the relay's copy.
                shapes.retain(|s| !self.is_pending(EntityId::Shape(s.id())));
                connectors.retain(|c| !self.is_pending(EntityId::Connector(c.id())));
                self.flush_pending();
                Some(SyncEvent::Joined {
                    session_id,
                    roster,
                    shapes,
                    connectors,
                })
            }
            ServerMessage::RosterChanged { roster } => Some(SyncEvent::RosterChanged(roster)),
            ServerMessage::AddShape { from, shape } => {
                self.discard_pending(EntityId::Shape(shape.id()));
                Some(SyncEvent::ShapeReceived { from, shape })
            }
            ServerMessage::UpdateShape { from, id, shape } => {
                if id != shape.id() {
                    log::warn!("Dropping update for shape {} carrying shape {}", id, shape.id());
                    return None;
                }
                self.discard_pending(EntityId::Shape(id));
                Some(SyncEvent::ShapeReceived { from, shape })
            }
            ServerMessage::AddConnector { from, connector } => {
                self.discard_pending(EntityId::Connector(connector.id()));
                Some(SyncEvent::ConnectorReceived { from, connector })
            }
            ServerMessage::UpdateConnector { from, id, connector } => {
                if id != connector.id() {
                    log::warn!("Dropping update for connector {} carrying connector {}", id, connector.id());
                    return None;
                }
                self.discard_pending(EntityId::Connector(id));
                Some(SyncEvent::ConnectorReceived { from, connector })
            }
            ServerMessage::Presence { from, cursor } => Some(SyncEvent::CursorMoved { from, cursor }),
            ServerMessage::Error { message } => {
                log::warn!("Relay error: {}", message);
                Some(SyncEvent::Error(message))
            }
        }
    }

    fn is_pending(&self, entity: EntityId) -> bool {
        self.pending.iter().any(|(id, _)| *id == entity)
    }
}

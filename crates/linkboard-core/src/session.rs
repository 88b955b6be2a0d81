//! Board session: the single owner of a board's local state.
//!
//! Every local mutation enters through [`BoardSession::dispatch`], which checks
//! the access policy, applies the change to the [`Board`], records it in the
//! history and broadcasts the affected entities. Remote traffic is applied by
//! [`BoardSession::pump`]. Readers get owned [`BoardSnapshot`]s.

use crate::board::{Board, BoardError};
use crate::config::SessionConfig;
use crate::geometry::{Edge, ExtrudableEdge};
use crate::history::{EntitySnapshot, HistoryAction, HistoryManager, HistoryOutcome};
use crate::interaction::{DragTarget, Selection, ToolKind};
use crate::shapes::{
    AnchorBinding, Connector, ConnectorEnd, ConnectorId, ConnectorPatch, EntityId, SerializableColor, Shape, ShapeId,
    ShapePatch,
};
use crate::storage::PersistedBoard;
use crate::sync::{Collaborator, SessionState, SyncEngine, SyncError, SyncEvent, Transport};
use kurbo::Point;
use std::time::Instant;
use thiserror::Error;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Capability granted on a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    View,
    Edit,
}

/// External permission check, queried on every mutating dispatch.
pub trait AccessPolicy {
    fn permission(&self, board_id: &str) -> Permission;
}

impl AccessPolicy for Permission {
    fn permission(&self, _board_id: &str) -> Permission {
        *self
    }
}

/// A local request against the board.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddShape(Shape),
    UpdateShape { id: ShapeId, patch: ShapePatch },
    MoveShape { id: ShapeId, position: Point },
    AddConnector(Connector),
    UpdateConnector { id: ConnectorId, patch: ConnectorPatch },
    Delete(EntityId),
    LinkShapes { parent: ShapeId, child: ShapeId, color: SerializableColor },
    UnlinkShapes { parent: ShapeId, child: ShapeId },
    BindEndpoint { id: ConnectorId, end: ConnectorEnd, binding: Option<AnchorBinding> },
    /// Start a connector gesture. Drag commands start one implicitly.
    BeginConnectorDrag(DragTarget),
    DragEndpoint { id: ConnectorId, end: ConnectorEnd, position: Point },
    DragEdge { id: ConnectorId, edge: Edge, position: Point },
    ExtrudeEdge { id: ConnectorId, edge: ExtrudableEdge, position: Point },
    /// Finish the gesture: rebuild edges, snap the dragged endpoint, record
    /// one history step and broadcast once.
    EndConnectorDrag,
    BringToFront(ShapeId),
    SendToBack(ShapeId),
    Undo,
    Redo,
    Select(Selection),
    SetTool(ToolKind),
}

impl Command {
    /// Whether this command changes board content (and so needs edit rights).
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Command::Select(_) | Command::SetTool(_))
    }
}

/// Result of a dispatched command.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The board changed. `broadcast` lists the entities sent to the relay.
    Applied { broadcast: Vec<EntityId> },
    /// Nothing happened: read-only session, empty history or a no-op.
    Ignored,
    /// An undo/redo step was dropped because the entity changed remotely.
    Conflict(EntityId),
}

impl DispatchOutcome {
    fn local() -> Self {
        DispatchOutcome::Applied { broadcast: Vec::new() }
    }
}

/// Owned read-only view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardSnapshot {
    pub board_id: String,
    /// Visible shapes, back to front.
    pub shapes: Vec<Shape>,
    pub connectors: Vec<Connector>,
    pub selection: Selection,
    pub tool: ToolKind,
    pub drag: DragTarget,
    pub roster: Vec<Collaborator>,
    pub connection: SessionState,
    pub read_only: bool,
    pub can_undo: bool,
    pub can_redo: bool,
}

/// An in-progress connector gesture.
#[derive(Debug, Clone)]
struct Gesture {
    connector: ConnectorId,
    before: EntitySnapshot,
    dragged_end: Option<ConnectorEnd>,
}

/// One client's session on one board.
pub struct BoardSession<T: Transport> {
    board: Board,
    history: HistoryManager,
    engine: SyncEngine<T>,
    policy: Box<dyn AccessPolicy>,
    config: SessionConfig,
    gesture: Option<Gesture>,
    /// When the next automatic reconnect may run.
    reconnect_due: Option<Instant>,
    last_reconnect: Option<Instant>,
}

impl<T: Transport> BoardSession<T> {
    /// Open a board from persisted records. The session starts disconnected.
    pub fn open(
        config: SessionConfig,
        persisted: &PersistedBoard,
        transport: T,
        policy: impl AccessPolicy + 'static,
    ) -> Self {
        let board = Board::hydrate(persisted);
        let engine = SyncEngine::new(
            transport,
            config.relay_url.clone(),
            board.id().to_string(),
            config.user.clone(),
            config.presence_interval(),
        );
        Self {
            board,
            history: HistoryManager::new(config.max_history),
            engine,
            policy: Box::new(policy),
            config,
            gesture: None,
            reconnect_due: None,
            last_reconnect: None,
        }
    }

    pub fn connect(&mut self) -> SessionResult<()> {
        self.engine.connect()?;
        Ok(())
    }

    /// Reconnect after a transport failure. Pending local edits are re-sent
    /// once the relay confirms the rejoin.
    pub fn reconnect(&mut self) -> SessionResult<()> {
        self.reconnect_due = None;
        self.engine.reconnect()?;
        Ok(())
    }

    /// Leave the board and tear the session down. Returns the final local
    /// state so the caller can persist it.
    pub fn close(mut self) -> PersistedBoard {
        self.end_gesture();
        self.engine.leave();
        self.board.to_persisted()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn engine(&self) -> &SyncEngine<T> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SyncEngine<T> {
        &mut self.engine
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_read_only(&self) -> bool {
        self.policy.permission(self.board.id()) != Permission::Edit
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            board_id: self.board.id().to_string(),
            shapes: self.board.visible_shapes().cloned().collect(),
            connectors: self.board.visible_connectors().cloned().collect(),
            selection: self.board.selection(),
            tool: self.board.tool(),
            drag: self.board.drag_target(),
            roster: self.board.roster().to_vec(),
            connection: self.engine.state(),
            read_only: self.is_read_only(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        }
    }

    /// Send the local cursor position. Allowed in read-only sessions.
    pub fn send_cursor(&mut self, position: Point, now: Instant) -> SessionResult<bool> {
        Ok(self.engine.send_cursor(position.x, position.y, now)?)
    }

    /// Apply one local command.
    pub fn dispatch(&mut self, command: Command) -> SessionResult<DispatchOutcome> {
        if command.is_mutating() && self.is_read_only() {
            log::debug!("Ignoring {:?} on read-only board {}", command, self.board.id());
            return Ok(DispatchOutcome::Ignored);
        }
        let in_gesture = matches!(
            command,
            Command::BeginConnectorDrag(_)
                | Command::DragEndpoint { .. }
                | Command::DragEdge { .. }
                | Command::ExtrudeEdge { .. }
                | Command::EndConnectorDrag
        );
        if !in_gesture && command.is_mutating() {
            self.end_gesture_and_broadcast()?;
        }

        match command {
            Command::AddShape(shape) => {
                let id = shape.id();
                let entity = EntityId::Shape(id);
                match self.board.snapshot_of(entity) {
                    Some(before) => {
                        let bound = self.bound_connectors(id);
                        let cascaded = self.board.upsert_shape(shape);
                        self.commit_shape_change(before, bound, cascaded)
                    }
                    None => {
                        self.board.upsert_shape(shape);
                        self.record_single(entity, None)?;
                        self.broadcast(vec![entity], Vec::new(), true)
                    }
                }
            }
            Command::UpdateShape { id, patch } => self.update_shape(id, patch),
            Command::MoveShape { id, position } => self.update_shape(id, ShapePatch::new().position(position)),
            Command::AddConnector(connector) => {
                let entity = EntityId::Connector(connector.id());
                let before = self.board.snapshot_of(entity);
                let added = before.is_none();
                self.board.upsert_connector(connector);
                self.record_single(entity, before)?;
                self.broadcast(vec![entity], Vec::new(), added)
            }
            Command::UpdateConnector { id, patch } => {
                let entity = EntityId::Connector(id);
                let before = self.require(entity)?;
                self.board.update_connector(id, patch)?;
                self.commit_updates(vec![before], Vec::new())
            }
            Command::Delete(entity) => {
                let bound = match entity {
                    EntityId::Shape(id) => self.bound_connectors(id),
                    EntityId::Connector(_) => Vec::new(),
                };
                let before = self.board.soft_delete(entity)?;
                if before.is_deleted() {
                    return Ok(DispatchOutcome::Ignored);
                }
                // Undoing the delete puts bound connectors back exactly.
                let mut step = vec![(HistoryAction::Delete, before)];
                step.extend(bound.into_iter().map(|c| (HistoryAction::Update, c)));
                self.history.record_step(step);
                self.broadcast(vec![entity], Vec::new(), false)
            }
            Command::LinkShapes { parent, child, color } => {
                let before = vec![self.require(EntityId::Shape(parent))?, self.require(EntityId::Shape(child))?];
                self.board.link_shapes(parent, child, color)?;
                self.commit_updates(before, Vec::new())
            }
            Command::UnlinkShapes { parent, child } => {
                let before = vec![self.require(EntityId::Shape(parent))?, self.require(EntityId::Shape(child))?];
                if !self.board.unlink_shapes(parent, child)? {
                    return Ok(DispatchOutcome::Ignored);
                }
                self.commit_updates(before, Vec::new())
            }
            Command::BindEndpoint { id, end, binding } => {
                let before = self.require(EntityId::Connector(id))?;
                self.board.bind_endpoint(id, end, binding)?;
                self.commit_updates(vec![before], Vec::new())
            }
            Command::BeginConnectorDrag(target) => {
                let Some(id) = target.connector() else {
                    log::warn!("Ignoring connector drag on {:?}", target);
                    return Ok(DispatchOutcome::Ignored);
                };
                self.begin_gesture(id, target)?;
                Ok(DispatchOutcome::local())
            }
            Command::DragEndpoint { id, end, position } => {
                self.begin_gesture(id, DragTarget::ConnectorEndpoint { id, end })?;
                self.board.drag_connector_endpoint(id, end, position)?;
                Ok(DispatchOutcome::local())
            }
            Command::DragEdge { id, edge, position } => {
                self.begin_gesture(id, DragTarget::ConnectorEdge { id, edge })?;
                self.board.drag_connector_edge(id, &edge, position)?;
                Ok(DispatchOutcome::local())
            }
            Command::ExtrudeEdge { id, edge, position } => {
                self.begin_gesture(id, DragTarget::ConnectorExtrusion { id, end: edge.end })?;
                self.board.extrude_connector_edge(id, &edge, position)?;
                Ok(DispatchOutcome::local())
            }
            Command::EndConnectorDrag => self.end_gesture_and_broadcast(),
            Command::BringToFront(id) => Ok(if self.board.bring_to_front(id) {
                DispatchOutcome::local()
            } else {
                DispatchOutcome::Ignored
            }),
            Command::SendToBack(id) => Ok(if self.board.send_to_back(id) {
                DispatchOutcome::local()
            } else {
                DispatchOutcome::Ignored
            }),
            Command::Undo => {
                let outcome = self.history.undo(&mut self.board);
                self.history_outcome(outcome)
            }
            Command::Redo => {
                let outcome = self.history.redo(&mut self.board);
                self.history_outcome(outcome)
            }
            Command::Select(selection) => {
                match selection {
                    Selection::None => self.board.clear_selection(),
                    Selection::Shape(id) => self.board.select_shape(id)?,
                    Selection::Connector(id) => self.board.select_connector(id)?,
                }
                Ok(DispatchOutcome::local())
            }
            Command::SetTool(tool) => {
                self.board.set_tool(tool);
                Ok(DispatchOutcome::local())
            }
        }
    }

    /// Drain relay traffic and apply it to the board. An unexpected
    /// disconnect triggers a reconnect, at most once per reconnect delay.
    pub fn pump(&mut self) -> Vec<SyncEvent> {
        self.pump_at(Instant::now())
    }

    /// [`pump`](Self::pump) with an explicit clock.
    pub fn pump_at(&mut self, now: Instant) -> Vec<SyncEvent> {
        self.retry_if_due(now);
        let events = self.engine.poll();
        for event in &events {
            match event {
                SyncEvent::Joined {
                    roster,
                    shapes,
                    connectors,
                    ..
                } => {
                    self.last_reconnect = None;
                    self.board.roster_mut().replace(roster.clone());
                    for shape in shapes {
                        self.apply_remote(EntitySnapshot::Shape(shape.clone()));
                    }
                    for connector in connectors {
                        self.apply_remote(EntitySnapshot::Connector(connector.clone()));
                    }
                }
                SyncEvent::RosterChanged(roster) => self.board.roster_mut().replace(roster.clone()),
                SyncEvent::ShapeReceived { shape, .. } => self.apply_remote(EntitySnapshot::Shape(shape.clone())),
                SyncEvent::ConnectorReceived { connector, .. } => {
                    self.apply_remote(EntitySnapshot::Connector(connector.clone()))
                }
                SyncEvent::CursorMoved { from, cursor } => {
                    if !self.board.roster_mut().update_cursor(from, *cursor) {
                        log::debug!("Cursor from unknown session {}", from);
                    }
                }
                SyncEvent::Disconnected => self.schedule_reconnect(now),
                SyncEvent::Error(message) => log::debug!("Sync error surfaced: {}", message),
            }
        }
        events
    }

    /// Reconnect now, or once the delay since the last attempt has passed.
    fn schedule_reconnect(&mut self, now: Instant) {
        let due = match self.last_reconnect {
            Some(last) => (last + self.config.reconnect_delay()).max(now),
            None => now,
        };
        self.reconnect_due = Some(due);
        self.retry_if_due(now);
    }

    fn retry_if_due(&mut self, now: Instant) {
        if self.reconnect_due.is_none_or(|due| now < due) {
            return;
        }
        self.reconnect_due = None;
        self.last_reconnect = Some(now);
        if let Err(e) = self.engine.reconnect() {
            log::warn!("Reconnect to relay failed: {}", e);
            self.reconnect_due = Some(now + self.config.reconnect_delay());
        }
    }

    /// Last-writer-wins upsert of a remote entity.
    fn apply_remote(&mut self, incoming: EntitySnapshot) {
        let entity = incoming.id();
        if self.board.snapshot_of(entity).as_ref() == Some(&incoming) {
            return;
        }
        if self.gesture.as_ref().is_some_and(|g| EntityId::Connector(g.connector) == entity) {
            log::debug!("Remote update to {} interrupts the local gesture", entity);
            self.gesture = None;
            self.board.set_drag_target(DragTarget::None);
        }
        self.history.note_remote_change(entity);
        self.board.restore(incoming);
    }

    fn update_shape(&mut self, id: ShapeId, patch: ShapePatch) -> SessionResult<DispatchOutcome> {
        if patch.is_empty() {
            return Ok(DispatchOutcome::Ignored);
        }
        let before = self.require(EntityId::Shape(id))?;
        let bound = self.bound_connectors(id);
        let cascaded = self.board.update_shape(id, patch)?;
        self.commit_shape_change(before, bound, cascaded)
    }

    fn bound_connectors(&self, id: ShapeId) -> Vec<EntitySnapshot> {
        self.board
            .connectors_bound_to(id)
            .map(|c| EntitySnapshot::Connector(c.clone()))
            .collect()
    }

    /// Record a shape change together with the prior state of every bound
    /// connector it moved, so undo restores their exact paths.
    fn commit_shape_change(
        &mut self,
        before: EntitySnapshot,
        bound: Vec<EntitySnapshot>,
        cascaded: Vec<ConnectorId>,
    ) -> SessionResult<DispatchOutcome> {
        let mut records = vec![before];
        records.extend(
            bound
                .into_iter()
                .filter(|c| matches!(c.id(), EntityId::Connector(id) if cascaded.contains(&id))),
        );
        self.commit_updates(records, Vec::new())
    }

    fn require(&self, entity: EntityId) -> SessionResult<EntitySnapshot> {
        self.board.snapshot_of(entity).ok_or_else(|| {
            SessionError::Board(match entity {
                EntityId::Shape(id) => BoardError::UnknownShape(id),
                EntityId::Connector(id) => BoardError::UnknownConnector(id),
            })
        })
    }

    /// Record an add, or an update when the id was already on the board.
    fn record_single(&mut self, entity: EntityId, before: Option<EntitySnapshot>) -> SessionResult<()> {
        match before {
            Some(before) => self.history.record_mutation(HistoryAction::Update, before),
            None => {
                let added = self.require(entity)?;
                self.history.record_mutation(HistoryAction::Add, added);
            }
        }
        Ok(())
    }

    /// Record updates of `before`'s entities as one step and broadcast them.
    fn commit_updates(
        &mut self,
        before: Vec<EntitySnapshot>,
        cascaded: Vec<ConnectorId>,
    ) -> SessionResult<DispatchOutcome> {
        let entities: Vec<EntityId> = before.iter().map(EntitySnapshot::id).collect();
        self.history
            .record_step(before.into_iter().map(|s| (HistoryAction::Update, s)).collect());
        self.broadcast(entities, cascaded, false)
    }

    fn history_outcome(&mut self, outcome: HistoryOutcome) -> SessionResult<DispatchOutcome> {
        match outcome {
            HistoryOutcome::Empty => Ok(DispatchOutcome::Ignored),
            HistoryOutcome::Conflict(entity) => Ok(DispatchOutcome::Conflict(entity)),
            HistoryOutcome::Applied { entities, cascaded } => self.broadcast(entities, cascaded, false),
        }
    }

    /// Send the current state of each entity, then of connectors that moved
    /// with a shape. `added` announces `entities` as new.
    fn broadcast(
        &mut self,
        entities: Vec<EntityId>,
        cascaded: Vec<ConnectorId>,
        added: bool,
    ) -> SessionResult<DispatchOutcome> {
        let direct = entities.len();
        let mut sent = Vec::with_capacity(entities.len() + cascaded.len());
        let all = entities.into_iter().chain(cascaded.into_iter().map(EntityId::Connector));
        for (i, entity) in all.enumerate() {
            if sent.contains(&entity) {
                continue;
            }
            let add = added && i < direct;
            match entity {
                EntityId::Shape(id) => {
                    if let Some(shape) = self.board.shape(id) {
                        if add {
                            self.engine.send_add_shape(shape)?;
                        } else {
                            self.engine.send_update_shape(shape)?;
                        }
                    }
                }
                EntityId::Connector(id) => {
                    if let Some(connector) = self.board.connector(id) {
                        if add {
                            self.engine.send_add_connector(connector)?;
                        } else {
                            self.engine.send_update_connector(connector)?;
                        }
                    }
                }
            }
            sent.push(entity);
        }
        Ok(DispatchOutcome::Applied { broadcast: sent })
    }

    fn begin_gesture(&mut self, id: ConnectorId, target: DragTarget) -> SessionResult<()> {
        if self.gesture.as_ref().is_some_and(|g| g.connector != id) {
            self.end_gesture_and_broadcast()?;
        }
        if self.gesture.is_none() {
            let before = self.require(EntityId::Connector(id))?;
            self.gesture = Some(Gesture {
                connector: id,
                before,
                dragged_end: None,
            });
        }
        if let (Some(gesture), DragTarget::ConnectorEndpoint { end, .. }) = (self.gesture.as_mut(), target) {
            gesture.dragged_end = Some(end);
        }
        self.board.set_drag_target(target);
        Ok(())
    }

    /// Finish the active gesture. Returns the connector and its state before
    /// the gesture when anything changed.
    fn end_gesture(&mut self) -> Option<(ConnectorId, EntitySnapshot)> {
        let gesture = self.gesture.take()?;
        let id = gesture.connector;
        if let Err(e) = self.board.finish_connector_drag(id) {
            log::warn!("Failed to finish drag of connector {}: {}", id, e);
            return None;
        }
        if let Some(end) = gesture.dragged_end {
            match self.board.snap_endpoint(id, end, self.config.snap_threshold) {
                Ok(Some(hit)) => log::debug!("Snapped connector {} to shape {} anchor {}", id, hit.shape_id, hit.anchor_index),
                Ok(None) => {}
                Err(e) => log::warn!("Snap of connector {} failed: {}", id, e),
            }
        }
        let after = self.board.snapshot_of(EntityId::Connector(id))?;
        (after != gesture.before).then_some((id, gesture.before))
    }

    fn end_gesture_and_broadcast(&mut self) -> SessionResult<DispatchOutcome> {
        match self.end_gesture() {
            Some((_, before)) => self.commit_updates(vec![before], Vec::new()),
            None => Ok(DispatchOutcome::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::PathPoint;
    use crate::sync::{ClientMessage, MemoryTransport, ServerMessage, UserInfo};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    type TestSession = BoardSession<MemoryTransport>;

    fn session(policy: impl AccessPolicy + 'static) -> TestSession {
        BoardSession::open(
            SessionConfig::default(),
            &PersistedBoard::new("board-1"),
            MemoryTransport::new(),
            policy,
        )
    }

    fn joined(session: &mut TestSession) {
        session.connect().unwrap();
        session.pump();
        let frame = serde_json::to_string(&ServerMessage::Joined {
            board: "board-1".to_string(),
            session_id: "me".to_string(),
            roster: vec![Collaborator {
                session_id: "peer".to_string(),
                user: UserInfo::default(),
                cursor: None,
            }],
            shapes: Vec::new(),
            connectors: Vec::new(),
        })
        .unwrap();
        session.engine_mut().transport_mut().push_incoming(frame);
        session.pump();
        session.engine_mut().transport_mut().take_sent();
    }

    fn sent(session: &mut TestSession) -> Vec<ClientMessage> {
        session
            .engine_mut()
            .transport_mut()
            .take_sent()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    fn push(session: &mut TestSession, message: ServerMessage) {
        let frame = serde_json::to_string(&message).unwrap();
        session.engine_mut().transport_mut().push_incoming(frame);
    }

    /// Two rectangles with a connector from A's right anchor to B's left.
    fn linked(session: &mut TestSession) -> (ShapeId, ShapeId, ConnectorId) {
        let a = Shape::rectangle(Point::new(0.0, 0.0), 100.0, 100.0);
        let b = Shape::rectangle(Point::new(300.0, 0.0), 100.0, 100.0);
        let (a_id, b_id) = (a.id(), b.id());
        session.dispatch(Command::AddShape(a)).unwrap();
        session.dispatch(Command::AddShape(b)).unwrap();
        let connector = Connector::between(Point::new(100.0, 50.0), Point::new(300.0, 50.0))
            .with_bindings(Some(AnchorBinding::new(a_id, 3)), Some(AnchorBinding::new(b_id, 0)));
        let c_id = connector.id();
        session.dispatch(Command::AddConnector(connector)).unwrap();
        (a_id, b_id, c_id)
    }

    #[test]
    fn test_move_broadcasts_shape_and_bound_connector() {
        let mut s = session(Permission::Edit);
        joined(&mut s);
        let (a, _, c) = linked(&mut s);
        sent(&mut s);

        let outcome = s
            .dispatch(Command::MoveShape {
                id: a,
                position: Point::new(0.0, 200.0),
            })
            .unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Applied {
                broadcast: vec![EntityId::Shape(a), EntityId::Connector(c)]
            }
        );
        let connector = s.board().connector(c).unwrap();
        assert_eq!(connector.endpoint(ConnectorEnd::Start), Point::new(100.0, 250.0));
        assert_eq!(connector.endpoint(ConnectorEnd::End), Point::new(300.0, 50.0));
        assert_eq!(sent(&mut s).len(), 2);
    }

    #[test]
    fn test_undo_restores_and_broadcasts() {
        let mut s = session(Permission::Edit);
        joined(&mut s);
        let (a, _, c) = linked(&mut s);
        s.dispatch(Command::MoveShape {
            id: a,
            position: Point::new(0.0, 200.0),
        })
        .unwrap();
        sent(&mut s);

        let outcome = s.dispatch(Command::Undo).unwrap();
        assert!(matches!(outcome, DispatchOutcome::Applied { ref broadcast } if broadcast.contains(&EntityId::Connector(c))));
        assert_eq!(s.board().shape(a).unwrap().position(), Point::ZERO);
        assert_eq!(
            s.board().connector(c).unwrap().endpoint(ConnectorEnd::Start),
            Point::new(100.0, 50.0)
        );
        assert!(s.snapshot().can_redo);

        s.dispatch(Command::Redo).unwrap();
        assert_eq!(s.board().shape(a).unwrap().position(), Point::new(0.0, 200.0));
    }

    #[test]
    fn test_undo_move_restores_bound_connector_exactly() {
        let mut s = session(Permission::Edit);
        let (a, _, c) = linked(&mut s);
        let original = s.board().connector(c).unwrap().clone();

        s.dispatch(Command::MoveShape {
            id: a,
            position: Point::new(0.0, 200.0),
        })
        .unwrap();
        let routed = s.board().connector(c).unwrap().clone();
        assert!(routed.points().len() > 2);

        s.dispatch(Command::Undo).unwrap();
        assert_eq!(s.board().connector(c).unwrap(), &original);
        s.dispatch(Command::Redo).unwrap();
        assert_eq!(s.board().connector(c).unwrap(), &routed);
    }

    #[test]
    fn test_undo_redo_sequence_restores_whole_board() {
        let mut s = session(Permission::Edit);
        let (a, b, _) = linked(&mut s);
        let initial = s.snapshot();
        let undo_base = s.history().undo_count();

        let edits = [
            Command::MoveShape {
                id: a,
                position: Point::new(0.0, 200.0),
            },
            Command::UpdateShape {
                id: b,
                patch: ShapePatch::new().size(160.0, 40.0),
            },
            Command::MoveShape {
                id: b,
                position: Point::new(250.0, -120.0),
            },
            Command::MoveShape {
                id: a,
                position: Point::new(40.0, 320.0),
            },
        ];
        for edit in edits {
            assert!(matches!(s.dispatch(edit).unwrap(), DispatchOutcome::Applied { .. }));
        }
        let edited = s.snapshot();

        while s.history().undo_count() > undo_base {
            assert!(matches!(s.dispatch(Command::Undo).unwrap(), DispatchOutcome::Applied { .. }));
        }
        let undone = s.snapshot();
        assert_eq!(undone.shapes, initial.shapes);
        assert_eq!(undone.connectors, initial.connectors);

        while s.history().can_redo() {
            s.dispatch(Command::Redo).unwrap();
        }
        let redone = s.snapshot();
        assert_eq!(redone.shapes, edited.shapes);
        assert_eq!(redone.connectors, edited.connectors);
    }

    #[test]
    fn test_undo_delete_restores_bound_connector() {
        let mut s = session(Permission::Edit);
        let (a, _, c) = linked(&mut s);
        let original = s.board().connector(c).unwrap().clone();
        s.dispatch(Command::Delete(EntityId::Shape(a))).unwrap();
        s.dispatch(Command::Undo).unwrap();
        assert!(!s.board().shape(a).unwrap().is_deleted());
        assert_eq!(s.board().connector(c).unwrap(), &original);
    }

    #[test]
    fn test_new_mutation_clears_redo() {
        let mut s = session(Permission::Edit);
        let shape = Shape::rectangle(Point::ZERO, 10.0, 10.0);
        let id = shape.id();
        s.dispatch(Command::AddShape(shape)).unwrap();
        s.dispatch(Command::Undo).unwrap();
        assert!(s.history().can_redo());
        assert!(s.board().shape(id).unwrap().is_deleted());
        s.dispatch(Command::AddShape(Shape::rectangle(Point::ZERO, 5.0, 5.0))).unwrap();
        assert!(!s.history().can_redo());
    }

    #[test]
    fn test_undo_after_remote_edit_conflicts() {
        let mut s = session(Permission::Edit);
        joined(&mut s);
        let shape = Shape::rectangle(Point::ZERO, 10.0, 10.0);
        let id = shape.id();
        s.dispatch(Command::AddShape(shape)).unwrap();
        s.dispatch(Command::MoveShape {
            id,
            position: Point::new(5.0, 5.0),
        })
        .unwrap();

        let remote = s.board().shape(id).unwrap().with(ShapePatch::new().position(Point::new(80.0, 80.0)));
        push(
            &mut s,
            ServerMessage::UpdateShape {
                from: "peer".to_string(),
                id,
                shape: remote,
            },
        );
        s.pump();

        assert_eq!(s.dispatch(Command::Undo).unwrap(), DispatchOutcome::Conflict(EntityId::Shape(id)));
        assert_eq!(s.board().shape(id).unwrap().position(), Point::new(80.0, 80.0));
    }

    #[test]
    fn test_concurrent_updates_last_writer_wins() {
        let mut s = session(Permission::Edit);
        joined(&mut s);
        let shape = Shape::rectangle(Point::ZERO, 10.0, 10.0);
        let id = shape.id();
        push(
            &mut s,
            ServerMessage::AddShape {
                from: "peer".to_string(),
                shape: shape.clone(),
            },
        );
        for (from, x) in [("peer", 10.0), ("other", 20.0)] {
            push(
                &mut s,
                ServerMessage::UpdateShape {
                    from: from.to_string(),
                    id,
                    shape: shape.with(ShapePatch::new().position(Point::new(x, 0.0))),
                },
            );
        }
        s.pump();
        assert_eq!(s.board().shape(id).unwrap().position(), Point::new(20.0, 0.0));
    }

    #[test]
    fn test_connector_gesture_records_once_and_snaps() {
        let mut s = session(Permission::Edit);
        joined(&mut s);
        let (a, b, c) = linked(&mut s);
        s.dispatch(Command::BindEndpoint {
            id: c,
            end: ConnectorEnd::End,
            binding: None,
        })
        .unwrap();
        sent(&mut s);
        let undo_before = s.history().undo_count();

        for x in [250.0, 280.0, 297.0] {
            let outcome = s
                .dispatch(Command::DragEndpoint {
                    id: c,
                    end: ConnectorEnd::End,
                    position: Point::new(x, 52.0),
                })
                .unwrap();
            assert_eq!(outcome, DispatchOutcome::local());
        }
        assert!(sent(&mut s).is_empty());
        assert_eq!(s.history().undo_count(), undo_before);

        let outcome = s.dispatch(Command::EndConnectorDrag).unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Applied {
                broadcast: vec![EntityId::Connector(c)]
            }
        );
        assert_eq!(s.history().undo_count(), undo_before + 1);
        let connector = s.board().connector(c).unwrap();
        assert_eq!(connector.binding(ConnectorEnd::End), Some(AnchorBinding::new(b, 0)));
        assert_eq!(connector.endpoint(ConnectorEnd::End), Point::new(300.0, 50.0));
        assert_eq!(connector.binding(ConnectorEnd::Start), Some(AnchorBinding::new(a, 3)));
        assert_eq!(s.board().drag_target(), DragTarget::None);
        assert_eq!(sent(&mut s).len(), 1);
    }

    #[test]
    fn test_remote_update_cancels_gesture() {
        let mut s = session(Permission::Edit);
        joined(&mut s);
        let (_, _, c) = linked(&mut s);
        s.dispatch(Command::BindEndpoint {
            id: c,
            end: ConnectorEnd::End,
            binding: None,
        })
        .unwrap();
        let remote = s
            .board()
            .connector(c)
            .unwrap()
            .with(ConnectorPatch::new().points(vec![
                PathPoint::move_to(Point::new(100.0, 50.0)),
                PathPoint::line_to(Point::new(320.0, 90.0)),
            ]))
            .unwrap();
        s.dispatch(Command::DragEndpoint {
            id: c,
            end: ConnectorEnd::End,
            position: Point::new(250.0, 80.0),
        })
        .unwrap();
        assert!(matches!(s.snapshot().drag, DragTarget::ConnectorEndpoint { .. }));

        push(
            &mut s,
            ServerMessage::UpdateConnector {
                from: "peer".to_string(),
                id: c,
                connector: remote,
            },
        );
        s.pump();
        assert_eq!(s.snapshot().drag, DragTarget::None);
        assert_eq!(
            s.board().connector(c).unwrap().endpoint(ConnectorEnd::End),
            Point::new(320.0, 90.0)
        );
        assert_eq!(s.dispatch(Command::EndConnectorDrag).unwrap(), DispatchOutcome::Ignored);
    }

    #[test]
    fn test_extrude_gesture_inserts_once() {
        let mut s = session(Permission::Edit);
        let connector = Connector::between(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        let id = connector.id();
        s.dispatch(Command::AddConnector(connector)).unwrap();
        let edge = s.board().connector(id).unwrap().extrudable_edge(ConnectorEnd::Start).unwrap();

        s.dispatch(Command::ExtrudeEdge {
            id,
            edge,
            position: Point::new(50.0, 20.0),
        })
        .unwrap();
        let after_first = s.board().connector(id).unwrap().points().len();
        s.dispatch(Command::ExtrudeEdge {
            id,
            edge,
            position: Point::new(50.0, 40.0),
        })
        .unwrap();
        assert_eq!(s.board().connector(id).unwrap().points().len(), after_first);
        assert!(after_first > 2);

        s.dispatch(Command::EndConnectorDrag).unwrap();
        s.dispatch(Command::Undo).unwrap();
        assert_eq!(s.board().connector(id).unwrap().points().len(), 2);
    }

    struct Toggle(Rc<Cell<Permission>>);

    impl AccessPolicy for Toggle {
        fn permission(&self, _board_id: &str) -> Permission {
            self.0.get()
        }
    }

    #[test]
    fn test_read_only_ignores_mutations_but_applies_remote() {
        let permission = Rc::new(Cell::new(Permission::View));
        let mut s = session(Toggle(permission.clone()));
        joined(&mut s);

        let shape = Shape::rectangle(Point::ZERO, 10.0, 10.0);
        assert_eq!(s.dispatch(Command::AddShape(shape.clone())).unwrap(), DispatchOutcome::Ignored);
        assert!(s.board().is_empty());
        assert!(s.snapshot().read_only);

        push(
            &mut s,
            ServerMessage::AddShape {
                from: "peer".to_string(),
                shape: shape.clone(),
            },
        );
        s.pump();
        assert_eq!(s.snapshot().shapes, vec![shape.clone()]);
        assert!(s.send_cursor(Point::new(1.0, 1.0), Instant::now()).unwrap());
        s.dispatch(Command::Select(Selection::Shape(shape.id()))).unwrap();
        assert_eq!(s.snapshot().selection, Selection::Shape(shape.id()));

        permission.set(Permission::Edit);
        let outcome = s.dispatch(Command::Delete(EntityId::Shape(shape.id()))).unwrap();
        assert!(matches!(outcome, DispatchOutcome::Applied { .. }));
        assert_eq!(s.snapshot().selection, Selection::None);
    }

    #[test]
    fn test_offline_edits_replay_on_join() {
        let mut s = session(Permission::Edit);
        let shape = Shape::rectangle(Point::ZERO, 10.0, 10.0);
        s.dispatch(Command::AddShape(shape)).unwrap();
        assert_eq!(s.engine().pending_count(), 1);
        joined(&mut s);
        assert_eq!(s.engine().pending_count(), 0);
        assert_eq!(s.snapshot().roster.len(), 1);
    }

    #[test]
    fn test_disconnect_triggers_reconnect() {
        let mut s = session(Permission::Edit);
        joined(&mut s);
        s.engine_mut().transport_mut().drop_connection();
        let events = s.pump();
        assert_eq!(events, vec![SyncEvent::Disconnected]);
        assert_eq!(s.engine().state(), SessionState::Joining);
        assert_eq!(s.engine().transport().connect_count(), 2);
    }

    #[test]
    fn test_reconnect_backs_off_while_relay_is_down() {
        let mut s = session(Permission::Edit);
        joined(&mut s);
        let t0 = Instant::now();

        s.engine_mut().transport_mut().drop_connection();
        s.pump_at(t0);
        assert_eq!(s.engine().transport().connect_count(), 2);

        // The relay drops us again before the rejoin completes.
        s.engine_mut().transport_mut().drop_connection();
        s.pump_at(t0 + Duration::from_millis(10));
        assert_eq!(s.engine().transport().connect_count(), 2);
        assert_eq!(s.engine().state(), SessionState::Disconnected);

        s.pump_at(t0 + Duration::from_millis(500));
        assert_eq!(s.engine().transport().connect_count(), 2);
        s.pump_at(t0 + s.config().reconnect_delay());
        assert_eq!(s.engine().transport().connect_count(), 3);
        assert_eq!(s.engine().state(), SessionState::Joining);
    }

    #[test]
    fn test_manual_reconnect_rejoins() {
        let mut s = session(Permission::Edit);
        joined(&mut s);
        s.reconnect().unwrap();
        for _ in 0..3 {
            s.pump();
        }
        assert_eq!(s.engine().state(), SessionState::Joining);
        assert_eq!(s.engine().transport().connect_count(), 2);
        let joins = sent(&mut s)
            .into_iter()
            .filter(|m| matches!(m, ClientMessage::Join { .. }))
            .count();
        assert_eq!(joins, 1);
    }

    #[test]
    fn test_remote_cursor_updates_roster() {
        let mut s = session(Permission::Edit);
        joined(&mut s);
        push(
            &mut s,
            ServerMessage::Presence {
                from: "peer".to_string(),
                cursor: crate::sync::CursorPosition { x: 3.0, y: 4.0 },
            },
        );
        s.pump();
        let peer = s.snapshot().roster.into_iter().find(|m| m.session_id == "peer").unwrap();
        assert_eq!(peer.cursor.map(|c| (c.x, c.y)), Some((3.0, 4.0)));
    }

    #[test]
    fn test_close_returns_state() {
        let mut s = session(Permission::Edit);
        let shape = Shape::rectangle(Point::ZERO, 10.0, 10.0);
        s.dispatch(Command::AddShape(shape)).unwrap();
        let persisted = s.close();
        assert_eq!(persisted.shapes.len(), 1);
    }
}

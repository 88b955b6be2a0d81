//! Board state: the shapes and connectors of one open board.

use crate::geometry::{
    Edge, ExtrudableEdge, GeometryError, anchor_position, extrude_connector_edge,
    update_connector_endpoint, update_connector_interior_edge,
};
use crate::history::EntitySnapshot;
use crate::interaction::{DragTarget, Interaction, Selection, ToolKind};
use crate::presence::Roster;
use crate::render::SceneRenderer;
use crate::shapes::{
    AnchorBinding, ChildLink, Connector, ConnectorEnd, ConnectorId, ConnectorPatch, EntityId, SerializableColor, Shape,
    ShapeId, ShapePatch,
};
use crate::snap::{AnchorHit, find_nearest_anchor};
use crate::storage::{EntityRecord, PersistedBoard};
use kurbo::Point;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from board operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoardError {
    #[error("unknown shape {0}")]
    UnknownShape(ShapeId),
    #[error("unknown connector {0}")]
    UnknownConnector(ConnectorId),
    #[error("shape {0} is deleted")]
    ShapeDeleted(ShapeId),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Result type for board operations.
pub type BoardResult<T> = Result<T, BoardError>;

/// The authoritative local model of one board.
///
/// Entities are never physically removed; deletes set a tombstone so they can
/// be undone and propagated. Every shape mutation goes through a path that
/// recomputes anchors and then re-attaches bound connector endpoints.
#[derive(Debug, Clone)]
pub struct Board {
    id: String,
    shapes: HashMap<ShapeId, Shape>,
    /// Z-order of shapes (back to front).
    shape_order: Vec<ShapeId>,
    connectors: HashMap<ConnectorId, Connector>,
    connector_order: Vec<ConnectorId>,
    interaction: Interaction,
    roster: Roster,
}

impl Board {
    /// Create an empty board.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            shapes: HashMap::new(),
            shape_order: Vec::new(),
            connectors: HashMap::new(),
            connector_order: Vec::new(),
            interaction: Interaction::default(),
            roster: Roster::new(),
        }
    }

    /// Build a board from persisted records. Malformed records are skipped.
    pub fn hydrate(persisted: &PersistedBoard) -> Self {
        let mut board = Self::new(persisted.id.clone());
        for record in &persisted.shapes {
            match serde_json::from_value::<Shape>(record.data.clone()) {
                Ok(shape) => {
                    board.upsert_shape(shape);
                }
                Err(e) => log::warn!("Skipping malformed shape record {}: {}", record.id, e),
            }
        }
        for record in &persisted.connectors {
            match serde_json::from_value::<Connector>(record.data.clone()) {
                Ok(connector) => board.upsert_connector(connector),
                Err(e) => log::warn!("Skipping malformed connector record {}: {}", record.id, e),
            }
        }
        log::info!(
            "Hydrated board {} with {} shapes and {} connectors",
            board.id,
            board.shapes.len(),
            board.connectors.len()
        );
        board
    }

    /// Export every entity, tombstones included, as persisted records.
    pub fn to_persisted(&self) -> PersistedBoard {
        fn record<T: serde::Serialize>(id: String, entity: &T) -> Option<EntityRecord> {
            match serde_json::to_value(entity) {
                Ok(data) => Some(EntityRecord { id, data }),
                Err(e) => {
                    log::warn!("Failed to serialize entity {}: {}", id, e);
                    None
                }
            }
        }
        PersistedBoard {
            id: self.id.clone(),
            shapes: self
                .shapes_ordered()
                .filter_map(|s| record(s.id().to_string(), s))
                .collect(),
            connectors: self
                .connectors_ordered()
                .filter_map(|c| record(c.id().to_string(), c))
                .collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // --- Queries ---

    pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(&id)
    }

    pub fn connector(&self, id: ConnectorId) -> Option<&Connector> {
        self.connectors.get(&id)
    }

    /// All shapes in z-order, tombstones included.
    pub fn shapes_ordered(&self) -> impl Iterator<Item = &Shape> {
        self.shape_order.iter().filter_map(|id| self.shapes.get(id))
    }

    /// All connectors in insertion order, tombstones included.
    pub fn connectors_ordered(&self) -> impl Iterator<Item = &Connector> {
        self.connector_order.iter().filter_map(|id| self.connectors.get(id))
    }

    /// Shapes that are not tombstoned, back to front.
    pub fn visible_shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes_ordered().filter(|s| !s.is_deleted())
    }

    pub fn visible_connectors(&self) -> impl Iterator<Item = &Connector> {
        self.connectors_ordered().filter(|c| !c.is_deleted())
    }

    /// Current state of an entity, if it exists.
    pub fn snapshot_of(&self, entity: EntityId) -> Option<EntitySnapshot> {
        match entity {
            EntityId::Shape(id) => self.shapes.get(&id).cloned().map(EntitySnapshot::Shape),
            EntityId::Connector(id) => self.connectors.get(&id).cloned().map(EntitySnapshot::Connector),
        }
    }

    /// Live connectors with at least one end bound to `shape_id`.
    pub fn connectors_bound_to(&self, shape_id: ShapeId) -> impl Iterator<Item = &Connector> {
        self.visible_connectors().filter(move |c| c.is_bound_to(shape_id))
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        match entity {
            EntityId::Shape(id) => self.shapes.contains_key(&id),
            EntityId::Connector(id) => self.connectors.contains_key(&id),
        }
    }

    /// Visible shapes under `point`, front to back.
    pub fn shapes_at_point(&self, point: Point, tolerance: f64) -> Vec<ShapeId> {
        self.shape_order
            .iter()
            .rev()
            .filter_map(|id| self.shapes.get(id))
            .filter(|s| !s.is_deleted() && s.hit_test(point, tolerance))
            .map(|s| s.id())
            .collect()
    }

    /// Nearest visible anchor strictly within `threshold` of `point`.
    pub fn find_nearest_anchor(&self, point: Point, threshold: f64) -> Option<AnchorHit> {
        find_nearest_anchor(point, self.shapes_ordered(), threshold)
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty() && self.connectors.is_empty()
    }

    // --- Entity mutation ---

    /// Insert or replace a shape by id, then re-attach connectors bound to it.
    /// Returns the connectors whose endpoints moved.
    pub fn upsert_shape(&mut self, mut shape: Shape) -> Vec<ConnectorId> {
        shape.refresh_anchors();
        let id = shape.id();
        if self.shapes.insert(id, shape).is_none() {
            self.shape_order.push(id);
        }
        self.reattach(id)
    }

    /// Insert or replace a connector by id.
    ///
    /// Bindings to missing shapes or out-of-range anchors are dropped; bound
    /// endpoints are moved onto their anchors.
    pub fn upsert_connector(&mut self, mut connector: Connector) {
        attach_endpoints(&mut connector, &self.shapes, None);
        let id = connector.id();
        if self.connectors.insert(id, connector).is_none() {
            self.connector_order.push(id);
        }
    }

    /// Patch a shape and cascade to bound connectors.
    pub fn update_shape(&mut self, id: ShapeId, patch: ShapePatch) -> BoardResult<Vec<ConnectorId>> {
        let shape = self.shapes.get_mut(&id).ok_or(BoardError::UnknownShape(id))?;
        shape.apply(patch);
        Ok(self.reattach(id))
    }

    /// Move a shape's top-left corner to `(x, y)`.
    pub fn move_shape(&mut self, id: ShapeId, x: f64, y: f64) -> BoardResult<Vec<ConnectorId>> {
        self.update_shape(id, ShapePatch::new().position(Point::new(x, y)))
    }

    /// Patch a connector at rest: bindings are re-validated and edges rebuilt.
    pub fn update_connector(&mut self, id: ConnectorId, patch: ConnectorPatch) -> BoardResult<()> {
        let connector = self.connectors.get_mut(&id).ok_or(BoardError::UnknownConnector(id))?;
        connector.apply(patch)?;
        attach_endpoints(connector, &self.shapes, None);
        connector.recalculate_edges()?;
        Ok(())
    }

    /// Set the tombstone on an entity. Returns its state before the change.
    pub fn soft_delete(&mut self, entity: EntityId) -> BoardResult<EntitySnapshot> {
        let before = self.set_deleted(entity, true)?;
        self.interaction.forget(entity);
        Ok(before)
    }

    /// Clear the tombstone on an entity. Undeleting a shape re-attaches the
    /// connectors bound to it; the returned ids are those that moved.
    pub fn soft_undelete(&mut self, entity: EntityId) -> BoardResult<Vec<ConnectorId>> {
        self.set_deleted(entity, false)?;
        Ok(match entity {
            EntityId::Shape(id) => self.reattach(id),
            EntityId::Connector(id) => {
                if let Some(connector) = self.connectors.get_mut(&id) {
                    attach_endpoints(connector, &self.shapes, None);
                }
                Vec::new()
            }
        })
    }

    fn set_deleted(&mut self, entity: EntityId, deleted: bool) -> BoardResult<EntitySnapshot> {
        match entity {
            EntityId::Shape(id) => {
                let shape = self.shapes.get_mut(&id).ok_or(BoardError::UnknownShape(id))?;
                let before = EntitySnapshot::Shape(shape.clone());
                shape.deleted = deleted;
                Ok(before)
            }
            EntityId::Connector(id) => {
                let connector = self.connectors.get_mut(&id).ok_or(BoardError::UnknownConnector(id))?;
                let before = EntitySnapshot::Connector(connector.clone());
                connector.deleted = deleted;
                Ok(before)
            }
        }
    }

    /// Reinstate a snapshot as the entity's current state.
    pub fn restore(&mut self, snapshot: EntitySnapshot) -> Vec<ConnectorId> {
        if snapshot.is_deleted() {
            self.interaction.forget(snapshot.id());
        }
        match snapshot {
            EntitySnapshot::Shape(shape) => self.upsert_shape(shape),
            EntitySnapshot::Connector(connector) => {
                self.upsert_connector(connector);
                Vec::new()
            }
        }
    }

    /// Recompute the endpoints of every live connector bound to `shape_id`.
    /// Bindings to a tombstoned shape stay dormant until it is undeleted.
    fn reattach(&mut self, shape_id: ShapeId) -> Vec<ConnectorId> {
        if self.shapes.get(&shape_id).is_none_or(|s| s.is_deleted()) {
            return Vec::new();
        }
        let mut moved = Vec::new();
        for id in &self.connector_order {
            let Some(connector) = self.connectors.get_mut(id) else {
                continue;
            };
            if connector.is_deleted() || !connector.is_bound_to(shape_id) {
                continue;
            }
            if attach_endpoints(connector, &self.shapes, Some(shape_id)) {
                moved.push(*id);
            }
        }
        if !moved.is_empty() {
            log::debug!("Shape {} moved {} bound connectors", shape_id, moved.len());
        }
        moved
    }

    // --- Connector endpoints and gestures ---

    /// Attach or detach one endpoint. Attaching moves the endpoint onto the
    /// anchor and rebuilds edges.
    pub fn bind_endpoint(
        &mut self,
        id: ConnectorId,
        end: ConnectorEnd,
        binding: Option<AnchorBinding>,
    ) -> BoardResult<()> {
        let target = match binding {
            Some(b) => {
                let shape = self.shapes.get(&b.shape_id).ok_or(BoardError::UnknownShape(b.shape_id))?;
                if shape.is_deleted() {
                    return Err(BoardError::ShapeDeleted(b.shape_id));
                }
                Some(anchor_position(shape, b.anchor_index)?)
            }
            None => None,
        };
        let connector = self.connectors.get_mut(&id).ok_or(BoardError::UnknownConnector(id))?;
        connector.set_binding(end, binding);
        if let Some(target) = target {
            *connector = update_connector_endpoint(connector, end, target)?;
            connector.recalculate_edges()?;
        }
        Ok(())
    }

    /// Bind a free endpoint to the nearest anchor within `threshold`.
    pub fn snap_endpoint(
        &mut self,
        id: ConnectorId,
        end: ConnectorEnd,
        threshold: f64,
    ) -> BoardResult<Option<AnchorHit>> {
        let connector = self.connectors.get(&id).ok_or(BoardError::UnknownConnector(id))?;
        if connector.binding(end).is_some() {
            return Ok(None);
        }
        let Some(hit) = self.find_nearest_anchor(connector.endpoint(end), threshold) else {
            return Ok(None);
        };
        self.bind_endpoint(id, end, Some(AnchorBinding::new(hit.shape_id, hit.anchor_index)))?;
        Ok(Some(hit))
    }

    /// Drag an endpoint. A dragged endpoint is detached from its shape; edges
    /// are rebuilt by [`Board::finish_connector_drag`].
    pub fn drag_connector_endpoint(&mut self, id: ConnectorId, end: ConnectorEnd, position: Point) -> BoardResult<()> {
        let connector = self.connectors.get_mut(&id).ok_or(BoardError::UnknownConnector(id))?;
        connector.set_binding(end, None);
        *connector = update_connector_endpoint(connector, end, position)?;
        Ok(())
    }

    pub fn drag_connector_edge(&mut self, id: ConnectorId, edge: &Edge, position: Point) -> BoardResult<()> {
        let connector = self.connectors.get_mut(&id).ok_or(BoardError::UnknownConnector(id))?;
        *connector = update_connector_interior_edge(connector, edge, position)?;
        Ok(())
    }

    pub fn extrude_connector_edge(
        &mut self,
        id: ConnectorId,
        edge: &ExtrudableEdge,
        position: Point,
    ) -> BoardResult<()> {
        let connector = self.connectors.get_mut(&id).ok_or(BoardError::UnknownConnector(id))?;
        *connector = extrude_connector_edge(connector, edge, position)?;
        Ok(())
    }

    /// End a drag gesture on a connector: clear the drag session and rebuild edges.
    pub fn finish_connector_drag(&mut self, id: ConnectorId) -> BoardResult<()> {
        let connector = self.connectors.get_mut(&id).ok_or(BoardError::UnknownConnector(id))?;
        connector.finish_drag()?;
        if self.interaction.drag.connector() == Some(id) {
            self.interaction.drag = DragTarget::None;
        }
        Ok(())
    }

    // --- Shape links ---

    /// Link `child` under `parent`. Both shapes change.
    pub fn link_shapes(&mut self, parent: ShapeId, child: ShapeId, color: SerializableColor) -> BoardResult<()> {
        if !self.shapes.contains_key(&child) {
            return Err(BoardError::UnknownShape(child));
        }
        let p = self.shapes.get_mut(&parent).ok_or(BoardError::UnknownShape(parent))?;
        p.add_child_link(ChildLink { child, color });
        if let Some(c) = self.shapes.get_mut(&child) {
            c.add_parent(parent);
        }
        Ok(())
    }

    /// Remove a parent/child link. Returns whether a link existed.
    pub fn unlink_shapes(&mut self, parent: ShapeId, child: ShapeId) -> BoardResult<bool> {
        if !self.shapes.contains_key(&child) {
            return Err(BoardError::UnknownShape(child));
        }
        let p = self.shapes.get_mut(&parent).ok_or(BoardError::UnknownShape(parent))?;
        let removed_child = p.remove_child_link(child);
        let removed_parent = self.shapes.get_mut(&child).is_some_and(|c| c.remove_parent(parent));
        Ok(removed_child || removed_parent)
    }

    // --- Z-order ---

    /// Bring a shape to the front (topmost).
    pub fn bring_to_front(&mut self, id: ShapeId) -> bool {
        if !self.shapes.contains_key(&id) {
            return false;
        }
        self.shape_order.retain(|&shape_id| shape_id != id);
        self.shape_order.push(id);
        true
    }

    /// Send a shape to the back (bottommost).
    pub fn send_to_back(&mut self, id: ShapeId) -> bool {
        if !self.shapes.contains_key(&id) {
            return false;
        }
        self.shape_order.retain(|&shape_id| shape_id != id);
        self.shape_order.insert(0, id);
        true
    }

    // --- Interaction state ---

    pub fn selection(&self) -> Selection {
        self.interaction.selection
    }

    /// Select a visible shape, clearing any connector selection.
    pub fn select_shape(&mut self, id: ShapeId) -> BoardResult<()> {
        match self.shapes.get(&id) {
            Some(s) if !s.is_deleted() => {
                self.interaction.selection = Selection::Shape(id);
                Ok(())
            }
            Some(_) => Err(BoardError::ShapeDeleted(id)),
            None => Err(BoardError::UnknownShape(id)),
        }
    }

    /// Select a visible connector, clearing any shape selection.
    pub fn select_connector(&mut self, id: ConnectorId) -> BoardResult<()> {
        match self.connectors.get(&id) {
            Some(c) if !c.is_deleted() => {
                self.interaction.selection = Selection::Connector(id);
                Ok(())
            }
            _ => Err(BoardError::UnknownConnector(id)),
        }
    }

    pub fn clear_selection(&mut self) {
        self.interaction.selection = Selection::None;
    }

    pub fn tool(&self) -> ToolKind {
        self.interaction.tool
    }

    pub fn set_tool(&mut self, tool: ToolKind) {
        self.interaction.tool = tool;
    }

    pub fn drag_target(&self) -> DragTarget {
        self.interaction.drag
    }

    pub fn set_drag_target(&mut self, target: DragTarget) {
        self.interaction.drag = target;
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    // --- Rendering ---

    /// Drive a renderer over visible shapes (back to front) then connectors.
    pub fn render(&self, renderer: &mut dyn SceneRenderer) {
        for shape in self.visible_shapes() {
            renderer.draw_shape(shape);
        }
        for connector in self.visible_connectors() {
            renderer.draw_connector(connector, &connector.to_path());
        }
    }
}

/// Move bound endpoints of `connector` onto their anchors, optionally only
/// those bound to `only`. Invalid bindings are dropped. Returns whether the
/// connector changed.
fn attach_endpoints(connector: &mut Connector, shapes: &HashMap<ShapeId, Shape>, only: Option<ShapeId>) -> bool {
    let mut changed = false;
    for end in [ConnectorEnd::Start, ConnectorEnd::End] {
        let Some(binding) = connector.binding(end) else {
            continue;
        };
        if only.is_some_and(|id| id != binding.shape_id) {
            continue;
        }
        let Some(shape) = shapes.get(&binding.shape_id) else {
            log::warn!(
                "Connector {} bound to missing shape {}, detaching",
                connector.id(),
                binding.shape_id
            );
            connector.set_binding(end, None);
            changed = true;
            continue;
        };
        if shape.is_deleted() {
            continue;
        }
        let target = match anchor_position(shape, binding.anchor_index) {
            Ok(target) => target,
            Err(e) => {
                log::warn!("Connector {} has invalid binding: {}, detaching", connector.id(), e);
                connector.set_binding(end, None);
                changed = true;
                continue;
            }
        };
        if connector.endpoint(end) != target {
            match update_connector_endpoint(connector, end, target) {
                Ok(next) => {
                    *connector = next;
                    changed = true;
                }
                Err(e) => log::warn!("Failed to move endpoint of connector {}: {}", connector.id(), e),
            }
        }
    }
    if changed {
        if let Err(e) = connector.recalculate_edges() {
            log::warn!("Failed to rebuild edges of connector {}: {}", connector.id(), e);
        }
    }
    changed
}

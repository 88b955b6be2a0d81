//! Tool, selection and drag-target state for one client.

use crate::geometry::Edge;
use crate::shapes::{ConnectorEnd, ConnectorId, EntityId, ShapeId, ShapeKind};
use serde::{Deserialize, Serialize};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ToolKind {
    #[default]
    Select,
    Pan,
    Rectangle,
    Ellipse,
    Polygon,
    StickyNote,
    Text,
    Connector,
}

impl ToolKind {
    /// Shape kind created by this tool, if it draws shapes.
    pub fn shape_kind(self) -> Option<ShapeKind> {
        match self {
            ToolKind::Rectangle => Some(ShapeKind::Rectangle),
            ToolKind::Ellipse => Some(ShapeKind::Ellipse),
            ToolKind::Polygon => Some(ShapeKind::polygon(3)),
            ToolKind::StickyNote => Some(ShapeKind::StickyNote),
            ToolKind::Text => Some(ShapeKind::Text),
            ToolKind::Select | ToolKind::Pan | ToolKind::Connector => None,
        }
    }
}

/// The single focused entity. Shape and connector selection exclude each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Selection {
    #[default]
    None,
    Shape(ShapeId),
    Connector(ConnectorId),
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        matches!(self, Selection::None)
    }

    pub fn entity(&self) -> Option<EntityId> {
        match *self {
            Selection::None => None,
            Selection::Shape(id) => Some(EntityId::Shape(id)),
            Selection::Connector(id) => Some(EntityId::Connector(id)),
        }
    }

    /// Whether `entity` is the current selection.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entity() == Some(entity)
    }
}

/// What the pointer is currently dragging.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragTarget {
    #[default]
    None,
    Shape(ShapeId),
    ConnectorEndpoint { id: ConnectorId, end: ConnectorEnd },
    ConnectorEdge { id: ConnectorId, edge: Edge },
    ConnectorExtrusion { id: ConnectorId, end: ConnectorEnd },
}

impl DragTarget {
    /// Connector being dragged, if any.
    pub fn connector(&self) -> Option<ConnectorId> {
        match *self {
            DragTarget::ConnectorEndpoint { id, .. }
            | DragTarget::ConnectorEdge { id, .. }
            | DragTarget::ConnectorExtrusion { id, .. } => Some(id),
            DragTarget::None | DragTarget::Shape(_) => None,
        }
    }
}

/// UI-facing interaction state held by the board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interaction {
    pub tool: ToolKind,
    pub selection: Selection,
    pub drag: DragTarget,
}

impl Interaction {
    /// Drop any selection or drag that refers to `entity`.
    pub(crate) fn forget(&mut self, entity: EntityId) {
        if self.selection.contains(entity) {
            self.selection = Selection::None;
        }
        let dragging = match (self.drag, entity) {
            (DragTarget::Shape(id), EntityId::Shape(other)) => id == other,
            (drag, EntityId::Connector(other)) => drag.connector() == Some(other),
            _ => false,
        };
        if dragging {
            self.drag = DragTarget::None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_tool_shape_kinds() {
        assert_eq!(ToolKind::Rectangle.shape_kind(), Some(ShapeKind::Rectangle));
        assert_eq!(ToolKind::Polygon.shape_kind(), Some(ShapeKind::Polygon { sides: 3 }));
        assert_eq!(ToolKind::Connector.shape_kind(), None);
    }

    #[test]
    fn test_forget_clears_selection_and_drag() {
        let id = Uuid::new_v4();
        let mut state = Interaction {
            tool: ToolKind::Select,
            selection: Selection::Connector(id),
            drag: DragTarget::ConnectorEndpoint { id, end: ConnectorEnd::End },
        };
        state.forget(EntityId::Shape(id));
        assert_eq!(state.selection, Selection::Connector(id));
        state.forget(EntityId::Connector(id));
        assert_eq!(state.selection, Selection::None);
        assert_eq!(state.drag, DragTarget::None);
    }
}

//! Orthogonal connectors between shapes.

use super::{ConnectorId, SerializableColor, ShapeId, StrokeStyle};
use crate::geometry::{Edge, ExtrudableEdge, GeometryError, GeometryResult, recalculate_edges};
use kurbo::{BezPath, Point};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Drawing command for a connector point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathCommand {
    Move,
    Line,
}

/// One vertex of a connector polyline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub command: PathCommand,
    pub x: f64,
    pub y: f64,
}

impl PathPoint {
    pub fn move_to(p: Point) -> Self {
        Self { command: PathCommand::Move, x: p.x, y: p.y }
    }

    pub fn line_to(p: Point) -> Self {
        Self { command: PathCommand::Line, x: p.x, y: p.y }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub(crate) fn set(&mut self, p: Point) {
        self.x = p.x;
        self.y = p.y;
    }
}

/// Which end of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorEnd {
    Start,
    End,
}

impl ConnectorEnd {
    /// Index of this endpoint in a polyline of `len` points.
    pub fn index(self, len: usize) -> usize {
        match self {
            ConnectorEnd::Start => 0,
            ConnectorEnd::End => len.saturating_sub(1),
        }
    }

    /// Index of the point adjacent to this endpoint.
    pub fn neighbor_index(self, len: usize) -> usize {
        match self {
            ConnectorEnd::Start => 1,
            ConnectorEnd::End => len.saturating_sub(2),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            ConnectorEnd::Start => ConnectorEnd::End,
            ConnectorEnd::End => ConnectorEnd::Start,
        }
    }
}

/// Attachment of a connector endpoint to a shape anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorBinding {
    pub shape_id: ShapeId,
    pub anchor_index: usize,
}

impl AnchorBinding {
    pub fn new(shape_id: ShapeId, anchor_index: usize) -> Self {
        Self { shape_id, anchor_index }
    }
}

/// Style properties for connectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorStyle {
    pub stroke_color: SerializableColor,
    pub stroke_width: f64,
    #[serde(default)]
    pub stroke_style: StrokeStyle,
}

impl ConnectorStyle {
    pub fn dash_pattern(&self) -> Vec<f64> {
        self.stroke_style.dash_pattern(self.stroke_width)
    }
}

impl Default for ConnectorStyle {
    fn default() -> Self {
        Self {
            stroke_color: SerializableColor::black(),
            stroke_width: 2.0,
            stroke_style: StrokeStyle::Solid,
        }
    }
}

/// Transient state of an in-progress extrude gesture.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DragSession {
    /// A segment has already been inserted during this gesture.
    pub extruded: bool,
    /// The re-indexed edge that subsequent drag events move.
    pub active_edge: Option<ExtrudableEdge>,
}

/// A path linking two points, optionally anchored to shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConnectorFields")]
pub struct Connector {
    pub(crate) id: ConnectorId,
    pub(crate) points: Vec<PathPoint>,
    #[serde(skip_serializing)]
    pub(crate) edges: Vec<Edge>,
    #[serde(skip_serializing)]
    pub(crate) extrudable_edges: Vec<ExtrudableEdge>,
    start: Option<AnchorBinding>,
    end: Option<AnchorBinding>,
    style: ConnectorStyle,
    #[serde(skip_serializing)]
    pub(crate) drag: DragSession,
    pub(crate) deleted: bool,
}

/// Serialized attributes of a connector; derived edges are rebuilt on load.
#[derive(Deserialize)]
struct ConnectorFields {
    id: ConnectorId,
    points: Vec<PathPoint>,
    #[serde(default)]
    start: Option<AnchorBinding>,
    #[serde(default)]
    end: Option<AnchorBinding>,
    #[serde(default)]
    style: ConnectorStyle,
    #[serde(default)]
    deleted: bool,
}

impl TryFrom<ConnectorFields> for Connector {
    type Error = GeometryError;

    fn try_from(f: ConnectorFields) -> Result<Self, Self::Error> {
        let set = recalculate_edges(&f.points)?;
        Ok(Self {
            id: f.id,
            points: f.points,
            edges: set.edges,
            extrudable_edges: set.extrudable,
            start: f.start,
            end: f.end,
            style: f.style,
            drag: DragSession::default(),
            deleted: f.deleted,
        })
    }
}

impl Connector {
    /// Create a connector through `points` (at least two).
    pub fn new(points: Vec<Point>) -> GeometryResult<Self> {
        let points: Vec<PathPoint> = points
            .into_iter()
            .enumerate()
            .map(|(i, p)| if i == 0 { PathPoint::move_to(p) } else { PathPoint::line_to(p) })
            .collect();
        let set = recalculate_edges(&points)?;
        Ok(Self {
            id: Uuid::new_v4(),
            points,
            edges: set.edges,
            extrudable_edges: set.extrudable,
            start: None,
            end: None,
            style: ConnectorStyle::default(),
            drag: DragSession::default(),
            deleted: false,
        })
    }

    /// Create a straight two-point connector.
    pub fn between(start: Point, end: Point) -> Self {
        let points = vec![PathPoint::move_to(start), PathPoint::line_to(end)];
        let mut connector = Self {
            id: Uuid::new_v4(),
            points,
            edges: Vec::new(),
            extrudable_edges: Vec::new(),
            start: None,
            end: None,
            style: ConnectorStyle::default(),
            drag: DragSession::default(),
            deleted: false,
        };
        // Two points always form a valid polyline.
        if let Ok(set) = recalculate_edges(&connector.points) {
            connector.edges = set.edges;
            connector.extrudable_edges = set.extrudable;
        }
        connector
    }

    /// Builder-style anchor bindings.
    pub fn with_bindings(mut self, start: Option<AnchorBinding>, end: Option<AnchorBinding>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn id(&self) -> ConnectorId {
        self.id
    }

    pub fn points(&self) -> &[PathPoint] {
        &self.points
    }

    /// Interior edges (draggable along one axis).
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// End segments that can be pulled out into a new segment.
    pub fn extrudable_edges(&self) -> &[ExtrudableEdge] {
        &self.extrudable_edges
    }

    pub fn extrudable_edge(&self, end: ConnectorEnd) -> Option<ExtrudableEdge> {
        self.extrudable_edges.iter().copied().find(|e| e.end == end)
    }

    pub fn binding(&self, end: ConnectorEnd) -> Option<AnchorBinding> {
        match end {
            ConnectorEnd::Start => self.start,
            ConnectorEnd::End => self.end,
        }
    }

    /// Whether either endpoint is bound to `shape_id`.
    pub fn is_bound_to(&self, shape_id: ShapeId) -> bool {
        self.start.is_some_and(|b| b.shape_id == shape_id) || self.end.is_some_and(|b| b.shape_id == shape_id)
    }

    pub fn endpoint(&self, end: ConnectorEnd) -> Point {
        self.points[end.index(self.points.len())].point()
    }

    pub fn style(&self) -> &ConnectorStyle {
        &self.style
    }

    pub fn drag_session(&self) -> DragSession {
        self.drag
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Apply a patch in place. Derived edges are not recomputed; callers that
    /// change points call [`Connector::recalculate_edges`] once at rest.
    pub fn apply(&mut self, patch: ConnectorPatch) -> GeometryResult<()> {
        if let Some(points) = patch.points {
            if points.len() < 2 {
                return Err(GeometryError::TooFewPoints(points.len()));
            }
            self.points = points;
        }
        if let Some(start) = patch.start {
            self.start = start;
        }
        if let Some(end) = patch.end {
            self.end = end;
        }
        if let Some(style) = patch.style {
            self.style = style;
        }
        Ok(())
    }

    /// Return a patched copy.
    pub fn with(&self, patch: ConnectorPatch) -> GeometryResult<Self> {
        let mut next = self.clone();
        next.apply(patch)?;
        Ok(next)
    }

    pub fn with_deleted(&self, deleted: bool) -> Self {
        Self {
            deleted,
            ..self.clone()
        }
    }

    /// Rebuild the interior and extrudable edge sets from the current points.
    pub fn recalculate_edges(&mut self) -> GeometryResult<()> {
        let set = recalculate_edges(&self.points)?;
        self.edges = set.edges;
        self.extrudable_edges = set.extrudable;
        Ok(())
    }

    /// End the current drag gesture: clear the extrusion flag and rebuild edges.
    pub fn finish_drag(&mut self) -> GeometryResult<()> {
        self.drag = DragSession::default();
        self.recalculate_edges()
    }

    pub(crate) fn set_binding(&mut self, end: ConnectorEnd, binding: Option<AnchorBinding>) {
        match end {
            ConnectorEnd::Start => self.start = binding,
            ConnectorEnd::End => self.end = binding,
        }
    }

    /// Get the path representation for rendering.
    pub fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        for p in &self.points {
            match p.command {
                PathCommand::Move => path.move_to(p.point()),
                PathCommand::Line => path.line_to(p.point()),
            }
        }
        path
    }
}

/// Partial attribute update for a [`Connector`].
///
/// Bindings use a nested option: `Some(None)` detaches an endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectorPatch {
    pub points: Option<Vec<PathPoint>>,
    pub start: Option<Option<AnchorBinding>>,
    pub end: Option<Option<AnchorBinding>>,
    pub style: Option<ConnectorStyle>,
}

impl ConnectorPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(mut self, points: Vec<PathPoint>) -> Self {
        self.points = Some(points);
        self
    }

    pub fn binding(mut self, end: ConnectorEnd, binding: Option<AnchorBinding>) -> Self {
        match end {
            ConnectorEnd::Start => self.start = Some(binding),
            ConnectorEnd::End => self.end = Some(binding),
        }
        self
    }

    pub fn style(mut self, style: ConnectorStyle) -> Self {
        self.style = Some(style);
        self
    }
}

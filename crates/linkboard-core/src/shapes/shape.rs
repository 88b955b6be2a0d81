//! Shape nodes.

use super::{SerializableColor, ShapeId, TextContent};
use crate::geometry::{AnchorPoint, compute_anchor_points};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Geometric kind of a shape. Drives anchor layout and bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    /// Regular polygon. `width`/`height` are the horizontal/vertical radii.
    Polygon { sides: u8 },
    StickyNote,
    Text,
}

impl ShapeKind {
    /// Polygons with fewer than 3 sides are clamped to triangles.
    pub fn polygon(sides: u8) -> Self {
        ShapeKind::Polygon { sides: sides.max(3) }
    }

    /// Whether anchor offsets are measured from the shape center rather than
    /// its top-left corner.
    pub fn is_center_anchored(&self) -> bool {
        matches!(self, ShapeKind::Ellipse | ShapeKind::Polygon { .. })
    }
}

/// Style properties for shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    /// Fill color (None = no fill).
    pub fill_color: Option<SerializableColor>,
    pub stroke_color: SerializableColor,
    pub stroke_width: f64,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            fill_color: None,
            stroke_color: SerializableColor::black(),
            stroke_width: 2.0,
        }
    }
}

/// Outgoing graph link from a parent shape to a child shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChildLink {
    pub child: ShapeId,
    /// Color of the link line drawn between parent and child.
    pub color: SerializableColor,
}

/// A node in the diagram.
///
/// Geometry is only reachable through [`ShapePatch`], so the derived anchor
/// points can never drift from the shape's kind and size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ShapeFields")]
pub struct Shape {
    pub(crate) id: ShapeId,
    /// Top-left corner of the bounding box.
    position: Point,
    width: f64,
    height: f64,
    kind: ShapeKind,
    style: ShapeStyle,
    text: TextContent,
    parents: Vec<ShapeId>,
    children: Vec<ChildLink>,
    #[serde(skip_serializing)]
    anchors: Vec<AnchorPoint>,
    pub(crate) deleted: bool,
}

/// Serialized attributes of a shape; derived state is rebuilt on load.
#[derive(Deserialize)]
struct ShapeFields {
    id: ShapeId,
    position: Point,
    width: f64,
    height: f64,
    kind: ShapeKind,
    #[serde(default)]
    style: ShapeStyle,
    #[serde(default)]
    text: TextContent,
    #[serde(default)]
    parents: Vec<ShapeId>,
    #[serde(default)]
    children: Vec<ChildLink>,
    #[serde(default)]
    deleted: bool,
}

impl From<ShapeFields> for Shape {
    fn from(f: ShapeFields) -> Self {
        let mut shape = Self {
            id: f.id,
            position: f.position,
            width: f.width.max(0.0),
            height: f.height.max(0.0),
            kind: f.kind,
            style: f.style,
            text: f.text,
            parents: f.parents,
            children: f.children,
            anchors: Vec::new(),
            deleted: f.deleted,
        };
        shape.refresh_anchors();
        shape
    }
}

impl Shape {
    /// Create a new shape with a fresh id.
    pub fn new(kind: ShapeKind, position: Point, width: f64, height: f64) -> Self {
        let style = match kind {
            ShapeKind::StickyNote => ShapeStyle {
                fill_color: Some(SerializableColor::note_yellow()),
                ..ShapeStyle::default()
            },
            _ => ShapeStyle::default(),
        };
        let mut shape = Self {
            id: Uuid::new_v4(),
            position,
            width: width.max(0.0),
            height: height.max(0.0),
            kind,
            style,
            text: TextContent::default(),
            parents: Vec::new(),
            children: Vec::new(),
            anchors: Vec::new(),
            deleted: false,
        };
        shape.refresh_anchors();
        shape
    }

    pub fn rectangle(position: Point, width: f64, height: f64) -> Self {
        Self::new(ShapeKind::Rectangle, position, width, height)
    }

    pub fn ellipse(position: Point, width: f64, height: f64) -> Self {
        Self::new(ShapeKind::Ellipse, position, width, height)
    }

    pub fn polygon(sides: u8, position: Point, radius_x: f64, radius_y: f64) -> Self {
        Self::new(ShapeKind::polygon(sides), position, radius_x, radius_y)
    }

    pub fn id(&self) -> ShapeId {
        self.id
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn style(&self) -> &ShapeStyle {
        &self.style
    }

    pub fn text(&self) -> &TextContent {
        &self.text
    }

    pub fn parents(&self) -> &[ShapeId] {
        &self.parents
    }

    pub fn children(&self) -> &[ChildLink] {
        &self.children
    }

    /// Anchor points in shape-local coordinates, in anchor-index order.
    pub fn anchors(&self) -> &[AnchorPoint] {
        &self.anchors
    }

    /// Whether the shape carries a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Bounding box in world coordinates.
    pub fn bounds(&self) -> Rect {
        let (w, h) = match self.kind {
            ShapeKind::Polygon { .. } => (self.width * 2.0, self.height * 2.0),
            _ => (self.width, self.height),
        };
        Rect::new(self.position.x, self.position.y, self.position.x + w, self.position.y + h)
    }

    /// Check if a point (in world coordinates) hits this shape.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let bounds = self.bounds();
        if self.kind == ShapeKind::Ellipse {
            let rx = bounds.width() / 2.0 + tolerance;
            let ry = bounds.height() / 2.0 + tolerance;
            if rx <= 0.0 || ry <= 0.0 {
                return false;
            }
            let c = bounds.center();
            let dx = (point.x - c.x) / rx;
            let dy = (point.y - c.y) / ry;
            return dx * dx + dy * dy <= 1.0;
        }
        bounds.inflate(tolerance, tolerance).contains(point)
    }

    /// Apply a patch in place, then recompute derived state.
    pub fn apply(&mut self, patch: ShapePatch) {
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(width) = patch.width {
            self.width = width.max(0.0);
        }
        if let Some(height) = patch.height {
            self.height = height.max(0.0);
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(style) = patch.style {
            self.style = style;
        }
        if let Some(text) = patch.text {
            self.text = text;
        }
        if let Some(parents) = patch.parents {
            self.parents = parents;
        }
        if let Some(children) = patch.children {
            self.children = children;
        }
        self.refresh_anchors();
    }

    /// Return a patched copy, leaving `self` untouched.
    pub fn with(&self, patch: ShapePatch) -> Self {
        let mut next = self.clone();
        next.apply(patch);
        next
    }

    /// Copy of this shape with the tombstone set or cleared.
    pub fn with_deleted(&self, deleted: bool) -> Self {
        Self {
            deleted,
            ..self.clone()
        }
    }

    pub(crate) fn refresh_anchors(&mut self) {
        self.anchors = compute_anchor_points(self);
    }

    pub(crate) fn add_child_link(&mut self, link: ChildLink) {
        match self.children.iter_mut().find(|c| c.child == link.child) {
            Some(existing) => existing.color = link.color,
            None => self.children.push(link),
        }
    }

    pub(crate) fn add_parent(&mut self, parent: ShapeId) {
        if !self.parents.contains(&parent) {
            self.parents.push(parent);
        }
    }

    pub(crate) fn remove_child_link(&mut self, child: ShapeId) -> bool {
        let before = self.children.len();
        self.children.retain(|c| c.child != child);
        before != self.children.len()
    }

    pub(crate) fn remove_parent(&mut self, parent: ShapeId) -> bool {
        let before = self.parents.len();
        self.parents.retain(|p| *p != parent);
        before != self.parents.len()
    }
}

/// Partial attribute update for a [`Shape`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapePatch {
    pub position: Option<Point>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub kind: Option<ShapeKind>,
    pub style: Option<ShapeStyle>,
    pub text: Option<TextContent>,
    pub parents: Option<Vec<ShapeId>>,
    pub children: Option<Vec<ChildLink>>,
}

impl ShapePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(mut self, position: Point) -> Self {
        self.position = Some(position);
        self
    }

    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn kind(mut self, kind: ShapeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn style(mut self, style: ShapeStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn text(mut self, text: TextContent) -> Self {
        self.text = Some(text);
        self
    }

    pub fn parents(mut self, parents: Vec<ShapeId>) -> Self {
        self.parents = Some(parents);
        self
    }

    pub fn children(mut self, children: Vec<ChildLink>) -> Self {
        self.children = Some(children);
        self
    }

    /// Whether applying this patch can move the shape's anchors.
    pub fn affects_geometry(&self) -> bool {
        self.position.is_some() || self.width.is_some() || self.height.is_some() || self.kind.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_creation() {
        let shape = Shape::rectangle(Point::new(10.0, 20.0), 100.0, 50.0);
        assert_eq!(shape.position(), Point::new(10.0, 20.0));
        assert_eq!(shape.anchors().len(), 4);
        assert!(!shape.is_deleted());
    }

    #[test]
    fn test_sticky_note_has_fill() {
        let note = Shape::new(ShapeKind::StickyNote, Point::ZERO, 120.0, 120.0);
        assert_eq!(note.style().fill_color, Some(SerializableColor::note_yellow()));
    }

    #[test]
    fn test_polygon_sides_clamped() {
        assert_eq!(ShapeKind::polygon(1), ShapeKind::Polygon { sides: 3 });
        assert_eq!(ShapeKind::polygon(6), ShapeKind::Polygon { sides: 6 });
    }

    #[test]
    fn test_patch_recomputes_anchors() {
        let shape = Shape::rectangle(Point::ZERO, 100.0, 100.0);
        let resized = shape.with(ShapePatch::new().size(200.0, 40.0));
        assert_eq!(resized.anchors()[3].local, Point::new(200.0, 20.0));
        // Original untouched
        assert_eq!(shape.anchors()[3].local, Point::new(100.0, 50.0));
    }

    #[test]
    fn test_patch_kind_change_relayouts() {
        let mut shape = Shape::rectangle(Point::ZERO, 90.0, 60.0);
        shape.apply(ShapePatch::new().kind(ShapeKind::polygon(3)));
        assert_eq!(shape.anchors().len(), 3);
    }

    #[test]
    fn test_negative_size_clamped() {
        let shape = Shape::rectangle(Point::ZERO, 10.0, 10.0).with(ShapePatch::new().size(-5.0, 3.0));
        assert_eq!(shape.width(), 0.0);
        assert_eq!(shape.height(), 3.0);
    }

    #[test]
    fn test_affects_geometry() {
        assert!(ShapePatch::new().position(Point::ZERO).affects_geometry());
        assert!(!ShapePatch::new().style(ShapeStyle::default()).affects_geometry());
        assert!(ShapePatch::new().is_empty());
    }

    #[test]
    fn test_bounds_and_hit_test() {
        let rect = Shape::rectangle(Point::new(0.0, 0.0), 100.0, 100.0);
        assert!(rect.hit_test(Point::new(50.0, 50.0), 0.0));
        assert!(!rect.hit_test(Point::new(150.0, 50.0), 0.0));
        assert!(rect.hit_test(Point::new(105.0, 50.0), 10.0));

        let ellipse = Shape::ellipse(Point::ZERO, 100.0, 100.0);
        assert!(ellipse.hit_test(Point::new(50.0, 50.0), 0.0));
        assert!(!ellipse.hit_test(Point::new(2.0, 2.0), 0.0));

        let hexagon = Shape::polygon(6, Point::ZERO, 30.0, 20.0);
        let b = hexagon.bounds();
        assert_eq!((b.width(), b.height()), (60.0, 40.0));
    }

    #[test]
    fn test_serde_rebuilds_anchors() {
        let shape = Shape::ellipse(Point::new(5.0, 5.0), 40.0, 20.0);
        let json = serde_json::to_string(&shape).unwrap();
        assert!(!json.contains("anchors"));
        let back: Shape = serde_json::from_str(&json).unwrap();
        assert_eq!(back, shape);
    }

    #[test]
    fn test_child_links_deduplicate() {
        let mut parent = Shape::rectangle(Point::ZERO, 10.0, 10.0);
        let child = Uuid::new_v4();
        parent.add_child_link(ChildLink { child, color: SerializableColor::black() });
        parent.add_child_link(ChildLink { child, color: SerializableColor::white() });
        assert_eq!(parent.children().len(), 1);
        assert_eq!(parent.children()[0].color, SerializableColor::white());
        assert!(parent.remove_child_link(child));
        assert!(!parent.remove_child_link(child));
    }
}

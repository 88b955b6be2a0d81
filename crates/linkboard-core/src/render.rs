//! Renderer seam.
//!
//! The core never draws. A frontend implements [`SceneRenderer`] and
//! [`Board::render`](crate::Board::render) feeds it the visible entities in
//! z-order, shapes first.

use crate::shapes::{Connector, SerializableColor, Shape, ShapeKind};
use kurbo::{BezPath, Ellipse, Point, Rect, RoundedRect, Shape as _};
use peniko::Color;
use std::f64::consts::{FRAC_PI_2, TAU};

/// Corner radius used for sticky notes.
pub const STICKY_NOTE_RADIUS: f64 = 6.0;

/// Receives visible entities during [`Board::render`](crate::Board::render).
pub trait SceneRenderer {
    fn draw_shape(&mut self, shape: &Shape);

    /// `path` is the connector's polyline as produced by [`Connector::to_path`].
    fn draw_connector(&mut self, connector: &Connector, path: &BezPath);
}

/// Outline of a shape in world coordinates.
pub fn shape_outline(shape: &Shape) -> BezPath {
    let bounds = shape.bounds();
    match shape.kind() {
        ShapeKind::Rectangle | ShapeKind::Text => bounds.to_path(0.1),
        ShapeKind::StickyNote => RoundedRect::from_rect(bounds, STICKY_NOTE_RADIUS).to_path(0.1),
        ShapeKind::Ellipse => Ellipse::from_rect(bounds).to_path(0.1),
        ShapeKind::Polygon { sides } => polygon_path(bounds, sides.max(3)),
    }
}

/// Regular polygon inscribed in `bounds`, first vertex pointing up.
fn polygon_path(bounds: Rect, sides: u8) -> BezPath {
    let center = bounds.center();
    let (rx, ry) = (bounds.width() / 2.0, bounds.height() / 2.0);
    let mut path = BezPath::new();
    for i in 0..sides {
        let angle = -FRAC_PI_2 + TAU * f64::from(i) / f64::from(sides);
        let p = Point::new(center.x + rx * angle.cos(), center.y + ry * angle.sin());
        if i == 0 {
            path.move_to(p);
        } else {
            path.line_to(p);
        }
    }
    path.close_path();
    path
}

/// Paint color for a stored color.
pub fn paint(color: SerializableColor) -> Color {
    color.into()
}

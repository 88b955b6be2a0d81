//! Anchor point layout.

use super::{GeometryError, GeometryResult};
use crate::shapes::{Shape, ShapeId, ShapeKind};
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// A connector attachment location on a shape, in shape-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPoint {
    pub shape_id: ShapeId,
    pub index: usize,
    pub local: Point,
}

/// Compute the anchor points for a shape.
///
/// Count and layout depend only on kind and size. Box-anchored kinds measure
/// from the top-left corner, center-anchored kinds from the center.
pub fn compute_anchor_points(shape: &Shape) -> Vec<AnchorPoint> {
    let w = shape.width();
    let h = shape.height();
    let locals = match shape.kind() {
        ShapeKind::Rectangle | ShapeKind::StickyNote | ShapeKind::Text => vec![
            Point::new(0.0, h / 2.0),
            Point::new(w / 2.0, 0.0),
            Point::new(w / 2.0, h),
            Point::new(w, h / 2.0),
        ],
        ShapeKind::Ellipse => vec![
            Point::new(-w / 2.0, 0.0),
            Point::new(0.0, -h / 2.0),
            Point::new(0.0, h / 2.0),
            Point::new(w / 2.0, 0.0),
        ],
        ShapeKind::Polygon { sides } if sides <= 3 => {
            let base = w / 3f64.sqrt();
            vec![Point::new(0.0, h / 2.0), Point::new(base, 0.0), Point::new(-base, 0.0)]
        }
        ShapeKind::Polygon { .. } => vec![
            Point::new(-w, 0.0),
            Point::new(0.0, -h),
            Point::new(0.0, h),
            Point::new(w, 0.0),
        ],
    };
    locals
        .into_iter()
        .enumerate()
        .map(|(index, local)| AnchorPoint {
            shape_id: shape.id(),
            index,
            local,
        })
        .collect()
}

/// World-space point that anchor offsets are measured from.
pub fn anchor_origin(shape: &Shape) -> Point {
    let p = shape.position();
    match shape.kind() {
        ShapeKind::Rectangle | ShapeKind::StickyNote | ShapeKind::Text => p,
        ShapeKind::Ellipse => p + Vec2::new(shape.width() / 2.0, shape.height() / 2.0),
        ShapeKind::Polygon { .. } => p + Vec2::new(shape.width(), shape.height()),
    }
}

/// Absolute position of anchor `index` on `shape`.
pub fn anchor_position(shape: &Shape, index: usize) -> GeometryResult<Point> {
    let anchors = shape.anchors();
    let anchor = anchors.get(index).ok_or(GeometryError::AnchorOutOfRange {
        index,
        count: anchors.len(),
    })?;
    Ok(anchor_origin(shape) + anchor.local.to_vec2())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::ShapePatch;
    use proptest::prelude::*;

    fn locals(shape: &Shape) -> Vec<Point> {
        compute_anchor_points(shape).into_iter().map(|a| a.local).collect()
    }

    #[test]
    fn test_rectangle_anchors() {
        let shape = Shape::rectangle(Point::new(10.0, 10.0), 100.0, 60.0);
        assert_eq!(
            locals(&shape),
            vec![
                Point::new(0.0, 30.0),
                Point::new(50.0, 0.0),
                Point::new(50.0, 60.0),
                Point::new(100.0, 30.0),
            ]
        );
    }

    #[test]
    fn test_ellipse_anchors_relative_to_center() {
        let shape = Shape::ellipse(Point::new(0.0, 0.0), 80.0, 40.0);
        assert_eq!(
            locals(&shape),
            vec![
                Point::new(-40.0, 0.0),
                Point::new(0.0, -20.0),
                Point::new(0.0, 20.0),
                Point::new(40.0, 0.0),
            ]
        );
        assert_eq!(anchor_position(&shape, 3).unwrap(), Point::new(80.0, 20.0));
    }

    #[test]
    fn test_square_polygon_anchors() {
        let shape = Shape::polygon(4, Point::ZERO, 30.0, 20.0);
        assert_eq!(
            locals(&shape),
            vec![
                Point::new(-30.0, 0.0),
                Point::new(0.0, -20.0),
                Point::new(0.0, 20.0),
                Point::new(30.0, 0.0),
            ]
        );
        assert_eq!(anchor_position(&shape, 0).unwrap(), Point::new(0.0, 20.0));
    }

    #[test]
    fn test_text_and_note_use_box_layout() {
        let note = Shape::new(ShapeKind::StickyNote, Point::ZERO, 40.0, 40.0);
        let text = Shape::new(ShapeKind::Text, Point::ZERO, 40.0, 40.0);
        let rect = Shape::rectangle(Point::ZERO, 40.0, 40.0);
        assert_eq!(locals(&note), locals(&rect));
        assert_eq!(locals(&text), locals(&rect));
    }

    #[test]
    fn test_anchor_out_of_range() {
        let shape = Shape::polygon(3, Point::ZERO, 10.0, 10.0);
        assert_eq!(
            anchor_position(&shape, 3),
            Err(GeometryError::AnchorOutOfRange { index: 3, count: 3 })
        );
    }

    #[test]
    fn test_anchors_follow_resize() {
        let shape = Shape::rectangle(Point::ZERO, 10.0, 10.0).with(ShapePatch::new().size(40.0, 20.0));
        assert_eq!(shape.anchors(), compute_anchor_points(&shape).as_slice());
    }

    proptest! {
        #[test]
        fn prop_rectangle_layout(w in 0.0f64..5000.0, h in 0.0f64..5000.0, x in -1e4f64..1e4, y in -1e4f64..1e4) {
            let shape = Shape::rectangle(Point::new(x, y), w, h);
            let expected = vec![
                Point::new(0.0, h / 2.0),
                Point::new(w / 2.0, 0.0),
                Point::new(w / 2.0, h),
                Point::new(w, h / 2.0),
            ];
            prop_assert_eq!(locals(&shape), expected);
        }

        #[test]
        fn prop_triangle_layout(w in 0.0f64..5000.0, h in 0.0f64..5000.0) {
            let shape = Shape::polygon(3, Point::ZERO, w, h);
            let base = w / 3f64.sqrt();
            let expected = vec![Point::new(0.0, h / 2.0), Point::new(base, 0.0), Point::new(-base, 0.0)];
            prop_assert_eq!(locals(&shape), expected);
        }

        #[test]
        fn prop_anchor_layout_idempotent(w in 0.0f64..5000.0, h in 0.0f64..5000.0, sides in 0u8..12) {
            let kinds = [
                ShapeKind::Rectangle,
                ShapeKind::Ellipse,
                ShapeKind::polygon(sides),
                ShapeKind::StickyNote,
                ShapeKind::Text,
            ];
            for kind in kinds {
                let shape = Shape::new(kind, Point::ZERO, w, h);
                prop_assert_eq!(compute_anchor_points(&shape), compute_anchor_points(&shape));
                prop_assert_eq!(shape.anchors().to_vec(), compute_anchor_points(&shape));
            }
        }
    }
}

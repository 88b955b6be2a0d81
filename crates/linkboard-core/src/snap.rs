//! Snapping connector endpoints to shape anchors.

use crate::geometry::anchor_origin;
use crate::shapes::{Shape, ShapeId};
use kurbo::Point;

/// Distance threshold for anchor snapping (in world units).
pub const SNAP_THRESHOLD: f64 = 10.0;

/// An anchor that a point snapped to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorHit {
    pub shape_id: ShapeId,
    pub anchor_index: usize,
    /// Absolute position of the anchor.
    pub position: Point,
    /// Distance from the query point.
    pub distance: f64,
}

/// Find the anchor nearest to `point` that lies strictly within `threshold`.
///
/// Scans shapes in iteration order, then anchors by index. The first anchor at
/// the minimum distance wins. Tombstoned shapes are skipped.
pub fn find_nearest_anchor<'a, I>(point: Point, shapes: I, threshold: f64) -> Option<AnchorHit>
where
    I: IntoIterator<Item = &'a Shape>,
{
    let mut best: Option<AnchorHit> = None;
    let mut best_dist_sq = threshold * threshold;

    for shape in shapes.into_iter().filter(|s| !s.is_deleted()) {
        let origin = anchor_origin(shape);
        for anchor in shape.anchors() {
            let position = origin + anchor.local.to_vec2();
            let dist_sq = (point - position).hypot2();
            if dist_sq < best_dist_sq {
                best_dist_sq = dist_sq;
                best = Some(AnchorHit {
                    shape_id: shape.id(),
                    anchor_index: anchor.index,
                    position,
                    distance: 0.0,
                });
            }
        }
    }

    best.map(|hit| AnchorHit {
        distance: best_dist_sq.sqrt(),
        ..hit
    })
}

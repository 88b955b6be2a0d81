//! Orthogonal connector path editing.
//!
//! A connector is an axis-aligned polyline. Its two end segments are
//! *extrudable*: dragging one perpendicular to itself inserts a new segment so
//! the bound endpoint stays put. Every segment between the end segments is an
//! *interior edge* that slides along a single axis.

use super::{GeometryError, GeometryResult};
use crate::shapes::{Connector, ConnectorEnd, DragSession, PathPoint};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Coordinates closer than this count as equal when classifying segments.
const AXIS_EPSILON: f64 = 1e-9;

fn same(a: f64, b: f64) -> bool {
    (a - b).abs() < AXIS_EPSILON
}

/// The coordinate a segment drag changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Drag axis of the segment `a`-`b`: the axis on which the two points are
    /// equal. A horizontal pair (equal y) drags vertically.
    pub fn of_segment(a: Point, b: Point) -> Self {
        if same(a.y, b.y) { Axis::Y } else { Axis::X }
    }

    pub fn other(self) -> Self {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }

    pub fn coordinate(self, p: Point) -> f64 {
        match self {
            Axis::X => p.x,
            Axis::Y => p.y,
        }
    }

    fn set(self, p: &mut PathPoint, value: f64) {
        match self {
            Axis::X => p.x = value,
            Axis::Y => p.y = value,
        }
    }
}

/// A segment between two consecutive connector points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub start: usize,
    pub end: usize,
    pub axis: Axis,
}

impl Edge {
    fn segment(points: &[PathPoint], start: usize) -> Self {
        Self {
            start,
            end: start + 1,
            axis: Axis::of_segment(points[start].point(), points[start + 1].point()),
        }
    }

    /// Handle position for dragging this edge.
    pub fn midpoint(&self, points: &[PathPoint]) -> Option<Point> {
        let a = points.get(self.start)?.point();
        let b = points.get(self.end)?.point();
        Some(a.midpoint(b))
    }

    fn validate(&self, len: usize) -> GeometryResult<()> {
        for index in [self.start, self.end] {
            if index >= len {
                return Err(GeometryError::PointOutOfRange { index, len });
            }
        }
        if self.end != self.start + 1 {
            return Err(GeometryError::NotASegment {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

/// An end segment of a connector, tagged with the end it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtrudableEdge {
    pub end: ConnectorEnd,
    pub edge: Edge,
}

/// Derived edge sets of a connector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeSet {
    pub edges: Vec<Edge>,
    pub extrudable: Vec<ExtrudableEdge>,
}

/// Derive interior and extrudable edges from a polyline.
///
/// Interior edges pair each interior point with its successor while the
/// successor is still interior. Extrudable edges are the first and last
/// segments, in that order.
pub fn recalculate_edges(points: &[PathPoint]) -> GeometryResult<EdgeSet> {
    let len = points.len();
    if len < 2 {
        return Err(GeometryError::TooFewPoints(len));
    }
    let edges = (1..len.saturating_sub(2)).map(|i| Edge::segment(points, i)).collect();
    let extrudable = vec![
        ExtrudableEdge {
            end: ConnectorEnd::Start,
            edge: Edge::segment(points, 0),
        },
        ExtrudableEdge {
            end: ConnectorEnd::End,
            edge: Edge::segment(points, len - 2),
        },
    ];
    Ok(EdgeSet { edges, extrudable })
}

/// Interior elbow points joining `start` to `end` with axis-aligned segments.
/// Empty when the two already share an axis.
pub fn route_elbow(start: Point, end: Point) -> Vec<Point> {
    if same(start.x, end.x) || same(start.y, end.y) {
        return Vec::new();
    }
    let mid_x = (start.x + end.x) / 2.0;
    vec![Point::new(mid_x, start.y), Point::new(mid_x, end.y)]
}

/// Move one endpoint of a connector, keeping the polyline orthogonal.
///
/// The neighboring point follows along the axis it shares with the old
/// endpoint, so exactly one neighbor coordinate changes when the endpoint moves
/// on that axis and none otherwise. When the neighbor is itself the far
/// endpoint, it stays put and elbow points are inserted instead.
pub fn update_connector_endpoint(
    connector: &Connector,
    end: ConnectorEnd,
    new_position: Point,
) -> GeometryResult<Connector> {
    let len = connector.points.len();
    if len < 2 {
        return Err(GeometryError::TooFewPoints(len));
    }
    let mut next = connector.clone();
    let index = end.index(len);
    let old = next.points[index].point();
    next.points[index].set(new_position);

    if len == 2 {
        let (first, last) = (next.points[0], next.points[1]);
        let elbow = route_elbow(first.point(), last.point());
        if !elbow.is_empty() {
            let mut points = Vec::with_capacity(4);
            points.push(first);
            points.extend(elbow.into_iter().map(PathPoint::line_to));
            points.push(last);
            next.points = points;
        }
        return Ok(next);
    }

    let neighbor_index = end.neighbor_index(len);
    let neighbor = next.points[neighbor_index].point();
    let axis = match (same(old.x, neighbor.x), same(old.y, neighbor.y)) {
        // Zero-length end segment: pick the axis that keeps the neighbor's
        // other segment intact.
        (true, true) => {
            let beyond_index = match end {
                ConnectorEnd::Start => neighbor_index + 1,
                ConnectorEnd::End => neighbor_index - 1,
            };
            let beyond = next.points[beyond_index].point();
            Some(Axis::of_segment(neighbor, beyond).other())
        }
        (true, false) => Some(Axis::X),
        (false, true) => Some(Axis::Y),
        (false, false) => None,
    };
    if let Some(axis) = axis {
        let value = axis.coordinate(new_position);
        if axis.coordinate(old) != value {
            axis.set(&mut next.points[neighbor_index], value);
        }
    }
    Ok(next)
}

/// Slide an interior edge: both of its points take the new coordinate on the
/// edge's drag axis.
pub fn update_connector_interior_edge(
    connector: &Connector,
    edge: &Edge,
    new_position: Point,
) -> GeometryResult<Connector> {
    let len = connector.points.len();
    edge.validate(len)?;
    if edge.start == 0 || edge.end == len - 1 {
        return Err(GeometryError::NotInterior {
            start: edge.start,
            end: edge.end,
        });
    }
    let mut next = connector.clone();
    let value = edge.axis.coordinate(new_position);
    edge.axis.set(&mut next.points[edge.start], value);
    edge.axis.set(&mut next.points[edge.end], value);
    Ok(next)
}

/// Drag an end segment outward.
///
/// The first event of a drag session inserts a new segment next to the
/// endpoint, marks the session extruded and re-indexes the extrudable edges so
/// later events move the new segment. Later events only update coordinates.
pub fn extrude_connector_edge(
    connector: &Connector,
    edge: &ExtrudableEdge,
    new_position: Point,
) -> GeometryResult<Connector> {
    let len = connector.points.len();
    if len < 2 {
        return Err(GeometryError::TooFewPoints(len));
    }
    let mut next = connector.clone();
    let active = match (next.drag.extruded, next.drag.active_edge) {
        (true, Some(active)) => active,
        _ => {
            let expected = match edge.end {
                ConnectorEnd::Start => 0,
                ConnectorEnd::End => len - 2,
            };
            if edge.edge.start != expected || edge.edge.end != expected + 1 {
                return Err(GeometryError::NotASegment {
                    start: edge.edge.start,
                    end: edge.edge.end,
                });
            }
            let active = insert_extrusion(&mut next, *edge);
            next.drag = DragSession {
                extruded: true,
                active_edge: Some(active),
            };
            active
        }
    };
    active.edge.validate(next.points.len())?;
    let value = active.edge.axis.coordinate(new_position);
    active.edge.axis.set(&mut next.points[active.edge.start], value);
    active.edge.axis.set(&mut next.points[active.edge.end], value);
    Ok(next)
}

/// Split an end segment by duplicating the endpoint next to it. A two-point
/// connector gets a duplicate at both ends so neither endpoint moves.
/// Returns the edge that now carries the drag.
fn insert_extrusion(connector: &mut Connector, edge: ExtrudableEdge) -> ExtrudableEdge {
    let len = connector.points.len();
    let axis = edge.edge.axis;
    let first = connector.points[0].point();
    let last = connector.points[len - 1].point();

    let active_segment = if len == 2 {
        connector.points = vec![
            PathPoint::move_to(first),
            PathPoint::line_to(first),
            PathPoint::line_to(last),
            PathPoint::line_to(last),
        ];
        1
    } else {
        match edge.end {
            ConnectorEnd::Start => {
                connector.points.insert(1, PathPoint::line_to(first));
                1
            }
            ConnectorEnd::End => {
                connector.points.insert(len - 1, PathPoint::line_to(last));
                len - 2
            }
        }
    };

    let new_len = connector.points.len();
    let active = ExtrudableEdge {
        end: edge.end,
        edge: Edge {
            start: active_segment,
            end: active_segment + 1,
            axis,
        },
    };
    let stub = |start: usize, points: &[PathPoint]| {
        if len == 2 {
            // Fresh zero-length stub; it runs perpendicular to the drag.
            Edge {
                start,
                end: start + 1,
                axis: axis.other(),
            }
        } else {
            Edge::segment(points, start)
        }
    };
    let other = match edge.end {
        ConnectorEnd::Start => ExtrudableEdge {
            end: ConnectorEnd::End,
            edge: stub(new_len - 2, &connector.points),
        },
        ConnectorEnd::End => ExtrudableEdge {
            end: ConnectorEnd::Start,
            edge: stub(0, &connector.points),
        },
    };
    connector.extrudable_edges = match edge.end {
        ConnectorEnd::Start => vec![active, other],
        ConnectorEnd::End => vec![other, active],
    };
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pts(c: &Connector) -> Vec<Point> {
        c.points().iter().map(|p| p.point()).collect()
    }

    fn is_orthogonal(points: &[Point]) -> bool {
        points.windows(2).all(|w| same(w[0].x, w[1].x) || same(w[0].y, w[1].y))
    }

    fn elbow_connector() -> Connector {
        Connector::new(vec![
            Point::new(0.0, 0.0),
            Point::new(50.0, 0.0),
            Point::new(50.0, 100.0),
            Point::new(100.0, 100.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_axis_rule() {
        assert_eq!(Axis::of_segment(Point::new(0.0, 5.0), Point::new(10.0, 5.0)), Axis::Y);
        assert_eq!(Axis::of_segment(Point::new(3.0, 0.0), Point::new(3.0, 10.0)), Axis::X);
    }

    #[test]
    fn test_recalculate_edges() {
        let c = elbow_connector();
        let set = recalculate_edges(c.points()).unwrap();
        assert_eq!(set.edges, vec![Edge { start: 1, end: 2, axis: Axis::X }]);
        assert_eq!(set.extrudable[0].edge, Edge { start: 0, end: 1, axis: Axis::Y });
        assert_eq!(set.extrudable[1].edge, Edge { start: 2, end: 3, axis: Axis::Y });
    }

    #[test]
    fn test_recalculate_edges_too_few_points() {
        let points = vec![PathPoint::move_to(Point::ZERO)];
        assert_eq!(recalculate_edges(&points), Err(GeometryError::TooFewPoints(1)));
    }

    #[test]
    fn test_endpoint_move_drags_neighbor() {
        let c = elbow_connector();
        let moved = update_connector_endpoint(&c, ConnectorEnd::Start, Point::new(0.0, 20.0)).unwrap();
        assert_eq!(pts(&moved)[..2], [Point::new(0.0, 20.0), Point::new(50.0, 20.0)]);
        assert_eq!(pts(&moved)[2..], pts(&c)[2..]);
        assert!(is_orthogonal(&pts(&moved)));
    }

    #[test]
    fn test_endpoint_move_along_segment_leaves_neighbor() {
        let c = elbow_connector();
        let moved = update_connector_endpoint(&c, ConnectorEnd::End, Point::new(140.0, 100.0)).unwrap();
        assert_eq!(pts(&moved)[2], Point::new(50.0, 100.0));
        assert_eq!(pts(&moved)[3], Point::new(140.0, 100.0));
    }

    #[test]
    fn test_two_point_endpoint_move_routes_elbow() {
        let c = Connector::between(Point::new(100.0, 50.0), Point::new(300.0, 50.0));
        let moved = update_connector_endpoint(&c, ConnectorEnd::Start, Point::new(100.0, 250.0)).unwrap();
        let p = pts(&moved);
        assert_eq!(p.first(), Some(&Point::new(100.0, 250.0)));
        assert_eq!(p.last(), Some(&Point::new(300.0, 50.0)));
        assert_eq!(p.len(), 4);
        assert!(is_orthogonal(&p));
    }

    #[test]
    fn test_interior_edge_drag() {
        let c = elbow_connector();
        let edge = c.edges()[0];
        let moved = update_connector_interior_edge(&c, &edge, Point::new(70.0, 999.0)).unwrap();
        assert_eq!(pts(&moved)[1], Point::new(70.0, 0.0));
        assert_eq!(pts(&moved)[2], Point::new(70.0, 100.0));
    }

    #[test]
    fn test_interior_edge_rejects_bad_indices() {
        let c = elbow_connector();
        let out = Edge { start: 3, end: 4, axis: Axis::X };
        assert_eq!(
            update_connector_interior_edge(&c, &out, Point::ZERO).unwrap_err(),
            GeometryError::PointOutOfRange { index: 4, len: 4 }
        );
        let end_segment = Edge { start: 0, end: 1, axis: Axis::Y };
        assert!(matches!(
            update_connector_interior_edge(&c, &end_segment, Point::ZERO),
            Err(GeometryError::NotInterior { .. })
        ));
    }

    #[test]
    fn test_extrude_inserts_once_per_session() {
        let c = elbow_connector();
        let edge = c.extrudable_edge(ConnectorEnd::Start).unwrap();
        let first = extrude_connector_edge(&c, &edge, Point::new(25.0, -30.0)).unwrap();
        assert_eq!(first.points().len(), 5);
        assert!(first.drag_session().extruded);
        assert_eq!(pts(&first)[0], Point::new(0.0, 0.0));
        assert_eq!(pts(&first)[1], Point::new(0.0, -30.0));
        assert_eq!(pts(&first)[2], Point::new(50.0, -30.0));

        let second = extrude_connector_edge(&first, &edge, Point::new(25.0, -60.0)).unwrap();
        assert_eq!(second.points().len(), 5);
        assert_eq!(pts(&second)[1], Point::new(0.0, -60.0));
        assert!(is_orthogonal(&pts(&second)));
    }

    #[test]
    fn test_extrude_reindexes_other_end() {
        let c = elbow_connector();
        let edge = c.extrudable_edge(ConnectorEnd::Start).unwrap();
        let moved = extrude_connector_edge(&c, &edge, Point::new(25.0, -30.0)).unwrap();
        let end = moved.extrudable_edge(ConnectorEnd::End).unwrap();
        assert_eq!((end.edge.start, end.edge.end), (3, 4));
        let start = moved.extrudable_edge(ConnectorEnd::Start).unwrap();
        assert_eq!((start.edge.start, start.edge.end), (1, 2));
    }

    #[test]
    fn test_extrude_end_segment() {
        let c = elbow_connector();
        let edge = c.extrudable_edge(ConnectorEnd::End).unwrap();
        let moved = extrude_connector_edge(&c, &edge, Point::new(75.0, 140.0)).unwrap();
        let p = pts(&moved);
        assert_eq!(p.len(), 5);
        assert_eq!(p[4], Point::new(100.0, 100.0));
        assert_eq!(p[3], Point::new(100.0, 140.0));
        assert_eq!(p[2], Point::new(50.0, 140.0));
        assert!(is_orthogonal(&p));
    }

    #[test]
    fn test_extrude_two_point_connector_keeps_both_ends() {
        let c = Connector::between(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        let edge = c.extrudable_edge(ConnectorEnd::End).unwrap();
        let moved = extrude_connector_edge(&c, &edge, Point::new(50.0, 40.0)).unwrap();
        let p = pts(&moved);
        assert_eq!(p, vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 40.0),
            Point::new(100.0, 40.0),
            Point::new(100.0, 0.0),
        ]);
    }

    #[test]
    fn test_extrude_rejects_wrong_segment() {
        let c = elbow_connector();
        let bogus = ExtrudableEdge {
            end: ConnectorEnd::Start,
            edge: Edge { start: 1, end: 2, axis: Axis::X },
        };
        assert!(matches!(
            extrude_connector_edge(&c, &bogus, Point::ZERO),
            Err(GeometryError::NotASegment { start: 1, end: 2 })
        ));
    }

    #[test]
    fn test_route_elbow() {
        assert!(route_elbow(Point::new(0.0, 0.0), Point::new(0.0, 10.0)).is_empty());
        assert_eq!(
            route_elbow(Point::new(0.0, 0.0), Point::new(10.0, 20.0)),
            vec![Point::new(5.0, 0.0), Point::new(5.0, 20.0)]
        );
    }

    /// Axis-aligned polyline with alternating segment directions.
    fn orthogonal_polyline() -> impl Strategy<Value = Vec<Point>> {
        (
            any::<bool>(),
            -500.0f64..500.0,
            -500.0f64..500.0,
            prop::collection::vec((1.0f64..200.0, any::<bool>()), 1..7),
        )
            .prop_map(|(horizontal_first, x, y, steps)| {
                let mut points = vec![Point::new(x, y)];
                let mut horizontal = horizontal_first;
                for (len, negative) in steps {
                    let d = if negative { -len } else { len };
                    let last = points[points.len() - 1];
                    points.push(if horizontal {
                        Point::new(last.x + d, last.y)
                    } else {
                        Point::new(last.x, last.y + d)
                    });
                    horizontal = !horizontal;
                }
                points
            })
    }

    proptest! {
        #[test]
        fn prop_extrude_then_recalculate_is_consistent(
            points in orthogonal_polyline(),
            start_side in any::<bool>(),
            drags in prop::collection::vec(-300.0f64..300.0, 1..4),
        ) {
            let c = Connector::new(points.clone()).unwrap();
            let end = if start_side { ConnectorEnd::Start } else { ConnectorEnd::End };
            let edge = c.extrudable_edge(end).unwrap();
            let mut moved = c.clone();
            for d in drags {
                moved = extrude_connector_edge(&moved, &edge, Point::new(d, d)).unwrap();
            }
            moved.finish_drag().unwrap();

            let p = pts(&moved);
            prop_assert!(!moved.drag_session().extruded);
            prop_assert_eq!(p[0], points[0]);
            prop_assert_eq!(p[p.len() - 1], points[points.len() - 1]);
            prop_assert!(is_orthogonal(&p));
            for e in moved.edges().iter().chain(moved.extrudable_edges().iter().map(|x| &x.edge)) {
                prop_assert!(e.end < p.len());
                prop_assert_eq!(e.end, e.start + 1);
                prop_assert_eq!(e.axis, Axis::of_segment(p[e.start], p[e.end]));
            }
            prop_assert_eq!(moved.edges().len(), p.len().saturating_sub(3));
            prop_assert_eq!(moved.extrudable_edges().len(), 2);
        }

        #[test]
        fn prop_endpoint_move_keeps_orthogonal(
            points in orthogonal_polyline(),
            start_side in any::<bool>(),
            x in -500.0f64..500.0,
            y in -500.0f64..500.0,
        ) {
            let c = Connector::new(points.clone()).unwrap();
            let end = if start_side { ConnectorEnd::Start } else { ConnectorEnd::End };
            let moved = update_connector_endpoint(&c, end, Point::new(x, y)).unwrap();
            let p = pts(&moved);
            prop_assert!(is_orthogonal(&p));
            prop_assert_eq!(moved.endpoint(end), Point::new(x, y));
            prop_assert_eq!(moved.endpoint(end.opposite()), c.endpoint(end.opposite()));
        }
    }
}

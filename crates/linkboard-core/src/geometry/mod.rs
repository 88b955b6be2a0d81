//! Geometry kernel.
//!
//! Pure functions over entity values: anchor layout per shape kind, and the
//! orthogonal connector editing operations (endpoint moves, interior edge
//! drags, end-segment extrusion, edge derivation). No state, no I/O.
//!
//! Malformed input (fewer than two points, indices out of range) is a
//! programmer error and comes back as a [`GeometryError`].

mod anchors;
mod paths;

pub use anchors::{AnchorPoint, anchor_origin, anchor_position, compute_anchor_points};
pub use paths::{
    Axis, Edge, EdgeSet, ExtrudableEdge, extrude_connector_edge, recalculate_edges, route_elbow,
    update_connector_endpoint, update_connector_interior_edge,
};

use thiserror::Error;

/// Errors from geometry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("connector needs at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("anchor index {index} out of range for shape with {count} anchors")]
    AnchorOutOfRange { index: usize, count: usize },
    #[error("point index {index} out of range for connector with {len} points")]
    PointOutOfRange { index: usize, len: usize },
    #[error("points {start}..{end} do not form a segment of this connector")]
    NotASegment { start: usize, end: usize },
    #[error("segment {start}..{end} touches an endpoint and cannot be dragged as an interior edge")]
    NotInterior { start: usize, end: usize },
}

/// Result type for geometry operations.
pub type GeometryResult<T> = Result<T, GeometryError>;

//! Entity model: shapes, connectors and the value types they share.

mod connector;
mod shape;
mod text;

pub use connector::{AnchorBinding, Connector, ConnectorEnd, ConnectorPatch, ConnectorStyle, DragSession, PathCommand, PathPoint};
pub use shape::{ChildLink, Shape, ShapeKind, ShapePatch, ShapeStyle};
pub use text::{FontFamily, FontStyle, TextAlign, TextContent};

use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for shapes.
pub type ShapeId = Uuid;

/// Unique identifier for connectors.
pub type ConnectorId = Uuid;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    /// Default sticky note background.
    pub fn note_yellow() -> Self {
        Self::new(255, 235, 130, 255)
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Stroke style for connectors and shape outlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrokeStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

impl StrokeStyle {
    /// Dash pattern (on/off lengths) scaled to the stroke width.
    /// Empty for solid strokes.
    pub fn dash_pattern(self, stroke_width: f64) -> Vec<f64> {
        let w = stroke_width.max(1.0);
        match self {
            StrokeStyle::Solid => Vec::new(),
            StrokeStyle::Dashed => vec![4.0 * w, 3.0 * w],
            StrokeStyle::Dotted => vec![w, 2.0 * w],
        }
    }
}

/// The two entity families stored on a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Shape,
    Connector,
}

/// Typed reference to any board entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityId {
    Shape(ShapeId),
    Connector(ConnectorId),
}

impl EntityId {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityId::Shape(_) => EntityKind::Shape,
            EntityId::Connector(_) => EntityKind::Connector,
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            EntityId::Shape(id) | EntityId::Connector(id) => *id,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Shape(id) => write!(f, "shape:{}", id),
            EntityId::Connector(id) => write!(f, "connector:{}", id),
        }
    }
}

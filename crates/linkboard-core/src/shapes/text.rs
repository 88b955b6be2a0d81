//! Text payload carried by shapes.

use super::SerializableColor;
use serde::{Deserialize, Serialize};

/// Font family options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FontFamily {
    #[default]
    Sans,
    Serif,
    Mono,
    Handwritten,
}

impl FontFamily {
    /// Get the font family name as used by the renderer.
    pub fn name(&self) -> &'static str {
        match self {
            FontFamily::Sans => "Noto Sans",
            FontFamily::Serif => "Noto Serif",
            FontFamily::Mono => "Noto Sans Mono",
            FontFamily::Handwritten => "GelPen",
        }
    }
}

/// Font style options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
    Bold,
    BoldItalic,
}

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// Rich text content and its typography.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    /// Markup produced by the rich-text editor. Opaque to the core.
    #[serde(default)]
    pub content: String,
    pub font_size: f64,
    #[serde(default)]
    pub font_family: FontFamily,
    #[serde(default)]
    pub font_style: FontStyle,
    pub color: SerializableColor,
    #[serde(default)]
    pub align: TextAlign,
}

impl TextContent {
    /// Default font size in world units.
    pub const DEFAULT_FONT_SIZE: f64 = 16.0;

    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl Default for TextContent {
    fn default() -> Self {
        Self {
            content: String::new(),
            font_size: Self::DEFAULT_FONT_SIZE,
            font_family: FontFamily::default(),
            font_style: FontStyle::default(),
            color: SerializableColor::black(),
            align: TextAlign::default(),
        }
    }
}

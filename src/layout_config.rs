//! Frozen sheet layouts – the intermediate representation between layout
//! computation and the two output backends (vector PDF and raster capture).
//! Every coordinate is in PDF points relative to the sheet's top-left.

use serde::{Deserialize, Serialize};

use crate::template::{PageProfile, SheetKind};

/// A complete certificate layout ready for printing or capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentLayout {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    /// Sheets in document order.
    pub sheets: Vec<SheetLayout>,
}

/// One physical sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetLayout {
    pub index: usize,
    pub kind: SheetKind,
    pub profile: PageProfile,
    pub width_pt: f32,
    pub height_pt: f32,
    pub boxes: Vec<LayoutBox>,
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,
    #[serde(default = "LayoutBox::opaque")]
    pub opacity: f32,

    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,

    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
    /// Only the bottom edge is stroked (fill-lines).
    pub bottom_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped, pre-aligned lines.
    pub lines: Vec<TextLine>,
    pub font_size: f32,
    pub bold: bool,
    pub color: [f32; 4],
    pub line_height: f32,
    /// Distance from a line's top to its baseline.
    pub ascent: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// Offset within the box after alignment.
    pub x_offset: f32,
    /// Offset of the line's top within the box.
    pub y_offset: f32,
    pub width: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    /// Resolved asset reference (`asset:` name or `data:` URI).
    pub src: String,
}

impl DocumentLayout {
    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }
}

impl SheetLayout {
    /// Depth-first visit of every box on the sheet.
    pub fn visit(&self, f: &mut impl FnMut(&LayoutBox)) {
        for b in &self.boxes {
            b.visit(f);
        }
    }

    /// All text lines on the sheet in paint order.
    pub fn text_lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.visit(&mut |b| {
            if let Some(t) = &b.text {
                out.extend(t.lines.iter().map(|l| l.text.clone()));
            }
        });
        out
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            opacity: 1.0,
            text: None,
            image: None,
            children: Vec::new(),
        }
    }

    fn opaque() -> f32 {
        1.0
    }

    pub fn visit(&self, f: &mut impl FnMut(&LayoutBox)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

//! Drawing-surface capability shared by every chart renderer.
//!
//! Renderers only talk to [`RendererBackend`]; the browser canvas and the
//! in-memory [`DisplayList`] are two implementations of it.

use serde::Serialize;
use ts_core::Viewport;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stroke {
    pub color: String,
    pub width: f64,
    /// `[on, off]` dash lengths, solid when `None`.
    pub dash: Option<[f64; 2]>,
    pub alpha: f64,
}

impl Stroke {
    pub fn solid(color: impl Into<String>, width: f64) -> Self {
        Self {
            color: color.into(),
            width,
            dash: None,
            alpha: 1.0,
        }
    }

    pub fn dashed(mut self, on: f64, off: f64) -> Self {
        self.dash = Some([on, off]);
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub color: String,
    pub alpha: f64,
}

impl Fill {
    pub fn new(color: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            alpha: 1.0,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

impl TextAlign {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStyle {
    pub color: String,
    pub size: f64,
    pub bold: bool,
    pub align: TextAlign,
}

impl TextStyle {
    pub fn new(color: impl Into<String>, size: f64) -> Self {
        Self {
            color: color.into(),
            size,
            bold: false,
            align: TextAlign::Left,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn align(mut self, align: TextAlign) -> Self {
        self.align = align;
        self
    }

    /// CSS font shorthand.
    pub fn font(&self) -> String {
        if self.bold {
            format!("bold {}px monospace", self.size)
        } else {
            format!("{}px monospace", self.size)
        }
    }

    /// Rough monospace advance, good enough for badge and tooltip sizing.
    pub fn measure(&self, text: &str) -> f64 {
        text.chars().count() as f64 * self.size * 0.6
    }
}

pub trait RendererBackend {
    /// Sizes the surface for `viewport` and clears it with `clear_color`.
    fn begin_frame(&mut self, viewport: &Viewport, clear_color: &str);
    fn draw_segments(&mut self, segments: &[(f64, f64, f64, f64)], stroke: &Stroke);
    fn draw_polyline(&mut self, points: &[(f64, f64)], stroke: &Stroke);
    /// Closed polygon fill.
    fn fill_path(&mut self, points: &[(f64, f64)], fill: &Fill);
    fn fill_rect(&mut self, rect: Rect, fill: &Fill);
    fn stroke_rect(&mut self, rect: Rect, stroke: &Stroke);
    fn draw_text(&mut self, text: &str, x: f64, y: f64, style: &TextStyle);
}

/// Polygon approximation of a circle, for dots and markers.
pub fn circle_path(cx: f64, cy: f64, r: f64) -> Vec<(f64, f64)> {
    const STEPS: usize = 16;
    (0..STEPS)
        .map(|i| {
            let a = i as f64 / STEPS as f64 * std::f64::consts::TAU;
            (cx + r * a.cos(), cy + r * a.sin())
        })
        .collect()
}

// ---------- recording backend ------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    BeginFrame {
        width: f64,
        height: f64,
        pixel_ratio: f64,
        clear: String,
    },
    Segments {
        segments: Vec<(f64, f64, f64, f64)>,
        stroke: Stroke,
    },
    Polyline {
        points: Vec<(f64, f64)>,
        stroke: Stroke,
    },
    FillPath {
        points: Vec<(f64, f64)>,
        fill: Fill,
    },
    FillRect {
        rect: Rect,
        fill: Fill,
    },
    StrokeRect {
        rect: Rect,
        stroke: Stroke,
    },
    Text {
        text: String,
        x: f64,
        y: f64,
        style: TextStyle,
    },
}

/// Records one frame of drawing commands. Two frames rendered from the same
/// input compare equal, which is how pixel parity is checked off-browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplayList {
    commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> + '_ {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn polylines(&self) -> impl Iterator<Item = (&[(f64, f64)], &Stroke)> + '_ {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Polyline { points, stroke } => Some((points.as_slice(), stroke)),
            _ => None,
        })
    }

    /// Index of the first text command equal to `needle`.
    pub fn position_of_text(&self, needle: &str) -> Option<usize> {
        self.commands
            .iter()
            .position(|c| matches!(c, DrawCommand::Text { text, .. } if text == needle))
    }
}

impl RendererBackend for DisplayList {
    fn begin_frame(&mut self, viewport: &Viewport, clear_color: &str) {
        self.commands.clear();
        self.commands.push(DrawCommand::BeginFrame {
            width: viewport.width,
            height: viewport.height,
            pixel_ratio: viewport.pixel_ratio,
            clear: clear_color.to_string(),
        });
    }

    fn draw_segments(&mut self, segments: &[(f64, f64, f64, f64)], stroke: &Stroke) {
        if segments.is_empty() {
            return;
        }
        self.commands.push(DrawCommand::Segments {
            segments: segments.to_vec(),
            stroke: stroke.clone(),
        });
    }

    fn draw_polyline(&mut self, points: &[(f64, f64)], stroke: &Stroke) {
        if points.len() < 2 {
            return;
        }
        self.commands.push(DrawCommand::Polyline {
            points: points.to_vec(),
            stroke: stroke.clone(),
        });
    }

    fn fill_path(&mut self, points: &[(f64, f64)], fill: &Fill) {
        if points.len() < 3 {
            return;
        }
        self.commands.push(DrawCommand::FillPath {
            points: points.to_vec(),
            fill: fill.clone(),
        });
    }

    fn fill_rect(&mut self, rect: Rect, fill: &Fill) {
        self.commands.push(DrawCommand::FillRect {
            rect,
            fill: fill.clone(),
        });
    }

    fn stroke_rect(&mut self, rect: Rect, stroke: &Stroke) {
        self.commands.push(DrawCommand::StrokeRect {
            rect,
            stroke: stroke.clone(),
        });
    }

    fn draw_text(&mut self, text: &str, x: f64, y: f64, style: &TextStyle) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            x,
            y,
            style: style.clone(),
        });
    }
}

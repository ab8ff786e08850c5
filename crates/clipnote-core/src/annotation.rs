//! Annotation records and their time-window semantics.

use crate::geometry;
use kurbo::{Point, Rect, Vec2};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Seconds an annotation stays visible around its timestamp unless edited.
pub const DEFAULT_DURATION: f64 = 3.0;
/// Stroke/fill color for newly drawn annotations.
pub const DEFAULT_COLOR: Rgba = Rgba::opaque(0xff, 0x00, 0x00);
/// Font size used to render and measure text annotations.
pub const TEXT_FONT_SIZE: f64 = 16.0;
/// Height of the text hit box, extending upward from the baseline.
pub const TEXT_LINE_HEIGHT: f64 = 20.0;
/// Average glyph advance as a fraction of the font size.
pub const TEXT_ADVANCE_FACTOR: f64 = 0.6;
/// Lower clamp applied to `duration` by property edits.
pub const DURATION_MIN: f64 = 1.0;
/// Upper clamp applied to `duration` by property edits.
pub const DURATION_MAX: f64 = 10.0;

/// Opaque annotation identifier. Client-generated stand-ins and
/// server-issued ids are both UUID strings.
pub type AnnotationId = String;

/// Generate a fresh client-side id for an optimistic record.
pub fn new_local_id() -> AnnotationId {
    Uuid::new_v4().to_string()
}

/// Serializable RGBA color, written as `#rrggbb`/`#rrggbbaa` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 0xff)
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self {
            r: self.r,
            g: self.g,
            b: self.b,
            a,
        }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let byte = |range: &str| u8::from_str_radix(range, 16).ok();
        match hex.len() {
            3 => {
                let r = byte(&hex[0..1])? * 17;
                let g = byte(&hex[1..2])? * 17;
                let b = byte(&hex[2..3])? * 17;
                Some(Self::opaque(r, g, b))
            }
            6 => Some(Self::opaque(
                byte(&hex[0..2])?,
                byte(&hex[2..4])?,
                byte(&hex[4..6])?,
            )),
            8 => Some(Self::new(
                byte(&hex[0..2])?,
                byte(&hex[2..4])?,
                byte(&hex[4..6])?,
                byte(&hex[6..8])?,
            )),
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        if self.a == 0xff {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl From<peniko::Color> for Rgba {
    fn from(color: peniko::Color) -> Self {
        let rgba = color.to_rgba8();
        Self::new(rgba.r, rgba.g, rgba.b, rgba.a)
    }
}

impl From<Rgba> for peniko::Color {
    fn from(color: Rgba) -> Self {
        peniko::Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

impl Serialize for Rgba {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgba {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Rgba::parse(&s).ok_or_else(|| D::Error::custom(format!("invalid color {:?}", s)))
    }
}

/// The four annotation shapes. Fixed at creation, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Circle,
    Rectangle,
    Line,
    Text,
}

impl AnnotationKind {
    /// Display name for list panels.
    pub fn name(self) -> &'static str {
        match self {
            AnnotationKind::Circle => "Circle",
            AnnotationKind::Rectangle => "Rectangle",
            AnnotationKind::Line => "Line",
            AnnotationKind::Text => "Text",
        }
    }
}

/// Why a record failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidAnnotation {
    #[error("empty id")]
    EmptyId,
    #[error("non-finite coordinate or extent")]
    NonFiniteGeometry,
    #[error("timestamp must be a finite number >= 0")]
    InvalidTimestamp,
    #[error("duration must be a finite number > 0")]
    InvalidDuration,
    #[error("text annotations need non-empty text")]
    MissingText,
    #[error("only text annotations may carry text")]
    UnexpectedText,
}

/// A timestamped, positioned shape or text overlay on the video canvas.
///
/// `x, y` is the top-left of the bounding box for rectangles and circles,
/// the segment start for lines, and the baseline anchor for text.
/// `width`/`height` are signed: shapes drawn leftward/upward keep negative
/// extents, and geometry consumers normalize before measuring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Video time (seconds) this annotation is anchored to.
    pub timestamp: f64,
    /// Seconds the annotation stays visible around `timestamp`.
    pub duration: f64,
    pub color: Rgba,
}

impl Annotation {
    /// New shape record (circle, rectangle or line) with zero extents.
    pub fn new_shape(kind: AnnotationKind, origin: Point, timestamp: f64) -> Self {
        Self {
            id: new_local_id(),
            kind,
            x: origin.x,
            y: origin.y,
            width: 0.0,
            height: 0.0,
            text: None,
            timestamp,
            duration: DEFAULT_DURATION,
            color: DEFAULT_COLOR,
        }
    }

    /// New text record anchored at `baseline`.
    pub fn new_text(baseline: Point, content: impl Into<String>, timestamp: f64) -> Self {
        Self {
            id: new_local_id(),
            kind: AnnotationKind::Text,
            x: baseline.x,
            y: baseline.y,
            width: 0.0,
            height: 0.0,
            text: Some(content.into()),
            timestamp,
            duration: DEFAULT_DURATION,
            color: DEFAULT_COLOR,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn set_origin(&mut self, origin: Point) {
        self.x = origin.x;
        self.y = origin.y;
    }

    /// Far end of the signed extents (segment end for lines).
    pub fn end_point(&self) -> Point {
        self.origin() + Vec2::new(self.width, self.height)
    }

    /// Check the record invariants.
    pub fn validate(&self) -> Result<(), InvalidAnnotation> {
        if self.id.is_empty() {
            return Err(InvalidAnnotation::EmptyId);
        }
        if ![self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(InvalidAnnotation::NonFiniteGeometry);
        }
        if !self.timestamp.is_finite() || self.timestamp < 0.0 {
            return Err(InvalidAnnotation::InvalidTimestamp);
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(InvalidAnnotation::InvalidDuration);
        }
        match (self.kind, self.text.as_deref()) {
            (AnnotationKind::Text, Some(t)) if !t.is_empty() => Ok(()),
            (AnnotationKind::Text, _) => Err(InvalidAnnotation::MissingText),
            (_, Some(_)) => Err(InvalidAnnotation::UnexpectedText),
            (_, None) => Ok(()),
        }
    }

    /// Whether the annotation is shown at the given video time.
    pub fn visible_at(&self, time: f64) -> bool {
        (time - self.timestamp).abs() < self.duration
    }

    /// Normalized bounding box. For text this is the measured hit box
    /// anchored at the baseline and extending upward.
    pub fn bounds(&self) -> Rect {
        match self.kind {
            AnnotationKind::Text => {
                let width = estimated_text_width(self.text.as_deref().unwrap_or(""));
                geometry::text_box(self.origin(), width, TEXT_LINE_HEIGHT)
            }
            _ => geometry::normalized_box(self.origin(), self.width, self.height),
        }
    }

    /// Hit-test a canvas-local point against this annotation.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        match self.kind {
            AnnotationKind::Rectangle | AnnotationKind::Text => {
                geometry::point_in_box(self.bounds(), point)
            }
            AnnotationKind::Circle => geometry::point_in_inscribed_ellipse(self.bounds(), point),
            AnnotationKind::Line => {
                geometry::point_near_segment(point, self.origin(), self.end_point(), tolerance)
            }
        }
    }

    /// Short summary for list panels, e.g. `Rectangle @ 12.3s`.
    pub fn label(&self) -> String {
        format!("{} @ {:.1}s", self.kind.name(), self.timestamp)
    }
}

/// Estimated pixel width of rendered text at `TEXT_FONT_SIZE`.
fn estimated_text_width(text: &str) -> f64 {
    text.chars().count() as f64 * TEXT_FONT_SIZE * TEXT_ADVANCE_FACTOR
}

/// Partial edit of an annotation: the property-panel payload and the
/// `PUT` body on the wire. The kind and id are not patchable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgba>,
}

impl AnnotationPatch {
    /// Merge the set fields into `annotation`, clamping timestamp and
    /// duration to the ranges the property panel allows.
    pub fn apply_to(&self, annotation: &mut Annotation) {
        if let Some(x) = self.x {
            annotation.x = x;
        }
        if let Some(y) = self.y {
            annotation.y = y;
        }
        if let Some(width) = self.width {
            annotation.width = width;
        }
        if let Some(height) = self.height {
            annotation.height = height;
        }
        if let Some(ref text) = self.text {
            annotation.text = Some(text.clone());
        }
        if let Some(timestamp) = self.timestamp {
            annotation.timestamp = timestamp.max(0.0);
        }
        if let Some(duration) = self.duration {
            annotation.duration = duration.clamp(DURATION_MIN, DURATION_MAX);
        }
        if let Some(color) = self.color {
            annotation.color = color;
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

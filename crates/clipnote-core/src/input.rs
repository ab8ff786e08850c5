//! Host-agnostic pointer and keyboard events.
//!
//! The embedding shell translates its native events into these before
//! feeding them to the editor, so the engine never touches a windowing
//! or browser API directly.

use kurbo::{Point, Size, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// A pointer event in canvas-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { position: Point, button: MouseButton },
    Move { position: Point },
    Up { position: Point, button: MouseButton },
}

impl PointerEvent {
    pub fn position(&self) -> Point {
        match *self {
            PointerEvent::Down { position, .. }
            | PointerEvent::Move { position }
            | PointerEvent::Up { position, .. } => position,
        }
    }
}

/// A key event carrying the logical key name (`"Delete"`, `"r"`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    Pressed(String),
    Released(String),
}

/// Where the annotation canvas sits in the host window, used to map
/// client coordinates onto the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CanvasViewport {
    pub origin: Point,
    pub size: Size,
}

impl CanvasViewport {
    pub fn new(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    pub fn set_bounds(&mut self, origin: Point, size: Size) {
        self.origin = origin;
        self.size = size;
    }

    /// Translate a client-space point into canvas-local coordinates.
    pub fn to_canvas(&self, client: Point) -> Point {
        (client - self.origin).to_point()
    }

    pub fn bounds(&self) -> kurbo::Rect {
        kurbo::Rect::from_origin_size(self.origin, self.size)
    }

    /// Canvas-local point back to client space.
    pub fn to_client(&self, canvas: Point) -> Point {
        canvas + Vec2::new(self.origin.x, self.origin.y)
    }
}

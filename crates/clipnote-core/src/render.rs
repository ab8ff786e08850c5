//! Frame scene construction.
//!
//! `build_frame` turns the store into an ordered display list for the
//! current video time. The host rasterizes the items with whatever
//! backend it has; nothing here draws.

use crate::annotation::{Annotation, AnnotationKind, Rgba, TEXT_FONT_SIZE};
use crate::editor::Draft;
use crate::geometry;
use crate::store::AnnotationStore;
use kurbo::{BezPath, Ellipse, Point, Shape as _};

/// Outline width for shapes.
pub const STROKE_WIDTH: f64 = 2.0;
/// Alpha applied to the interior of rectangles and circles.
pub const FILL_ALPHA: u8 = 0x40;
/// Gap between a selected annotation and its highlight box.
pub const SELECTION_MARGIN: f64 = 5.0;
/// Dash pattern of the selection highlight.
pub const SELECTION_DASH: [f64; 2] = [5.0, 5.0];
/// Highlight color.
pub const SELECTION_COLOR: Rgba = Rgba::opaque(0x0d, 0x6e, 0xfd);
/// Dash pattern of the in-progress draft preview.
pub const PREVIEW_DASH: [f64; 2] = [4.0, 4.0];

/// What produced a display item, so hosts can restyle layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRole {
    Shape,
    SelectionHighlight,
    Preview,
}

/// One paint operation, in list order.
#[derive(Debug, Clone)]
pub enum DrawItem {
    Path {
        path: BezPath,
        color: peniko::Color,
        stroke_width: f64,
        fill: Option<peniko::Color>,
        dash: Option<[f64; 2]>,
        role: ItemRole,
    },
    Text {
        baseline: Point,
        content: String,
        size: f64,
        color: peniko::Color,
        role: ItemRole,
    },
}

impl DrawItem {
    pub fn role(&self) -> ItemRole {
        match self {
            DrawItem::Path { role, .. } | DrawItem::Text { role, .. } => *role,
        }
    }
}

/// Display list for one frame, bottom to top.
#[derive(Debug, Clone, Default)]
pub struct FrameScene {
    pub items: Vec<DrawItem>,
}

impl FrameScene {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DrawItem> {
        self.items.iter()
    }
}

/// Build the scene for `current_time`: visible annotations in list
/// order, the selection highlight right above its annotation, and any
/// in-progress draft on top. A selected annotation outside its time
/// window contributes nothing, highlight included.
pub fn build_frame(
    store: &AnnotationStore,
    draft: Option<&Draft>,
    current_time: f64,
) -> FrameScene {
    let mut items = Vec::new();
    for annotation in store.annotations() {
        if !annotation.visible_at(current_time) {
            continue;
        }
        items.push(annotation_item(annotation));
        if store.selected_id().map(String::as_str) == Some(annotation.id.as_str()) {
            items.push(highlight_item(annotation));
        }
    }
    if let Some(draft) = draft {
        items.push(preview_item(draft));
    }
    FrameScene { items }
}

fn stroke_color(color: Rgba) -> peniko::Color {
    color.into()
}

fn fill_color(color: Rgba) -> peniko::Color {
    color.with_alpha(FILL_ALPHA).into()
}

fn shape_path(kind: AnnotationKind, origin: Point, width: f64, height: f64) -> BezPath {
    match kind {
        AnnotationKind::Rectangle => {
            geometry::normalized_box(origin, width, height).to_path(0.1)
        }
        AnnotationKind::Circle => {
            let bounds = geometry::normalized_box(origin, width, height);
            Ellipse::new(
                bounds.center(),
                (bounds.width() / 2.0, bounds.height() / 2.0),
                0.0,
            )
            .to_path(0.1)
        }
        AnnotationKind::Line | AnnotationKind::Text => {
            let mut path = BezPath::new();
            path.move_to(origin);
            path.line_to(origin + kurbo::Vec2::new(width, height));
            path
        }
    }
}

fn annotation_item(annotation: &Annotation) -> DrawItem {
    match annotation.kind {
        AnnotationKind::Text => DrawItem::Text {
            baseline: annotation.origin(),
            content: annotation.text.clone().unwrap_or_default(),
            size: TEXT_FONT_SIZE,
            color: stroke_color(annotation.color),
            role: ItemRole::Shape,
        },
        kind => DrawItem::Path {
            path: shape_path(kind, annotation.origin(), annotation.width, annotation.height),
            color: stroke_color(annotation.color),
            stroke_width: STROKE_WIDTH,
            fill: interior_fill(kind, annotation.color),
            dash: None,
            role: ItemRole::Shape,
        },
    }
}

fn interior_fill(kind: AnnotationKind, color: Rgba) -> Option<peniko::Color> {
    match kind {
        AnnotationKind::Rectangle | AnnotationKind::Circle => Some(fill_color(color)),
        _ => None,
    }
}

fn highlight_item(annotation: &Annotation) -> DrawItem {
    let bounds = annotation
        .bounds()
        .inflate(SELECTION_MARGIN, SELECTION_MARGIN);
    DrawItem::Path {
        path: bounds.to_path(0.1),
        color: stroke_color(SELECTION_COLOR),
        stroke_width: STROKE_WIDTH,
        fill: None,
        dash: Some(SELECTION_DASH),
        role: ItemRole::SelectionHighlight,
    }
}

/// The rubber-band preview is always drawn, whatever the time window
/// says: the user is drawing it right now.
fn preview_item(draft: &Draft) -> DrawItem {
    DrawItem::Path {
        path: shape_path(draft.kind, draft.origin, draft.width, draft.height),
        color: stroke_color(draft.color),
        stroke_width: STROKE_WIDTH,
        fill: interior_fill(draft.kind, draft.color),
        dash: Some(PREVIEW_DASH),
        role: ItemRole::Preview,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::DEFAULT_COLOR;

    fn shape_at(kind: AnnotationKind, timestamp: f64) -> Annotation {
        let mut a = Annotation::new_shape(kind, Point::new(10.0, 10.0), timestamp);
        a.width = 40.0;
        a.height = 20.0;
        a
    }

    #[test]
    fn test_only_visible_annotations_are_drawn() {
        let mut store = AnnotationStore::new();
        store.add(shape_at(AnnotationKind::Rectangle, 5.0)).unwrap();
        store.add(shape_at(AnnotationKind::Circle, 50.0)).unwrap();

        let scene = build_frame(&store, None, 5.0);
        assert_eq!(scene.items.len(), 1);
        let scene = build_frame(&store, None, 25.0);
        assert!(scene.is_empty());
    }

    #[test]
    fn test_selection_highlight_sits_above_its_shape() {
        let mut store = AnnotationStore::new();
        store.add(shape_at(AnnotationKind::Rectangle, 5.0)).unwrap();
        let id = store.annotations()[0].id.clone();
        store.set_selected(Some(id)).unwrap();

        let scene = build_frame(&store, None, 5.0);
        assert_eq!(scene.items.len(), 2);
        assert_eq!(scene.items[0].role(), ItemRole::Shape);
        let DrawItem::Path { path, dash, color, .. } = &scene.items[1] else {
            panic!("highlight must be a path");
        };
        assert_eq!(*dash, Some(SELECTION_DASH));
        assert_eq!(*color, peniko::Color::from(SELECTION_COLOR));
        // Inflated by the margin on every side.
        let bbox = path.bounding_box();
        assert_eq!(bbox, kurbo::Rect::new(5.0, 5.0, 55.0, 35.0));
    }

    #[test]
    fn test_selected_but_hidden_draws_nothing() {
        let mut store = AnnotationStore::new();
        store.add(shape_at(AnnotationKind::Rectangle, 5.0)).unwrap();
        let id = store.annotations()[0].id.clone();
        store.set_selected(Some(id)).unwrap();

        let scene = build_frame(&store, None, 30.0);
        assert!(scene.is_empty());
    }

    #[test]
    fn test_fills_by_kind() {
        let mut store = AnnotationStore::new();
        store.add(shape_at(AnnotationKind::Rectangle, 0.0)).unwrap();
        store.add(shape_at(AnnotationKind::Line, 0.0)).unwrap();

        let scene = build_frame(&store, None, 0.0);
        let DrawItem::Path { fill: rect_fill, .. } = &scene.items[0] else {
            panic!("expected path");
        };
        let DrawItem::Path { fill: line_fill, .. } = &scene.items[1] else {
            panic!("expected path");
        };
        assert_eq!(
            *rect_fill,
            Some(peniko::Color::from(DEFAULT_COLOR.with_alpha(FILL_ALPHA)))
        );
        assert_eq!(*line_fill, None);
    }

    #[test]
    fn test_draft_preview_ignores_the_time_window() {
        let mut editor_store = AnnotationStore::new();
        let draft = Draft {
            kind: AnnotationKind::Circle,
            origin: Point::new(0.0, 0.0),
            width: 30.0,
            height: 30.0,
            timestamp: 100.0,
            duration: 3.0,
            color: DEFAULT_COLOR,
        };
        let scene = build_frame(&editor_store, Some(&draft), 0.0);
        assert_eq!(scene.items.len(), 1);
        assert_eq!(scene.items[0].role(), ItemRole::Preview);
        let DrawItem::Path { dash, .. } = &scene.items[0] else {
            panic!("preview must be a path");
        };
        assert_eq!(*dash, Some(PREVIEW_DASH));

        // And it stacks above stored annotations.
        editor_store
            .add(shape_at(AnnotationKind::Rectangle, 0.0))
            .unwrap();
        let scene = build_frame(&editor_store, Some(&draft), 0.0);
        assert_eq!(scene.items.len(), 2);
        assert_eq!(scene.items.last().map(DrawItem::role), Some(ItemRole::Preview));
    }

    #[test]
    fn test_text_items_carry_their_content() {
        let mut store = AnnotationStore::new();
        store
            .add(Annotation::new_text(Point::new(50.0, 60.0), "watch this", 2.0))
            .unwrap();

        let scene = build_frame(&store, None, 2.0);
        let DrawItem::Text {
            baseline,
            content,
            size,
            ..
        } = &scene.items[0]
        else {
            panic!("expected text item");
        };
        assert_eq!(*baseline, Point::new(50.0, 60.0));
        assert_eq!(content, "watch this");
        assert_eq!(*size, TEXT_FONT_SIZE);
    }
}

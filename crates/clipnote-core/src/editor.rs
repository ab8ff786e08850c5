//! Pointer and keyboard interaction state machine.
//!
//! Translates canvas gestures into store mutations and remote calls.
//! All drawing and dragging is gated on the video being paused; the
//! gesture in progress lives in [`EditorState`] and only touches the
//! store (and history) when it commits on pointer-up.

use crate::annotation::{Annotation, AnnotationKind, Rgba, DEFAULT_COLOR, DEFAULT_DURATION};
use crate::geometry::HIT_TOLERANCE;
use crate::input::{KeyEvent, MouseButton, PointerEvent};
use crate::playback::PlaybackState;
use crate::store::{AnnotationStore, EditError, Tool};
use crate::sync::SyncGateway;
use kurbo::{Point, Vec2};
use log::debug;

/// Knobs the host can tune per session.
#[derive(Debug, Clone)]
pub struct EditorOptions {
    pub default_color: Rgba,
    pub default_duration: f64,
    pub hit_tolerance: f64,
    /// Revert to the select tool after each drawn annotation.
    pub one_shot_tools: bool,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            default_color: DEFAULT_COLOR,
            default_duration: DEFAULT_DURATION,
            hit_tolerance: HIT_TOLERANCE,
            one_shot_tools: false,
        }
    }
}

/// Shape being rubber-banded, not yet in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub kind: AnnotationKind,
    pub origin: Point,
    pub width: f64,
    pub height: f64,
    pub timestamp: f64,
    pub duration: f64,
    pub color: Rgba,
}

impl Draft {
    fn new(kind: AnnotationKind, origin: Point, timestamp: f64, options: &EditorOptions) -> Self {
        Self {
            kind,
            origin,
            width: 0.0,
            height: 0.0,
            timestamp,
            duration: options.default_duration,
            color: options.default_color,
        }
    }

    /// Extend the draft to the pointer, keeping the extents signed so
    /// leftward/upward drawing works.
    pub fn grow_to(&mut self, position: Point) {
        self.width = position.x - self.origin.x;
        self.height = position.y - self.origin.y;
    }

    fn into_annotation(self) -> Annotation {
        let mut record = Annotation::new_shape(self.kind, self.origin, self.timestamp);
        record.width = self.width;
        record.height = self.height;
        record.duration = self.duration;
        record.color = self.color;
        record
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum EditorState {
    #[default]
    Idle,
    /// Rubber-banding a new shape.
    Drawing { draft: Draft },
    /// Moving an existing annotation. `original` is the pre-drag record
    /// used for the single history entry and for cancel.
    Dragging {
        id: String,
        grab_offset: Vec2,
        original: Annotation,
    },
    /// A text click happened, the host is collecting the string.
    AwaitingText { anchor: Point, timestamp: f64 },
}

#[derive(Debug, Default)]
pub struct AnnotationEditor {
    state: EditorState,
    options: EditorOptions,
}

impl AnnotationEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: EditorOptions) -> Self {
        Self {
            state: EditorState::Idle,
            options,
        }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    /// The shape preview to render, when a draw is in progress.
    pub fn draft(&self) -> Option<&Draft> {
        match &self.state {
            EditorState::Drawing { draft } => Some(draft),
            _ => None,
        }
    }

    pub fn awaiting_text(&self) -> Option<Point> {
        match self.state {
            EditorState::AwaitingText { anchor, .. } => Some(anchor),
            _ => None,
        }
    }

    /// Feed a pointer event. Returns whether anything changed.
    pub fn handle_pointer(
        &mut self,
        event: &PointerEvent,
        store: &mut AnnotationStore,
        sync: Option<&SyncGateway>,
        playback: &PlaybackState,
    ) -> Result<bool, EditError> {
        match *event {
            PointerEvent::Down { position, button } => {
                self.pointer_down(position, button, store, playback)
            }
            PointerEvent::Move { position } => self.pointer_move(position, store),
            PointerEvent::Up { position, button } => {
                self.pointer_up(position, button, store, sync)
            }
        }
    }

    fn pointer_down(
        &mut self,
        position: Point,
        button: MouseButton,
        store: &mut AnnotationStore,
        playback: &PlaybackState,
    ) -> Result<bool, EditError> {
        if button != MouseButton::Left || !playback.paused() {
            return Ok(false);
        }
        if self.state != EditorState::Idle {
            return Ok(false);
        }
        match store.tool() {
            Tool::Select => {
                // Later annotations draw on top, so they get picked
                // first. Hidden ones are not clickable.
                let hit = store
                    .annotations()
                    .iter()
                    .rev()
                    .filter(|a| a.visible_at(playback.current_time))
                    .find(|a| a.hit_test(position, self.options.hit_tolerance))
                    .cloned();
                match hit {
                    Some(original) => {
                        store.set_selected(Some(original.id.clone()))?;
                        self.state = EditorState::Dragging {
                            id: original.id.clone(),
                            grab_offset: position - original.origin(),
                            original,
                        };
                    }
                    None => store.set_selected(None)?,
                }
                Ok(true)
            }
            Tool::Text => {
                self.state = EditorState::AwaitingText {
                    anchor: position,
                    timestamp: playback.current_time,
                };
                Ok(true)
            }
            Tool::Rectangle => self.start_draft(AnnotationKind::Rectangle, position, playback),
            Tool::Circle => self.start_draft(AnnotationKind::Circle, position, playback),
            Tool::Line => self.start_draft(AnnotationKind::Line, position, playback),
        }
    }

    fn start_draft(
        &mut self,
        kind: AnnotationKind,
        origin: Point,
        playback: &PlaybackState,
    ) -> Result<bool, EditError> {
        self.state = EditorState::Drawing {
            draft: Draft::new(kind, origin, playback.current_time, &self.options),
        };
        Ok(true)
    }

    fn pointer_move(
        &mut self,
        position: Point,
        store: &mut AnnotationStore,
    ) -> Result<bool, EditError> {
        match &mut self.state {
            EditorState::Drawing { draft } => {
                draft.grow_to(position);
                Ok(true)
            }
            EditorState::Dragging {
                id, grab_offset, ..
            } => {
                let target = position - *grab_offset;
                match store.set_position(&id.clone(), target) {
                    Ok(()) => Ok(true),
                    // The record can vanish mid-drag, e.g. when a failed
                    // create is rolled back. Drop the gesture.
                    Err(EditError::NotFound(id)) => {
                        debug!("drag target {} vanished, cancelling drag", id);
                        self.state = EditorState::Idle;
                        Ok(false)
                    }
                    Err(err) => Err(err),
                }
            }
            _ => Ok(false),
        }
    }

    fn pointer_up(
        &mut self,
        position: Point,
        button: MouseButton,
        store: &mut AnnotationStore,
        sync: Option<&SyncGateway>,
    ) -> Result<bool, EditError> {
        if button != MouseButton::Left {
            return Ok(false);
        }
        let state = std::mem::take(&mut self.state);
        match state {
            EditorState::Drawing { mut draft } => {
                draft.grow_to(position);
                let record = draft.into_annotation();
                store.add(record.clone())?;
                if let Some(sync) = sync {
                    sync.create(store, &record);
                }
                if self.options.one_shot_tools {
                    store.set_tool(Tool::Select);
                }
                Ok(true)
            }
            EditorState::Dragging { id, original, .. } => {
                let Some(current) = store.get(&id).cloned() else {
                    return Ok(false);
                };
                if current.origin() == original.origin() {
                    // A click, not a drag. Selection already happened on
                    // pointer-down; nothing to commit.
                    return Ok(false);
                }
                // Rewind the drag feedback so the commit records the
                // pre-drag state as its single undo entry.
                store.overwrite(original.clone())?;
                let prev = store.update(current.clone())?;
                if let Some(sync) = sync {
                    sync.update(store, &current, prev);
                }
                Ok(true)
            }
            other => {
                // Pointer-up is not a commit point for these states.
                self.state = other;
                Ok(false)
            }
        }
    }

    /// Feed a key event. Text collection swallows everything; the host
    /// routes Enter/Escape to `submit_text`/`cancel_text` itself.
    pub fn handle_key(
        &mut self,
        event: &KeyEvent,
        store: &mut AnnotationStore,
        sync: Option<&SyncGateway>,
    ) -> Result<bool, EditError> {
        let KeyEvent::Pressed(key) = event else {
            return Ok(false);
        };
        if matches!(self.state, EditorState::AwaitingText { .. }) {
            return Ok(false);
        }
        match key.as_str() {
            "Delete" | "Backspace" => {
                let Some(id) = store.selected_id().cloned() else {
                    return Ok(false);
                };
                if let EditorState::Dragging { id: drag_id, .. } = &self.state {
                    if *drag_id == id {
                        self.state = EditorState::Idle;
                    }
                }
                let (removed, index) = store.delete(&id)?;
                if let Some(sync) = sync {
                    sync.delete(store, &removed, index);
                }
                Ok(true)
            }
            "Escape" => Ok(self.cancel(store)),
            key => {
                let Some(tool) = Tool::from_shortcut(key) else {
                    return Ok(false);
                };
                store.set_tool(tool);
                Ok(true)
            }
        }
    }

    /// Abort the gesture in progress. A cancelled drag snaps the record
    /// back to where it was grabbed.
    pub fn cancel(&mut self, store: &mut AnnotationStore) -> bool {
        match std::mem::take(&mut self.state) {
            EditorState::Idle => false,
            EditorState::Drawing { .. } | EditorState::AwaitingText { .. } => true,
            EditorState::Dragging { original, .. } => {
                if let Err(err) = store.overwrite(original) {
                    debug!("could not restore cancelled drag: {}", err);
                }
                true
            }
        }
    }

    /// Commit the collected text for a pending text click. Empty or
    /// whitespace-only input creates nothing.
    pub fn submit_text(
        &mut self,
        text: &str,
        store: &mut AnnotationStore,
        sync: Option<&SyncGateway>,
    ) -> Result<bool, EditError> {
        let EditorState::AwaitingText { anchor, timestamp } = self.state else {
            return Ok(false);
        };
        self.state = EditorState::Idle;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(false);
        }
        let mut record = Annotation::new_text(anchor, trimmed, timestamp);
        record.color = self.options.default_color;
        record.duration = self.options.default_duration;
        store.add(record.clone())?;
        if let Some(sync) = sync {
            sync.create(store, &record);
        }
        if self.options.one_shot_tools {
            store.set_tool(Tool::Select);
        }
        Ok(true)
    }

    /// Drop a pending text click without creating anything.
    pub fn cancel_text(&mut self) -> bool {
        if matches!(self.state, EditorState::AwaitingText { .. }) {
            self.state = EditorState::Idle;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paused_at(time: f64) -> PlaybackState {
        PlaybackState {
            playing: false,
            current_time: time,
            duration: 60.0,
            playback_rate: 1.0,
        }
    }

    fn down(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Down {
            position: Point::new(x, y),
            button: MouseButton::Left,
        }
    }

    fn moved(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Move {
            position: Point::new(x, y),
        }
    }

    fn up(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Up {
            position: Point::new(x, y),
            button: MouseButton::Left,
        }
    }

    fn press(key: &str) -> KeyEvent {
        KeyEvent::Pressed(key.to_string())
    }

    fn draw_rect(
        editor: &mut AnnotationEditor,
        store: &mut AnnotationStore,
        playback: &PlaybackState,
        from: (f64, f64),
        to: (f64, f64),
    ) {
        store.set_tool(Tool::Rectangle);
        editor
            .handle_pointer(&down(from.0, from.1), store, None, playback)
            .unwrap();
        editor
            .handle_pointer(&moved(to.0, to.1), store, None, playback)
            .unwrap();
        editor
            .handle_pointer(&up(to.0, to.1), store, None, playback)
            .unwrap();
    }

    #[test]
    fn test_draw_commits_once_on_pointer_up() {
        let mut editor = AnnotationEditor::new();
        let mut store = AnnotationStore::new();
        let playback = paused_at(5.0);

        draw_rect(&mut editor, &mut store, &playback, (10.0, 10.0), (50.0, 40.0));

        assert_eq!(store.len(), 1);
        let a = &store.annotations()[0];
        assert_eq!(a.kind, AnnotationKind::Rectangle);
        assert_eq!((a.x, a.y, a.width, a.height), (10.0, 10.0, 40.0, 30.0));
        assert_eq!(a.timestamp, 5.0);
        assert_eq!(a.duration, DEFAULT_DURATION);
        // The whole gesture is one undo step.
        assert!(store.undo());
        assert!(store.is_empty());
        assert!(!store.undo());
    }

    #[test]
    fn test_leftward_draw_keeps_signed_extents() {
        let mut editor = AnnotationEditor::new();
        let mut store = AnnotationStore::new();
        let playback = paused_at(0.0);

        draw_rect(&mut editor, &mut store, &playback, (60.0, 40.0), (10.0, 10.0));

        let a = &store.annotations()[0];
        assert_eq!((a.width, a.height), (-50.0, -30.0));
        let b = a.bounds();
        assert_eq!((b.x0, b.y0), (10.0, 10.0));
    }

    #[test]
    fn test_drawing_requires_paused_video() {
        let mut editor = AnnotationEditor::new();
        let mut store = AnnotationStore::new();
        let mut playback = paused_at(1.0);
        playback.playing = true;
        store.set_tool(Tool::Circle);

        let handled = editor
            .handle_pointer(&down(5.0, 5.0), &mut store, None, &playback)
            .unwrap();
        assert!(!handled);
        assert_eq!(*editor.state(), EditorState::Idle);
    }

    #[test]
    fn test_topmost_annotation_wins_the_hit() {
        let mut editor = AnnotationEditor::new();
        let mut store = AnnotationStore::new();
        let playback = paused_at(0.0);

        draw_rect(&mut editor, &mut store, &playback, (0.0, 0.0), (100.0, 100.0));
        draw_rect(&mut editor, &mut store, &playback, (50.0, 50.0), (150.0, 150.0));
        let bottom = store.annotations()[0].id.clone();
        let top = store.annotations()[1].id.clone();

        store.set_tool(Tool::Select);
        editor
            .handle_pointer(&down(75.0, 75.0), &mut store, None, &playback)
            .unwrap();
        assert_eq!(store.selected_id(), Some(&top));

        editor
            .handle_pointer(&up(75.0, 75.0), &mut store, None, &playback)
            .unwrap();
        editor
            .handle_pointer(&down(10.0, 10.0), &mut store, None, &playback)
            .unwrap();
        assert_eq!(store.selected_id(), Some(&bottom));
    }

    #[test]
    fn test_hidden_annotations_are_not_clickable() {
        let mut editor = AnnotationEditor::new();
        let mut store = AnnotationStore::new();
        let playback = paused_at(30.0);

        // Drawn at t=0, invisible by t=30.
        draw_rect(&mut editor, &mut store, &paused_at(0.0), (0.0, 0.0), (50.0, 50.0));
        store.set_tool(Tool::Select);
        editor
            .handle_pointer(&down(25.0, 25.0), &mut store, None, &playback)
            .unwrap();
        assert!(store.selected_id().is_none());
        assert_eq!(*editor.state(), EditorState::Idle);
    }

    #[test]
    fn test_drag_is_a_single_history_entry() {
        let mut editor = AnnotationEditor::new();
        let mut store = AnnotationStore::new();
        let playback = paused_at(0.0);

        draw_rect(&mut editor, &mut store, &playback, (10.0, 10.0), (40.0, 40.0));
        let id = store.annotations()[0].id.clone();

        store.set_tool(Tool::Select);
        editor
            .handle_pointer(&down(20.0, 20.0), &mut store, None, &playback)
            .unwrap();
        // Several intermediate frames, none of them undo steps.
        for step in 1..=5 {
            editor
                .handle_pointer(&moved(20.0 + step as f64 * 10.0, 20.0), &mut store, None, &playback)
                .unwrap();
        }
        editor
            .handle_pointer(&up(70.0, 20.0), &mut store, None, &playback)
            .unwrap();

        let a = store.get(&id).unwrap();
        assert_eq!((a.x, a.y), (60.0, 10.0));

        // One undo returns to the pre-drag position, not an
        // intermediate frame.
        assert!(store.undo());
        let a = store.get(&id).unwrap();
        assert_eq!((a.x, a.y), (10.0, 10.0));
        // The next undo removes the annotation itself.
        assert!(store.undo());
        assert!(store.is_empty());
    }

    #[test]
    fn test_click_without_movement_commits_nothing() {
        let mut editor = AnnotationEditor::new();
        let mut store = AnnotationStore::new();
        let playback = paused_at(0.0);

        draw_rect(&mut editor, &mut store, &playback, (10.0, 10.0), (40.0, 40.0));
        store.set_tool(Tool::Select);
        editor
            .handle_pointer(&down(20.0, 20.0), &mut store, None, &playback)
            .unwrap();
        editor
            .handle_pointer(&up(20.0, 20.0), &mut store, None, &playback)
            .unwrap();

        // Only the add is in history.
        assert!(store.undo());
        assert!(store.is_empty());
    }

    #[test]
    fn test_escape_cancels_a_drag() {
        let mut editor = AnnotationEditor::new();
        let mut store = AnnotationStore::new();
        let playback = paused_at(0.0);

        draw_rect(&mut editor, &mut store, &playback, (10.0, 10.0), (40.0, 40.0));
        let id = store.annotations()[0].id.clone();
        store.set_tool(Tool::Select);
        editor
            .handle_pointer(&down(20.0, 20.0), &mut store, None, &playback)
            .unwrap();
        editor
            .handle_pointer(&moved(80.0, 90.0), &mut store, None, &playback)
            .unwrap();
        editor.handle_key(&press("Escape"), &mut store, None).unwrap();

        let a = store.get(&id).unwrap();
        assert_eq!((a.x, a.y), (10.0, 10.0));
        assert_eq!(*editor.state(), EditorState::Idle);
        // The cancelled drag left no history entry.
        assert!(store.undo());
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_key_removes_selection() {
        let mut editor = AnnotationEditor::new();
        let mut store = AnnotationStore::new();
        let playback = paused_at(0.0);

        draw_rect(&mut editor, &mut store, &playback, (10.0, 10.0), (40.0, 40.0));
        let id = store.annotations()[0].id.clone();
        store.set_tool(Tool::Select);
        store.set_selected(Some(id)).unwrap();

        assert!(editor.handle_key(&press("Delete"), &mut store, None).unwrap());
        assert!(store.is_empty());
        assert!(store.selected_id().is_none());
        // Without a selection the key does nothing.
        assert!(!editor.handle_key(&press("Delete"), &mut store, None).unwrap());

        // Undo restores the annotation but not the selection.
        assert!(store.undo());
        assert_eq!(store.len(), 1);
        assert!(store.selected_id().is_none());
    }

    #[test]
    fn test_tool_shortcuts() {
        let mut editor = AnnotationEditor::new();
        let mut store = AnnotationStore::new();

        assert!(editor.handle_key(&press("r"), &mut store, None).unwrap());
        assert_eq!(store.tool(), Tool::Rectangle);
        assert!(editor.handle_key(&press("t"), &mut store, None).unwrap());
        assert_eq!(store.tool(), Tool::Text);
        assert!(!editor.handle_key(&press("q"), &mut store, None).unwrap());

        // While collecting text every key is left to the host.
        editor.state = EditorState::AwaitingText {
            anchor: Point::ZERO,
            timestamp: 0.0,
        };
        assert!(!editor.handle_key(&press("r"), &mut store, None).unwrap());
        assert_eq!(store.tool(), Tool::Text);
    }

    #[test]
    fn test_text_click_then_submit() {
        let mut editor = AnnotationEditor::new();
        let mut store = AnnotationStore::new();
        let playback = paused_at(4.0);
        store.set_tool(Tool::Text);

        editor
            .handle_pointer(&down(120.0, 80.0), &mut store, None, &playback)
            .unwrap();
        assert_eq!(editor.awaiting_text(), Some(Point::new(120.0, 80.0)));
        // Pointer-up while waiting for text is not a commit.
        editor
            .handle_pointer(&up(120.0, 80.0), &mut store, None, &playback)
            .unwrap();
        assert!(editor.awaiting_text().is_some());

        assert!(editor.submit_text("  look here  ", &mut store, None).unwrap());
        let a = &store.annotations()[0];
        assert_eq!(a.kind, AnnotationKind::Text);
        assert_eq!(a.text.as_deref(), Some("look here"));
        assert_eq!((a.x, a.y), (120.0, 80.0));
        assert_eq!(a.timestamp, 4.0);
    }

    #[test]
    fn test_empty_text_creates_nothing() {
        let mut editor = AnnotationEditor::new();
        let mut store = AnnotationStore::new();
        let playback = paused_at(0.0);
        store.set_tool(Tool::Text);

        editor
            .handle_pointer(&down(10.0, 10.0), &mut store, None, &playback)
            .unwrap();
        assert!(!editor.submit_text("   ", &mut store, None).unwrap());
        assert!(store.is_empty());
        assert_eq!(*editor.state(), EditorState::Idle);
    }

    #[test]
    fn test_one_shot_tools_revert_to_select() {
        let mut editor = AnnotationEditor::with_options(EditorOptions {
            one_shot_tools: true,
            ..Default::default()
        });
        let mut store = AnnotationStore::new();
        let playback = paused_at(0.0);

        draw_rect(&mut editor, &mut store, &playback, (0.0, 0.0), (10.0, 10.0));
        assert_eq!(store.tool(), Tool::Select);
    }
}

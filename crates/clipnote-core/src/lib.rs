//! Clipnote Core Library
//!
//! Host-agnostic engine for timestamped video annotations: the record
//! model, editing state machine, undo history, frame scene building and
//! optimistic server sync.

pub mod annotation;
pub mod editor;
pub mod geometry;
pub mod input;
pub mod playback;
pub mod remote;
pub mod render;
pub mod store;
pub mod sync;

pub use annotation::{
    Annotation, AnnotationId, AnnotationKind, AnnotationPatch, InvalidAnnotation, Rgba,
};
pub use editor::{AnnotationEditor, Draft, EditorOptions, EditorState};
pub use input::{CanvasViewport, KeyEvent, MouseButton, PointerEvent};
pub use playback::PlaybackState;
pub use remote::{HttpRemote, MemoryRemote, RemoteApi, RemoteConfig, SyncError};
pub use render::{build_frame, DrawItem, FrameScene, ItemRole};
pub use store::{AnnotationStore, EditError, Tool, MAX_UNDO_HISTORY};
pub use sync::{SyncEvent, SyncGateway};

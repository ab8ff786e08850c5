//! Clipnote Annotation Service
//!
//! REST service holding the shared annotation list for a clip. State is
//! in memory only; restarting the server starts from an empty list.
//!
//! ## API
//!
//! ```text
//! GET    /api/annotations       -> [ Annotation, ... ]
//! POST   /api/annotations       -> 201 Annotation (id assigned here)
//! PUT    /api/annotations/{id}  -> Annotation after the merge
//! DELETE /api/annotations/{id}  -> { "success": true }
//! ```
//!
//! Unknown ids answer 404 with `{ "error": "..." }`, invalid records 400.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
};
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

/// Annotation shape discriminator. Fixed once a record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AnnotationKind {
    Circle,
    Rectangle,
    Line,
    Text,
}

/// Stored annotation record, exactly as served to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Annotation {
    id: String,
    #[serde(rename = "type")]
    kind: AnnotationKind,
    x: f64,
    y: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    /// Anchor time in seconds of video.
    timestamp: f64,
    /// Seconds the annotation stays visible around `timestamp`.
    duration: f64,
    /// Hex color string, `#rgb`, `#rrggbb` or `#rrggbbaa`.
    color: String,
}

/// `POST /annotations` body. The id is assigned server-side.
#[derive(Debug, Clone, Deserialize)]
struct CreateAnnotation {
    #[serde(rename = "type")]
    kind: AnnotationKind,
    x: f64,
    y: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
    #[serde(default)]
    text: Option<String>,
    timestamp: f64,
    duration: f64,
    color: String,
}

/// `PUT /annotations/{id}` body: any subset of the mutable fields.
#[derive(Debug, Clone, Default, Deserialize)]
struct AnnotationPatch {
    x: Option<f64>,
    y: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
    text: Option<String>,
    timestamp: Option<f64>,
    duration: Option<f64>,
    color: Option<String>,
}

impl AnnotationPatch {
    /// Merge the set fields onto `record`. Unknown body keys, including
    /// attempts to change `id` or `type`, are ignored.
    fn apply_to(&self, record: &mut Annotation) {
        if let Some(x) = self.x {
            record.x = x;
        }
        if let Some(y) = self.y {
            record.y = y;
        }
        if let Some(width) = self.width {
            record.width = width;
        }
        if let Some(height) = self.height {
            record.height = height;
        }
        if let Some(ref text) = self.text {
            record.text = Some(text.clone());
        }
        if let Some(timestamp) = self.timestamp {
            record.timestamp = timestamp;
        }
        if let Some(duration) = self.duration {
            record.duration = duration;
        }
        if let Some(ref color) = self.color {
            record.color = color.clone();
        }
    }
}

fn valid_color(color: &str) -> bool {
    let Some(hex) = color.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// Record invariants enforced on create and after every merge.
fn validate(record: &Annotation) -> Result<(), String> {
    for value in [record.x, record.y, record.width, record.height] {
        if !value.is_finite() {
            return Err("coordinates and extents must be finite".to_string());
        }
    }
    if !record.timestamp.is_finite() || record.timestamp < 0.0 {
        return Err("timestamp must be a number >= 0".to_string());
    }
    if !record.duration.is_finite() || record.duration <= 0.0 {
        return Err("duration must be a number > 0".to_string());
    }
    match (record.kind, record.text.as_deref()) {
        (AnnotationKind::Text, Some(text)) if !text.is_empty() => {}
        (AnnotationKind::Text, _) => return Err("text annotations need non-empty text".to_string()),
        (_, Some(_)) => return Err("only text annotations may carry text".to_string()),
        (_, None) => {}
    }
    if !valid_color(&record.color) {
        return Err(format!("invalid color {:?}", record.color));
    }
    Ok(())
}

/// Error responses as JSON bodies.
enum ApiError {
    NotFound(String),
    Invalid(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                format!("no annotation with id {}", id),
            ),
            ApiError::Invalid(reason) => (StatusCode::BAD_REQUEST, reason),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Shared application state
#[derive(Default)]
struct AppState {
    annotations: RwLock<Vec<Annotation>>,
}

type SharedState = Arc<AppState>;

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .nest("/api", api_router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/annotations", get(list_annotations).post(create_annotation))
        .route(
            "/annotations/{id}",
            put(update_annotation).delete(delete_annotation),
        )
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipnote_server=info,tower_http=info".into()),
        )
        .init();

    let state = Arc::new(AppState::default());
    let app = router(state);

    let addr = std::env::var("CLIPNOTE_ADDR")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 5000)));
    info!("Clipnote annotation service listening on {}", addr);
    info!("API root: http://{}/api/annotations", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Index page
async fn index() -> &'static str {
    "Clipnote annotation service - REST API at /api/annotations"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// Full annotation list for the clip.
async fn list_annotations(State(state): State<SharedState>) -> Json<Vec<Annotation>> {
    Json(state.annotations.read().unwrap().clone())
}

/// Store a new record and hand back the id clients must use from then on.
async fn create_annotation(
    State(state): State<SharedState>,
    Json(body): Json<CreateAnnotation>,
) -> Result<(StatusCode, Json<Annotation>), ApiError> {
    let record = Annotation {
        id: Uuid::new_v4().to_string(),
        kind: body.kind,
        x: body.x,
        y: body.y,
        width: body.width,
        height: body.height,
        text: body.text,
        timestamp: body.timestamp,
        duration: body.duration,
        color: body.color,
    };
    validate(&record).map_err(ApiError::Invalid)?;
    state.annotations.write().unwrap().push(record.clone());
    info!("created annotation {}", record.id);
    Ok((StatusCode::CREATED, Json(record)))
}

/// Merge a partial edit and return the record as stored.
async fn update_annotation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(patch): Json<AnnotationPatch>,
) -> Result<Json<Annotation>, ApiError> {
    let mut annotations = state.annotations.write().unwrap();
    let Some(existing) = annotations.iter_mut().find(|a| a.id == id) else {
        return Err(ApiError::NotFound(id));
    };
    let mut merged = existing.clone();
    patch.apply_to(&mut merged);
    validate(&merged).map_err(ApiError::Invalid)?;
    *existing = merged.clone();
    Ok(Json(merged))
}

/// Remove a record.
async fn delete_annotation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut annotations = state.annotations.write().unwrap();
    let before = annotations.len();
    annotations.retain(|a| a.id != id);
    if annotations.len() == before {
        return Err(ApiError::NotFound(id));
    }
    info!("deleted annotation {}", id);
    Ok(Json(serde_json::json!({ "success": true })))
}

//! Blocking HTTP client for the annotation service.
//!
//! The sync worker talks to the server through the [`RemoteApi`] trait
//! so tests and offline hosts can substitute [`MemoryRemote`].

use crate::annotation::{Annotation, AnnotationKind, Rgba};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Default service root, matching the dev server.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000/api";

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Service root including any path prefix, without trailing slash.
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Transport and protocol failures surfaced to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("malformed response body: {0}")]
    Body(String),
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Status(404))
    }
}

/// `POST /annotations` body: a record without an id, the server
/// assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAnnotation {
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
    pub timestamp: f64,
    pub duration: f64,
    pub color: Rgba,
}

impl From<&Annotation> for CreateAnnotation {
    fn from(a: &Annotation) -> Self {
        Self {
            kind: a.kind,
            x: a.x,
            y: a.y,
            width: a.width,
            height: a.height,
            text: a.text.clone(),
            timestamp: a.timestamp,
            duration: a.duration,
            color: a.color,
        }
    }
}

/// The four service operations the engine performs.
pub trait RemoteApi: Send {
    fn fetch_all(&self) -> Result<Vec<Annotation>, SyncError>;
    fn create(&self, record: &CreateAnnotation) -> Result<Annotation, SyncError>;
    fn update(&self, id: &str, record: &Annotation) -> Result<Annotation, SyncError>;
    fn delete(&self, id: &str) -> Result<(), SyncError>;
}

/// `RemoteApi` over HTTP with a pooled blocking agent.
pub struct HttpRemote {
    agent: ureq::Agent,
    config: RemoteConfig,
}

impl HttpRemote {
    pub fn new(config: RemoteConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { agent, config }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::new(RemoteConfig {
            base_url: base_url.into(),
            ..RemoteConfig::default()
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/annotations{}",
            self.config.base_url.trim_end_matches('/'),
            suffix
        )
    }
}

fn transport_error(err: ureq::Error) -> SyncError {
    match err {
        ureq::Error::Status(code, _) => SyncError::Status(code),
        ureq::Error::Transport(transport) => SyncError::Network(transport.to_string()),
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T, SyncError> {
    let body = response
        .into_string()
        .map_err(|err| SyncError::Network(err.to_string()))?;
    serde_json::from_str(&body).map_err(|err| SyncError::Body(err.to_string()))
}

impl RemoteApi for HttpRemote {
    fn fetch_all(&self) -> Result<Vec<Annotation>, SyncError> {
        let response = self.agent.get(&self.url("")).call().map_err(transport_error)?;
        parse_body(response)
    }

    fn create(&self, record: &CreateAnnotation) -> Result<Annotation, SyncError> {
        let response = self
            .agent
            .post(&self.url(""))
            .send_json(record)
            .map_err(transport_error)?;
        parse_body(response)
    }

    fn update(&self, id: &str, record: &Annotation) -> Result<Annotation, SyncError> {
        let response = self
            .agent
            .put(&self.url(&format!("/{}", id)))
            .send_json(record)
            .map_err(transport_error)?;
        parse_body(response)
    }

    fn delete(&self, id: &str) -> Result<(), SyncError> {
        self.agent
            .delete(&self.url(&format!("/{}", id)))
            .call()
            .map_err(transport_error)?;
        Ok(())
    }
}

/// In-process `RemoteApi` with a switchable failure mode. Ids are
/// assigned from a counter so tests stay deterministic.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<MemoryRemoteInner>,
}

#[derive(Default)]
struct MemoryRemoteInner {
    records: Mutex<Vec<Annotation>>,
    failing: AtomicBool,
    next_id: AtomicU64,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load server-side records.
    pub fn seed(&self, records: Vec<Annotation>) {
        *self.inner.records.lock().unwrap() = records;
    }

    /// While failing, every call returns a network error.
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<Annotation> {
        self.inner.records.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), SyncError> {
        if self.inner.failing.load(Ordering::SeqCst) {
            Err(SyncError::Network("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RemoteApi for MemoryRemote {
    fn fetch_all(&self) -> Result<Vec<Annotation>, SyncError> {
        self.check()?;
        Ok(self.records())
    }

    fn create(&self, record: &CreateAnnotation) -> Result<Annotation, SyncError> {
        self.check()?;
        let n = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = Annotation {
            id: format!("srv-{}", n),
            kind: record.kind,
            x: record.x,
            y: record.y,
            width: record.width,
            height: record.height,
            text: record.text.clone(),
            timestamp: record.timestamp,
            duration: record.duration,
            color: record.color,
        };
        self.inner.records.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    fn update(&self, id: &str, record: &Annotation) -> Result<Annotation, SyncError> {
        self.check()?;
        let mut records = self.inner.records.lock().unwrap();
        let Some(existing) = records.iter_mut().find(|a| a.id == id) else {
            return Err(SyncError::Status(404));
        };
        let mut stored = record.clone();
        stored.id = id.to_string();
        *existing = stored.clone();
        Ok(stored)
    }

    fn delete(&self, id: &str) -> Result<(), SyncError> {
        self.check()?;
        let mut records = self.inner.records.lock().unwrap();
        let before = records.len();
        records.retain(|a| a.id != id);
        if records.len() == before {
            return Err(SyncError::Status(404));
        }
        Ok(())
    }
}

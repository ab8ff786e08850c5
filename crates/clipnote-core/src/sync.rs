//! Optimistic synchronization with the annotation service.
//!
//! Mutations apply to the local store immediately; a background worker
//! replays them against the server in FIFO order over blocking HTTP.
//! Confirmations and failures come back as [`SyncEvent`]s which the
//! host drains once per frame via [`SyncGateway::process_events`].
//! Conflict policy is last-local-write-wins: a confirmation only lands
//! if no newer local write to the same record happened in between.

use crate::annotation::{Annotation, AnnotationId};
use crate::remote::{CreateAnnotation, HttpRemote, RemoteApi, RemoteConfig, SyncError};
use crate::store::AnnotationStore;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
enum SyncCommand {
    Create {
        temp_id: AnnotationId,
        record: CreateAnnotation,
        seq: u64,
    },
    Update {
        id: AnnotationId,
        record: Annotation,
        prev: Annotation,
        seq: u64,
    },
    Delete {
        id: AnnotationId,
        /// Pre-delete record and list index, for restore on failure.
        /// `None` for compensating deletes, which must not restore.
        prev: Option<(usize, Annotation)>,
    },
    FetchAll,
    Shutdown,
}

/// Outcome of a remote operation, reported under the id the UI used
/// when it issued the command.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Created {
        temp_id: AnnotationId,
        record: Annotation,
        seq: u64,
    },
    Updated {
        id: AnnotationId,
        record: Annotation,
        seq: u64,
    },
    Deleted {
        id: AnnotationId,
    },
    Fetched {
        records: Vec<Annotation>,
    },
    CreateFailed {
        temp_id: AnnotationId,
        seq: u64,
        error: SyncError,
    },
    UpdateFailed {
        id: AnnotationId,
        prev: Annotation,
        seq: u64,
        error: SyncError,
    },
    DeleteFailed {
        id: AnnotationId,
        prev: Option<(usize, Annotation)>,
        error: SyncError,
    },
    FetchFailed {
        error: SyncError,
    },
}

/// Runs on the worker thread, one command at a time. Keeps the
/// temp-to-server id map so commands queued before a create confirmed
/// still reach the right resource.
struct SyncWorker {
    api: Box<dyn RemoteApi>,
    commands: Receiver<SyncCommand>,
    events: Sender<SyncEvent>,
    id_map: HashMap<AnnotationId, AnnotationId>,
}

impl SyncWorker {
    fn run(mut self) {
        while let Ok(command) = self.commands.recv() {
            let Some(event) = self.execute(command) else {
                break;
            };
            if self.events.send(event).is_err() {
                break;
            }
        }
    }

    fn resolve(&self, id: &str) -> AnnotationId {
        self.id_map
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn execute(&mut self, command: SyncCommand) -> Option<SyncEvent> {
        let event = match command {
            SyncCommand::Create {
                temp_id,
                record,
                seq,
            } => match self.api.create(&record) {
                Ok(server) => {
                    self.id_map.insert(temp_id.clone(), server.id.clone());
                    SyncEvent::Created {
                        temp_id,
                        record: server,
                        seq,
                    }
                }
                Err(error) => SyncEvent::CreateFailed {
                    temp_id,
                    seq,
                    error,
                },
            },
            SyncCommand::Update {
                id,
                record,
                prev,
                seq,
            } => {
                let wire_id = self.resolve(&id);
                let mut wire_record = record;
                wire_record.id = wire_id.clone();
                match self.api.update(&wire_id, &wire_record) {
                    Ok(server) => SyncEvent::Updated {
                        id,
                        record: server,
                        seq,
                    },
                    Err(error) => SyncEvent::UpdateFailed {
                        id,
                        prev,
                        seq,
                        error,
                    },
                }
            }
            SyncCommand::Delete { id, prev } => {
                let wire_id = self.resolve(&id);
                match self.api.delete(&wire_id) {
                    Ok(()) => SyncEvent::Deleted { id },
                    // The record is gone either way.
                    Err(error) if error.is_not_found() => {
                        debug!("delete of {} already applied server-side", wire_id);
                        SyncEvent::Deleted { id }
                    }
                    Err(error) => SyncEvent::DeleteFailed { id, prev, error },
                }
            }
            SyncCommand::FetchAll => match self.api.fetch_all() {
                Ok(records) => SyncEvent::Fetched { records },
                Err(error) => SyncEvent::FetchFailed { error },
            },
            SyncCommand::Shutdown => return None,
        };
        Some(event)
    }
}

/// UI-side handle to the sync worker. Owns the channels and the
/// confirmed temp-to-server id map used to route late confirmations.
pub struct SyncGateway {
    commands: Sender<SyncCommand>,
    events: Receiver<SyncEvent>,
    worker: Option<JoinHandle<()>>,
    confirmed: HashMap<AnnotationId, AnnotationId>,
}

impl SyncGateway {
    /// Spawn the worker thread over any [`RemoteApi`] implementation.
    pub fn spawn(api: impl RemoteApi + 'static) -> Self {
        let (command_tx, command_rx) = channel();
        let (event_tx, event_rx) = channel();
        let worker = SyncWorker {
            api: Box::new(api),
            commands: command_rx,
            events: event_tx,
            id_map: HashMap::new(),
        };
        let handle = std::thread::spawn(move || worker.run());
        Self {
            commands: command_tx,
            events: event_rx,
            worker: Some(handle),
            confirmed: HashMap::new(),
        }
    }

    /// Spawn against the HTTP service described by `config`.
    pub fn connect(config: RemoteConfig) -> Self {
        Self::spawn(HttpRemote::new(config))
    }

    fn send(&self, command: SyncCommand) {
        if self.commands.send(command).is_err() {
            warn!("sync worker disconnected, dropping command");
        }
    }

    /// Queue the create for a record just added to the store.
    pub fn create(&self, store: &mut AnnotationStore, record: &Annotation) {
        store.mark_unconfirmed(&record.id);
        self.send(SyncCommand::Create {
            temp_id: record.id.clone(),
            record: CreateAnnotation::from(record),
            seq: store.seq_of(&record.id).unwrap_or(0),
        });
    }

    /// Queue the update for a record, with its pre-image for rollback.
    pub fn update(&self, store: &AnnotationStore, record: &Annotation, prev: Annotation) {
        self.send(SyncCommand::Update {
            id: record.id.clone(),
            record: record.clone(),
            prev,
            seq: store.seq_of(&record.id).unwrap_or(0),
        });
    }

    /// Queue the delete for a record removed from the store. Deletes of
    /// records whose create never confirmed are deferred: the create
    /// confirmation triggers a compensating delete instead.
    pub fn delete(&self, store: &mut AnnotationStore, removed: &Annotation, index: usize) {
        if store.is_tombstoned(&removed.id) {
            debug!(
                "delete of {} deferred until its create confirms",
                removed.id
            );
            return;
        }
        self.send(SyncCommand::Delete {
            id: removed.id.clone(),
            prev: Some((index, removed.clone())),
        });
    }

    /// Queue a full snapshot fetch, applied on confirmation.
    pub fn fetch_all(&self) {
        self.send(SyncCommand::FetchAll);
    }

    /// Drain pending worker events, reconcile each into the store and
    /// return them for the host to surface. Call once per frame.
    pub fn process_events(&mut self, store: &mut AnnotationStore) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            self.reconcile(store, &event);
            events.push(event);
        }
        events
    }

    /// Map the id a command was issued under to the record's current
    /// local id, accounting for temp ids adopted since.
    fn local_id(&self, store: &AnnotationStore, id: &str) -> AnnotationId {
        if store.get(id).is_some() {
            return id.to_string();
        }
        self.confirmed
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn reconcile(&mut self, store: &mut AnnotationStore, event: &SyncEvent) {
        match event {
            SyncEvent::Created {
                temp_id,
                record,
                seq,
            } => {
                self.confirmed.insert(temp_id.clone(), record.id.clone());
                let tombstoned = store.take_tombstone(temp_id);
                if tombstoned || store.get(temp_id).is_none() {
                    info!(
                        "{} deleted locally before create confirmed, compensating",
                        temp_id
                    );
                    self.send(SyncCommand::Delete {
                        id: temp_id.clone(),
                        prev: None,
                    });
                } else {
                    store.adopt_remote_id(temp_id, record, *seq);
                }
            }
            SyncEvent::Updated { id, record, seq } => {
                let local = self.local_id(store, id);
                store.reconcile_update(&local, record, *seq);
            }
            SyncEvent::Deleted { id } => {
                debug!("delete of {} confirmed", id);
                self.confirmed.remove(id);
            }
            SyncEvent::Fetched { records } => {
                if let Err(err) = store.replace_all(records.clone()) {
                    warn!("rejecting fetched snapshot: {}", err);
                } else {
                    self.confirmed.clear();
                }
            }
            SyncEvent::CreateFailed {
                temp_id,
                seq,
                error,
            } => {
                warn!("create of {} failed: {}", temp_id, error);
                store.take_tombstone(temp_id);
                if store.seq_of(temp_id) == Some(*seq) {
                    store.rollback_create(temp_id);
                } else {
                    debug!("{} edited since the failed create, keeping it", temp_id);
                }
            }
            SyncEvent::UpdateFailed {
                id,
                prev,
                seq,
                error,
            } => {
                warn!("update of {} failed: {}", id, error);
                let local = self.local_id(store, id);
                if store.seq_of(&local) == Some(*seq) {
                    let mut restore = prev.clone();
                    restore.id = local;
                    if let Err(err) = store.overwrite(restore) {
                        debug!("could not roll back {}: {}", id, err);
                    }
                } else {
                    debug!("{} edited since the failed update, keeping it", id);
                }
            }
            SyncEvent::DeleteFailed { id, prev, error } => {
                warn!("delete of {} failed: {}", id, error);
                if let Some((index, record)) = prev {
                    if store.get(&record.id).is_none() {
                        if let Err(err) = store.restore_at(*index, record.clone()) {
                            debug!("could not restore {}: {}", id, err);
                        }
                    }
                }
            }
            SyncEvent::FetchFailed { error } => {
                warn!("fetch failed: {}", error);
            }
        }
    }
}

impl Drop for SyncGateway {
    fn drop(&mut self) {
        let _ = self.commands.send(SyncCommand::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

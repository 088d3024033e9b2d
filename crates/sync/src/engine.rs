//! The sync engine: single owner of the local overlay collection.
//!
//! Every mutation is applied to the local collection first (optimistic),
//! then sent to the [`OverlayStore`] from a spawned task. Requests for
//! the same overlay are serialized through its queue (see `queue.rs`);
//! requests for different overlays run concurrently. When a request
//! settles the overlay is rebuilt from the store's canonical document
//! (success) or from its previous acknowledged state (failure).
//!
//! Mutating methods spawn tasks and must be called from within a Tokio
//! runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use overlay_client::{OverlayStore, StoreError};
use overlay_core::overlay::{Geometry, Overlay, OverlayKind};
use overlay_core::types::{OverlayId, OverlayKey, TempToken};
use overlay_core::validation;
use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::events::{Operation, SyncEvent};
use crate::queue::{Collection, Entry, Mutation, PendingOp, Request};

/// Handle to the eventual outcome of one engine operation.
///
/// Dropping a ticket does not cancel anything; the outcome is still
/// broadcast as a [`SyncEvent`].
#[derive(Debug)]
pub struct Ticket {
    key: OverlayKey,
    outcome: Option<oneshot::Receiver<Result<(), SyncError>>>,
}

impl Ticket {
    fn pending(key: OverlayKey, outcome: oneshot::Receiver<Result<(), SyncError>>) -> Self {
        Self {
            key,
            outcome: Some(outcome),
        }
    }

    /// A ticket for an intent that needed no remote call.
    fn settled_now(key: OverlayKey) -> Self {
        Self { key, outcome: None }
    }

    /// The overlay this operation targets. For `create` this is the
    /// local token, which keeps resolving after the store assigns an id.
    pub fn key(&self) -> &OverlayKey {
        &self.key
    }

    /// Wait for the remote call to settle.
    pub async fn settled(self) -> Result<(), SyncError> {
        match self.outcome {
            None => Ok(()),
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(SyncError::Discarded(self.key))),
        }
    }
}

/// Owns the local overlay collection and every call to the store.
///
/// Cheap to clone; clones share the same collection.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn OverlayStore>,
    config: SyncConfig,
    collection: Mutex<Collection>,
    event_tx: broadcast::Sender<SyncEvent>,
    /// Operations queued or in flight, for [`SyncEngine::idle`].
    outstanding: watch::Sender<usize>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl SyncEngine {
    /// Create an engine with an empty collection. Call
    /// [`load`](Self::load) to fetch the stored overlays.
    pub fn new(store: Arc<dyn OverlayStore>, config: SyncConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (outstanding, _) = watch::channel(0);

        Self {
            inner: Arc::new(Inner {
                store,
                config,
                collection: Mutex::new(Collection::default()),
                event_tx,
                outstanding,
                tasks: TaskTracker::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Subscribe to collection change events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Replace the local collection with the store's current overlays.
    ///
    /// Overlays with operations still queued or in flight are kept as
    /// they are, so a create racing the fetch is never lost. On failure
    /// every other overlay is dropped. There is no retry; call again to
    /// retry.
    pub async fn load(&self) -> Result<Vec<Overlay>, SyncError> {
        self.ensure_live()?;
        let result = self.inner.store.list().await;

        let mut collection = self.inner.lock();
        let mut busy = collection.take_busy();

        let outcome = match result {
            Ok(overlays) => {
                for overlay in overlays {
                    let Some(id) = overlay.id.clone() else {
                        tracing::warn!("Skipping stored overlay without an id");
                        continue;
                    };
                    if collection.contains_id(&id) {
                        tracing::warn!(overlay = %id, "Skipping duplicate stored overlay");
                        continue;
                    }
                    // Local state of a busy overlay is newer than the fetch.
                    match busy.iter().position(|(_, entry)| entry.id() == Some(&id)) {
                        Some(pos) => {
                            let (token, entry) = busy.remove(pos);
                            collection.insert(token, entry);
                        }
                        None => collection.insert(TempToken::generate(), Entry::confirmed(overlay)),
                    }
                }
                Ok(())
            }
            Err(e) => Err(e),
        };

        if !busy.is_empty() {
            tracing::debug!(count = busy.len(), "Keeping overlays with outstanding operations");
        }
        for (token, entry) in busy {
            collection.insert(token, entry);
        }
        let loaded: Vec<Overlay> = collection.visible().map(|(_, _, o)| o.clone()).collect();
        self.inner.publish_outstanding(&collection);
        drop(collection);

        match outcome {
            Ok(()) => {
                tracing::info!(count = loaded.len(), "Overlays loaded");
                self.inner.emit(SyncEvent::Loaded {
                    count: loaded.len(),
                });
                Ok(loaded)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load overlays");
                self.inner.emit(SyncEvent::Failed {
                    key: None,
                    operation: Operation::Load,
                    message: e.to_string(),
                });
                Err(SyncError::Load(e))
            }
        }
    }

    /// Validate and insert a pending overlay, then create it remotely.
    ///
    /// The returned ticket's key is the overlay's local token. On
    /// success the entry gains its store id; on failure it is discarded.
    pub fn create(
        &self,
        kind: OverlayKind,
        content: impl Into<String>,
        geometry: Geometry,
    ) -> Result<Ticket, SyncError> {
        self.ensure_live()?;
        let draft = validation::validate_create(kind, content, geometry, &self.inner.config.bounds)?;

        let token = TempToken::generate();
        let key = OverlayKey::Local(token);
        let request = Request::Create(draft.body());
        let (tx, rx) = oneshot::channel();

        let mut collection = self.inner.lock();
        let seq = collection.next_seq();
        collection.insert(
            token,
            Entry::creating(draft, PendingOp::new(seq, Mutation::Create, tx)),
        );
        self.inner.publish_outstanding(&collection);
        self.inner.dispatch(token, seq, request);
        drop(collection);

        tracing::info!(overlay = %key, %kind, "Overlay created locally");
        self.inner.emit(SyncEvent::Inserted { key: key.clone() });

        Ok(Ticket::pending(key, rx))
    }

    /// Move/resize an overlay.
    ///
    /// Rejected without a request when the geometry is invalid. A
    /// geometry equal to the overlay's current one settles immediately.
    pub fn update_geometry(
        &self,
        key: &OverlayKey,
        geometry: Geometry,
    ) -> Result<Ticket, SyncError> {
        let bounds = self.inner.config.bounds;
        self.mutate(key, |view| {
            let patch = validation::validate_geometry_update(view, geometry, &bounds)?;
            Ok((view.geometry != patch.geometry).then_some(Mutation::Geometry(patch)))
        })
    }

    /// Replace the text of a text overlay.
    ///
    /// Content equal to the overlay's current text settles immediately.
    pub fn update_content(
        &self,
        key: &OverlayKey,
        content: impl Into<String>,
    ) -> Result<Ticket, SyncError> {
        let content = content.into();
        self.mutate(key, |view| {
            let patch = validation::validate_content_update(view, content)?;
            Ok((view.content != patch.content).then_some(Mutation::Content(patch)))
        })
    }

    /// Remove an overlay locally and delete it remotely.
    ///
    /// Operations on the overlay that were queued but not yet sent are
    /// discarded. If the delete fails the overlay is re-inserted at its
    /// last acknowledged state.
    pub fn remove(&self, key: &OverlayKey) -> Result<Ticket, SyncError> {
        self.ensure_live()?;
        let (tx, rx) = oneshot::channel();

        let mut collection = self.inner.lock();
        let token = collection
            .resolve(key)
            .ok_or_else(|| SyncError::NotFound(key.clone()))?;
        let key = collection.key_of(token);
        let seq = collection.next_seq();
        let Some(entry) = collection.get_mut(token) else {
            return Err(SyncError::NotFound(key));
        };

        let dropped = entry.mark_removed(PendingOp::new(seq, Mutation::Remove, tx));
        if let Some((seq, request)) = entry.start_next() {
            self.inner.dispatch(token, seq, request);
        }
        self.inner.publish_outstanding(&collection);
        drop(collection);

        for op in dropped {
            op.resolve(Err(SyncError::Discarded(key.clone())));
        }

        tracing::info!(overlay = %key, "Overlay removed locally");
        self.inner.emit(SyncEvent::Removed { key: key.clone() });

        Ok(Ticket::pending(key, rx))
    }

    /// Visible overlays in insertion order.
    pub fn overlays(&self) -> Vec<Overlay> {
        self.inner
            .lock()
            .visible()
            .map(|(_, _, overlay)| overlay.clone())
            .collect()
    }

    /// Visible overlays with the key to address each one by.
    pub fn snapshot(&self) -> Vec<(OverlayKey, Overlay)> {
        self.inner
            .lock()
            .visible()
            .map(|(_, key, overlay)| (key, overlay.clone()))
            .collect()
    }

    /// Stable handle of a visible overlay. Unlike its key, the handle
    /// does not change when the store assigns an id.
    pub(crate) fn token_of(&self, key: &OverlayKey) -> Option<TempToken> {
        self.inner.lock().resolve(key)
    }

    pub(crate) fn entries(&self) -> Vec<(TempToken, OverlayKey, Overlay)> {
        self.inner
            .lock()
            .visible()
            .map(|(token, key, overlay)| (token, key, overlay.clone()))
            .collect()
    }

    /// Publish an event on behalf of a collaborator.
    pub(crate) fn emit(&self, event: SyncEvent) {
        self.inner.emit(event);
    }

    pub fn get(&self, key: &OverlayKey) -> Option<Overlay> {
        let collection = self.inner.lock();
        let token = collection.resolve(key)?;
        collection.get(token).map(|entry| entry.view().clone())
    }

    /// The preferred key for an overlay: its store id once persisted.
    pub fn canonical_key(&self, key: &OverlayKey) -> Option<OverlayKey> {
        let collection = self.inner.lock();
        collection.resolve(key).map(|token| collection.key_of(token))
    }

    /// Number of operations queued or in flight.
    pub fn outstanding(&self) -> usize {
        *self.inner.outstanding.borrow()
    }

    /// Wait until no operation is queued or in flight.
    pub async fn idle(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        tokio::select! {
            _ = self.inner.cancel.cancelled() => {}
            _ = rx.wait_for(|n| *n == 0) => {}
        }
    }

    /// Stop all in-flight requests and drop the collection.
    ///
    /// Outstanding tickets settle with [`SyncError::Discarded`]; later
    /// calls fail with [`SyncError::Disposed`].
    pub async fn dispose(&self) {
        tracing::info!("Disposing sync engine");
        self.inner.cancel.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;

        let mut collection = self.inner.lock();
        collection.clear();
        self.inner.publish_outstanding(&collection);
    }

    // ---- private helpers ----

    fn ensure_live(&self) -> Result<(), SyncError> {
        if self.inner.cancel.is_cancelled() {
            return Err(SyncError::Disposed);
        }
        Ok(())
    }

    /// Queue a patch built from the overlay's current view. `build`
    /// returns `None` when the intent would not change anything.
    fn mutate<F>(&self, key: &OverlayKey, build: F) -> Result<Ticket, SyncError>
    where
        F: FnOnce(&Overlay) -> Result<Option<Mutation>, SyncError>,
    {
        self.ensure_live()?;

        let mut collection = self.inner.lock();
        let token = collection
            .resolve(key)
            .ok_or_else(|| SyncError::NotFound(key.clone()))?;
        let key = collection.key_of(token);
        let seq = collection.next_seq();
        let Some(entry) = collection.get_mut(token) else {
            return Err(SyncError::NotFound(key));
        };

        let Some(mutation) = build(entry.view())? else {
            tracing::debug!(overlay = %key, "Overlay unchanged, nothing to send");
            return Ok(Ticket::settled_now(key));
        };

        let (tx, rx) = oneshot::channel();
        entry.enqueue(PendingOp::new(seq, mutation, tx));
        if let Some((seq, request)) = entry.start_next() {
            self.inner.dispatch(token, seq, request);
        } else {
            tracing::debug!(overlay = %key, seq, "Overlay busy, operation queued");
        }
        self.inner.publish_outstanding(&collection);
        drop(collection);

        self.inner.emit(SyncEvent::Updated { key: key.clone() });
        Ok(Ticket::pending(key, rx))
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Collection> {
        self.collection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SyncEvent) {
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.event_tx.send(event);
    }

    fn publish_outstanding(&self, collection: &Collection) {
        let count = collection.outstanding();
        self.outstanding.send_if_modified(|current| {
            let changed = *current != count;
            *current = count;
            changed
        });
    }

    /// Send `request` from a tracked task and settle it on completion.
    fn dispatch(self: &Arc<Self>, token: TempToken, seq: u64, request: Request) {
        tracing::debug!(seq, ?request, "Sending overlay request");
        let inner = Arc::clone(self);
        self.tasks.spawn(async move {
            let outcome = tokio::select! {
                _ = inner.cancel.cancelled() => return,
                outcome = send(inner.store.as_ref(), request) => outcome,
            };
            inner.settle(token, seq, outcome);
        });
    }

    /// Reconcile the collection with the outcome of a request.
    fn settle(
        self: &Arc<Self>,
        token: TempToken,
        seq: u64,
        outcome: Result<Option<(OverlayId, Overlay)>, StoreError>,
    ) {
        let mut events = Vec::new();
        let mut resolved: Vec<(PendingOp, Result<(), SyncError>)> = Vec::new();

        let mut collection = self.lock();
        let key = collection.key_of(token);
        let Some(entry) = collection.get_mut(token) else {
            tracing::debug!(overlay = %key, seq, "Request settled for an overlay no longer tracked");
            return;
        };
        let Some(op) = entry.take_in_flight(seq) else {
            tracing::warn!(overlay = %key, seq, "Settled request is not the one in flight");
            return;
        };
        let visible = !entry.is_removed();

        match op.mutation {
            Mutation::Create => match outcome.and_then(|saved| saved.ok_or(StoreError::MissingId)) {
                Ok((id, overlay)) => {
                    entry.acknowledge(overlay);
                    collection.bind_id(token, id.clone());
                    tracing::info!(overlay = %key, id = %id, "Overlay confirmed by store");
                    events.push(SyncEvent::Confirmed { key: key.clone(), id });
                    resolved.push((op, Ok(())));
                }
                Err(e) => {
                    let queued = entry.drain_queue();
                    collection.remove(token);
                    tracing::warn!(overlay = %key, error = %e, "Create failed, discarding pending overlay");

                    events.push(SyncEvent::Failed {
                        key: Some(key.clone()),
                        operation: Operation::Create,
                        message: e.to_string(),
                    });
                    if visible {
                        events.push(SyncEvent::Removed { key: key.clone() });
                    }
                    for queued_op in queued {
                        let result = match queued_op.mutation {
                            // Nothing was persisted, so the delete has nothing left to do.
                            Mutation::Remove => Ok(()),
                            _ => Err(SyncError::Discarded(key.clone())),
                        };
                        resolved.push((queued_op, result));
                    }
                    resolved.push((op, Err(SyncError::Create { key, source: e })));

                    self.publish_outstanding(&collection);
                    drop(collection);
                    self.finish(events, resolved);
                    return;
                }
            },
            Mutation::Geometry(_) | Mutation::Content(_) => {
                let outcome = outcome
                    .and_then(|saved| saved.ok_or(StoreError::MissingId))
                    .and_then(|(id, overlay)| {
                        let current = entry.view();
                        if current.id.as_ref() != Some(&id) || current.kind != overlay.kind {
                            return Err(StoreError::UnexpectedDocument(format!(
                                "sent {} {}, got {} {id}",
                                current.kind, key, overlay.kind
                            )));
                        }
                        Ok((id, overlay))
                    });
                match outcome {
                    Ok((_, overlay)) => {
                        entry.acknowledge(overlay);
                        tracing::debug!(overlay = %key, seq, "Update acknowledged");
                        resolved.push((op, Ok(())));
                    }
                    Err(e) => {
                        entry.rebuild();
                        if visible {
                            tracing::warn!(overlay = %key, error = %e, "Update failed, rolled back");
                            events.push(SyncEvent::Failed {
                                key: Some(key.clone()),
                                operation: Operation::Update,
                                message: e.to_string(),
                            });
                        } else {
                            tracing::debug!(overlay = %key, error = %e, "Update failed on a removed overlay");
                        }
                        resolved.push((
                            op,
                            Err(SyncError::Update {
                                key: key.clone(),
                                source: e,
                            }),
                        ));
                    }
                }
                if visible {
                    events.push(SyncEvent::Updated { key: key.clone() });
                }
            }
            Mutation::Remove => match outcome {
                Ok(_) => {
                    collection.remove(token);
                    tracing::info!(overlay = %key, "Overlay deleted from store");
                    resolved.push((op, Ok(())));

                    self.publish_outstanding(&collection);
                    drop(collection);
                    self.finish(events, resolved);
                    return;
                }
                Err(e) => {
                    entry.restore();
                    tracing::warn!(overlay = %key, error = %e, "Delete failed, overlay restored");
                    events.push(SyncEvent::Restored { key: key.clone() });
                    events.push(SyncEvent::Failed {
                        key: Some(key.clone()),
                        operation: Operation::Delete,
                        message: e.to_string(),
                    });
                    resolved.push((
                        op,
                        Err(SyncError::Delete {
                            key: key.clone(),
                            source: e,
                        }),
                    ));
                }
            },
        }

        if let Some(entry) = collection.get_mut(token) {
            if let Some((next_seq, request)) = entry.start_next() {
                self.dispatch(token, next_seq, request);
            }
        }
        self.publish_outstanding(&collection);
        drop(collection);
        self.finish(events, resolved);
    }

    /// Publish events, then wake ticket holders. Runs outside the lock.
    fn finish(&self, events: Vec<SyncEvent>, resolved: Vec<(PendingOp, Result<(), SyncError>)>) {
        for event in events {
            self.emit(event);
        }
        for (op, result) in resolved {
            op.resolve(result);
        }
    }
}

/// Perform one remote call. Saves yield the stored document with its id;
/// deletes yield `None`.
async fn send(
    store: &dyn OverlayStore,
    request: Request,
) -> Result<Option<(OverlayId, Overlay)>, StoreError> {
    let saved = match request {
        Request::Create(body) => store.create(&body).await?,
        Request::Update(id, body) => store.update(&id, &body).await?,
        Request::Delete(id) => {
            store.delete(&id).await?;
            return Ok(None);
        }
    };
    let id = saved.id.clone().ok_or(StoreError::MissingId)?;
    Ok(Some((id, saved)))
}

//! Turns continuous operator gestures into discrete engine calls.
//!
//! Drag and resize motion only moves a local projection of the overlay;
//! the gesture's terminal event commits one `update_geometry`. Keystrokes
//! in a text overlay likewise stay local until the field loses focus,
//! and blurs are debounced so a burst of them commits the last value
//! once. Projections are keyed by the overlay's stable handle, so a
//! gesture that straddles a create confirmation stays attached.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use overlay_client::{UploadFile, UploadRelay};
use overlay_core::error::ValidationError;
use overlay_core::overlay::{Geometry, Overlay, OverlayKind};
use overlay_core::types::{OverlayKey, TempToken};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::AdapterConfig;
use crate::engine::{SyncEngine, Ticket};
use crate::error::SyncError;
use crate::events::{Operation, SyncEvent};

/// Raw events from the manipulation widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Intermediate drag sample: new top-left corner.
    DragMove { x: i32, y: i32 },
    /// Drop.
    DragStop { x: i32, y: i32 },
    /// Intermediate resize sample.
    ResizeMove(Geometry),
    /// Resize handle released.
    ResizeStop(Geometry),
}

#[derive(Debug)]
struct TextDraft {
    content: String,
    /// Blur generation that owns the pending commit, if any.
    commit: Option<u64>,
}

/// Uncommitted, purely visual state.
#[derive(Debug, Default)]
struct Projections {
    geometry: HashMap<TempToken, Geometry>,
    text: HashMap<TempToken, TextDraft>,
    generation: u64,
}

/// Front door for UI events. Never touches the collection directly; every
/// change goes through [`SyncEngine`].
pub struct InteractionAdapter {
    engine: SyncEngine,
    uploads: Arc<dyn UploadRelay>,
    config: AdapterConfig,
    local: Arc<Mutex<Projections>>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl InteractionAdapter {
    pub fn new(engine: SyncEngine, uploads: Arc<dyn UploadRelay>, config: AdapterConfig) -> Self {
        Self {
            engine,
            uploads,
            config,
            local: Arc::default(),
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Feed one drag/resize sample.
    ///
    /// Intermediate samples return `Ok(None)` and send nothing. Terminal
    /// samples commit the final geometry and return the engine's ticket;
    /// the projection is dropped either way, so a rejected geometry snaps
    /// the overlay back.
    pub fn on_gesture(
        &self,
        key: &OverlayKey,
        gesture: Gesture,
    ) -> Result<Option<Ticket>, SyncError> {
        let (token, current) = self.lookup(key)?;
        let mut local = lock(&self.local);

        match gesture {
            Gesture::DragMove { x, y } => {
                let start = local
                    .geometry
                    .get(&token)
                    .copied()
                    .unwrap_or(current.geometry);
                local.geometry.insert(token, start.moved_to(x, y));
                Ok(None)
            }
            Gesture::ResizeMove(geometry) => {
                local.geometry.insert(token, geometry);
                Ok(None)
            }
            Gesture::DragStop { x, y } => {
                let start = local.geometry.remove(&token).unwrap_or(current.geometry);
                drop(local);
                tracing::debug!(overlay = %key, x, y, "Drag finished");
                self.engine
                    .update_geometry(&OverlayKey::Local(token), start.moved_to(x, y))
                    .map(Some)
            }
            Gesture::ResizeStop(geometry) => {
                local.geometry.remove(&token);
                drop(local);
                tracing::debug!(overlay = %key, ?geometry, "Resize finished");
                self.engine
                    .update_geometry(&OverlayKey::Local(token), geometry)
                    .map(Some)
            }
        }
    }

    /// A keystroke changed the text of an overlay being edited.
    pub fn on_text_input(
        &self,
        key: &OverlayKey,
        content: impl Into<String>,
    ) -> Result<(), SyncError> {
        let (token, current) = self.lookup(key)?;
        if current.kind != OverlayKind::Text {
            return Err(ValidationError::new(
                "content",
                format!("{} overlays cannot be edited in place", current.kind),
            )
            .into());
        }

        let mut local = lock(&self.local);
        let draft = local.text.entry(token).or_insert_with(|| TextDraft {
            content: String::new(),
            commit: None,
        });
        draft.content = content.into();
        Ok(())
    }

    /// The text field lost focus. Schedules a commit of the latest draft
    /// after the debounce window; a later blur restarts the window.
    pub fn on_text_blur(&self, key: &OverlayKey) -> Result<(), SyncError> {
        let (token, _) = self.lookup(key)?;

        let generation = {
            let mut local = lock(&self.local);
            local.generation += 1;
            let generation = local.generation;
            match local.text.get_mut(&token) {
                Some(draft) => draft.commit = Some(generation),
                None => return Ok(()),
            }
            generation
        };

        let engine = self.engine.clone();
        let local = Arc::clone(&self.local);
        let cancel = self.cancel.clone();
        let delay = self.config.text_debounce;

        self.tasks.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let mut local = lock(&local);
            let Some(draft) = local.text.get(&token) else {
                return;
            };
            if draft.commit != Some(generation) {
                tracing::trace!(generation, "Text commit superseded");
                return;
            }
            let Some(draft) = local.text.remove(&token) else {
                return;
            };

            // Committed while the draft is still locked so the view never
            // falls back to the old text in between.
            match engine.update_content(&OverlayKey::Local(token), draft.content) {
                Ok(_) => {}
                Err(SyncError::NotFound(_)) => {
                    tracing::debug!("Text overlay disappeared before commit");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Text edit rejected");
                }
            }
        });

        Ok(())
    }

    /// "Add text": create a text overlay at the default placement.
    pub fn add_text(&self, content: impl Into<String>) -> Result<Ticket, SyncError> {
        self.engine
            .create(OverlayKind::Text, content, self.config.text_placement)
    }

    /// Upload a file and create an image overlay pointing at it.
    ///
    /// If the upload fails no overlay is created and the failure is
    /// returned as [`SyncError::Upload`].
    pub async fn upload_image(&self, file: UploadFile) -> Result<Ticket, SyncError> {
        let file_name = file.file_name.clone();

        let url = match self.uploads.upload(file).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(file = %file_name, error = %e, "Upload failed");
                self.engine.emit(SyncEvent::Failed {
                    key: None,
                    operation: Operation::Upload,
                    message: e.to_string(),
                });
                return Err(SyncError::Upload(e));
            }
        };

        tracing::info!(file = %file_name, url = %url, "Upload complete");
        self.engine
            .create(OverlayKind::Image, url, self.config.image_placement)
    }

    /// Delete an overlay, dropping any uncommitted gesture or text draft.
    pub fn delete(&self, key: &OverlayKey) -> Result<Ticket, SyncError> {
        let (token, _) = self.lookup(key)?;
        {
            let mut local = lock(&self.local);
            local.geometry.remove(&token);
            local.text.remove(&token);
        }
        self.engine.remove(&OverlayKey::Local(token))
    }

    /// What to render: the engine's collection with uncommitted gesture
    /// and text projections on top. Projections of overlays that are no
    /// longer visible are dropped.
    pub fn view(&self) -> Vec<(OverlayKey, Overlay)> {
        let entries = self.engine.entries();
        let mut local = lock(&self.local);

        let live: HashSet<TempToken> = entries.iter().map(|(token, _, _)| *token).collect();
        local.geometry.retain(|token, _| live.contains(token));
        local.text.retain(|token, _| live.contains(token));

        entries
            .into_iter()
            .map(|(token, key, mut overlay)| {
                if let Some(geometry) = local.geometry.get(&token) {
                    overlay.geometry = *geometry;
                }
                if let Some(draft) = local.text.get(&token) {
                    overlay.content.clone_from(&draft.content);
                }
                (key, overlay)
            })
            .collect()
    }

    /// Abandon pending text commits and drop all projections. The engine
    /// is left running; dispose it separately.
    pub async fn dispose(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        let mut local = lock(&self.local);
        local.geometry.clear();
        local.text.clear();
    }

    fn lookup(&self, key: &OverlayKey) -> Result<(TempToken, Overlay), SyncError> {
        let not_found = || SyncError::NotFound(key.clone());
        let token = self.engine.token_of(key).ok_or_else(not_found)?;
        let current = self
            .engine
            .get(&OverlayKey::Local(token))
            .ok_or_else(not_found)?;
        Ok((token, current))
    }
}

fn lock(local: &Mutex<Projections>) -> MutexGuard<'_, Projections> {
    local.lock().unwrap_or_else(PoisonError::into_inner)
}

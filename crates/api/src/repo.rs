//! In-memory overlay document store.
//!
//! Documents are kept in insertion order and addressed by string ids
//! minted from time-ordered UUIDs. Nothing is persisted across restarts.

use std::sync::{PoisonError, RwLock};

use indexmap::IndexMap;
use overlay_core::error::CoreError;
use overlay_core::overlay::{Overlay, OverlayBody};
use overlay_core::types::OverlayId;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct OverlayRepo {
    docs: RwLock<IndexMap<OverlayId, Overlay>>,
}

impl OverlayRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// All documents, oldest first.
    pub fn list(&self) -> Vec<Overlay> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        docs.values().cloned().collect()
    }

    pub fn find(&self, id: &OverlayId) -> Option<Overlay> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        docs.get(id).cloned()
    }

    /// Insert a new document and return it with its id.
    pub fn create(&self, body: OverlayBody) -> Overlay {
        let id = OverlayId::new(Uuid::now_v7().simple().to_string());
        let overlay = body.into_overlay(id.clone());

        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        docs.insert(id, overlay.clone());
        overlay
    }

    /// Replace the fields of an existing document.
    pub fn update(&self, id: &OverlayId, body: OverlayBody) -> Result<Overlay, CoreError> {
        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        let doc = docs.get_mut(id).ok_or_else(|| not_found(id))?;
        *doc = body.into_overlay(id.clone());
        Ok(doc.clone())
    }

    pub fn delete(&self, id: &OverlayId) -> Result<(), CoreError> {
        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        docs.shift_remove(id).map(|_| ()).ok_or_else(|| not_found(id))
    }
}

fn not_found(id: &OverlayId) -> CoreError {
    CoreError::NotFound {
        entity: "Overlay",
        id: id.clone(),
    }
}

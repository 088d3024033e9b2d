use overlay_client::StoreError;
use overlay_core::error::ValidationError;
use overlay_core::types::OverlayKey;

use crate::events::Operation;

/// Errors surfaced by the sync engine and the interaction adapter.
///
/// Validation and lookup errors are returned synchronously and never
/// mutate state. Store failures arrive through
/// [`Ticket::settled`](crate::Ticket::settled) and as
/// [`SyncEvent::Failed`](crate::SyncEvent::Failed) after the optimistic
/// change was rolled back.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Bad input; nothing was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No visible overlay matches the key.
    #[error("Overlay {0} not found")]
    NotFound(OverlayKey),

    /// The initial fetch failed; the collection is empty.
    #[error("Failed to load overlays: {0}")]
    Load(#[source] StoreError),

    /// The remote create failed; the pending overlay was discarded.
    #[error("Failed to create overlay {key}: {source}")]
    Create {
        key: OverlayKey,
        #[source]
        source: StoreError,
    },

    /// The remote update failed; the previous state was restored.
    #[error("Failed to update overlay {key}: {source}")]
    Update {
        key: OverlayKey,
        #[source]
        source: StoreError,
    },

    /// The remote delete failed; the overlay was re-inserted.
    #[error("Failed to delete overlay {key}: {source}")]
    Delete {
        key: OverlayKey,
        #[source]
        source: StoreError,
    },

    /// The upload relay failed; no overlay was created.
    #[error("Upload failed: {0}")]
    Upload(#[source] StoreError),

    /// A queued operation was dropped before being sent because its
    /// overlay was deleted or never persisted.
    #[error("Operation on overlay {0} was superseded")]
    Discarded(OverlayKey),

    /// The engine was disposed before the operation settled.
    #[error("Sync engine disposed")]
    Disposed,
}

impl SyncError {
    /// The remote operation that failed, if this is a store failure.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            SyncError::Load(_) => Some(Operation::Load),
            SyncError::Create { .. } => Some(Operation::Create),
            SyncError::Update { .. } => Some(Operation::Update),
            SyncError::Delete { .. } => Some(Operation::Delete),
            SyncError::Upload(_) => Some(Operation::Upload),
            _ => None,
        }
    }
}

//! Change notifications published by the sync engine.
//!
//! Events fan out over a [`tokio::sync::broadcast`] channel; call
//! [`SyncEngine::subscribe`](crate::SyncEngine::subscribe) to receive
//! them. A UI layer uses them to re-render and to show transient notices.

use std::fmt;

use overlay_core::types::{OverlayId, OverlayKey};

/// Remote operation kinds, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Create,
    Update,
    Delete,
    Upload,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Load => "load",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// Something changed in the local overlay collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The collection was replaced by a fresh fetch.
    Loaded { count: usize },
    /// A pending overlay was inserted optimistically.
    Inserted { key: OverlayKey },
    /// A pending overlay received its store id.
    Confirmed { key: OverlayKey, id: OverlayId },
    /// The visible state of an overlay changed.
    Updated { key: OverlayKey },
    /// An overlay disappeared from the visible collection.
    Removed { key: OverlayKey },
    /// A removed overlay came back after its delete failed.
    Restored { key: OverlayKey },
    /// A remote call failed and its optimistic change was undone.
    Failed {
        key: Option<OverlayKey>,
        operation: Operation,
        message: String,
    },
}

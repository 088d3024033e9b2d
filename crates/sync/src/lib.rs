//! Overlay synchronization engine.
//!
//! [`SyncEngine`] owns the local overlay collection and mediates every
//! call to the Overlay Store: optimistic local patches, per-overlay
//! request serialization, adoption of the server's canonical response on
//! success and rollback on failure. [`InteractionAdapter`] turns raw
//! drag/resize/text gestures into engine calls, and [`MediaBinding`]
//! carries the HLS stream configuration.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod interaction;
pub mod media;
mod queue;

pub use config::{AdapterConfig, SyncConfig};
pub use engine::{SyncEngine, Ticket};
pub use error::SyncError;
pub use events::{Operation, SyncEvent};
pub use interaction::{Gesture, InteractionAdapter};
pub use media::MediaBinding;

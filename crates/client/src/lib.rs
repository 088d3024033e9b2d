//! Overlay Store and Upload Relay clients.
//!
//! Defines the [`OverlayStore`](store::OverlayStore) and
//! [`UploadRelay`](store::UploadRelay) seams the sync engine talks to,
//! plus [`OverlayStoreApi`](api::OverlayStoreApi), the REST
//! implementation built on [`reqwest`].

pub mod api;
pub mod store;

pub use api::OverlayStoreApi;
pub use store::{OverlayStore, StoreError, UploadFile, UploadRelay};

//! Overlay entity model and validation.
//!
//! Pure types and rules shared by the sync engine, the HTTP store client
//! and the reference store server. No I/O.

pub mod error;
pub mod overlay;
pub mod types;
pub mod validation;

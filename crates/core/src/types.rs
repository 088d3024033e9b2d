//! Identifier types shared by the store, the sync engine and the server.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Store-assigned overlay identifier. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayId(String);

impl OverlayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OverlayId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OverlayId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Locally generated token identifying an overlay before (and after)
/// the store assigns it an [`OverlayId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempToken(Uuid);

impl TempToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TempToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp-{}", self.0.simple())
    }
}

/// How a caller refers to an overlay in the local collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OverlayKey {
    /// A persisted overlay, by store id.
    Persisted(OverlayId),
    /// An overlay created locally, by the token returned from `create`.
    Local(TempToken),
}

impl fmt::Display for OverlayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayKey::Persisted(id) => id.fmt(f),
            OverlayKey::Local(token) => token.fmt(f),
        }
    }
}

impl From<OverlayId> for OverlayKey {
    fn from(id: OverlayId) -> Self {
        OverlayKey::Persisted(id)
    }
}

impl From<TempToken> for OverlayKey {
    fn from(token: TempToken) -> Self {
        OverlayKey::Local(token)
    }
}

impl From<&str> for OverlayKey {
    fn from(id: &str) -> Self {
        OverlayKey::Persisted(OverlayId::from(id))
    }
}

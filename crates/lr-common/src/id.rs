//! Application identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for the application an update channel serves.
///
/// Opaque to the core; the distribution endpoint keys its published
/// metadata by this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(pub String);

impl AppId {
    pub fn new(id: impl Into<String>) -> Self {
        AppId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AppId {
    fn from(id: &str) -> Self {
        AppId(id.to_string())
    }
}

impl From<String> for AppId {
    fn from(id: String) -> Self {
        AppId(id)
    }
}

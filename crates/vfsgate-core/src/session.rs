//! Authenticated caller identity.

use serde::{Deserialize, Serialize};

/// The user a request runs as.
///
/// Produced by whatever authenticated the request; the gateway only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Login name, substituted for `{username}` in mount roots.
    pub username: String,
    /// Groups used by the permission gate.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Session {
    pub fn new(
        username: impl Into<String>,
        groups: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            username: username.into(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

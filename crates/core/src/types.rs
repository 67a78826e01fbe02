//! Common types and result structures.

use serde::{Deserialize, Serialize};

/// Result of a successful detached OpenPGP signature verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedSignature {
    pub key_fingerprint: String,
    pub uids: Vec<String>,
    pub source: KeySource,
}

/// Where the verifying key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// Configured explicitly by the operator.
    Configured,
    /// The bundled first-party key.
    Builtin,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Configured => "configured",
            KeySource::Builtin => "builtin",
        }
    }
}

//! Installation request configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Where a plugin comes from and which static key, if any, the operator pinned.
///
/// Built once per installation by the caller and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    pub source_host: String,
    pub source_owner: String,
    pub source_repo: String,
    /// ASCII-armored OpenPGP public key configured by the operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
}

impl InstallConfig {
    pub fn new(
        source_host: impl Into<String>,
        source_owner: impl Into<String>,
        source_repo: impl Into<String>,
    ) -> Self {
        Self {
            source_host: source_host.into(),
            source_owner: source_owner.into(),
            source_repo: source_repo.into(),
            signing_key: None,
        }
    }

    /// Parse a `host/owner/repo` source attribute such as
    /// `github.com/terraform-linters/tflint-ruleset-aws`.
    pub fn from_source(source: &str) -> Result<Self> {
        let parts: Vec<&str> = source.split('/').collect();
        let [host, owner, repo] = parts.as_slice() else {
            return Err(Error::config(format!(
                "plugin source must be in the format \"host/owner/repo\", got {source:?}"
            )));
        };
        if host.is_empty() || owner.is_empty() || repo.is_empty() {
            return Err(Error::config(format!(
                "plugin source has an empty segment: {source:?}"
            )));
        }
        Ok(Self::new(*host, *owner, *repo))
    }

    pub fn with_signing_key(mut self, key: impl Into<String>) -> Self {
        self.signing_key = Some(key.into());
        self
    }

    /// `host/owner/repo`
    pub fn source(&self) -> String {
        format!(
            "{}/{}/{}",
            self.source_host, self.source_owner, self.source_repo
        )
    }
}

//! Endpoints and local paths used by keyless verification.

use std::path::PathBuf;
use std::time::Duration;

use crate::{DEFAULT_REKOR_URL, GITHUB_ACTIONS_ISSUER};

/// Overrides the trust-root cache directory.
pub const TUF_ROOT_ENV: &str = "TFLINT_TUF_ROOT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeylessSettings {
    pub rekor_url: String,
    /// Local TUF cache. The mirror itself is pinned by the TUF client.
    pub tuf_cache_dir: PathBuf,
    /// The OIDC issuer a signing certificate must name.
    pub issuer: String,
    /// Bound on each Rekor request and on each TUF refresh.
    pub timeout: Option<Duration>,
}

impl Default for KeylessSettings {
    fn default() -> Self {
        Self {
            rekor_url: DEFAULT_REKOR_URL.to_string(),
            tuf_cache_dir: default_tuf_cache_dir(),
            issuer: GITHUB_ACTIONS_ISSUER.to_string(),
            timeout: None,
        }
    }
}

impl KeylessSettings {
    pub fn with_rekor_url(mut self, url: impl Into<String>) -> Self {
        self.rekor_url = url.into();
        self
    }

    pub fn with_tuf_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tuf_cache_dir = dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// `$TFLINT_TUF_ROOT`, else `~/.tflint.d/tufdata`.
pub fn default_tuf_cache_dir() -> PathBuf {
    tuf_cache_dir_from(
        std::env::var_os(TUF_ROOT_ENV).map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

fn tuf_cache_dir_from(explicit: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit.filter(|d| !d.as_os_str().is_empty()) {
        return dir;
    }
    home.unwrap_or_default().join(".tflint.d").join("tufdata")
}

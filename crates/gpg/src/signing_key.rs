//! Signing-key resolution.

use plugin_sig_core::{InstallConfig, KeySource};

/// Publisher namespace the bundled key applies to.
pub const FIRST_PARTY_OWNER: &str = "terraform-linters";

/// ASCII-armored key that signs first-party plugin releases.
pub const BUILTIN_SIGNING_KEY: &str = include_str!("builtin_signing_key.asc");

/// Decides which static key applies to an installation and verifies
/// detached signatures against it.
#[derive(Debug, Clone)]
pub struct SignatureChecker<'a> {
    config: &'a InstallConfig,
}

impl<'a> SignatureChecker<'a> {
    pub fn new(config: &'a InstallConfig) -> Self {
        Self { config }
    }

    /// The resolved ASCII-armored key, or `""` when none applies.
    ///
    /// An explicitly configured key always wins. Plugins published under
    /// [`FIRST_PARTY_OWNER`] fall back to [`BUILTIN_SIGNING_KEY`].
    pub fn signing_key(&self) -> &'a str {
        match self.config.signing_key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ if self.config.source_owner == FIRST_PARTY_OWNER => BUILTIN_SIGNING_KEY,
            _ => "",
        }
    }

    pub fn has_signing_key(&self) -> bool {
        !self.signing_key().is_empty()
    }

    pub(crate) fn key_source(&self) -> KeySource {
        match self.config.signing_key.as_deref() {
            Some(key) if !key.is_empty() => KeySource::Configured,
            _ => KeySource::Builtin,
        }
    }
}

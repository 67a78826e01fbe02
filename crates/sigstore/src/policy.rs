//! Verifier options and the identity policy a certificate must satisfy.

use plugin_sig_core::{Error, Result};
use regex::Regex;

/// How much independent evidence a verification must find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerifierOptions {
    /// Minimum number of valid embedded SCTs.
    pub signed_certificate_timestamps: usize,
    /// Minimum number of verified transparency-log entries.
    pub transparency_log: usize,
    /// Minimum number of verified integrated timestamps.
    pub integrated_timestamps: usize,
    /// Re-query the log during verification. Not supported.
    pub online: bool,
}

impl VerifierOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signed_certificate_timestamps(mut self, threshold: usize) -> Self {
        self.signed_certificate_timestamps = threshold;
        self
    }

    pub fn with_transparency_log(mut self, threshold: usize) -> Self {
        self.transparency_log = threshold;
        self
    }

    pub fn with_integrated_timestamps(mut self, threshold: usize) -> Self {
        self.integrated_timestamps = threshold;
        self
    }
}

/// An expected OIDC issuer plus a pattern for the subject alternative name.
#[derive(Debug, Clone)]
pub struct CertificateIdentity {
    issuer: String,
    san: Regex,
}

impl CertificateIdentity {
    pub fn new(issuer: impl Into<String>, san_regex: &str) -> Result<Self> {
        let san = Regex::new(san_regex)
            .map_err(|e| Error::config(format!("invalid subject pattern {san_regex:?}: {e}")))?;
        Ok(Self {
            issuer: issuer.into(),
            san,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn san_pattern(&self) -> &str {
        self.san.as_str()
    }

    /// Issuer must match exactly; the SAN only has to match the pattern.
    pub fn matches(&self, issuer: &str, san: &str) -> bool {
        self.issuer == issuer && self.san.is_match(san)
    }
}

/// What a signed entity is checked against.
#[derive(Debug, Clone)]
pub struct Policy<'a> {
    pub artifact: &'a [u8],
    /// Any one identity has to match.
    pub identities: Vec<CertificateIdentity>,
}

impl<'a> Policy<'a> {
    pub fn new(artifact: &'a [u8], identity: CertificateIdentity) -> Self {
        Self {
            artifact,
            identities: vec![identity],
        }
    }

    pub fn with_identity(mut self, identity: CertificateIdentity) -> Self {
        self.identities.push(identity);
        self
    }
}

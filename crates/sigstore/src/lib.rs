//! Keyless (Sigstore) verification of plugin artifacts: Rekor lookups, the
//! TUF-distributed trust root and an offline verifier for certificate-signed
//! artifacts.

pub mod certificate;
pub mod checkpoint;
pub mod config;
pub mod entity;
pub mod merkle;
pub mod policy;
pub mod rekor;
pub mod sct;
pub mod tlog;
pub mod trust;
pub mod verifier;
pub mod verify;

#[cfg(test)]
mod testutil;

pub use config::KeylessSettings;
pub use entity::{ArtifactEntity, SignedEntity, VerificationContent};
pub use policy::{CertificateIdentity, Policy, VerifierOptions};
pub use rekor::{LogLocator, RekorClient};
pub use tlog::{InclusionProof, TlogEntry};
pub use trust::{
    FileTrustRoot, StaticTrustRoot, TrustRootSource, TrustedMaterial, TrustedMaterialCollection,
    TufTrustRoot, get_trusted_root,
};
pub use verifier::{SignedEntityVerifier, VerificationResult};
pub use verify::KeylessVerifier;

/// Default Sigstore public endpoints. The TUF mirror is pinned by the TUF
/// client and reported in logs only.
pub const DEFAULT_REKOR_URL: &str = "https://rekor.sigstore.dev";
pub const DEFAULT_TUF_MIRROR: &str = "tuf-repo-cdn.sigstore.dev";

/// Issuer of GitHub Actions OIDC tokens.
pub const GITHUB_ACTIONS_ISSUER: &str = "https://token.actions.githubusercontent.com";

//! Keyless verification of plugin release artifacts.

use plugin_sig_core::{InstallConfig, Result};
use std::io::{Read, Seek};
use std::sync::Arc;

use crate::config::KeylessSettings;
use crate::entity::ArtifactEntity;
use crate::policy::{CertificateIdentity, Policy, VerifierOptions};
use crate::rekor::{LogLocator, RekorClient};
use crate::trust::{TrustRootSource, TufTrustRoot, get_trusted_root};
use crate::verifier::{SignedEntityVerifier, VerificationResult};

/// Checks that an artifact was signed by the release automation of the
/// configured source repository and recorded in the transparency log.
#[derive(Debug)]
pub struct KeylessVerifier<L = RekorClient, T = TufTrustRoot> {
    source: String,
    issuer: String,
    subject_pattern: String,
    locator: L,
    trust_source: T,
}

impl KeylessVerifier {
    /// Verifier backed by the public Rekor instance and the Sigstore TUF
    /// repository.
    pub fn production(config: &InstallConfig, settings: KeylessSettings) -> Result<Self> {
        tracing::debug!(
            rekor = %settings.rekor_url,
            mirror = crate::DEFAULT_TUF_MIRROR,
            cache_dir = %settings.tuf_cache_dir.display(),
            "Using public Sigstore instance"
        );
        let locator = RekorClient::new(&settings.rekor_url, settings.timeout)?;
        let trust_source = TufTrustRoot::new(settings.tuf_cache_dir.clone())
            .with_timeout(settings.timeout);
        Ok(Self::new(config, settings, locator, trust_source))
    }
}

impl<L, T> KeylessVerifier<L, T>
where
    L: LogLocator,
    T: TrustRootSource,
{
    pub fn new(
        config: &InstallConfig,
        settings: KeylessSettings,
        locator: L,
        trust_source: T,
    ) -> Self {
        Self {
            source: config.source(),
            issuer: settings.issuer,
            subject_pattern: subject_pattern(config),
            locator,
            trust_source,
        }
    }

    pub fn subject_pattern(&self) -> &str {
        &self.subject_pattern
    }

    /// Verify `artifact` against its base64 certificate and signature.
    ///
    /// `NotFound` and `Verification` errors mean the artifact is untrusted;
    /// anything else means the check could not be completed.
    #[tracing::instrument(skip_all, fields(source = %self.source))]
    pub async fn verify_keyless<A, C, S>(
        &self,
        artifact: &mut A,
        certificate: &mut C,
        signature: &mut S,
    ) -> Result<VerificationResult>
    where
        A: Read + Seek,
        C: Read + Seek,
        S: Read + Seek,
    {
        tracing::info!("Starting keyless verification");
        let entity =
            ArtifactEntity::from_streams(artifact, certificate, signature, &self.locator).await?;

        let options = VerifierOptions::new()
            .with_signed_certificate_timestamps(1)
            .with_transparency_log(1)
            .with_integrated_timestamps(1);
        let identity = CertificateIdentity::new(self.issuer.as_str(), &self.subject_pattern)?;

        let trust = Arc::new(get_trusted_root(&self.trust_source).await?);
        tracing::debug!("Trust root loaded");

        let verifier = SignedEntityVerifier::new(trust, options)?;
        let result = verifier.verify(&entity, &Policy::new(entity.artifact(), identity))?;

        match serde_json::to_string(&result) {
            Ok(json) => tracing::debug!(result = %json, "verification result"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize verification result"),
        }
        tracing::info!(
            identity = %result.verified_identity.subject_alternative_name,
            "Keyless verification successful"
        );
        Ok(result)
    }
}

/// `^https://{host}/{owner}/{repo}/` with every segment escaped.
pub fn subject_pattern(config: &InstallConfig) -> String {
    format!(
        "^https://{}/{}/{}/",
        regex::escape(&config.source_host),
        regex::escape(&config.source_owner),
        regex::escape(&config.source_repo)
    )
}

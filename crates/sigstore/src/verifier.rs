//! Offline verification of a signed entity against trust material.

use chrono::{DateTime, Utc};
use plugin_sig_core::{Error, Result, sha256_hex};
use serde::Serialize;
use std::sync::Arc;

use crate::certificate::{SigningCertificate, verify_chain};
use crate::entity::SignedEntity;
use crate::policy::{Policy, VerifierOptions};
use crate::sct::verify_embedded_scts;
use crate::trust::{AuthorityChain, TrustedMaterialCollection};

pub const VERIFICATION_RESULT_MEDIA_TYPE: &str =
    "application/vnd.dev.sigstore.verificationresult+json;version=0.1";

/// Outcome of a successful verification, suitable for an audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub media_type: String,
    pub signature: SignatureSummary,
    pub verified_timestamps: Vec<VerifiedTimestamp>,
    pub verified_identity: VerifiedIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureSummary {
    pub certificate: CertificateSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSummary {
    /// Issuing authority's distinguished name.
    pub certificate_issuer: String,
    pub subject_alternative_name: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedTimestamp {
    #[serde(rename = "type")]
    pub kind: String,
    pub uri: String,
    pub log_id: String,
    pub log_index: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedIdentity {
    pub issuer: String,
    pub subject_alternative_name: String,
}

/// Verifies signed entities against one set of trust material.
#[derive(Debug, Clone)]
pub struct SignedEntityVerifier {
    trust: Arc<TrustedMaterialCollection>,
    options: VerifierOptions,
}

impl SignedEntityVerifier {
    pub fn new(trust: Arc<TrustedMaterialCollection>, options: VerifierOptions) -> Result<Self> {
        if options.online {
            return Err(Error::config("online transparency log verification is not supported"));
        }
        if trust.is_empty() {
            return Err(Error::config("no trust material supplied"));
        }
        Ok(Self { trust, options })
    }

    pub fn options(&self) -> &VerifierOptions {
        &self.options
    }

    /// Run every check in order; the first failure is terminal.
    #[tracing::instrument(skip_all, fields(entries = entity.tlog_entries().len()))]
    pub fn verify(
        &self,
        entity: &dyn SignedEntity,
        policy: &Policy<'_>,
    ) -> Result<VerificationResult> {
        if policy.identities.is_empty() {
            return Err(Error::config("policy has no certificate identity"));
        }
        let leaf = entity.verification_content().leaf();

        let timestamps = self.verify_tlog_entries(entity, policy.artifact, leaf)?;
        let authority = self.verify_certificate_chain(leaf, &timestamps)?;
        self.verify_scts(leaf, authority)?;

        leaf.verify_signature(policy.artifact, entity.signature_content())?;
        tracing::debug!("Artifact signature verified");

        let issuer = leaf.oidc_issuer()?;
        let san = leaf.subject_alternative_name()?;
        if !policy.identities.iter().any(|id| id.matches(&issuer, &san)) {
            return Err(Error::verification(format!(
                "certificate identity {san:?} issued by {issuer:?} does not match the expected identity"
            )));
        }
        tracing::info!(%issuer, %san, "Certificate identity verified");

        Ok(VerificationResult {
            media_type: VERIFICATION_RESULT_MEDIA_TYPE.to_string(),
            signature: SignatureSummary {
                certificate: CertificateSummary {
                    certificate_issuer: leaf.issuer(),
                    subject_alternative_name: san.clone(),
                    issuer: issuer.clone(),
                    not_before: to_datetime(leaf.not_before())?,
                    not_after: to_datetime(leaf.not_after())?,
                },
            },
            verified_timestamps: timestamps,
            verified_identity: VerifiedIdentity {
                issuer,
                subject_alternative_name: san,
            },
        })
    }

    fn verify_tlog_entries(
        &self,
        entity: &dyn SignedEntity,
        artifact: &[u8],
        leaf: &SigningCertificate,
    ) -> Result<Vec<VerifiedTimestamp>> {
        let promise = entity.has_inclusion_promise();
        let proof = entity.has_inclusion_proof();
        if !promise && !proof {
            return Err(Error::verification(
                "log entries carry neither an inclusion promise nor an inclusion proof",
            ));
        }

        let digest = sha256_hex(artifact);
        let mut timestamps = Vec::new();
        for entry in entity.tlog_entries() {
            entry.check_matches(&digest, entity.signature_content(), leaf.der())?;

            let key = self
                .trust
                .tlog_key(&entry.log_id, entry.integrated_time)
                .ok_or_else(|| {
                    Error::verification(format!(
                        "no trusted transparency log key for log id {} at {}",
                        entry.log_id_hex(),
                        entry.integrated_time
                    ))
                })?;
            if promise {
                entry.verify_set(&key.key)?;
            }
            if proof {
                entry.verify_inclusion_proof(&key.key)?;
            }
            tracing::debug!(log_index = entry.log_index, log = %key.base_url, "Log entry verified");

            timestamps.push(VerifiedTimestamp {
                kind: "Tlog".to_string(),
                uri: key.base_url.clone(),
                log_id: entry.log_id_hex(),
                log_index: entry.log_index,
                timestamp: to_datetime(entry.integrated_time)?,
            });
        }

        if timestamps.len() < self.options.transparency_log {
            return Err(Error::verification(format!(
                "{} verified transparency log entries, {} required",
                timestamps.len(),
                self.options.transparency_log
            )));
        }
        let integrated = timestamps.iter().filter(|t| t.timestamp.timestamp() > 0).count();
        if integrated < self.options.integrated_timestamps {
            return Err(Error::verification(format!(
                "{integrated} verified integrated timestamps, {} required",
                self.options.integrated_timestamps
            )));
        }
        Ok(timestamps)
    }

    /// Chain the leaf to an authority at every verified time. Returns the
    /// authority that issued it.
    fn verify_certificate_chain(
        &self,
        leaf: &SigningCertificate,
        timestamps: &[VerifiedTimestamp],
    ) -> Result<&AuthorityChain> {
        if timestamps.is_empty() {
            return Err(Error::verification(
                "no verified timestamp to check the certificate against",
            ));
        }

        let mut issuer = None;
        for timestamp in timestamps {
            let at = timestamp.timestamp.timestamp();
            let mut last_error = None;
            let found = self.trust.certificate_authorities().find(|authority| {
                match verify_chain(leaf, authority, at) {
                    Ok(()) => true,
                    Err(e) => {
                        last_error = Some(e);
                        false
                    }
                }
            });
            match (found, last_error) {
                (Some(authority), _) => issuer = Some(authority),
                (None, Some(e)) => {
                    return Err(Error::verification_with(
                        format!(
                            "certificate does not chain to a trusted authority at {}",
                            timestamp.timestamp
                        ),
                        e,
                    ));
                }
                (None, None) => {
                    return Err(Error::verification("no trusted certificate authorities"));
                }
            }
        }

        let authority =
            issuer.ok_or_else(|| Error::verification("no trusted certificate authorities"))?;
        tracing::debug!(authority = %authority.uri, "Certificate chain verified");
        Ok(authority)
    }

    fn verify_scts(&self, leaf: &SigningCertificate, authority: &AuthorityChain) -> Result<()> {
        let threshold = self.options.signed_certificate_timestamps;
        if threshold == 0 {
            return Ok(());
        }
        let verified = verify_embedded_scts(leaf, authority, &self.trust)?;
        if verified < threshold {
            return Err(Error::verification(format!(
                "{verified} valid signed certificate timestamps, {threshold} required"
            )));
        }
        tracing::debug!(verified, "Signed certificate timestamps verified");
        Ok(())
    }
}

fn to_datetime(seconds: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| Error::malformed(format!("timestamp {seconds} is out of range")))
}

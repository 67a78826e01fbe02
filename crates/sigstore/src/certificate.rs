//! Short-lived signing certificates: parsing, identity extraction and chain
//! validation against trusted certificate authorities.

use const_oid::ObjectIdentifier;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use plugin_sig_core::{Error, Result};
use rustls_pki_types::{CertificateDer, UnixTime};
use std::time::Duration;
use webpki::{EndEntityCert, KeyUsage};
use x509_cert::Certificate;
use x509_cert::der::asn1::Utf8StringRef;
use x509_cert::der::{Decode, Encode};
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::ext::pkix::name::GeneralName;

use crate::trust::AuthorityChain;

/// OIDC issuer, raw bytes (deprecated form).
pub const OIDC_ISSUER_V1_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.1");
/// OIDC issuer, DER UTF8String.
pub const OIDC_ISSUER_V2_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.8");

const EKU_CODE_SIGNING: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x03];

/// A parsed leaf certificate.
#[derive(Debug, Clone)]
pub struct SigningCertificate {
    der: Vec<u8>,
    cert: Certificate,
}

impl SigningCertificate {
    /// Parse the first `CERTIFICATE` block of a PEM document.
    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let block = pem::parse(data)
            .map_err(|e| Error::malformed_with("certificate is not valid PEM", e))?;
        if block.tag() != "CERTIFICATE" {
            return Err(Error::malformed(format!(
                "expected a CERTIFICATE PEM block, found {}",
                block.tag()
            )));
        }
        Self::from_der(block.into_contents())
    }

    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        let cert = Certificate::from_der(&der)
            .map_err(|e| Error::malformed_with("failed to parse certificate", e))?;
        Ok(Self { der, cert })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    pub fn not_before(&self) -> i64 {
        unix_seconds(&self.cert.tbs_certificate.validity.not_before)
    }

    pub fn not_after(&self) -> i64 {
        unix_seconds(&self.cert.tbs_certificate.validity.not_after)
    }

    pub fn issuer(&self) -> String {
        self.cert.tbs_certificate.issuer.to_string()
    }

    pub fn public_key(&self) -> Result<VerifyingKey> {
        let spki = self
            .cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::malformed_with("failed to encode certificate public key", e))?;
        VerifyingKey::from_public_key_der(&spki).map_err(|e| {
            Error::malformed(format!(
                "certificate key is not an ECDSA P-256 key: {e}"
            ))
        })
    }

    /// Check a DER ECDSA signature over `message` with the certificate key.
    pub fn verify_signature(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let key = self.public_key()?;
        let signature = Signature::from_der(signature)
            .map_err(|e| Error::verification_with("signature is not a DER ECDSA signature", e))?;
        key.verify(message, &signature)
            .map_err(|e| Error::verification_with("artifact signature is invalid", e))
    }

    /// The first email or URI subject alternative name.
    pub fn subject_alternative_name(&self) -> Result<String> {
        let ext = self
            .extension(&const_oid::db::rfc5280::ID_CE_SUBJECT_ALT_NAME)
            .ok_or_else(|| Error::verification("certificate has no subject alternative name"))?;
        let san = SubjectAltName::from_der(ext)
            .map_err(|e| Error::malformed_with("failed to parse SAN extension", e))?;

        san.0
            .iter()
            .find_map(|name| match name {
                GeneralName::Rfc822Name(email) => Some(email.to_string()),
                GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
                _ => None,
            })
            .map(|identity| identity.trim().to_string())
            .ok_or_else(|| Error::verification("no email or URI found in certificate SAN"))
    }

    /// The OIDC issuer that authenticated the signer.
    pub fn oidc_issuer(&self) -> Result<String> {
        if let Some(value) = self.extension(&OIDC_ISSUER_V2_OID) {
            let issuer = Utf8StringRef::from_der(value)
                .map_err(|e| Error::malformed_with("failed to parse OIDC issuer extension", e))?;
            return Ok(issuer.as_str().to_string());
        }
        if let Some(value) = self.extension(&OIDC_ISSUER_V1_OID) {
            let issuer = std::str::from_utf8(value)
                .map_err(|e| Error::malformed_with("OIDC issuer extension is not UTF-8", e))?;
            return Ok(issuer
                .trim_matches(|c: char| c.is_whitespace() || c == '\0')
                .to_string());
        }
        Err(Error::verification("certificate has no OIDC issuer extension"))
    }

    /// Raw `extnValue` contents of the extension with `oid`.
    pub(crate) fn extension(&self, oid: &ObjectIdentifier) -> Option<&[u8]> {
        self.cert
            .tbs_certificate
            .extensions
            .as_ref()?
            .iter()
            .find(|ext| &ext.extn_id == oid)
            .map(|ext| ext.extn_value.as_bytes())
    }
}

fn unix_seconds(time: &x509_cert::time::Time) -> i64 {
    i64::try_from(time.to_unix_duration().as_secs()).unwrap_or(i64::MAX)
}

/// Validate `leaf` up to `authority`'s root at the log-recorded time `at`
/// (unix seconds). Requires the code-signing extended key usage.
pub fn verify_chain(leaf: &SigningCertificate, authority: &AuthorityChain, at: i64) -> Result<()> {
    if !authority.valid_for.contains(at) {
        return Err(Error::verification(format!(
            "certificate authority {} was not valid at {at}",
            authority.uri
        )));
    }
    let root = authority
        .root()
        .ok_or_else(|| Error::malformed("certificate authority has an empty chain"))?;
    let anchor = webpki::anchor_from_trusted_cert(root)
        .map_err(|e| Error::malformed(format!("invalid trust anchor: {e:?}")))?
        .to_owned();

    let at = u64::try_from(at).map_err(|_| Error::verification("negative verification time"))?;
    let time = UnixTime::since_unix_epoch(Duration::from_secs(at));

    let der = CertificateDer::from(leaf.der());
    let cert = EndEntityCert::try_from(&der)
        .map_err(|e| Error::malformed(format!("failed to parse certificate: {e:?}")))?;

    cert.verify_for_usage(
        webpki::ALL_VERIFICATION_ALGS,
        &[anchor],
        authority.intermediates(),
        time,
        KeyUsage::required(EKU_CODE_SIGNING),
        None,
        None,
    )
    .map_err(|e| Error::verification(format!("certificate chain verification failed: {e:?}")))?;
    Ok(())
}

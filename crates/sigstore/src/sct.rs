//! Embedded signed certificate timestamps (RFC 6962, section 3.3).

use const_oid::ObjectIdentifier;
use p256::ecdsa::Signature;
use p256::ecdsa::signature::Verifier;
use plugin_sig_core::{Error, Result, sha256};
use x509_cert::Certificate;
use x509_cert::der::asn1::OctetString;
use x509_cert::der::{Decode, Encode};

use crate::certificate::SigningCertificate;
use crate::trust::{AuthorityChain, TrustedMaterialCollection};

pub const SCT_LIST_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.11129.2.4.2");

const SCT_VERSION_V1: u8 = 0;
const SIGNATURE_TYPE_CERTIFICATE_TIMESTAMP: u8 = 0;
const ENTRY_TYPE_PRECERT: u16 = 1;
const HASH_SHA256: u8 = 4;
const SIGNATURE_ECDSA: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCertificateTimestamp {
    pub version: u8,
    pub log_id: [u8; 32],
    /// Milliseconds since the unix epoch.
    pub timestamp: u64,
    pub extensions: Vec<u8>,
    pub hash_algorithm: u8,
    pub signature_algorithm: u8,
    pub signature: Vec<u8>,
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() < n {
            return Err(Error::malformed("truncated signed certificate timestamp"));
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(buf))
    }

    fn vec16(&mut self) -> Result<&'a [u8]> {
        let len = self.u16()? as usize;
        self.take(len)
    }
}

impl SignedCertificateTimestamp {
    fn parse(data: &[u8]) -> Result<Self> {
        let mut r = Reader { data };
        let version = r.u8()?;
        let mut log_id = [0u8; 32];
        log_id.copy_from_slice(r.take(32)?);
        let timestamp = r.u64()?;
        let extensions = r.vec16()?.to_vec();
        let hash_algorithm = r.u8()?;
        let signature_algorithm = r.u8()?;
        let signature = r.vec16()?.to_vec();
        if !r.data.is_empty() {
            return Err(Error::malformed("trailing data after signed certificate timestamp"));
        }
        Ok(Self {
            version,
            log_id,
            timestamp,
            extensions,
            hash_algorithm,
            signature_algorithm,
            signature,
        })
    }

    /// The `digitally-signed` struct the log signed for a precertificate.
    pub fn signed_data(
        &self,
        issuer_key_hash: &[u8; 32],
        tbs_certificate: &[u8],
    ) -> Result<Vec<u8>> {
        let tbs_len = u32::try_from(tbs_certificate.len())
            .ok()
            .filter(|len| *len < 1 << 24)
            .ok_or_else(|| Error::malformed("precertificate is too large"))?;
        let ext_len = u16::try_from(self.extensions.len())
            .map_err(|_| Error::malformed("SCT extensions are too large"))?;

        let mut out = Vec::with_capacity(tbs_certificate.len() + 64);
        out.push(self.version);
        out.push(SIGNATURE_TYPE_CERTIFICATE_TIMESTAMP);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&ENTRY_TYPE_PRECERT.to_be_bytes());
        out.extend_from_slice(issuer_key_hash);
        out.extend_from_slice(&tbs_len.to_be_bytes()[1..]);
        out.extend_from_slice(tbs_certificate);
        out.extend_from_slice(&ext_len.to_be_bytes());
        out.extend_from_slice(&self.extensions);
        Ok(out)
    }
}

/// Parse the SCT list extension of `cert`. Empty when the extension is absent.
pub fn embedded_scts(cert: &SigningCertificate) -> Result<Vec<SignedCertificateTimestamp>> {
    let Some(value) = cert.extension(&SCT_LIST_OID) else {
        return Ok(Vec::new());
    };
    let list = OctetString::from_der(value)
        .map_err(|e| Error::malformed_with("invalid SCT list extension", e))?;

    let mut r = Reader {
        data: list.as_bytes(),
    };
    let mut entries = Reader { data: r.vec16()? };
    if !r.data.is_empty() {
        return Err(Error::malformed("trailing data after SCT list"));
    }

    let mut scts = Vec::new();
    while !entries.data.is_empty() {
        scts.push(SignedCertificateTimestamp::parse(entries.vec16()?)?);
    }
    Ok(scts)
}

/// Re-encode the TBS certificate without its SCT list, reproducing what
/// the certificate authority submitted to the log.
pub fn precertificate_tbs(cert: &Certificate) -> Result<Vec<u8>> {
    let mut tbs = cert.tbs_certificate.clone();
    if let Some(extensions) = tbs.extensions.as_mut() {
        extensions.retain(|ext| ext.extn_id != SCT_LIST_OID);
    }
    tbs.to_der()
        .map_err(|e| Error::malformed_with("failed to re-encode precertificate", e))
}

/// Find the certificate in `authority` that issued `leaf`.
fn find_issuer(leaf: &SigningCertificate, authority: &AuthorityChain) -> Result<Certificate> {
    let issuer = &leaf.certificate().tbs_certificate.issuer;
    for der in &authority.certificates {
        let candidate = Certificate::from_der(der)
            .map_err(|e| Error::malformed_with("failed to parse authority certificate", e))?;
        if &candidate.tbs_certificate.subject == issuer {
            return Ok(candidate);
        }
    }
    Err(Error::verification(
        "issuing certificate is not part of the trusted authority chain",
    ))
}

/// Verify the embedded SCTs of `leaf` against the trusted CT logs and return
/// how many are valid.
pub fn verify_embedded_scts(
    leaf: &SigningCertificate,
    authority: &AuthorityChain,
    trust: &TrustedMaterialCollection,
) -> Result<usize> {
    let scts = embedded_scts(leaf)?;
    if scts.is_empty() {
        return Ok(0);
    }

    let issuer = find_issuer(leaf, authority)?;
    let issuer_spki = issuer
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::malformed_with("failed to encode issuer public key", e))?;
    let issuer_key_hash = sha256(&issuer_spki);
    let tbs = precertificate_tbs(leaf.certificate())?;

    let mut verified = 0;
    for sct in &scts {
        if sct.version != SCT_VERSION_V1
            || sct.hash_algorithm != HASH_SHA256
            || sct.signature_algorithm != SIGNATURE_ECDSA
        {
            tracing::debug!(
                log_id = %hex::encode(sct.log_id),
                "Skipping SCT with unsupported algorithm"
            );
            continue;
        }
        let at = i64::try_from(sct.timestamp / 1000).unwrap_or(i64::MAX);
        let Some(log) = trust.ctlog_key(&sct.log_id, at) else {
            tracing::debug!(log_id = %hex::encode(sct.log_id), "SCT from unknown CT log");
            continue;
        };
        let Ok(signature) = Signature::from_der(&sct.signature) else {
            continue;
        };
        let message = sct.signed_data(&issuer_key_hash, &tbs)?;
        match log.key.verify(&message, &signature) {
            Ok(()) => verified += 1,
            Err(e) => tracing::debug!(log = %log.base_url, error = %e, "SCT signature is invalid"),
        }
    }
    Ok(verified)
}

/// TLS-encode an SCT list as it appears inside the extension. Used to build
/// test certificates.
#[cfg(test)]
pub(crate) fn encode_sct_list(scts: &[SignedCertificateTimestamp]) -> Vec<u8> {
    let mut entries = Vec::new();
    for sct in scts {
        let mut one = vec![sct.version];
        one.extend_from_slice(&sct.log_id);
        one.extend_from_slice(&sct.timestamp.to_be_bytes());
        one.extend_from_slice(&(sct.extensions.len() as u16).to_be_bytes());
        one.extend_from_slice(&sct.extensions);
        one.push(sct.hash_algorithm);
        one.push(sct.signature_algorithm);
        one.extend_from_slice(&(sct.signature.len() as u16).to_be_bytes());
        one.extend_from_slice(&sct.signature);

        entries.extend_from_slice(&(one.len() as u16).to_be_bytes());
        entries.extend_from_slice(&one);
    }
    let mut list = (entries.len() as u16).to_be_bytes().to_vec();
    list.extend_from_slice(&entries);
    list
}

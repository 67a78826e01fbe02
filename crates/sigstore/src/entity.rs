//! Adapts an (artifact, certificate, signature) triple into the signed-entity
//! shape the verifier consumes.

use plugin_sig_core::encoding::decode_base64;
use plugin_sig_core::{Error, Result};
use std::io::{Read, Seek, SeekFrom};

use crate::certificate::SigningCertificate;
use crate::rekor::LogLocator;
use crate::tlog::TlogEntry;

/// What a verifier needs from anything that was signed and logged.
pub trait SignedEntity {
    /// Whether every log entry carries a signed entry timestamp.
    fn has_inclusion_promise(&self) -> bool;
    /// Whether every log entry carries a Merkle inclusion proof.
    fn has_inclusion_proof(&self) -> bool;
    /// The raw signature bytes.
    fn signature_content(&self) -> &[u8];
    /// The signing certificate chain.
    fn verification_content(&self) -> &VerificationContent;
    fn tlog_entries(&self) -> &[TlogEntry];
}

/// A certificate chain, leaf first. Never empty.
#[derive(Debug, Clone)]
pub struct VerificationContent {
    chain: Vec<SigningCertificate>,
}

impl VerificationContent {
    /// A one-element chain. Chaining to a root happens at verification time.
    pub fn leaf_only(leaf: SigningCertificate) -> Self {
        Self { chain: vec![leaf] }
    }

    pub fn leaf(&self) -> &SigningCertificate {
        &self.chain[0]
    }

    pub fn chain(&self) -> &[SigningCertificate] {
        &self.chain
    }
}

/// Inclusion flags derived from a set of log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InclusionCapabilities {
    pub promise: bool,
    pub proof: bool,
}

impl InclusionCapabilities {
    pub fn from_entries(entries: &[TlogEntry]) -> Self {
        if entries.is_empty() {
            return Self::default();
        }
        Self {
            promise: entries.iter().all(|e| e.signed_entry_timestamp.is_some()),
            proof: entries.iter().all(|e| e.inclusion_proof.is_some()),
        }
    }
}

/// A release artifact signed with a short-lived certificate.
#[derive(Debug, Clone)]
pub struct ArtifactEntity {
    artifact: Vec<u8>,
    certificate_pem: Vec<u8>,
    signature: Vec<u8>,
    content: VerificationContent,
    entries: Vec<TlogEntry>,
    capabilities: InclusionCapabilities,
}

impl ArtifactEntity {
    /// Read the three streams, decode the certificate and signature from
    /// base64, and look the triple up in the transparency log.
    ///
    /// Every stream is rewound to offset zero after it is read.
    #[tracing::instrument(skip_all)]
    pub async fn from_streams<A, C, S, L>(
        artifact: &mut A,
        certificate: &mut C,
        signature: &mut S,
        locator: &L,
    ) -> Result<Self>
    where
        A: Read + Seek,
        C: Read + Seek,
        S: Read + Seek,
        L: LogLocator + ?Sized,
    {
        let artifact = read_and_rewind(artifact, "artifact")?;
        let certificate_pem =
            decode_base64(read_and_rewind(certificate, "certificate")?, "certificate")?;
        let signature = decode_base64(read_and_rewind(signature, "signature")?, "signature")?;
        tracing::debug!(
            artifact_len = artifact.len(),
            certificate_len = certificate_pem.len(),
            signature_len = signature.len(),
            "Read signed entity"
        );

        // Fail on an unusable certificate before going to the network.
        let leaf = parse_inputs(&artifact, &certificate_pem, &signature)?;

        let entries = locator
            .find_entries(&artifact, &certificate_pem, &signature)
            .await?;
        Self::assemble(artifact, certificate_pem, signature, leaf, entries)
    }

    /// Build an entity from already-decoded parts.
    pub fn new(
        artifact: Vec<u8>,
        certificate_pem: Vec<u8>,
        signature: Vec<u8>,
        entries: Vec<TlogEntry>,
    ) -> Result<Self> {
        let leaf = parse_inputs(&artifact, &certificate_pem, &signature)?;
        Self::assemble(artifact, certificate_pem, signature, leaf, entries)
    }

    fn assemble(
        artifact: Vec<u8>,
        certificate_pem: Vec<u8>,
        signature: Vec<u8>,
        leaf: SigningCertificate,
        entries: Vec<TlogEntry>,
    ) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::not_found("signature not found in transparency log"));
        }
        let capabilities = InclusionCapabilities::from_entries(&entries);
        Ok(Self {
            artifact,
            certificate_pem,
            signature,
            content: VerificationContent::leaf_only(leaf),
            entries,
            capabilities,
        })
    }

    pub fn artifact(&self) -> &[u8] {
        &self.artifact
    }

    pub fn certificate_pem(&self) -> &[u8] {
        &self.certificate_pem
    }
}

impl SignedEntity for ArtifactEntity {
    fn has_inclusion_promise(&self) -> bool {
        self.capabilities.promise
    }

    fn has_inclusion_proof(&self) -> bool {
        self.capabilities.proof
    }

    fn signature_content(&self) -> &[u8] {
        &self.signature
    }

    fn verification_content(&self) -> &VerificationContent {
        &self.content
    }

    fn tlog_entries(&self) -> &[TlogEntry] {
        &self.entries
    }
}

fn parse_inputs(
    artifact: &[u8],
    certificate_pem: &[u8],
    signature: &[u8],
) -> Result<SigningCertificate> {
    if artifact.is_empty() {
        return Err(Error::malformed("artifact is empty"));
    }
    if signature.is_empty() {
        return Err(Error::malformed("signature is empty"));
    }
    if certificate_pem.is_empty() {
        return Err(Error::malformed("certificate is empty"));
    }
    SigningCertificate::from_pem(certificate_pem)
}

/// Read `reader` to the end, then seek back to the start.
fn read_and_rewind<R: Read + Seek>(reader: &mut R, what: &str) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let read = reader.read_to_end(&mut data);
    let rewind = reader.seek(SeekFrom::Start(0));
    read.map_err(|e| Error::malformed_with(format!("failed to read {what}"), e))?;
    rewind.map_err(|e| Error::malformed_with(format!("failed to rewind {what}"), e))?;
    Ok(data)
}

//! Transparency-log entries and the checks made on them.

use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use plugin_sig_core::encoding::{decode_base64, encode_base64, encode_hex};
use plugin_sig_core::{DigestAlgorithm, Error, Result};
use serde::{Deserialize, Serialize};

use crate::checkpoint::SignedCheckpoint;
use crate::merkle::{self, Hash};

pub const HASHED_REKORD_KIND: &str = "hashedrekord";
pub const HASHED_REKORD_API_VERSION: &str = "0.0.1";

/// Merkle inclusion proof for one entry, as issued by the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    pub log_index: i64,
    pub root_hash: Vec<u8>,
    pub tree_size: i64,
    pub hashes: Vec<Vec<u8>>,
    pub checkpoint: String,
}

/// A position in the append-only log. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlogEntry {
    /// Canonicalized entry body, already decoded from base64.
    pub body: Vec<u8>,
    pub integrated_time: i64,
    pub log_index: i64,
    pub log_id: Vec<u8>,
    /// Signed entry timestamp (the inclusion promise), DER ECDSA.
    pub signed_entry_timestamp: Option<Vec<u8>>,
    pub inclusion_proof: Option<InclusionProof>,
}

/// The fields covered by the signed entry timestamp, in canonical key order.
#[derive(Serialize)]
struct SetPayload {
    body: String,
    #[serde(rename = "integratedTime")]
    integrated_time: i64,
    #[serde(rename = "logID")]
    log_id: String,
    #[serde(rename = "logIndex")]
    log_index: i64,
}

impl TlogEntry {
    pub fn log_id_hex(&self) -> String {
        encode_hex(&self.log_id)
    }

    pub fn leaf_hash(&self) -> Hash {
        merkle::hash_leaf(&self.body)
    }

    /// Canonical JSON of `{body, integratedTime, logID, logIndex}`.
    pub fn canonical_set_payload(&self) -> Result<Vec<u8>> {
        let payload = SetPayload {
            body: encode_base64(&self.body),
            integrated_time: self.integrated_time,
            log_id: self.log_id_hex(),
            log_index: self.log_index,
        };
        serde_json::to_vec(&payload)
            .map_err(|e| Error::malformed_with("failed to canonicalize log entry", e))
    }

    /// Verify the inclusion promise with the log's key.
    pub fn verify_set(&self, key: &VerifyingKey) -> Result<()> {
        let set = self
            .signed_entry_timestamp
            .as_deref()
            .ok_or_else(|| Error::verification("log entry has no signed entry timestamp"))?;
        let signature = Signature::from_der(set)
            .map_err(|e| Error::malformed_with("invalid signed entry timestamp encoding", e))?;
        key.verify(&self.canonical_set_payload()?, &signature)
            .map_err(|e| Error::verification_with("signed entry timestamp is invalid", e))
    }

    /// Verify the Merkle inclusion proof and the checkpoint that commits to
    /// its root.
    pub fn verify_inclusion_proof(&self, key: &VerifyingKey) -> Result<()> {
        let proof = self
            .inclusion_proof
            .as_ref()
            .ok_or_else(|| Error::verification("log entry has no inclusion proof"))?;

        let index = u64::try_from(proof.log_index)
            .map_err(|_| Error::malformed("negative inclusion proof index"))?;
        let tree_size = u64::try_from(proof.tree_size)
            .map_err(|_| Error::malformed("negative inclusion proof tree size"))?;
        let hashes = proof
            .hashes
            .iter()
            .map(|h| {
                Hash::try_from(h.as_slice())
                    .map_err(|_| Error::malformed("inclusion proof hash is not 32 bytes"))
            })
            .collect::<Result<Vec<_>>>()?;

        merkle::verify_inclusion(index, tree_size, &self.leaf_hash(), &hashes, &proof.root_hash)?;

        let signed = SignedCheckpoint::parse(&proof.checkpoint)?;
        signed.verify(&self.log_id, key)?;
        if signed.checkpoint.tree_size != tree_size {
            return Err(Error::verification(format!(
                "checkpoint tree size {} does not match inclusion proof tree size {tree_size}",
                signed.checkpoint.tree_size
            )));
        }
        if signed.checkpoint.root_hash != proof.root_hash {
            return Err(Error::verification(
                "checkpoint root hash does not match inclusion proof root hash",
            ));
        }
        Ok(())
    }

    pub fn hashed_rekord(&self) -> Result<HashedRekord> {
        let record: HashedRekord = serde_json::from_slice(&self.body)
            .map_err(|e| Error::malformed_with("log entry body is not a hashed record", e))?;
        if record.kind != HASHED_REKORD_KIND {
            return Err(Error::malformed(format!(
                "unsupported log entry kind {:?}",
                record.kind
            )));
        }
        Ok(record)
    }

    /// The entry must record exactly this digest, signature and certificate.
    pub fn check_matches(
        &self,
        artifact_digest_hex: &str,
        signature: &[u8],
        certificate_der: &[u8],
    ) -> Result<()> {
        let record = self.hashed_rekord()?;
        let spec = &record.spec;

        DigestAlgorithm::from_name(&spec.data.hash.algorithm)?;
        if !spec.data.hash.value.eq_ignore_ascii_case(artifact_digest_hex) {
            return Err(Error::verification(
                "log entry digest does not match the artifact",
            ));
        }
        if decode_base64(&spec.signature.content, "log entry signature")? != signature {
            return Err(Error::verification(
                "log entry signature does not match the provided signature",
            ));
        }

        let pem_bytes = decode_base64(&spec.signature.public_key.content, "log entry certificate")?;
        let logged = pem::parse(&pem_bytes)
            .map_err(|e| Error::malformed_with("log entry certificate is not PEM", e))?;
        if logged.contents() != certificate_der {
            return Err(Error::verification(
                "log entry certificate does not match the provided certificate",
            ));
        }
        Ok(())
    }
}

/// A `hashedrekord` entry: proposed in searches and stored as entry bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashedRekord {
    pub kind: String,
    pub api_version: String,
    pub spec: HashedRekordSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedRekordSpec {
    pub data: HashedRekordData,
    pub signature: HashedRekordSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedRekordData {
    pub hash: HashValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashValue {
    pub algorithm: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedRekordSignature {
    /// Base64 signature.
    pub content: String,
    #[serde(rename = "publicKey")]
    pub public_key: PublicKeyContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyContent {
    /// Base64 of the PEM certificate.
    pub content: String,
}

impl HashedRekord {
    pub fn new(sha256_hex: &str, signature: &[u8], certificate_pem: &[u8]) -> Self {
        Self {
            kind: HASHED_REKORD_KIND.to_string(),
            api_version: HASHED_REKORD_API_VERSION.to_string(),
            spec: HashedRekordSpec {
                data: HashedRekordData {
                    hash: HashValue {
                        algorithm: DigestAlgorithm::Sha256.name().to_string(),
                        value: sha256_hex.to_string(),
                    },
                },
                signature: HashedRekordSignature {
                    content: encode_base64(signature),
                    public_key: PublicKeyContent {
                        content: encode_base64(certificate_pem),
                    },
                },
            },
        }
    }
}

//! Deterministic keyless fixtures: a certificate authority, a short-lived
//! leaf with an embedded SCT, a transparency log holding the entry at index
//! 42, and the matching `trusted_root.json` snapshot.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use plugin_sig_core::{sha256, sha256_hex};
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, Ia5String, IsCa, KeyUsagePurpose, SanType, SerialNumber,
};
use serde_json::json;
use time::{Duration, OffsetDateTime};
use x509_cert::Certificate;
use x509_cert::der::asn1::{OctetString, Utf8StringRef};
use x509_cert::der::{Decode, Encode};

use crate::checkpoint::{Checkpoint, sign_checkpoint};
use crate::merkle::{hash_leaf, reference};
use crate::sct::{SignedCertificateTimestamp, encode_sct_list, precertificate_tbs};
use crate::tlog::{HashedRekord, InclusionProof, TlogEntry};

/// 2024-01-01T00:00:00Z
pub(crate) const T0: i64 = 1_704_067_200;
pub(crate) use crate::GITHUB_ACTIONS_ISSUER;
pub(crate) const SUBJECT: &str = "https://github.com/terraform-linters/tflint-ruleset-aws/.github/workflows/release.yml@refs/tags/v0.30.0";
pub(crate) const LOG_INDEX: i64 = 42;
pub(crate) const INTEGRATED_TIME: i64 = T0 + 120;
const TREE_SIZE: usize = 100;
const CHECKPOINT_ORIGIN: &str = "rekor.sigstore.dev - 1193050959916656506";

const OID_ISSUER_V1: &[u64] = &[1, 3, 6, 1, 4, 1, 57264, 1, 1];
const OID_ISSUER_V2: &[u64] = &[1, 3, 6, 1, 4, 1, 57264, 1, 8];
const OID_SCT_LIST: &[u64] = &[1, 3, 6, 1, 4, 1, 11129, 2, 4, 2];

pub(crate) struct EcdsaKey {
    pub signing: SigningKey,
    pub verifying: VerifyingKey,
}

impl EcdsaKey {
    pub fn spki_der(&self) -> Vec<u8> {
        self.verifying.to_public_key_der().unwrap().as_bytes().to_vec()
    }

    /// SHA-256 of the SubjectPublicKeyInfo: the log id of a log using this key.
    pub fn key_id(&self) -> [u8; 32] {
        sha256(&self.spki_der())
    }

    pub fn sign_der(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing.sign(message);
        signature.to_der().as_bytes().to_vec()
    }

    fn rcgen(&self) -> rcgen::KeyPair {
        let pem = self.signing.to_pkcs8_pem(LineEnding::LF).unwrap();
        rcgen::KeyPair::from_pem(&pem).unwrap()
    }
}

/// A P-256 key derived from `seed`, so fixtures are reproducible.
pub(crate) fn ecdsa_key(seed: u8) -> EcdsaKey {
    let signing = SigningKey::from_slice(&[seed; 32]).unwrap();
    let verifying = *signing.verifying_key();
    EcdsaKey { signing, verifying }
}

fn at(unix: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(unix).unwrap()
}

fn der_utf8(value: &str) -> Vec<u8> {
    Utf8StringRef::new(value).unwrap().to_der().unwrap()
}

pub(crate) struct Fixture {
    pub artifact: Vec<u8>,
    pub subject: String,
    pub certificate_der: Vec<u8>,
    pub certificate_pem: String,
    /// DER ECDSA signature over the artifact.
    pub signature: Vec<u8>,
    /// Contents of the `.pem` release asset: base64 of the PEM certificate.
    pub certificate_file: String,
    /// Contents of the `.sig` release asset: base64 of the signature.
    pub signature_file: String,
    pub entry: TlogEntry,
    pub rekor_key: EcdsaKey,
    pub trusted_root_json: String,
}

pub(crate) struct FixtureBuilder {
    subject: String,
    issuer: String,
    legacy_issuer_only: bool,
    with_sct: bool,
    ct_log_trusted: bool,
    ca_seed: u8,
}

impl FixtureBuilder {
    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn issuer(mut self, issuer: &str) -> Self {
        self.issuer = issuer.to_string();
        self
    }

    pub fn legacy_issuer_only(mut self) -> Self {
        self.legacy_issuer_only = true;
        self
    }

    pub fn without_sct(mut self) -> Self {
        self.with_sct = false;
        self
    }

    pub fn ct_log_trusted(mut self, trusted: bool) -> Self {
        self.ct_log_trusted = trusted;
        self
    }

    pub fn ca_seed(mut self, seed: u8) -> Self {
        self.ca_seed = seed;
        self
    }

    fn leaf_params(&self, extra: Option<CustomExtension>) -> CertificateParams {
        let mut params = CertificateParams::default();
        params.distinguished_name = DistinguishedName::new();
        params.serial_number = Some(SerialNumber::from(0x5157_2f0c_u64));
        params.not_before = at(T0);
        params.not_after = at(T0) + Duration::minutes(10);
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::CodeSigning];
        params.subject_alt_names = vec![SanType::URI(
            Ia5String::try_from(self.subject.as_str()).unwrap(),
        )];

        let mut extensions = vec![CustomExtension::from_oid_content(
            OID_ISSUER_V1,
            self.issuer.as_bytes().to_vec(),
        )];
        if !self.legacy_issuer_only {
            extensions.push(CustomExtension::from_oid_content(
                OID_ISSUER_V2,
                der_utf8(&self.issuer),
            ));
        }
        extensions.extend(extra);
        params.custom_extensions = extensions;
        params
    }

    pub fn build(self) -> Fixture {
        let ca_key = ecdsa_key(self.ca_seed);
        let leaf_key = ecdsa_key(12);
        let rekor_key = ecdsa_key(13);
        let ct_key = ecdsa_key(14);

        let mut ca_params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "sigstore.dev");
        dn.push(DnType::CommonName, "sigstore");
        ca_params.distinguished_name = dn;
        ca_params.serial_number = Some(SerialNumber::from(1u64));
        ca_params.not_before = at(T0) - Duration::days(365);
        ca_params.not_after = at(T0) + Duration::days(3650);
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let ca_rcgen = ca_key.rcgen();
        let ca_cert = ca_params.self_signed(&ca_rcgen).unwrap();
        let ca_der = ca_cert.der().to_vec();

        let leaf_rcgen = leaf_key.rcgen();
        let precert = self
            .leaf_params(None)
            .signed_by(&leaf_rcgen, &ca_cert, &ca_rcgen)
            .unwrap();

        let certificate_der = if self.with_sct {
            let parsed = Certificate::from_der(precert.der()).unwrap();
            let tbs = precertificate_tbs(&parsed).unwrap();
            let ca_parsed = Certificate::from_der(&ca_der).unwrap();
            let issuer_key_hash = sha256(
                &ca_parsed
                    .tbs_certificate
                    .subject_public_key_info
                    .to_der()
                    .unwrap(),
            );

            let mut sct = SignedCertificateTimestamp {
                version: 0,
                log_id: ct_key.key_id(),
                timestamp: (T0 as u64 + 5) * 1000,
                extensions: Vec::new(),
                hash_algorithm: 4,
                signature_algorithm: 3,
                signature: Vec::new(),
            };
            sct.signature = ct_key.sign_der(&sct.signed_data(&issuer_key_hash, &tbs).unwrap());

            let list = OctetString::new(encode_sct_list(&[sct])).unwrap().to_der().unwrap();
            let extension = CustomExtension::from_oid_content(OID_SCT_LIST, list);
            self.leaf_params(Some(extension))
                .signed_by(&leaf_rcgen, &ca_cert, &ca_rcgen)
                .unwrap()
                .der()
                .to_vec()
        } else {
            precert.der().to_vec()
        };

        let certificate_pem = pem::encode(&pem::Pem::new("CERTIFICATE", certificate_der.clone()));
        let artifact = b"PK\x03\x04 tflint-ruleset-aws_linux_amd64 release archive".to_vec();
        let signature = leaf_key.sign_der(&artifact);

        let record =
            HashedRekord::new(&sha256_hex(&artifact), &signature, certificate_pem.as_bytes());
        let body = serde_json::to_vec(&record).unwrap();

        let mut leaves: Vec<[u8; 32]> = (0..TREE_SIZE)
            .map(|i| hash_leaf(format!("unrelated entry {i}").as_bytes()))
            .collect();
        leaves[LOG_INDEX as usize] = hash_leaf(&body);
        let root_hash = reference::root(&leaves).to_vec();
        let hashes = reference::audit_path(LOG_INDEX as usize, &leaves)
            .into_iter()
            .map(|h| h.to_vec())
            .collect();

        let log_id = rekor_key.key_id().to_vec();
        let checkpoint = sign_checkpoint(
            &Checkpoint {
                origin: CHECKPOINT_ORIGIN.to_string(),
                tree_size: TREE_SIZE as u64,
                root_hash: root_hash.clone(),
                other_content: Vec::new(),
            },
            &log_id,
            &rekor_key.signing,
        );

        let mut entry = TlogEntry {
            body,
            integrated_time: INTEGRATED_TIME,
            log_index: LOG_INDEX,
            log_id,
            signed_entry_timestamp: None,
            inclusion_proof: Some(InclusionProof {
                log_index: LOG_INDEX,
                root_hash,
                tree_size: TREE_SIZE as i64,
                hashes,
                checkpoint,
            }),
        };
        entry.signed_entry_timestamp =
            Some(rekor_key.sign_der(&entry.canonical_set_payload().unwrap()));

        let ctlogs = if self.ct_log_trusted {
            json!([{
                "baseUrl": "https://ctfe.sigstore.dev/2022",
                "hashAlgorithm": "SHA2_256",
                "publicKey": {
                    "rawBytes": STANDARD.encode(ct_key.spki_der()),
                    "keyDetails": "PKIX_ECDSA_P256_SHA_256",
                    "validFor": {"start": "2023-01-01T00:00:00Z"}
                },
                "logId": {"keyId": STANDARD.encode(ct_key.key_id())}
            }])
        } else {
            json!([])
        };
        let trusted_root = json!({
            "mediaType": "application/vnd.dev.sigstore.trustedroot+json;version=0.1",
            "tlogs": [{
                "baseUrl": "https://rekor.sigstore.dev",
                "hashAlgorithm": "SHA2_256",
                "publicKey": {
                    "rawBytes": STANDARD.encode(rekor_key.spki_der()),
                    "keyDetails": "PKIX_ECDSA_P256_SHA_256",
                    "validFor": {"start": "2023-01-01T00:00:00Z"}
                },
                "logId": {"keyId": STANDARD.encode(rekor_key.key_id())}
            }],
            "certificateAuthorities": [{
                "subject": {"organization": "sigstore.dev", "commonName": "sigstore"},
                "uri": "https://fulcio.sigstore.dev",
                "certChain": {"certificates": [{"rawBytes": STANDARD.encode(&ca_der)}]},
                "validFor": {"start": "2023-01-01T00:00:00Z"}
            }],
            "ctlogs": ctlogs,
            "timestampAuthorities": []
        });

        Fixture {
            certificate_file: STANDARD.encode(&certificate_pem) + "\n",
            signature_file: STANDARD.encode(&signature) + "\n",
            artifact,
            subject: self.subject,
            certificate_der,
            certificate_pem,
            signature,
            entry,
            rekor_key,
            trusted_root_json: trusted_root.to_string(),
        }
    }
}

impl Fixture {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> FixtureBuilder {
        FixtureBuilder {
            subject: SUBJECT.to_string(),
            issuer: GITHUB_ACTIONS_ISSUER.to_string(),
            legacy_issuer_only: false,
            with_sct: true,
            ct_log_trusted: true,
            ca_seed: 11,
        }
    }

    /// What the log's `entries/retrieve` endpoint answers for this entry.
    pub fn rekor_response(&self) -> serde_json::Value {
        let proof = self.entry.inclusion_proof.as_ref().unwrap();
        let set = self.entry.signed_entry_timestamp.as_ref().unwrap();
        let uuid = hex::encode(self.entry.leaf_hash());
        json!([{
            (uuid): {
                "body": STANDARD.encode(&self.entry.body),
                "integratedTime": self.entry.integrated_time,
                "logID": self.entry.log_id_hex(),
                "logIndex": self.entry.log_index,
                "verification": {
                    "signedEntryTimestamp": STANDARD.encode(set),
                    "inclusionProof": {
                        "checkpoint": proof.checkpoint,
                        "hashes": proof.hashes.iter().map(hex::encode).collect::<Vec<_>>(),
                        "logIndex": proof.log_index,
                        "rootHash": hex::encode(&proof.root_hash),
                        "treeSize": proof.tree_size
                    }
                }
            }
        }])
    }
}

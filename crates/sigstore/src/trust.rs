//! Trust material: the authority keys used to validate log entries,
//! certificates and certificate-transparency timestamps.
//!
//! The document format is Sigstore's `trusted_root.json`. Sources fetch the
//! raw document; [`TrustedMaterial`] is the parsed, ready-to-use form.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use p256::ecdsa::VerifyingKey;
use p256::pkcs8::DecodePublicKey;
use plugin_sig_core::encoding::decode_base64;
use plugin_sig_core::{Error, Result};
use rustls_pki_types::CertificateDer;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

pub const TRUSTED_ROOT_TARGET: &str = "trusted_root.json";

const P256_KEY_DETAILS: &str = "PKIX_ECDSA_P256_SHA_256";

/// Serialized trust root.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedRoot {
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub tlogs: Vec<TransparencyLogInstance>,
    #[serde(default)]
    pub certificate_authorities: Vec<CertificateAuthority>,
    #[serde(default)]
    pub ctlogs: Vec<TransparencyLogInstance>,
    #[serde(default)]
    pub timestamp_authorities: Vec<CertificateAuthority>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransparencyLogInstance {
    pub base_url: String,
    #[serde(default)]
    pub hash_algorithm: Option<String>,
    pub public_key: PublicKey,
    pub log_id: LogId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    /// Base64 DER SubjectPublicKeyInfo.
    #[serde(default)]
    pub raw_bytes: Option<String>,
    #[serde(default)]
    pub key_details: Option<String>,
    #[serde(default)]
    pub valid_for: Option<TimeRange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogId {
    /// Base64 SHA-256 of the log's public key.
    pub key_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateAuthority {
    #[serde(default)]
    pub subject: Option<DistinguishedName>,
    #[serde(default)]
    pub uri: Option<String>,
    pub cert_chain: CertChain,
    #[serde(default)]
    pub valid_for: Option<TimeRange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistinguishedName {
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub common_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertChain {
    pub certificates: Vec<RawCertificate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCertificate {
    pub raw_bytes: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TimeRange {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Whether the unix timestamp `at` (seconds) falls inside the range.
    /// Open ends are unbounded.
    pub fn contains(&self, at: i64) -> bool {
        self.start.is_none_or(|start| start.timestamp() <= at)
            && self.end.is_none_or(|end| at <= end.timestamp())
    }
}

/// A log public key, indexed by the log id derived from it.
#[derive(Debug, Clone)]
pub struct LogKey {
    pub base_url: String,
    pub log_id: Vec<u8>,
    pub key: VerifyingKey,
    pub valid_for: TimeRange,
}

/// A certificate authority chain. The last certificate is the root.
#[derive(Debug, Clone)]
pub struct AuthorityChain {
    pub uri: String,
    pub name: String,
    pub certificates: Vec<CertificateDer<'static>>,
    pub valid_for: TimeRange,
}

impl AuthorityChain {
    pub fn root(&self) -> Option<&CertificateDer<'static>> {
        self.certificates.last()
    }

    pub fn intermediates(&self) -> &[CertificateDer<'static>] {
        match self.certificates.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }
}

/// Parsed trust root.
#[derive(Debug, Clone, Default)]
pub struct TrustedMaterial {
    pub tlogs: Vec<LogKey>,
    pub ctlogs: Vec<LogKey>,
    pub certificate_authorities: Vec<AuthorityChain>,
    pub timestamp_authorities: Vec<AuthorityChain>,
}

impl TrustedMaterial {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let root: TrustedRoot = serde_json::from_slice(data)
            .map_err(|e| Error::malformed_with("invalid trusted root document", e))?;
        Self::from_trusted_root(&root)
    }

    pub fn from_trusted_root(root: &TrustedRoot) -> Result<Self> {
        let material = Self {
            tlogs: load_log_keys(&root.tlogs, "transparency log")?,
            ctlogs: load_log_keys(&root.ctlogs, "certificate transparency log")?,
            certificate_authorities: load_authorities(&root.certificate_authorities)?,
            timestamp_authorities: load_authorities(&root.timestamp_authorities)?,
        };

        tracing::debug!(
            tlogs = material.tlogs.len(),
            ctlogs = material.ctlogs.len(),
            certificate_authorities = material.certificate_authorities.len(),
            timestamp_authorities = material.timestamp_authorities.len(),
            "Loaded trusted root"
        );
        Ok(material)
    }
}

fn load_log_keys(instances: &[TransparencyLogInstance], what: &str) -> Result<Vec<LogKey>> {
    let mut keys = Vec::with_capacity(instances.len());
    for instance in instances {
        let details = instance.public_key.key_details.as_deref().unwrap_or_default();
        let Some(raw) = instance.public_key.raw_bytes.as_deref() else {
            tracing::warn!(log = %instance.base_url, "Skipping {what} without a public key");
            continue;
        };
        if details != P256_KEY_DETAILS {
            tracing::warn!(
                log = %instance.base_url,
                key_details = details,
                "Skipping {what} with unsupported key type"
            );
            continue;
        }

        let der = decode_base64(raw, "log public key")?;
        let key = VerifyingKey::from_public_key_der(&der).map_err(|e| {
            Error::malformed(format!("invalid {what} key for {}: {e}", instance.base_url))
        })?;
        keys.push(LogKey {
            base_url: instance.base_url.clone(),
            log_id: decode_base64(&instance.log_id.key_id, "log id")?,
            key,
            valid_for: instance.public_key.valid_for.unwrap_or_default(),
        });
    }
    Ok(keys)
}

fn load_authorities(authorities: &[CertificateAuthority]) -> Result<Vec<AuthorityChain>> {
    authorities
        .iter()
        .filter(|ca| !ca.cert_chain.certificates.is_empty())
        .map(|ca| {
            let certificates = ca
                .cert_chain
                .certificates
                .iter()
                .map(|cert| {
                    decode_base64(&cert.raw_bytes, "authority certificate")
                        .map(CertificateDer::from)
                })
                .collect::<Result<Vec<_>>>()?;
            let name = ca
                .subject
                .as_ref()
                .map(|s| {
                    format!(
                        "{} - {}",
                        s.organization.as_deref().unwrap_or_default(),
                        s.common_name.as_deref().unwrap_or_default()
                    )
                })
                .unwrap_or_default();
            Ok(AuthorityChain {
                uri: ca.uri.clone().unwrap_or_default(),
                name,
                certificates,
                valid_for: ca.valid_for.unwrap_or_default(),
            })
        })
        .collect()
}

/// An ordered set of trust roots searched front to back.
///
/// Never mutated after construction; a refresh builds a new collection.
#[derive(Debug, Clone, Default)]
pub struct TrustedMaterialCollection {
    materials: Vec<TrustedMaterial>,
}

impl TrustedMaterialCollection {
    pub fn new(materials: Vec<TrustedMaterial>) -> Self {
        Self { materials }
    }

    pub fn single(material: TrustedMaterial) -> Self {
        Self::new(vec![material])
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// The transparency-log key for `log_id` that was valid at `at`.
    pub fn tlog_key(&self, log_id: &[u8], at: i64) -> Option<&LogKey> {
        self.materials
            .iter()
            .flat_map(|m| &m.tlogs)
            .find(|k| k.log_id == log_id && k.valid_for.contains(at))
    }

    pub fn ctlog_key(&self, log_id: &[u8], at: i64) -> Option<&LogKey> {
        self.materials
            .iter()
            .flat_map(|m| &m.ctlogs)
            .find(|k| k.log_id == log_id && k.valid_for.contains(at))
    }

    pub fn certificate_authorities(&self) -> impl Iterator<Item = &AuthorityChain> {
        self.materials.iter().flat_map(|m| &m.certificate_authorities)
    }
}

/// Where the signed trust-root document comes from.
#[async_trait]
pub trait TrustRootSource: Send + Sync {
    /// The raw `trusted_root.json` document.
    async fn trusted_root_json(&self) -> Result<Vec<u8>>;
}

/// Serializes refreshes of the on-disk cache within this process. Other
/// processes may refresh concurrently and the last writer wins.
static TUF_REFRESH: LazyLock<tokio::sync::Mutex<()>> =
    LazyLock::new(|| tokio::sync::Mutex::new(()));

/// Refresh-and-read rounds before an unreadable target is reported.
const REFRESH_ATTEMPTS: u32 = 3;
const REFRESH_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Fetches the trust root through Sigstore's TUF repository, caching targets
/// under a local directory.
#[derive(Debug, Clone)]
pub struct TufTrustRoot {
    cache_dir: PathBuf,
    timeout: Option<Duration>,
}

impl TufTrustRoot {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            timeout: None,
        }
    }

    /// Bound each metadata and target refresh.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Update metadata from the mirror and rewrite the cached target when it
    /// is stale.
    async fn refresh(&self) -> Result<()> {
        let update = async {
            sigstore::trust::sigstore::SigstoreTrustRoot::new(Some(self.cache_dir.as_path()))
                .await
                .map(drop)
                .map_err(|e| Error::transport(format!("failed to update trust root via TUF: {e}")))
        };
        with_timeout(self.timeout, "trust root update", update).await
    }
}

#[async_trait]
impl TrustRootSource for TufTrustRoot {
    #[tracing::instrument(
        skip(self),
        fields(cache_dir = %self.cache_dir.display(), mirror = crate::DEFAULT_TUF_MIRROR)
    )]
    async fn trusted_root_json(&self) -> Result<Vec<u8>> {
        let _guard = TUF_REFRESH.lock().await;

        tokio::fs::create_dir_all(&self.cache_dir).await.map_err(|e| {
            Error::transport_with(
                format!("failed to create TUF cache directory {}", self.cache_dir.display()),
                e,
            )
        })?;

        let path = self.cache_dir.join(TRUSTED_ROOT_TARGET);
        let data = refresh_and_read(&path, || self.refresh()).await?;
        tracing::debug!(len = data.len(), "Trust root refreshed");
        Ok(data)
    }
}

/// Run `refresh`, then read the target it maintains at `path`.
///
/// The TUF client rewrites the target in place, so a refresh in another
/// process can leave a partial document on disk while it is being read. A
/// prefix of a JSON object never parses, so only a complete document is
/// returned; anything else is re-read after another refresh.
async fn refresh_and_read<R, F>(path: &Path, mut refresh: R) -> Result<Vec<u8>>
where
    R: FnMut() -> F,
    F: Future<Output = Result<()>>,
{
    let mut attempt = 1;
    loop {
        refresh().await?;
        let data = tokio::fs::read(path).await.map_err(|e| {
            Error::transport_with(format!("failed to read {}", path.display()), e)
        })?;
        match serde_json::from_slice::<TrustedRoot>(&data) {
            Ok(_) => return Ok(data),
            Err(e) if attempt < REFRESH_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "Cached trust root is incomplete, retrying");
                attempt += 1;
                tokio::time::sleep(REFRESH_RETRY_DELAY).await;
            }
            Err(e) => return Err(Error::malformed_with("invalid trusted root document", e)),
        }
    }
}

/// Await `operation`, failing with a transport error once `timeout` elapses.
async fn with_timeout<T, F>(timeout: Option<Duration>, what: &str, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(limit) = timeout else {
        return operation.await;
    };
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| Error::transport(format!("{what} timed out after {limit:?}")))?
}

/// A pinned trust-root snapshot on disk.
#[derive(Debug, Clone)]
pub struct FileTrustRoot {
    path: PathBuf,
}

impl FileTrustRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TrustRootSource for FileTrustRoot {
    async fn trusted_root_json(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path).await.map_err(|e| {
            Error::transport_with(
                format!("failed to read trust root {}", self.path.display()),
                e,
            )
        })
    }
}

/// An in-memory trust-root document.
#[derive(Debug, Clone)]
pub struct StaticTrustRoot(pub Vec<u8>);

#[async_trait]
impl TrustRootSource for StaticTrustRoot {
    async fn trusted_root_json(&self) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// Fetch and parse the current trust root as a one-element collection.
#[tracing::instrument(skip_all)]
pub async fn get_trusted_root<S>(source: &S) -> Result<TrustedMaterialCollection>
where
    S: TrustRootSource + ?Sized,
{
    let data = source.trusted_root_json().await?;
    let material = TrustedMaterial::from_json(&data)?;
    Ok(TrustedMaterialCollection::single(material))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Fixture;
    use plugin_sig_core::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn time_range_bounds() {
        let range: TimeRange = serde_json::from_str(
            r#"{"start":"2024-01-01T00:00:00Z","end":"2024-01-02T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(!range.contains(1_704_067_199));
        assert!(range.contains(1_704_067_200));
        assert!(range.contains(1_704_153_600));
        assert!(!range.contains(1_704_153_601));
        assert!(TimeRange::default().contains(0));
    }

    #[test]
    fn loads_fixture_snapshot() {
        let fixture = Fixture::new();
        let material = TrustedMaterial::from_json(fixture.trusted_root_json.as_bytes()).unwrap();
        assert_eq!(material.tlogs.len(), 1);
        assert_eq!(material.ctlogs.len(), 1);
        assert_eq!(material.certificate_authorities.len(), 1);
        assert_eq!(material.tlogs[0].log_id, fixture.entry.log_id);
        assert_eq!(material.certificate_authorities[0].name, "sigstore.dev - sigstore");
        assert!(material.certificate_authorities[0].intermediates().is_empty());
    }

    #[test]
    fn unsupported_key_types_are_skipped() {
        let json = r#"{
            "tlogs": [{
                "baseUrl": "https://log2025-1.rekor.sigstore.dev",
                "hashAlgorithm": "SHA2_256",
                "publicKey": {"rawBytes": "AAAA", "keyDetails": "PKIX_ED25519"},
                "logId": {"keyId": "AAAA"}
            }]
        }"#;
        let material = TrustedMaterial::from_json(json.as_bytes()).unwrap();
        assert!(material.tlogs.is_empty());
    }

    #[test]
    fn invalid_document_is_malformed() {
        let err = TrustedMaterial::from_json(b"{\"tlogs\": 3}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn lookup_honours_key_validity() {
        let fixture = Fixture::new();
        let collection = TrustedMaterialCollection::single(
            TrustedMaterial::from_json(fixture.trusted_root_json.as_bytes()).unwrap(),
        );
        let log_id = &fixture.entry.log_id;
        assert!(collection.tlog_key(log_id, fixture.entry.integrated_time).is_some());
        // The fixture log key starts in 2023.
        assert!(collection.tlog_key(log_id, 1_600_000_000).is_none());
        assert!(collection.tlog_key(&[0u8; 32], fixture.entry.integrated_time).is_none());
    }

    #[tokio::test]
    async fn file_source_reads_snapshot() {
        let fixture = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRUSTED_ROOT_TARGET);
        std::fs::write(&path, &fixture.trusted_root_json).unwrap();

        let collection = get_trusted_root(&FileTrustRoot::new(&path)).await.unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.certificate_authorities().count(), 1);
    }

    #[tokio::test]
    async fn missing_snapshot_is_a_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = get_trusted_root(&FileTrustRoot::new(dir.path().join("missing.json")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn partial_target_is_read_again_after_refresh() {
        let fixture = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRUSTED_ROOT_TARGET);
        let document = fixture.trusted_root_json.clone();
        let refreshes = AtomicU32::new(0);

        let data = refresh_and_read(&path, || {
            // The first read sees a writer in another process halfway through.
            let contents = match refreshes.fetch_add(1, Ordering::SeqCst) {
                0 => &document[..document.len() / 2],
                _ => document.as_str(),
            };
            std::fs::write(&path, contents).unwrap();
            async { Ok::<_, Error>(()) }
        })
        .await
        .unwrap();

        assert_eq!(data, document.as_bytes());
        assert_eq!(refreshes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistently_corrupt_target_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRUSTED_ROOT_TARGET);
        std::fs::write(&path, b"{\"tlogs\": [").unwrap();
        let refreshes = AtomicU32::new(0);

        let err = refresh_and_read(&path, || {
            refreshes.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(()) }
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert_eq!(refreshes.load(Ordering::SeqCst), REFRESH_ATTEMPTS);
    }

    #[tokio::test]
    async fn failed_refresh_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let refreshes = AtomicU32::new(0);

        let err = refresh_and_read(&dir.path().join(TRUSTED_ROOT_TARGET), || {
            refreshes.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Error::transport("mirror unreachable")) }
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stalled_update_times_out() {
        let err = with_timeout(
            Some(Duration::from_millis(20)),
            "trust root update",
            std::future::pending::<Result<()>>(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("timed out"), "{err}");

        let quick = async { Ok::<_, Error>(7) };
        let value = with_timeout(Some(Duration::from_secs(5)), "trust root update", quick)
            .await
            .unwrap();
        assert_eq!(value, 7);
        let unbounded = async { Ok::<_, Error>(7) };
        assert_eq!(with_timeout(None, "trust root update", unbounded).await.unwrap(), 7);
    }

    #[test]
    fn tuf_source_carries_timeout() {
        let source = TufTrustRoot::new("/tmp/tuf");
        assert_eq!(source.timeout(), None);
        let source = source.with_timeout(Some(Duration::from_secs(30)));
        assert_eq!(source.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(source.cache_dir(), Path::new("/tmp/tuf"));
    }
}

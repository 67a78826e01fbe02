//! Rekor transparency-log lookups.

use async_trait::async_trait;
use plugin_sig_core::encoding::{decode_base64, decode_hex};
use plugin_sig_core::{Error, Result, sha256_hex};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::tlog::{HashedRekord, InclusionProof, TlogEntry};

const RETRIEVE_PATH: &str = "/api/v1/log/entries/retrieve";

/// Finds the log entries recorded for a signed artifact.
#[async_trait]
pub trait LogLocator: Send + Sync {
    /// Query the log for entries matching the artifact digest, the raw
    /// signature and the PEM certificate. Entries come back in the order the
    /// log supplied them.
    async fn find_entries(
        &self,
        artifact: &[u8],
        certificate_pem: &[u8],
        signature: &[u8],
    ) -> Result<Vec<TlogEntry>>;
}

/// HTTP client for a Rekor instance.
#[derive(Debug, Clone)]
pub struct RekorClient {
    base_url: String,
    http: reqwest::Client,
}

impl RekorClient {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct SearchLogQuery<'a> {
    entries: [&'a HashedRekord; 1],
}

#[async_trait]
impl LogLocator for RekorClient {
    #[tracing::instrument(
        skip_all,
        fields(url = %self.base_url, artifact_len = artifact.len(), signature_len = signature.len())
    )]
    async fn find_entries(
        &self,
        artifact: &[u8],
        certificate_pem: &[u8],
        signature: &[u8],
    ) -> Result<Vec<TlogEntry>> {
        let digest = sha256_hex(artifact);
        let proposed = HashedRekord::new(&digest, signature, certificate_pem);
        tracing::debug!(%digest, "Searching transparency log");

        let url = format!("{}{RETRIEVE_PATH}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&SearchLogQuery {
                entries: [&proposed],
            })
            .send()
            .await
            .map_err(|e| Error::transport_with(format!("request to {url} failed"), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(format!(
                "transparency log returned {status}: {}",
                body.trim()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::transport_with("failed to read transparency log response", e))?;
        let entries = parse_search_response(&bytes)?;
        if entries.is_empty() {
            return Err(Error::not_found("signature not found in transparency log"));
        }

        tracing::info!(count = entries.len(), "Found transparency log entries");
        Ok(entries)
    }
}

/// Decode an `entries/retrieve` response into log entries, keeping the order
/// of both the outer list and each inner map.
pub fn parse_search_response(data: &[u8]) -> Result<Vec<TlogEntry>> {
    let pages: Vec<OrderedEntries> = serde_json::from_slice(data)
        .map_err(|e| Error::malformed_with("invalid transparency log response", e))?;

    pages
        .into_iter()
        .flat_map(|page| page.0)
        .map(|(uuid, raw)| {
            raw.into_entry()
                .map_err(|e| Error::malformed(format!("log entry {uuid}: {e}")))
        })
        .collect()
}

/// A JSON object of `uuid -> entry` that remembers key order.
struct OrderedEntries(Vec<(String, RawLogEntry)>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of log entry UUIDs to log entries")
            }

            fn visit_map<M: MapAccess<'de>>(
                self,
                mut map: M,
            ) -> std::result::Result<Self::Value, M::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(1));
                while let Some((uuid, entry)) = map.next_entry::<String, RawLogEntry>()? {
                    entries.push((uuid, entry));
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLogEntry {
    body: String,
    integrated_time: i64,
    #[serde(rename = "logID")]
    log_id: String,
    log_index: i64,
    verification: Option<RawVerification>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerification {
    signed_entry_timestamp: Option<String>,
    inclusion_proof: Option<RawInclusionProof>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInclusionProof {
    checkpoint: String,
    hashes: Vec<String>,
    log_index: i64,
    root_hash: String,
    tree_size: i64,
}

impl RawLogEntry {
    fn into_entry(self) -> Result<TlogEntry> {
        let verification = self
            .verification
            .ok_or_else(|| Error::malformed("missing verification block"))?;
        let set = verification
            .signed_entry_timestamp
            .ok_or_else(|| Error::malformed("missing signed entry timestamp"))?;
        let proof = verification
            .inclusion_proof
            .ok_or_else(|| Error::malformed("missing inclusion proof"))?;

        let hashes = proof
            .hashes
            .iter()
            .map(|h| decode_hex(h, "inclusion proof hash"))
            .collect::<Result<Vec<_>>>()?;

        Ok(TlogEntry {
            body: decode_base64(&self.body, "log entry body")?,
            integrated_time: self.integrated_time,
            log_index: self.log_index,
            log_id: decode_hex(&self.log_id, "log id")?,
            signed_entry_timestamp: Some(decode_base64(&set, "signed entry timestamp")?),
            inclusion_proof: Some(InclusionProof {
                log_index: proof.log_index,
                root_hash: decode_hex(&proof.root_hash, "inclusion proof root hash")?,
                tree_size: proof.tree_size,
                hashes,
                checkpoint: proof.checkpoint,
            }),
        })
    }
}

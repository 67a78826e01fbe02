//! JSON output formats.

use serde::Serialize;

#[derive(Serialize)]
pub struct PgpSignatureJson {
    pub key_fingerprint: String,
    pub uids: Vec<String>,
    pub key_source: String,
}

#[derive(Serialize)]
pub struct KeylessSignatureJson {
    pub certificate_identity: String,
    pub certificate_oidc_issuer: String,
    pub rekor_log_index: Option<i64>,
    pub integrated_time: Option<String>,
}

#[derive(Serialize)]
pub struct VerifyJson<'a> {
    pub status: &'a str,
    pub command: &'a str,
    pub source: String,
    pub artifact: String,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openpgp: Option<PgpSignatureJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyless: Option<KeylessSignatureJson>,
}

#[derive(Serialize)]
pub struct SigningKeyJson<'a> {
    pub status: &'a str,
    pub command: &'a str,
    pub source: String,
    pub signing_key: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorJson<'a> {
    pub status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'a str>,
    pub error: String,
    pub causes: Vec<String>,
}

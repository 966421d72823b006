//! AWS Signature Version 4 request signing
//!
//! Produces the `Authorization`, `x-amz-date` and `x-amz-content-sha256`
//! headers for outgoing S3 requests. Payloads are always hashed (no
//! `UNSIGNED-PAYLOAD`), since every body this crate sends is already in memory.

use super::credentials::Credentials;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Characters SigV4 leaves unencoded: `A-Z a-z 0-9 - _ . ~`
pub(crate) const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Same as [`URI_ENCODE_SET`] but keeps `/` for object key paths
pub(crate) const PATH_ENCODE_SET: &AsciiSet = &URI_ENCODE_SET.remove(b'/');

/// Signs requests for one region/service with a fixed credential set
#[derive(Debug, Clone)]
pub struct SigV4Signer {
    credentials: Credentials,
    region: String,
    service: String,
}

impl SigV4Signer {
    /// Create a signer for the `s3` service in `region`
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: "s3".to_string(),
        }
    }

    /// Compute the headers that must accompany the request
    ///
    /// `url` must already carry its percent-encoded path and query exactly as
    /// they will be sent.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Vec<(&'static str, String)> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(body));

        let mut headers: BTreeMap<&'static str, String> = BTreeMap::new();
        headers.insert("host", host_header(url));
        headers.insert("x-amz-content-sha256", payload_hash.clone());
        headers.insert("x-amz-date", amz_date.clone());
        if let Some(token) = self.credentials.session_token() {
            headers.insert("x-amz-security-token", token.to_string());
        }

        let signed_headers = headers.keys().copied().collect::<Vec<_>>().join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method,
            canonical_uri(url),
            canonical_query(url),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/{}/aws4_request", date, self.region, self.service);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = hex::encode(self.signature(&date, &string_to_sign));
        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            self.credentials.access_key_id(),
            credential_scope,
            signed_headers,
            signature
        );

        // `host` is set by the HTTP client itself.
        headers.remove("host");
        let mut out: Vec<(&'static str, String)> = headers.into_iter().collect();
        out.push(("authorization", authorization));
        out
    }

    fn signature(&self, date: &str, string_to_sign: &str) -> Vec<u8> {
        let secret = format!("AWS4{}", self.credentials.secret_access_key());
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        hmac_sha256(&k_signing, string_to_sign.as_bytes())
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so this never falls through.
    match HmacSha256::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Err(_) => Vec::new(),
    }
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

fn canonical_query(url: &Url) -> String {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            (
                utf8_percent_encode(&k, URI_ENCODE_SET).to_string(),
                utf8_percent_encode(&v, URI_ENCODE_SET).to_string(),
            )
        })
        .collect();
    params.sort();
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

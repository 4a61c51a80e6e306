//! AWS Signature Version 4 request signing.
//!
//! Signs a request by hashing a canonical form of it, deriving a per-day,
//! per-region, per-service key from the secret, and sending the resulting
//! HMAC in the `Authorization` header.

use chrono::{DateTime, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Who signs and for what.
#[derive(Clone, Copy)]
pub struct SigningParams<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub time: DateTime<Utc>,
}

/// Headers to add to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Derives the signing key for one day, region and service.
pub fn signing_key(
    secret_key: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, InvalidLength> {
    let k_date = hmac(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// The `Host` header value reqwest will send for `url`.
pub fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lowercased, trimmed, sorted headers plus `host` and `x-amz-date`.
fn canonical_headers(url: &Url, headers: &[(&str, &str)], amz_date: &str) -> Vec<(String, String)> {
    let mut all: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    all.push(("host".to_string(), host_header(url)));
    all.push(("x-amz-date".to_string(), amz_date.to_string()));
    all.sort();
    all
}

fn canonical_request(
    method: &str,
    url: &Url,
    headers: &[(String, String)],
    payload: &[u8],
) -> String {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();
    let signed_headers = signed_header_names(headers);
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        url.path(),
        canonical_query(url),
        canonical_headers,
        signed_headers,
        sha256_hex(payload)
    )
}

fn signed_header_names(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

/// Signs a request.
///
/// `headers` are the headers the caller will send besides `host` and
/// `x-amz-date`, which are added here; all of them are signed.
pub fn sign(
    params: &SigningParams<'_>,
    method: &str,
    url: &Url,
    headers: &[(&str, &str)],
    payload: &[u8],
) -> Result<SignedHeaders, InvalidLength> {
    let amz_date = params.time.format("%Y%m%dT%H%M%SZ").to_string();
    let date = params.time.format("%Y%m%d").to_string();
    let scope = format!(
        "{}/{}/{}/aws4_request",
        date, params.region, params.service
    );

    let headers = canonical_headers(url, headers, &amz_date);
    let request = canonical_request(method, url, &headers, payload);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(request.as_bytes())
    );

    let key = signing_key(params.secret_key, &date, params.region, params.service)?;
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

    Ok(SignedHeaders {
        authorization: format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            params.access_key,
            scope,
            signed_header_names(&headers),
            signature
        ),
        amz_date,
    })
}

//! AWS Signature Version 4 signing for S3-compatible object storage.
//!
//! Two modes are supported: query-string presigning (credential-free URLs
//! with an embedded expiry) and header signing for the REST client's own
//! requests. Both share the same canonical-request and key-derivation core.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::FsError;

/// S3 limits presigned URL validity to 7 days.
const MAX_EXPIRES_SECONDS: u64 = 604_800;

const SERVICE: &str = "s3";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Headers to attach to an outgoing signed request.
#[derive(Debug)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub amz_content_sha256: String,
    pub host: String,
}

/// SigV4 signer bound to one endpoint and credential pair.
#[derive(Debug, Clone)]
pub struct SigV4Signer {
    endpoint: String,
    access_key: String,
    secret_key: String,
    region: String,
}

impl SigV4Signer {
    pub fn new(endpoint: &str, access_key: &str, secret_key: &str, region: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            region: region.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn validate(&self, bucket: &str, key: &str) -> Result<(), FsError> {
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(FsError::NotConfigured("storage access/secret key"));
        }
        if self.endpoint.is_empty() {
            return Err(FsError::NotConfigured("storage endpoint"));
        }
        if bucket.is_empty() {
            return Err(FsError::Sign("bucket component is empty".to_string()));
        }
        if key.is_empty() {
            return Err(FsError::Sign("object key is empty".to_string()));
        }
        Ok(())
    }

    fn host(&self) -> Result<String, FsError> {
        let host = self
            .endpoint
            .strip_prefix("http://")
            .or_else(|| self.endpoint.strip_prefix("https://"))
            .unwrap_or(&self.endpoint);
        let host = host.split('/').next().unwrap_or(host);
        if host.is_empty() {
            return Err(FsError::NotConfigured("storage endpoint"));
        }
        Ok(host.to_string())
    }

    fn credential_scope(&self, date: &str) -> String {
        format!("{}/{}/{}/aws4_request", date, self.region, SERVICE)
    }

    fn signing_key(&self, date: &str) -> Vec<u8> {
        let k_date = hmac_sha256(format!("AWS4{}", self.secret_key).as_bytes(), date.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }

    fn signature(&self, date: &str, string_to_sign: &str) -> String {
        let key = self.signing_key(date);
        hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()))
    }

    /// Produce a presigned GET URL for `bucket/key`, valid for
    /// `expires_seconds` (capped to the S3 maximum of 7 days).
    pub fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<String, FsError> {
        self.validate(bucket, key)?;
        let expires = expires_seconds.min(MAX_EXPIRES_SECONDS);

        let date = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let scope = self.credential_scope(&date);

        let canonical_uri = uri_encode_path(&format!("/{}/{}", bucket, key.trim_start_matches('/')));

        let mut query = BTreeMap::new();
        query.insert("X-Amz-Algorithm".to_string(), ALGORITHM.to_string());
        query.insert(
            "X-Amz-Credential".to_string(),
            format!("{}/{}", self.access_key, scope),
        );
        query.insert("X-Amz-Date".to_string(), amz_date.clone());
        query.insert("X-Amz-Expires".to_string(), expires.to_string());
        query.insert("X-Amz-SignedHeaders".to_string(), "host".to_string());
        let canonical_query = canonical_query_string(&query);

        let host = self.host()?;
        let canonical_request = format!(
            "GET\n{}\n{}\nhost:{}\n\nhost\n{}",
            canonical_uri, canonical_query, host, UNSIGNED_PAYLOAD
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            hex_sha256(canonical_request.as_bytes())
        );
        let signature = self.signature(&date, &string_to_sign);

        Ok(format!(
            "{}{}?{}&X-Amz-Signature={}",
            self.endpoint, canonical_uri, canonical_query, signature
        ))
    }

    /// Sign an outgoing request to `bucket/key` with the given method and
    /// query parameters, returning the headers the caller must attach.
    pub fn sign_request(
        &self,
        method: &str,
        bucket: &str,
        key: &str,
        query: &BTreeMap<String, String>,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SignedHeaders, FsError> {
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(FsError::NotConfigured("storage access/secret key"));
        }

        let date = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let scope = self.credential_scope(&date);
        let host = self.host()?;
        let payload_hash = hex_sha256(payload);

        // Key may legitimately be empty for bucket-level operations (ListObjectsV2).
        let path = if key.is_empty() {
            format!("/{}", bucket)
        } else {
            format!("/{}/{}", bucket, key.trim_start_matches('/'))
        };
        let canonical_uri = uri_encode_path(&path);
        let canonical_query = canonical_query_string(query);

        let canonical_headers = format!(
            "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            host, payload_hash, amz_date
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            hex_sha256(canonical_request.as_bytes())
        );
        let signature = self.signature(&date, &string_to_sign);

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key, scope, signed_headers, signature
        );

        Ok(SignedHeaders {
            authorization,
            amz_date,
            amz_content_sha256: payload_hash,
            host,
        })
    }
}

/// URI-encode a path, preserving slashes.
fn uri_encode_path(path: &str) -> String {
    uri_encode(path, true)
}

/// URI-encode a query value, escaping slashes.
fn uri_encode_value(value: &str) -> String {
    uri_encode(value, false)
}

fn uri_encode(input: &str, preserve_slash: bool) -> String {
    use std::fmt::Write;
    let mut result = String::with_capacity(input.len() * 3);
    for c in input.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => result.push(c),
            '/' if preserve_slash => result.push(c),
            _ => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).as_bytes() {
                    let _ = write!(result, "%{:02X}", b);
                }
            }
        }
    }
    result
}

pub(crate) fn canonical_query_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode_value(k), uri_encode_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> SigV4Signer {
        SigV4Signer::new("http://storage.local:9000", "test-access", "test-secret", "us-east-1")
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn presigned_url_carries_sigv4_query() {
        let url = signer()
            .presign_get("media", "path/to/frame.jpg", 172_800, fixed_now())
            .unwrap();

        assert!(url.starts_with("http://storage.local:9000/media/path/to/frame.jpg?"));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Credential=test-access"));
        assert!(url.contains("X-Amz-Expires=172800"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[test]
    fn presign_is_deterministic_for_fixed_timestamp() {
        let a = signer().presign_get("b", "k", 3600, fixed_now()).unwrap();
        let b = signer().presign_get("b", "k", 3600, fixed_now()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn expiry_capped_to_s3_maximum() {
        let url = signer()
            .presign_get("b", "k", 10 * MAX_EXPIRES_SECONDS, fixed_now())
            .unwrap();
        assert!(url.contains(&format!("X-Amz-Expires={}", MAX_EXPIRES_SECONDS)));
    }

    #[test]
    fn missing_credentials_fail() {
        let signer = SigV4Signer::new("http://storage.local:9000", "", "", "us-east-1");
        assert!(matches!(
            signer.presign_get("b", "k", 3600, fixed_now()),
            Err(FsError::NotConfigured(_))
        ));
    }

    #[test]
    fn empty_key_rejected_for_presign() {
        assert!(matches!(
            signer().presign_get("b", "", 3600, fixed_now()),
            Err(FsError::Sign(_))
        ));
    }

    #[test]
    fn header_signing_produces_authorization() {
        let headers = signer()
            .sign_request("GET", "media", "a.jpg", &BTreeMap::new(), b"", fixed_now())
            .unwrap();
        assert!(headers.authorization.starts_with("AWS4-HMAC-SHA256 Credential=test-access/"));
        assert!(headers.authorization.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
        assert_eq!(headers.host, "storage.local:9000");
        // Empty payload hash is the well-known SHA-256 of zero bytes.
        assert_eq!(
            headers.amz_content_sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn path_encoding_preserves_slashes_only_in_paths() {
        assert_eq!(uri_encode_path("/b/path to/key"), "/b/path%20to/key");
        assert_eq!(uri_encode_value("path/to"), "path%2Fto");
    }
}

//! Minimal S3-compatible REST client.
//!
//! Covers the handful of object operations the adapters need (GET, PUT,
//! HEAD, DELETE, ListObjectsV2) plus presigned GET URLs. Requests are
//! SigV4 header-signed; presigning is a pure computation and needs no
//! network round trip.

use chrono::Utc;
use reqwest::Method;
use std::collections::BTreeMap;

use crate::config::StorageConfig;

use super::sign::{canonical_query_string, SigV4Signer};
use super::FsError;

/// One page delimiter for "directory" listings.
const LIST_DELIMITER: &str = "/";

pub struct ObjectStoreClient {
    http: reqwest::Client,
    signer: SigV4Signer,
}

impl ObjectStoreClient {
    pub fn from_config(config: &StorageConfig) -> Result<Self, FsError> {
        if config.endpoint.is_empty() {
            return Err(FsError::NotConfigured("storage endpoint"));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            signer: SigV4Signer::new(
                &config.endpoint,
                &config.access_key,
                &config.secret_key,
                &config.region,
            ),
        })
    }

    async fn send(
        &self,
        method: Method,
        bucket: &str,
        key: &str,
        query: &BTreeMap<String, String>,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, FsError> {
        let headers = self
            .signer
            .sign_request(method.as_str(), bucket, key, query, &body, Utc::now())?;

        let mut url = if key.is_empty() {
            format!("{}/{}", self.signer.endpoint(), bucket)
        } else {
            format!("{}/{}/{}", self.signer.endpoint(), bucket, key)
        };
        if !query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query_string(query));
        }

        self.http
            .request(method, &url)
            .header("authorization", headers.authorization)
            .header("x-amz-date", headers.amz_date)
            .header("x-amz-content-sha256", headers.amz_content_sha256)
            .body(body)
            .send()
            .await
            .map_err(|e| FsError::Request(e.to_string()))
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, FsError> {
        let uri = format!("{}/{}", bucket, key);
        let resp = self
            .send(Method::GET, bucket, key, &BTreeMap::new(), Vec::new())
            .await?;
        if !resp.status().is_success() {
            return Err(FsError::UnexpectedStatus {
                status: resp.status().as_u16(),
                uri,
            });
        }
        let bytes = resp.bytes().await.map_err(|e| FsError::Request(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    pub async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), FsError> {
        let uri = format!("{}/{}", bucket, key);
        let resp = self
            .send(Method::PUT, bucket, key, &BTreeMap::new(), data)
            .await?;
        if !resp.status().is_success() {
            return Err(FsError::UnexpectedStatus {
                status: resp.status().as_u16(),
                uri,
            });
        }
        Ok(())
    }

    /// HEAD an object. `Ok(Some(size))` when present, `Ok(None)` when the
    /// store reports 404.
    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>, FsError> {
        let uri = format!("{}/{}", bucket, key);
        let resp = self
            .send(Method::HEAD, bucket, key, &BTreeMap::new(), Vec::new())
            .await?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(FsError::UnexpectedStatus {
                status: resp.status().as_u16(),
                uri,
            });
        }
        let size = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        Ok(Some(size))
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), FsError> {
        let uri = format!("{}/{}", bucket, key);
        let resp = self
            .send(Method::DELETE, bucket, key, &BTreeMap::new(), Vec::new())
            .await?;
        // S3 answers 204 for deletes, including of absent keys.
        if !resp.status().is_success() && resp.status().as_u16() != 404 {
            return Err(FsError::UnexpectedStatus {
                status: resp.status().as_u16(),
                uri,
            });
        }
        Ok(())
    }

    /// List one level under `prefix`, returning (object keys, child prefixes).
    /// Follows continuation tokens across pages.
    pub async fn list_dir(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<(Vec<String>, Vec<String>), FsError> {
        let mut normalized = prefix.to_string();
        if !normalized.is_empty() && !normalized.ends_with(LIST_DELIMITER) {
            normalized.push_str(LIST_DELIMITER);
        }

        let mut keys = Vec::new();
        let mut dirs = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = BTreeMap::new();
            query.insert("list-type".to_string(), "2".to_string());
            query.insert("delimiter".to_string(), LIST_DELIMITER.to_string());
            if !normalized.is_empty() {
                query.insert("prefix".to_string(), normalized.clone());
            }
            if let Some(token) = &continuation {
                query.insert("continuation-token".to_string(), token.clone());
            }

            let resp = self
                .send(Method::GET, bucket, "", &query, Vec::new())
                .await?;
            if !resp.status().is_success() {
                return Err(FsError::UnexpectedStatus {
                    status: resp.status().as_u16(),
                    uri: format!("{}/{}", bucket, normalized),
                });
            }
            let body = resp.text().await.map_err(|e| FsError::Request(e.to_string()))?;

            let page = parse_list_page(&body, &normalized);
            keys.extend(page.keys);
            dirs.extend(page.prefixes);

            match page.next_continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok((keys, dirs))
    }

    pub fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_seconds: u64,
    ) -> Result<String, FsError> {
        self.signer.presign_get(bucket, key, expires_seconds, Utc::now())
    }
}

struct ListPage {
    keys: Vec<String>,
    prefixes: Vec<String>,
    next_continuation: Option<String>,
}

/// Pull keys and common prefixes out of a ListObjectsV2 response. The
/// response shape is fixed enough that targeted tag extraction beats a
/// full XML dependency here.
fn parse_list_page(xml: &str, request_prefix: &str) -> ListPage {
    let mut keys = Vec::new();
    for block in extract_blocks(xml, "Contents") {
        for key in extract_tag_values(block, "Key") {
            // The prefix itself can be returned as a zero-byte marker object.
            if key != request_prefix {
                keys.push(key);
            }
        }
    }

    let mut prefixes = Vec::new();
    for block in extract_blocks(xml, "CommonPrefixes") {
        for prefix in extract_tag_values(block, "Prefix") {
            prefixes.push(prefix.trim_end_matches('/').to_string());
        }
    }

    let truncated = extract_tag_values(xml, "IsTruncated")
        .first()
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_continuation = if truncated {
        extract_tag_values(xml, "NextContinuationToken").into_iter().next()
    } else {
        None
    };

    ListPage { keys, prefixes, next_continuation }
}

/// Return the inner text of every `<tag>...</tag>` block.
fn extract_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut blocks = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        match after.find(&close) {
            Some(end) => {
                blocks.push(&after[..end]);
                rest = &after[end + close.len()..];
            }
            None => break,
        }
    }
    blocks
}

fn extract_tag_values(xml: &str, tag: &str) -> Vec<String> {
    extract_blocks(xml, tag).into_iter().map(xml_unescape).collect()
}

fn xml_unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <Name>media</Name>
  <Prefix>frames/</Prefix>
  <KeyCount>3</KeyCount>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>frames/</Key><Size>0</Size></Contents>
  <Contents><Key>frames/a.jpg</Key><Size>1024</Size></Contents>
  <Contents><Key>frames/b &amp; c.jpg</Key><Size>2048</Size></Contents>
  <CommonPrefixes><Prefix>frames/sub/</Prefix></CommonPrefixes>
</ListBucketResult>"#;

    #[test]
    fn parses_keys_and_prefixes() {
        let page = parse_list_page(LIST_RESPONSE, "frames/");
        assert_eq!(page.keys, vec!["frames/a.jpg", "frames/b & c.jpg"]);
        assert_eq!(page.prefixes, vec!["frames/sub"]);
        assert!(page.next_continuation.is_none());
    }

    #[test]
    fn follows_continuation_token_when_truncated() {
        let xml = r#"<ListBucketResult>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>token-123</NextContinuationToken>
  <Contents><Key>a</Key></Contents>
</ListBucketResult>"#;
        let page = parse_list_page(xml, "");
        assert_eq!(page.next_continuation.as_deref(), Some("token-123"));
    }

    #[test]
    fn unconfigured_endpoint_rejected() {
        let config = StorageConfig {
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            region: "us-east-1".to_string(),
            endpoint: String::new(),
            presign_expiry_secs: 3600,
        };
        assert!(matches!(
            ObjectStoreClient::from_config(&config),
            Err(FsError::NotConfigured(_))
        ));
    }
}

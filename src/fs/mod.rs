//! Filesystem and object-storage access.
//!
//! URIs select the backend: bare absolute paths and `file://` route to the
//! local filesystem, `s3://` and `bos://` (two aliases of the same remote
//! store) route to object storage.

pub mod adapter;
pub mod manager;
pub mod s3_client;
pub mod sign;

pub use adapter::{FileSystemAdapter, ListEntry, LocalFileSystemAdapter, ObjectStoreAdapter};
pub use manager::{fs_manager, FileSystemManager};

use thiserror::Error;

pub const SCHEME_FILE: &str = "file";
pub const SCHEME_S3: &str = "s3";
pub const SCHEME_BOS: &str = "bos";

const URI_SCHEME_SEPARATOR: &str = "://";

/// Errors from filesystem adapters and the URL-signing path.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("Unrecognized filesystem URI: {0}")]
    UnsupportedUri(String),

    #[error("URI missing bucket component: {0}")]
    MissingBucket(String),

    #[error("Operation not supported by this adapter: {0}")]
    UnsupportedOperation(&'static str),

    #[error("Object storage is not configured: {0}")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Object storage request failed: {0}")]
    Request(String),

    #[error("Object storage returned status {status} for {uri}")]
    UnexpectedStatus { status: u16, uri: String },

    #[error("URL signing failed: {0}")]
    Sign(String),

    #[error("File is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Backend class a URI resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Local,
    ObjectStore,
}

/// Anything that can turn an object-storage reference into a time-limited URL.
///
/// The materializer depends on this seam rather than on a concrete manager so
/// signing failures can be simulated in tests.
pub trait UrlSigner: Send + Sync {
    fn sign(&self, uri: &str, expiration_secs: u64) -> Result<String, FsError>;
}

fn starts_with_scheme(uri: &str, scheme: &str) -> bool {
    let lower = uri.to_ascii_lowercase();
    lower.starts_with(&format!("{scheme}{URI_SCHEME_SEPARATOR}"))
}

/// Extract the scheme of a URI, or `None` for bare absolute paths.
pub fn extract_scheme(uri: &str) -> Result<Option<&'static str>, FsError> {
    if uri.is_empty() {
        return Err(FsError::UnsupportedUri(uri.to_string()));
    }
    if starts_with_scheme(uri, SCHEME_S3) {
        return Ok(Some(SCHEME_S3));
    }
    if starts_with_scheme(uri, SCHEME_BOS) {
        return Ok(Some(SCHEME_BOS));
    }
    if starts_with_scheme(uri, SCHEME_FILE) {
        return Ok(Some(SCHEME_FILE));
    }
    if uri.starts_with('/') {
        return Ok(None);
    }
    Err(FsError::UnsupportedUri(uri.to_string()))
}

/// Identify the backend class for a URI, validating object URIs carry a bucket.
pub fn detect_fs_kind(uri: &str) -> Result<FsKind, FsError> {
    match extract_scheme(uri)? {
        Some(SCHEME_S3) | Some(SCHEME_BOS) => {
            split_bucket_key(uri)?;
            Ok(FsKind::ObjectStore)
        }
        Some(SCHEME_FILE) => {
            // Only absolute file:// paths are meaningful here.
            let rest = strip_scheme(uri);
            if !rest.starts_with('/') {
                return Err(FsError::UnsupportedUri(uri.to_string()));
            }
            Ok(FsKind::Local)
        }
        None => Ok(FsKind::Local),
        Some(_) => Err(FsError::UnsupportedUri(uri.to_string())),
    }
}

fn strip_scheme(uri: &str) -> &str {
    match uri.find(URI_SCHEME_SEPARATOR) {
        Some(idx) => &uri[idx + URI_SCHEME_SEPARATOR.len()..],
        None => uri,
    }
}

/// Split an object URI into bucket and key. The key may be empty.
pub fn split_bucket_key(uri: &str) -> Result<(String, String), FsError> {
    match extract_scheme(uri)? {
        Some(SCHEME_S3) | Some(SCHEME_BOS) => {}
        _ => return Err(FsError::UnsupportedUri(uri.to_string())),
    }

    let rest = strip_scheme(uri);
    if rest.is_empty() || rest.starts_with('/') {
        return Err(FsError::MissingBucket(uri.to_string()));
    }

    let (bucket, key) = match rest.split_once('/') {
        Some((bucket, key)) => (bucket.to_string(), key.to_string()),
        None => (rest.to_string(), String::new()),
    };
    if bucket.is_empty() {
        return Err(FsError::MissingBucket(uri.to_string()));
    }
    Ok((bucket, key))
}

/// Cache key for adapter instances: one local adapter, one per object scheme.
pub fn adapter_cache_key(uri: &str) -> Result<String, FsError> {
    match detect_fs_kind(uri)? {
        FsKind::Local => Ok("local".to_string()),
        FsKind::ObjectStore => {
            let scheme = extract_scheme(uri)?.unwrap_or(SCHEME_S3);
            Ok(scheme.to_string())
        }
    }
}

/// Convert a local URI to a plain filesystem path.
pub fn normalize_local_path(uri: &str) -> Result<String, FsError> {
    if detect_fs_kind(uri)? != FsKind::Local {
        return Err(FsError::UnsupportedUri(uri.to_string()));
    }
    let path = match extract_scheme(uri)? {
        Some(SCHEME_FILE) => strip_scheme(uri),
        _ => uri,
    };
    if !path.starts_with('/') {
        return Err(FsError::UnsupportedUri(uri.to_string()));
    }
    Ok(path.to_string())
}

/// Join a base URI and a relative reference with a single slash.
pub fn join_uri(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

/// Directory form of a URI, guaranteed to end with a slash.
pub fn normalize_dir_uri(uri: &str) -> String {
    if uri.ends_with('/') {
        uri.to_string()
    } else {
        format!("{}/", uri)
    }
}

/// Path of `uri` relative to the directory `base`. A URI outside `base`
/// is returned unchanged.
pub fn relative_path(uri: &str, base: &str) -> String {
    let base = normalize_dir_uri(base);
    match uri.strip_prefix(&base) {
        Some(rest) => rest.to_string(),
        None => uri.to_string(),
    }
}

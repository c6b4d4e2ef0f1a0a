//! Filesystem adapters: one for local paths, one for S3-compatible object
//! storage. Adapter selection and caching live in the manager.

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;

use crate::config::StorageConfig;

use super::s3_client::ObjectStoreClient;
use super::{normalize_local_path, split_bucket_key, FsError};

/// A directory entry returned by `list_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub path: String,
    pub is_dir: bool,
}

/// Lazily constructed object-store client shared by every adapter.
///
/// `get_or_try_init` guarantees exactly one client is built even when two
/// requests race on first use; a failed init is retried on the next call.
pub struct SharedObjectClient {
    config: StorageConfig,
    cell: OnceCell<Arc<ObjectStoreClient>>,
}

impl SharedObjectClient {
    pub fn new(config: StorageConfig) -> Self {
        Self { config, cell: OnceCell::new() }
    }

    pub fn get(&self) -> Result<Arc<ObjectStoreClient>, FsError> {
        self.cell
            .get_or_try_init(|| ObjectStoreClient::from_config(&self.config).map(Arc::new))
            .cloned()
    }
}

#[async_trait]
pub trait FileSystemAdapter: Send + Sync {
    async fn read_bytes(&self, uri: &str) -> Result<Vec<u8>, FsError>;
    async fn write_bytes(&self, uri: &str, data: &[u8]) -> Result<(), FsError>;
    async fn exists(&self, uri: &str) -> Result<bool, FsError>;
    async fn list_dir(&self, uri: &str) -> Result<Vec<ListEntry>, FsError>;
    async fn remove(&self, uri: &str) -> Result<(), FsError>;
    async fn size(&self, uri: &str) -> Result<u64, FsError>;

    /// Resolve an object URI to a time-limited URL. Pure computation, no
    /// network round trip.
    fn generate_presigned_url(&self, uri: &str, expiration_secs: u64) -> Result<String, FsError>;
}

/// Adapter for local absolute paths and `file://` URIs.
pub struct LocalFileSystemAdapter {
    object_client: Arc<SharedObjectClient>,
}

impl LocalFileSystemAdapter {
    pub fn new(object_client: Arc<SharedObjectClient>) -> Self {
        Self { object_client }
    }
}

#[async_trait]
impl FileSystemAdapter for LocalFileSystemAdapter {
    async fn read_bytes(&self, uri: &str) -> Result<Vec<u8>, FsError> {
        let path = normalize_local_path(uri)?;
        Ok(tokio::fs::read(path).await?)
    }

    async fn write_bytes(&self, uri: &str, data: &[u8]) -> Result<(), FsError> {
        let path = normalize_local_path(uri)?;
        if let Some(parent) = Path::new(&path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::write(path, data).await?)
    }

    async fn exists(&self, uri: &str) -> Result<bool, FsError> {
        let path = normalize_local_path(uri)?;
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn list_dir(&self, uri: &str) -> Result<Vec<ListEntry>, FsError> {
        let path = normalize_local_path(uri)?;
        let mut entries = Vec::new();
        if !Path::new(&path).is_dir() {
            return Ok(entries);
        }
        let mut dir = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let is_dir = entry.file_type().await?.is_dir();
            entries.push(ListEntry {
                path: entry.path().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        Ok(entries)
    }

    async fn remove(&self, uri: &str) -> Result<(), FsError> {
        let path = normalize_local_path(uri)?;
        let p = Path::new(&path);
        if p.is_dir() {
            return Err(FsError::UnsupportedOperation("remove of a directory"));
        }
        if p.exists() {
            tokio::fs::remove_file(p).await?;
        }
        Ok(())
    }

    async fn size(&self, uri: &str) -> Result<u64, FsError> {
        let path = normalize_local_path(uri)?;
        Ok(tokio::fs::metadata(path).await?.len())
    }

    /// Presigning only makes sense for object URIs. Callers holding a local
    /// adapter shouldn't ask for it, but when they do we delegate to the
    /// shared object-store client rather than failing silently, so a mixed
    /// batch of local and object references behaves uniformly.
    fn generate_presigned_url(&self, uri: &str, expiration_secs: u64) -> Result<String, FsError> {
        let (bucket, key) = split_bucket_key(uri)?;
        self.object_client.get()?.presign_get(&bucket, &key, expiration_secs)
    }
}

/// Adapter for `s3://` / `bos://` object URIs.
pub struct ObjectStoreAdapter {
    object_client: Arc<SharedObjectClient>,
    scheme: String,
}

impl ObjectStoreAdapter {
    pub fn new(object_client: Arc<SharedObjectClient>, scheme: &str) -> Self {
        Self { object_client, scheme: scheme.to_string() }
    }

    fn format_uri(&self, bucket: &str, key: &str) -> String {
        format!("{}://{}/{}", self.scheme, bucket, key)
    }
}

#[async_trait]
impl FileSystemAdapter for ObjectStoreAdapter {
    async fn read_bytes(&self, uri: &str) -> Result<Vec<u8>, FsError> {
        let (bucket, key) = split_bucket_key(uri)?;
        self.object_client.get()?.get_object(&bucket, &key).await
    }

    async fn write_bytes(&self, uri: &str, data: &[u8]) -> Result<(), FsError> {
        let (bucket, key) = split_bucket_key(uri)?;
        self.object_client
            .get()?
            .put_object(&bucket, &key, data.to_vec())
            .await
    }

    async fn exists(&self, uri: &str) -> Result<bool, FsError> {
        let (bucket, key) = split_bucket_key(uri)?;
        Ok(self.object_client.get()?.head_object(&bucket, &key).await?.is_some())
    }

    async fn list_dir(&self, uri: &str) -> Result<Vec<ListEntry>, FsError> {
        let (bucket, prefix) = split_bucket_key(uri)?;
        let (keys, dirs) = self.object_client.get()?.list_dir(&bucket, &prefix).await?;

        let mut entries = Vec::new();
        for dir in dirs {
            entries.push(ListEntry { path: self.format_uri(&bucket, &dir), is_dir: true });
        }
        for key in keys {
            entries.push(ListEntry { path: self.format_uri(&bucket, &key), is_dir: false });
        }
        Ok(entries)
    }

    async fn remove(&self, uri: &str) -> Result<(), FsError> {
        let (bucket, key) = split_bucket_key(uri)?;
        if key.is_empty() {
            return Err(FsError::UnsupportedOperation("remove of a bucket root"));
        }
        self.object_client.get()?.delete_object(&bucket, &key).await
    }

    async fn size(&self, uri: &str) -> Result<u64, FsError> {
        let (bucket, key) = split_bucket_key(uri)?;
        self.object_client
            .get()?
            .head_object(&bucket, &key)
            .await?
            .ok_or_else(|| FsError::UnexpectedStatus { status: 404, uri: uri.to_string() })
    }

    fn generate_presigned_url(&self, uri: &str, expiration_secs: u64) -> Result<String, FsError> {
        let (bucket, key) = split_bucket_key(uri)?;
        self.object_client.get()?.presign_get(&bucket, &key, expiration_secs)
    }
}

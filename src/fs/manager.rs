//! Centralized filesystem manager: adapter selection, caching, and the
//! URL-signing entry point used by the result serializer.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::config::{self, StorageConfig};

use super::adapter::{
    FileSystemAdapter, ListEntry, LocalFileSystemAdapter, ObjectStoreAdapter, SharedObjectClient,
};
use super::{
    adapter_cache_key, detect_fs_kind, extract_scheme, join_uri, normalize_dir_uri, relative_path,
    FsError, FsKind, UrlSigner, SCHEME_S3,
};

pub struct FileSystemManager {
    object_client: Arc<SharedObjectClient>,
    adapters: RwLock<HashMap<String, Arc<dyn FileSystemAdapter>>>,
}

impl FileSystemManager {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            object_client: Arc::new(SharedObjectClient::new(storage)),
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Return the adapter for a URI, creating and caching it on first use.
    /// Cached by scheme-derived key so every `s3://...` URI shares one
    /// adapter (and one underlying client) regardless of bucket.
    pub fn get_fs(&self, uri: &str) -> Result<Arc<dyn FileSystemAdapter>, FsError> {
        let cache_key = adapter_cache_key(uri)?;

        {
            let adapters = self.adapters.read().expect("adapter cache lock poisoned");
            if let Some(adapter) = adapters.get(&cache_key) {
                return Ok(adapter.clone());
            }
        }

        let adapter = self.create_adapter(uri)?;
        let mut adapters = self.adapters.write().expect("adapter cache lock poisoned");
        // A racing writer may have inserted already; keep the first one.
        Ok(adapters.entry(cache_key).or_insert(adapter).clone())
    }

    fn create_adapter(&self, uri: &str) -> Result<Arc<dyn FileSystemAdapter>, FsError> {
        match detect_fs_kind(uri)? {
            FsKind::Local => Ok(Arc::new(LocalFileSystemAdapter::new(self.object_client.clone()))),
            FsKind::ObjectStore => {
                let scheme = extract_scheme(uri)?.unwrap_or(SCHEME_S3);
                Ok(Arc::new(ObjectStoreAdapter::new(self.object_client.clone(), scheme)))
            }
        }
    }

    pub async fn read_bytes(&self, uri: &str) -> Result<Vec<u8>, FsError> {
        self.get_fs(uri)?.read_bytes(uri).await
    }

    pub async fn write_bytes(&self, uri: &str, data: &[u8]) -> Result<(), FsError> {
        self.get_fs(uri)?.write_bytes(uri, data).await
    }

    pub async fn read_text(&self, uri: &str) -> Result<String, FsError> {
        let bytes = self.read_bytes(uri).await?;
        Ok(String::from_utf8(bytes)?)
    }

    pub async fn write_text(&self, uri: &str, content: &str) -> Result<(), FsError> {
        self.write_bytes(uri, content.as_bytes()).await
    }

    pub async fn exists(&self, uri: &str) -> Result<bool, FsError> {
        self.get_fs(uri)?.exists(uri).await
    }

    pub async fn list_dir(&self, uri: &str) -> Result<Vec<ListEntry>, FsError> {
        self.get_fs(uri)?.list_dir(uri).await
    }

    pub async fn remove(&self, uri: &str) -> Result<(), FsError> {
        self.get_fs(uri)?.remove(uri).await
    }

    pub async fn size(&self, uri: &str) -> Result<u64, FsError> {
        self.get_fs(uri)?.size(uri).await
    }

    pub fn generate_presigned_url(
        &self,
        uri: &str,
        expiration_secs: u64,
    ) -> Result<String, FsError> {
        self.get_fs(uri)?.generate_presigned_url(uri, expiration_secs)
    }

    /// Recursively copy every file under `src_uri` to the same relative
    /// location under `dst_uri`. Source and destination may live on
    /// different backends.
    pub async fn copy_directory(&self, src_uri: &str, dst_uri: &str) -> Result<(), FsError> {
        let src_root = normalize_dir_uri(src_uri);
        let dst_root = normalize_dir_uri(dst_uri);
        let src_fs = self.get_fs(&src_root)?;
        let dst_fs = self.get_fs(&dst_root)?;

        let mut stack = vec![src_root.trim_end_matches('/').to_string()];
        while let Some(current) = stack.pop() {
            for entry in src_fs.list_dir(&current).await? {
                if entry.is_dir {
                    stack.push(entry.path);
                    continue;
                }
                let target = join_uri(&dst_root, &relative_path(&entry.path, &src_root));
                let data = src_fs.read_bytes(&entry.path).await?;
                dst_fs.write_bytes(&target, &data).await?;
            }
        }
        Ok(())
    }
}

impl UrlSigner for FileSystemManager {
    fn sign(&self, uri: &str, expiration_secs: u64) -> Result<String, FsError> {
        self.generate_presigned_url(uri, expiration_secs)
    }
}

/// Process-wide manager built from the global config on first use.
pub fn fs_manager() -> &'static FileSystemManager {
    static INSTANCE: OnceLock<FileSystemManager> = OnceLock::new();
    INSTANCE.get_or_init(|| FileSystemManager::new(config::config().storage.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> FileSystemManager {
        FileSystemManager::new(StorageConfig {
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            region: "us-east-1".to_string(),
            endpoint: "http://storage.local:9000".to_string(),
            presign_expiry_secs: 3600,
        })
    }

    #[test]
    fn adapters_cached_per_scheme() {
        let manager = manager();
        let a = manager.get_fs("s3://bucket-one/key").unwrap();
        let b = manager.get_fs("s3://bucket-two/other").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let bos = manager.get_fs("bos://bucket/key").unwrap();
        assert!(!Arc::ptr_eq(&a, &bos));

        let local = manager.get_fs("/data/file").unwrap();
        assert!(!Arc::ptr_eq(&a, &local));
    }

    #[tokio::test]
    async fn text_roundtrip_through_the_manager() {
        let dir = std::env::temp_dir().join(format!("vortex-text-{}", uuid::Uuid::new_v4()));
        let uri = dir.join("note.txt").to_string_lossy().into_owned();

        let manager = manager();
        manager.write_text(&uri, "résumé ready").await.unwrap();
        assert_eq!(manager.read_text(&uri).await.unwrap(), "résumé ready");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn copies_directory_trees_recursively() {
        let base = std::env::temp_dir().join(format!("vortex-copy-{}", uuid::Uuid::new_v4()));
        let src = base.join("src").to_string_lossy().into_owned();
        let dst = base.join("dst").to_string_lossy().into_owned();

        let manager = manager();
        manager
            .write_bytes(&format!("{}/a.bin", src), b"alpha")
            .await
            .unwrap();
        manager
            .write_bytes(&format!("{}/sub/deeper/b.bin", src), b"beta")
            .await
            .unwrap();

        manager.copy_directory(&src, &dst).await.unwrap();

        assert_eq!(
            manager.read_bytes(&format!("{}/a.bin", dst)).await.unwrap(),
            b"alpha"
        );
        assert_eq!(
            manager
                .read_bytes(&format!("{}/sub/deeper/b.bin", dst))
                .await
                .unwrap(),
            b"beta"
        );

        tokio::fs::remove_dir_all(&base).await.ok();
    }

    #[test]
    fn signs_object_uris_and_rejects_local_paths() {
        let manager = manager();
        let url = manager.sign("bos://media/clip.mp4", 172_800).unwrap();
        assert!(url.contains("X-Amz-Expires=172800"));

        assert!(manager.sign("/local/clip.mp4", 172_800).is_err());
        assert!(manager.sign("relative/clip.mp4", 172_800).is_err());
    }
}

//! sf-storage: blob store abstraction for uploaded images and rendered videos.
//!
//! [`BlobStore`] is the seam the server and the job orchestrator talk to.
//! [`FsBlobStore`] keeps objects on the local filesystem, one directory per
//! bucket. Object keys are built with the helpers in [`keys`].

pub mod fs;
pub mod keys;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

pub use fs::FsBlobStore;
pub use keys::{public_url, result_key, upload_key};

/// Metadata about a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub content_type: Option<String>,
}

/// Put/get of binary objects addressed by `(bucket, key)`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any existing object.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> sf_core::Result<()>;

    /// Read a whole object. Missing objects yield [`sf_core::Error::NotFound`].
    async fn get(&self, bucket: &str, key: &str) -> sf_core::Result<Bytes>;

    /// Size and content type of an object.
    async fn head(&self, bucket: &str, key: &str) -> sf_core::Result<ObjectMeta>;

    /// Store the contents of a local file.
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> sf_core::Result<()> {
        let data = tokio::fs::read(path).await?;
        self.put(bucket, key, Bytes::from(data), content_type).await
    }

    /// Download an object into a local file.
    async fn get_to_file(&self, bucket: &str, key: &str, dest: &Path) -> sf_core::Result<()> {
        let data = self.get(bucket, key).await?;
        tokio::fs::write(dest, &data).await?;
        Ok(())
    }
}

//! Filesystem-backed blob store.
//!
//! Layout: `{root}/{bucket}/{key}`, with the content type kept in a sidecar
//! file `{key}.content-type`. Writes go to a temporary sibling and are
//! renamed into place, so readers never observe a partial object.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sf_core::{Error, Result};

use crate::{BlobStore, ObjectMeta};

const CONTENT_TYPE_SUFFIX: &str = ".content-type";

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `(bucket, key)` to a path, rejecting anything that could escape
    /// the bucket directory.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_segment("bucket", bucket)?;
        if key.is_empty() || key.ends_with('/') || key.ends_with(CONTENT_TYPE_SUFFIX) {
            return Err(Error::Validation(format!("invalid object key: {key:?}")));
        }
        let rel = Path::new(key);
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || key.contains('\\') {
            return Err(Error::Validation(format!("invalid object key: {key:?}")));
        }
        Ok(self.root.join(bucket).join(rel))
    }

    fn sidecar(path: &Path) -> PathBuf {
        let mut s = path.as_os_str().to_owned();
        s.push(CONTENT_TYPE_SUFFIX);
        PathBuf::from(s)
    }
}

fn validate_segment(what: &str, value: &str) -> Result<()> {
    let ok = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\']);
    if ok {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid {what}: {value:?}")))
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = {
        let mut s = path.as_os_str().to_owned();
        s.push(format!(".tmp-{}", uuid::Uuid::new_v4()));
        PathBuf::from(s)
    };
    if let Err(e) = tokio::fs::write(&tmp, data).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

fn map_io(bucket: &str, key: &str, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::not_found("object", format!("{bucket}/{key}"))
    } else {
        Error::storage(format!("{bucket}/{key}: {e}"))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bucket: &str, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(bucket, key, e))?;
        }

        write_atomic(&path, &data)
            .await
            .map_err(|e| Error::storage(format!("{bucket}/{key}: {e}")))?;
        write_atomic(&Self::sidecar(&path), content_type.as_bytes())
            .await
            .map_err(|e| Error::storage(format!("{bucket}/{key}: {e}")))?;

        tracing::debug!(bucket, key, size = data.len(), content_type, "object stored");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let path = self.object_path(bucket, key)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| map_io(bucket, key, e))?;
        Ok(Bytes::from(data))
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        let path = self.object_path(bucket, key)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_io(bucket, key, e))?;
        let content_type = tokio::fs::read_to_string(Self::sidecar(&path))
            .await
            .ok()
            .filter(|s| !s.is_empty());
        Ok(ObjectMeta {
            size: meta.len(),
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn put_then_get() {
        let (_dir, store) = store();
        store
            .put("videos", "uploads/a_cat.png", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();

        let data = store.get("videos", "uploads/a_cat.png").await.unwrap();
        assert_eq!(&data[..], b"png");

        let meta = store.head("videos", "uploads/a_cat.png").await.unwrap();
        assert_eq!(meta.size, 3);
        assert_eq!(meta.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn put_overwrites() {
        let (_dir, store) = store();
        store
            .put("b", "k", Bytes::from_static(b"one"), "text/plain")
            .await
            .unwrap();
        store
            .put("b", "k", Bytes::from_static(b"two"), "text/plain")
            .await
            .unwrap();
        assert_eq!(&store.get("b", "k").await.unwrap()[..], b"two");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (_dir, store) = store();
        let err = store.get("videos", "results/nope.mp4").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }), "{err}");
    }

    #[tokio::test]
    async fn traversal_keys_rejected() {
        let (_dir, store) = store();
        for key in ["../escape", "/abs/path", "a/../../b", "", "dir/"] {
            let err = store
                .put("videos", key, Bytes::from_static(b"x"), "text/plain")
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{key}: {err}");
        }
        assert!(store.object_path("..", "k").is_err());
    }

    #[tokio::test]
    async fn file_helpers_roundtrip() {
        let (dir, store) = store();
        let src = dir.path().join("local.mp4");
        tokio::fs::write(&src, b"mp4 bytes").await.unwrap();

        store
            .put_file("videos", "results/j.mp4", &src, "video/mp4")
            .await
            .unwrap();

        let dest = dir.path().join("copy.mp4");
        store
            .get_to_file("videos", "results/j.mp4", &dest)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"mp4 bytes");
    }
}

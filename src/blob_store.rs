use async_trait::async_trait;
use bytes::Bytes;
use log::warn;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use crate::errors::{GalleryError, GalleryResult};

/// Object storage keyed by slash-separated paths.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> GalleryResult<()>;

    async fn get(&self, path: &str) -> GalleryResult<Option<Bytes>>;

    /// Deleting a blob that is already gone counts as success.
    async fn delete(&self, path: &str) -> GalleryResult<()>;

    /// Address under which visitors can fetch the blob.
    fn public_url(&self, path: &str) -> String;

    /// Inverse of `public_url`; `None` for addresses this store does not own.
    fn path_for_url(&self, url: &str) -> Option<String>;
}

fn validate_path(path: &str) -> GalleryResult<()> {
    let relative = Path::new(path);
    let clean = !path.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if clean {
        Ok(())
    } else {
        Err(GalleryError::validation(format!("Invalid blob path '{}'", path)))
    }
}

fn strip_base<'a>(base_url: &str, url: &'a str) -> Option<&'a str> {
    url.strip_prefix(base_url)?
        .strip_prefix('/')
        .filter(|p| !p.is_empty())
}

/// Blobs as plain files below a root directory, served by the `/blobs` route.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
}

impl FsBlobStore {
    pub fn new(root: PathBuf, base_url: &str) -> Self {
        Self {
            root,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, path: &str) -> GalleryResult<PathBuf> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: Bytes, _content_type: &str) -> GalleryResult<()> {
        let file_path = self.file_path(path)?;
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file_path, &bytes).await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> GalleryResult<Option<Bytes>> {
        let file_path = self.file_path(path)?;
        match tokio::fs::read(&file_path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> GalleryResult<()> {
        let file_path = self.file_path(path)?;
        match tokio::fs::remove_file(&file_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already deleted", path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn path_for_url(&self, url: &str) -> Option<String> {
        strip_base(&self.base_url, url).map(str::to_string)
    }
}

/// Process-local blob store, used in tests and for throwaway instances.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, (Bytes, String)>>,
}

const MEMORY_BASE_URL: &str = "memory://blobs";

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.lock().get(path).map(|(_, ct)| ct.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, (Bytes, String)>> {
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> GalleryResult<()> {
        validate_path(path)?;
        self.lock()
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, path: &str) -> GalleryResult<Option<Bytes>> {
        Ok(self.lock().get(path).map(|(bytes, _)| bytes.clone()))
    }

    async fn delete(&self, path: &str) -> GalleryResult<()> {
        self.lock().remove(path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", MEMORY_BASE_URL, path)
    }

    fn path_for_url(&self, url: &str) -> Option<String> {
        strip_base(MEMORY_BASE_URL, url).map(str::to_string)
    }
}

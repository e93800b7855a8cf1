//! Filesystem object store
//!
//! Items are written to `<root>/<prefix>/<uuid><extension>`; the returned id
//! is `<prefix>/<uuid>`.

use crate::storage::traits::{ObjectStore, StorageError, StorageResult, StoreItem};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str, extension: &str) -> StorageResult<PathBuf> {
        let unsafe_component = id.is_empty()
            || id.starts_with('/')
            || id.contains('\\')
            || id.split('/').any(|part| part.is_empty() || part == "." || part == "..");
        if unsafe_component {
            return Err(StorageError::NotFound(format!("invalid object id '{}'", id)));
        }
        Ok(self
            .root
            .join(format!("{}{}", id, extension.to_ascii_lowercase())))
    }
}

#[async_trait]
impl ObjectStore for FileStore {
    async fn store(&self, item: &(dyn StoreItem + Sync), extension: &str) -> StorageResult<String> {
        let id = format!("{}/{}", item.prefix().trim_matches('/'), Uuid::new_v4());
        let data = item.marshal()?;

        let path = self.path_for(&id, extension)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;

        tracing::debug!(id = %id, path = %path.display(), "Stored object");
        Ok(id)
    }

    async fn retrieve(&self, id: &str, extension: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(id, extension)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

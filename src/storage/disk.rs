use crate::model::StorageError;
use crate::storage::{BlobStore, CacheKey};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Blobs as files in one folder, named by [`CacheKey::file_name`].
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Keys of every file in the folder that follows the naming scheme.
    pub fn list(&self) -> Result<Vec<CacheKey>, StorageError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            match CacheKey::parse_file_name(name) {
                Ok(key) => keys.push(key),
                Err(_) => debug!("Ignoring foreign file in cache: {}", name),
            }
        }
        keys.sort_by_key(|k| k.file_name());
        Ok(keys)
    }
}

impl BlobStore for DiskStore {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    fn put(&self, key: &CacheKey, blob: &[u8]) -> Result<(), StorageError> {
        fs::write(self.path_for(key), blob)?;
        Ok(())
    }

    fn contains(&self, key: &CacheKey) -> Result<bool, StorageError> {
        Ok(self.path_for(key).is_file())
    }
}

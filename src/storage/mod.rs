// Cached artifacts: structured keys, blob stores on disk and in SQLite.

pub mod cache_key;
pub mod disk;
pub mod sqlite;

pub use cache_key::{ArtifactKind, CacheKey};
pub use disk::DiskStore;
pub use sqlite::SqliteStorage;

use crate::model::StorageError;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub trait BlobStore {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&self, key: &CacheKey, blob: &[u8]) -> Result<(), StorageError>;
    fn contains(&self, key: &CacheKey) -> Result<bool, StorageError>;
}

pub fn load_json<T: DeserializeOwned>(store: &dyn BlobStore, key: &CacheKey) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub fn save_json<T: Serialize>(store: &dyn BlobStore, key: &CacheKey, value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.put(key, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StatementFrequency;
    use std::collections::BTreeMap;

    #[test]
    fn json_helpers_round_trip_through_sqlite() {
        let store = SqliteStorage::new(":memory:").unwrap();
        let key = CacheKey::new("TSLA", StatementFrequency::Quarterly, ArtifactKind::Statements);
        assert_eq!(load_json::<BTreeMap<String, f64>>(&store, &key).unwrap(), None);

        let value = BTreeMap::from([("totalAssets".to_string(), 1.5e9)]);
        save_json(&store, &key, &value).unwrap();
        assert_eq!(load_json::<BTreeMap<String, f64>>(&store, &key).unwrap(), Some(value));
    }
}

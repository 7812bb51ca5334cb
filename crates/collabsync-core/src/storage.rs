//! Persistent identity storage using redb.
//!
//! One `identity` table keyed by channel name, holding a postcard-encoded
//! [`Identity`]. This is the only state a peer keeps across restarts.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{SyncError, SyncResult};
use crate::identity::{Identity, IdentityStore};

const IDENTITY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("identity");

/// Identity store backed by a redb file
#[derive(Clone)]
pub struct RedbIdentityStore {
    db: Arc<RwLock<Database>>,
}

impl RedbIdentityStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(IDENTITY_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    /// Every channel that has a stored identity
    pub fn channels(&self) -> SyncResult<Vec<String>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(IDENTITY_TABLE)?;

        let mut channels = Vec::new();
        for row in table.iter()? {
            let (key, _) = row?;
            channels.push(key.value().to_string());
        }
        Ok(channels)
    }
}

impl IdentityStore for RedbIdentityStore {
    fn load(&self, channel: &str) -> SyncResult<Option<Identity>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(IDENTITY_TABLE)?;

        match table.get(channel)? {
            Some(v) => {
                let identity: Identity = postcard::from_bytes(v.value())
                    .map_err(|e| SyncError::Storage(format!("corrupt identity for {channel}: {e}")))?;
                Ok(Some(identity))
            }
            None => Ok(None),
        }
    }

    fn save(&self, channel: &str, identity: &Identity) -> SyncResult<()> {
        let data = postcard::to_allocvec(identity)?;
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(IDENTITY_TABLE)?;
            table.insert(channel, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn clear(&self, channel: &str) -> SyncResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(IDENTITY_TABLE)?;
            table.remove(channel)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (RedbIdentityStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RedbIdentityStore::open(temp_dir.path().join("identity.redb")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_store_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested/path/identity.redb");
        assert!(RedbIdentityStore::open(&db_path).is_ok());
        assert!(db_path.exists());
    }

    #[test]
    fn test_save_load_clear() {
        let (store, _temp) = create_test_store();
        assert!(store.load("room").unwrap().is_none());

        let identity = Identity::generate(Some("Ada"));
        store.save("room", &identity).unwrap();
        assert_eq!(store.load("room").unwrap(), Some(identity));
        assert_eq!(store.channels().unwrap(), vec!["room".to_string()]);

        store.clear("room").unwrap();
        assert!(store.load("room").unwrap().is_none());
        // Clearing twice is fine
        store.clear("room").unwrap();
    }

    #[test]
    fn test_identity_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("identity.redb");

        let original = {
            let store = RedbIdentityStore::open(&path).unwrap();
            let (identity, is_new) = Identity::load_or_create(&store, "room", None, None).unwrap();
            assert!(is_new);
            identity
        };

        let store = RedbIdentityStore::open(&path).unwrap();
        let (recovered, is_new) = Identity::load_or_create(&store, "room", None, None).unwrap();
        assert!(!is_new);
        assert_eq!(recovered, original);
    }
}

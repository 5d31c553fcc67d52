use crate::domain::ledger::{LedgerEntry, LedgerKey, LedgerStatus};
use crate::domain::ports::LedgerStore;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Column Family for ledger entries, keyed by entry id.
pub const CF_ENTRIES: &str = "ledger_entries";
/// Column Family mapping the encoded composite key to an entry id.
pub const CF_KEYS: &str = "ledger_keys";

/// A persistent ledger store using RocksDB.
///
/// Entries and the composite-key index live in separate Column Families and
/// are written together in one batch. `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbLedgerStore {
    db: Arc<DB>,
}

impl RocksDbLedgerStore {
    /// Opens or creates a RocksDB instance at the specified path, creating the
    /// ledger Column Families when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_entries = ColumnFamilyDescriptor::new(CF_ENTRIES, Options::default());
        let cf_keys = ColumnFamilyDescriptor::new(CF_KEYS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_entries, cf_keys])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            BridgeError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn decode(bytes: &[u8]) -> Result<LedgerEntry> {
        serde_json::from_slice(bytes).map_err(|e| {
            BridgeError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Deserialization error: {}", e),
            )))
        })
    }

    fn read_entry(&self, id: Uuid) -> Result<Option<LedgerEntry>> {
        let cf = self.cf(CF_ENTRIES)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LedgerStore for RocksDbLedgerStore {
    async fn store(&self, entry: LedgerEntry) -> Result<()> {
        let entries = self.cf(CF_ENTRIES)?;
        let keys = self.cf(CF_KEYS)?;

        let value = serde_json::to_vec(&entry)?;
        let mut batch = rocksdb::WriteBatch::default();
        batch.put_cf(entries, entry.id.as_bytes(), value);
        batch.put_cf(keys, entry.key.encode().as_bytes(), entry.id.as_bytes());
        self.db.write(batch)?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<LedgerEntry>> {
        self.read_entry(id)
    }

    async fn find_by_key(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>> {
        let keys = self.cf(CF_KEYS)?;
        let Some(id_bytes) = self.db.get_pinned_cf(keys, key.encode().as_bytes())? else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&id_bytes).map_err(|e| BridgeError::InternalError(Box::new(e)))?;
        self.read_entry(id)
    }

    async fn by_status(&self, statuses: &[LedgerStatus]) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf(CF_ENTRIES)?;

        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            let entry = Self::decode(&value)?;
            if statuses.contains(&entry.status) {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e| e.created_at);

        Ok(entries)
    }
}

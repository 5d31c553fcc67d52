use crate::domain::ledger::{LedgerEntry, LedgerKey, LedgerStatus};
use crate::domain::ports::LedgerStore;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    entries: HashMap<Uuid, LedgerEntry>,
    by_key: HashMap<LedgerKey, Uuid>,
}

/// A thread-safe in-memory ledger store.
///
/// Uses `Arc<RwLock<..>>` so clones share the same tables. Suitable for tests
/// and single-run batches where the audit trail does not need to outlive the
/// process.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn store(&self, entry: LedgerEntry) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.by_key.insert(entry.key.clone(), entry.id);
        tables.entries.insert(entry.id, entry);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<LedgerEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.entries.get(&id).cloned())
    }

    async fn find_by_key(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_key
            .get(key)
            .and_then(|id| tables.entries.get(id))
            .cloned())
    }

    async fn by_status(&self, statuses: &[LedgerStatus]) -> Result<Vec<LedgerEntry>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<LedgerEntry> = tables
            .entries
            .values()
            .filter(|e| statuses.contains(&e.status))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }
}

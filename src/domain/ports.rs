use super::ledger::{LedgerEntry, LedgerKey, LedgerStatus};
use super::remote::{AuthToken, RemoteRequest, RemoteResponse};
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Executes one named operation against the policy-administration backend.
///
/// Business failures come back as `BridgeError::RemoteFault`, connectivity
/// problems as `BridgeError::Transport`. Transport-level retries, if any,
/// happen below this trait.
#[async_trait]
pub trait RemoteServiceClient: Send + Sync {
    async fn call(&self, token: &AuthToken, request: RemoteRequest) -> Result<RemoteResponse>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_token(&self) -> Result<AuthToken>;
}

/// Keyed persistence for ledger entries.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn store(&self, entry: LedgerEntry) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<LedgerEntry>>;
    async fn find_by_key(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>>;
    async fn by_status(&self, statuses: &[LedgerStatus]) -> Result<Vec<LedgerEntry>>;
}

pub type LedgerStoreBox = Box<dyn LedgerStore>;

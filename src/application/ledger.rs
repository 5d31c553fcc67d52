use crate::domain::ledger::{LedgerEntry, LedgerKey, LedgerStatus};
use crate::domain::ports::LedgerStoreBox;
use crate::error::{BridgeError, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Idempotency ledger over a [`LedgerStore`](crate::domain::ports::LedgerStore).
///
/// All state transitions run under one async mutex, so the read-check-write in
/// [`begin`](Self::begin) is atomic with respect to other workers sharing this
/// ledger: at most one attempt holds a key at a time.
pub struct IdempotencyLedger {
    store: LedgerStoreBox,
    max_attempts: u32,
    transitions: Mutex<()>,
}

impl IdempotencyLedger {
    pub fn new(store: LedgerStoreBox, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
            transitions: Mutex::new(()),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// True only when an entry for exactly this key reached `completed`.
    pub async fn already_completed(&self, key: &LedgerKey) -> Result<bool> {
        Ok(self
            .store
            .find_by_key(key)
            .await?
            .is_some_and(|e| e.status == LedgerStatus::Completed))
    }

    /// Claims the key for a new attempt and returns the entry id.
    ///
    /// The first attempt creates the entry; later attempts reuse it. Fails with
    /// `AlreadyCompleted`, `InFlight` while another attempt holds the key, or
    /// `AttemptsExhausted` once the attempt cap is reached.
    pub async fn begin(
        &self,
        key: LedgerKey,
        external_id: Option<String>,
        request_snapshot: serde_json::Value,
    ) -> Result<Uuid> {
        let _guard = self.transitions.lock().await;

        let Some(mut entry) = self.store.find_by_key(&key).await? else {
            let entry = LedgerEntry::new(key, external_id, request_snapshot);
            let id = entry.id;
            debug!(entry_id = %id, key = %entry.key, "ledger entry created");
            self.store.store(entry).await?;
            return Ok(id);
        };

        if entry.status == LedgerStatus::Completed {
            return Err(BridgeError::AlreadyCompleted(key.to_string()));
        }
        if entry.status.is_in_flight() {
            return Err(BridgeError::InFlight(key.to_string()));
        }
        if entry.attempt_count >= self.max_attempts {
            warn!(
                entry_id = %entry.id,
                key = %entry.key,
                attempts = entry.attempt_count,
                "attempt limit reached, manual intervention required"
            );
            return Err(BridgeError::AttemptsExhausted {
                key: key.to_string(),
                attempts: entry.attempt_count,
            });
        }

        entry.status = LedgerStatus::Pending;
        entry.request_snapshot = request_snapshot;
        if external_id.is_some() {
            entry.external_id = external_id;
        }
        let id = entry.id;
        debug!(entry_id = %id, attempt = entry.attempt_count + 1, "ledger entry re-opened");
        self.store.store(entry).await?;
        Ok(id)
    }

    pub async fn mark_processing(&self, id: Uuid) -> Result<()> {
        let _guard = self.transitions.lock().await;
        let mut entry = self.load(id).await?;
        entry.status = LedgerStatus::Processing;
        entry.last_attempt_at = Some(Utc::now());
        self.store.store(entry).await
    }

    pub async fn complete(
        &self,
        id: Uuid,
        response_snapshot: serde_json::Value,
        remote_policy_number: Option<String>,
    ) -> Result<()> {
        let _guard = self.transitions.lock().await;
        let mut entry = self.load(id).await?;
        let now = Utc::now();
        entry.status = LedgerStatus::Completed;
        entry.attempt_count += 1;
        entry.last_attempt_at = Some(now);
        entry.completed_at = Some(now);
        entry.response_snapshot = Some(response_snapshot);
        entry.last_error = None;
        entry.retryable = false;
        if remote_policy_number.is_some() {
            entry.remote_policy_number = remote_policy_number;
        }
        info!(entry_id = %id, key = %entry.key, attempts = entry.attempt_count, "ledger entry completed");
        self.store.store(entry).await
    }

    pub async fn fail(
        &self,
        id: Uuid,
        error_message: &str,
        response_snapshot: Option<serde_json::Value>,
        retryable: bool,
    ) -> Result<()> {
        let _guard = self.transitions.lock().await;
        let mut entry = self.load(id).await?;
        entry.status = LedgerStatus::Failed;
        entry.attempt_count += 1;
        entry.last_attempt_at = Some(Utc::now());
        entry.last_error = Some(error_message.to_string());
        entry.retryable = retryable;
        if response_snapshot.is_some() {
            entry.response_snapshot = response_snapshot;
        }
        warn!(
            entry_id = %id,
            key = %entry.key,
            attempts = entry.attempt_count,
            retryable,
            error = error_message,
            "ledger entry failed"
        );
        self.store.store(entry).await
    }

    /// Moves a failed entry to `retry`. Returns false when the entry is not
    /// failed or has used up its attempts.
    pub async fn mark_retry(&self, id: Uuid) -> Result<bool> {
        let _guard = self.transitions.lock().await;
        let mut entry = self.load(id).await?;
        if entry.status != LedgerStatus::Failed || entry.attempt_count >= self.max_attempts {
            return Ok(false);
        }
        entry.status = LedgerStatus::Retry;
        self.store.store(entry).await?;
        Ok(true)
    }

    pub async fn entry(&self, id: Uuid) -> Result<Option<LedgerEntry>> {
        self.store.get(id).await
    }

    pub async fn find(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>> {
        self.store.find_by_key(key).await
    }

    pub async fn entries_with_status(&self, statuses: &[LedgerStatus]) -> Result<Vec<LedgerEntry>> {
        self.store.by_status(statuses).await
    }

    /// Entries waiting to be processed that are still under the attempt cap.
    pub async fn pending(&self) -> Result<Vec<LedgerEntry>> {
        let entries = self
            .store
            .by_status(&[LedgerStatus::Pending, LedgerStatus::Retry])
            .await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.attempt_count < self.max_attempts)
            .collect())
    }

    /// Unfinished entries at the attempt cap; these need an operator.
    pub async fn escalations(&self) -> Result<Vec<LedgerEntry>> {
        let entries = self
            .store
            .by_status(&[LedgerStatus::Pending, LedgerStatus::Retry, LedgerStatus::Failed])
            .await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.requires_escalation(self.max_attempts))
            .collect())
    }

    async fn load(&self, id: Uuid) -> Result<LedgerEntry> {
        self.store
            .get(id)
            .await?
            .ok_or(BridgeError::EntryNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::ResourceType;
    use crate::domain::transaction::TransactionKind;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use serde_json::json;

    fn ledger() -> IdempotencyLedger {
        IdempotencyLedger::new(Box::new(InMemoryLedgerStore::new()), 3)
    }

    fn key() -> LedgerKey {
        LedgerKey::new(ResourceType::Policy, "portal:TX-1", TransactionKind::Issue)
    }

    #[tokio::test]
    async fn test_pending_is_not_completed() {
        let ledger = ledger();
        let id = ledger.begin(key(), None, json!({})).await.unwrap();
        assert!(!ledger.already_completed(&key()).await.unwrap());

        ledger.complete(id, json!({"ok": true}), Some("POL-1".to_string())).await.unwrap();
        assert!(ledger.already_completed(&key()).await.unwrap());

        let entry = ledger.entry(id).await.unwrap().unwrap();
        assert_eq!(entry.attempt_count, 1);
        assert_eq!(entry.remote_policy_number.as_deref(), Some("POL-1"));
        assert!(entry.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_different_kind_is_a_different_key() {
        let ledger = ledger();
        let id = ledger.begin(key(), None, json!({})).await.unwrap();
        ledger.complete(id, json!({}), None).await.unwrap();

        let other = LedgerKey::new(ResourceType::Policy, "portal:TX-1", TransactionKind::Cancellation);
        assert!(!ledger.already_completed(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_begin_while_in_flight_is_rejected() {
        let ledger = ledger();
        let id = ledger.begin(key(), None, json!({})).await.unwrap();
        assert!(matches!(
            ledger.begin(key(), None, json!({})).await,
            Err(BridgeError::InFlight(_))
        ));

        ledger.mark_processing(id).await.unwrap();
        assert!(matches!(
            ledger.begin(key(), None, json!({})).await,
            Err(BridgeError::InFlight(_))
        ));
    }

    #[tokio::test]
    async fn test_begin_after_failure_reuses_entry() {
        let ledger = ledger();
        let first = ledger.begin(key(), Some("EXT-1".to_string()), json!({"v": 1})).await.unwrap();
        ledger.fail(first, "timeout", None, true).await.unwrap();

        let second = ledger.begin(key(), None, json!({"v": 2})).await.unwrap();
        assert_eq!(first, second);

        let entry = ledger.entry(second).await.unwrap().unwrap();
        assert_eq!(entry.status, LedgerStatus::Pending);
        assert_eq!(entry.attempt_count, 1);
        assert_eq!(entry.external_id.as_deref(), Some("EXT-1"));
        assert_eq!(entry.request_snapshot, json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_completed_key_cannot_begin_again() {
        let ledger = ledger();
        let id = ledger.begin(key(), None, json!({})).await.unwrap();
        ledger.complete(id, json!({}), None).await.unwrap();
        assert!(matches!(
            ledger.begin(key(), None, json!({})).await,
            Err(BridgeError::AlreadyCompleted(_))
        ));
    }

    #[tokio::test]
    async fn test_attempt_cap_blocks_fourth_begin() {
        let ledger = ledger();
        for attempt in 1..=3 {
            let id = ledger.begin(key(), None, json!({})).await.unwrap();
            ledger.fail(id, "connection reset", None, true).await.unwrap();
            let entry = ledger.entry(id).await.unwrap().unwrap();
            assert_eq!(entry.attempt_count, attempt);
        }

        let err = ledger.begin(key(), None, json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::AttemptsExhausted { attempts: 3, .. }));

        let escalated = ledger.escalations().await.unwrap();
        assert_eq!(escalated.len(), 1);
        assert!(ledger.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_retry_respects_cap_and_status() {
        let ledger = ledger();
        let id = ledger.begin(key(), None, json!({})).await.unwrap();
        assert!(!ledger.mark_retry(id).await.unwrap());

        ledger.fail(id, "timeout", None, true).await.unwrap();
        assert!(ledger.mark_retry(id).await.unwrap());
        assert_eq!(ledger.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_entry() {
        let ledger = ledger();
        let missing = Uuid::new_v4();
        assert!(matches!(
            ledger.complete(missing, json!({}), None).await,
            Err(BridgeError::EntryNotFound(id)) if id == missing
        ));
    }
}

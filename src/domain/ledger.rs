use crate::domain::transaction::{TransactionKind, TransactionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// A first-time submission that creates remote entities.
    Submission,
    /// A lifecycle action against an already-bound policy.
    Policy,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Submission => "submission",
            ResourceType::Policy => "policy",
        }
    }
}

/// Composite idempotency key: one ledger entry exists per key.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone)]
pub struct LedgerKey {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub kind: TransactionKind,
}

impl LedgerKey {
    pub fn new(resource_type: ResourceType, resource_id: impl Into<String>, kind: TransactionKind) -> Self {
        Self {
            resource_type,
            resource_id: resource_id.into(),
            kind,
        }
    }

    /// Resource ids are namespaced by source system so two feeds can reuse
    /// transaction numbers without colliding.
    pub fn for_record(record: &TransactionRecord, resource_type: ResourceType) -> Self {
        Self::new(
            resource_type,
            format!("{}:{}", record.source_system, record.source_transaction_id),
            record.kind,
        )
    }

    /// Stable string form, used as a storage key.
    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}",
            self.resource_type.as_str(),
            self.resource_id,
            self.kind.as_str()
        )
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.resource_type.as_str(),
            self.resource_id,
            self.kind
        )
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retry,
}

impl LedgerStatus {
    /// Statuses meaning an attempt currently owns the key.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, LedgerStatus::Pending | LedgerStatus::Processing)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub key: LedgerKey,
    pub external_id: Option<String>,
    pub status: LedgerStatus,
    /// Finished attempts. Never decreases.
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub request_snapshot: serde_json::Value,
    pub response_snapshot: Option<serde_json::Value>,
    pub remote_policy_number: Option<String>,
    pub last_error: Option<String>,
    /// Whether the last failure may be re-queued automatically.
    #[serde(default)]
    pub retryable: bool,
}

impl LedgerEntry {
    pub fn new(key: LedgerKey, external_id: Option<String>, request_snapshot: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            external_id,
            status: LedgerStatus::Pending,
            attempt_count: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
            completed_at: None,
            request_snapshot,
            response_snapshot: None,
            remote_policy_number: None,
            last_error: None,
            retryable: false,
        }
    }

    /// True once the entry can no longer be retried without an operator.
    pub fn requires_escalation(&self, max_attempts: u32) -> bool {
        self.status != LedgerStatus::Completed && self.attempt_count >= max_attempts
    }
}

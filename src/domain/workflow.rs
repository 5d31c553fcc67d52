use crate::domain::transaction::{TransactionKind, TransactionRecord};
use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Keys under which step outputs are recorded in [`WorkflowResult::identifiers`].
pub mod ids {
    pub const INSURED_ID: &str = "insured_id";
    pub const INSURED_MATCHED: &str = "insured_matched";
    pub const AGENCY_ID: &str = "agency_id";
    pub const PRODUCER_ID: &str = "producer_id";
    pub const UNDERWRITER_ID: &str = "underwriter_id";
    pub const QUOTE_ID: &str = "quote_id";
    pub const QUOTE_OPTION_ID: &str = "quote_option_id";
    pub const DOCUMENT_ID: &str = "document_id";
    pub const POLICY_ID: &str = "policy_id";
    pub const POLICY_NUMBER: &str = "policy_number";
    pub const ISSUE_DATE: &str = "issue_date";
    pub const ENDORSEMENT_ID: &str = "endorsement_id";
    pub const CANCELLATION_DATE: &str = "cancellation_date";
    pub const REINSTATEMENT_DATE: &str = "reinstatement_date";
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Completed,
    Failed,
}

/// Accumulated outcome of one orchestrated transaction.
///
/// Identifiers are written as each step succeeds, so a failed result still
/// shows everything that now exists on the remote side.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WorkflowResult {
    pub transaction_id: String,
    pub transaction_kind: TransactionKind,
    pub status: WorkflowStatus,
    pub message: String,
    pub errors: Vec<String>,
    pub identifiers: BTreeMap<String, String>,
    /// Set when the ledger showed the transaction as already completed.
    #[serde(default)]
    pub duplicate: bool,
    /// Set when the failure is one a scheduler may retry.
    #[serde(default)]
    pub retryable: bool,
    #[serde(default)]
    pub ledger_entry_id: Option<Uuid>,
}

impl WorkflowResult {
    pub fn new(record: &TransactionRecord) -> Self {
        Self {
            transaction_id: record.source_transaction_id.clone(),
            transaction_kind: record.kind,
            status: WorkflowStatus::Failed,
            message: String::new(),
            errors: Vec::new(),
            identifiers: BTreeMap::new(),
            duplicate: false,
            retryable: false,
            ledger_entry_id: None,
        }
    }

    pub fn record_id(&mut self, key: &str, value: impl Into<String>) {
        self.identifiers.insert(key.to_string(), value.into());
    }

    pub fn id(&self, key: &str) -> Option<&str> {
        self.identifiers.get(key).map(String::as_str)
    }

    pub fn policy_number(&self) -> Option<&str> {
        self.id(ids::POLICY_NUMBER)
    }

    pub fn is_completed(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    pub(crate) fn complete(&mut self, message: impl Into<String>) {
        self.status = WorkflowStatus::Completed;
        self.message = message.into();
        self.retryable = false;
    }

    pub(crate) fn complete_duplicate(&mut self) {
        self.duplicate = true;
        self.complete("duplicate transaction: already completed, no action taken");
    }

    pub(crate) fn fail(&mut self, step: &str, error: &BridgeError) {
        self.status = WorkflowStatus::Failed;
        self.message = format!("{step} failed");
        self.errors.push(error.to_string());
        self.retryable = error.is_retryable();
    }

    pub(crate) fn fail_internal(&mut self) {
        self.status = WorkflowStatus::Failed;
        self.message = "internal error while processing transaction".to_string();
        self.errors
            .push("an unexpected internal error occurred".to_string());
        self.retryable = false;
    }

    /// The projection persisted as the ledger's response snapshot.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status,
            "message": self.message,
            "errors": self.errors,
            "identifiers": self.identifiers,
        })
    }
}

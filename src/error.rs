use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} not found: {detail}")]
    LookupNotFound { entity: String, detail: String },
    #[error("{operation} failed: {message}")]
    RemoteFault { operation: String, message: String },
    #[error("transport error calling {operation}: {message}")]
    Transport { operation: String, message: String },
    #[error("step '{step}' timed out after {timeout_ms}ms")]
    StepTimeout { step: String, timeout_ms: u64 },
    #[error("authentication unavailable: {0}")]
    Auth(String),
    #[error("transaction {0} is already being processed")]
    InFlight(String),
    #[error("transaction {key} reached {attempts} attempts and requires manual intervention")]
    AttemptsExhausted { key: String, attempts: u32 },
    #[error("transaction {0} already completed")]
    AlreadyCompleted(String),
    #[error("ledger entry {0} not found")]
    EntryNotFound(Uuid),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl BridgeError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::LookupNotFound {
            entity: entity.into(),
            detail: detail.into(),
        }
    }

    pub fn remote_fault(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteFault {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether a scheduler may re-queue the transaction after this failure.
    ///
    /// Only connectivity-class failures qualify; validation, lookups and
    /// business faults from the remote system will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Transport { .. } | BridgeError::StepTimeout { .. } | BridgeError::Auth(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(BridgeError::transport("CreateQuote", "connection reset").is_retryable());
        assert!(
            BridgeError::StepTimeout {
                step: "create_quote".to_string(),
                timeout_ms: 30_000,
            }
            .is_retryable()
        );
        assert!(!BridgeError::validation("missing financials").is_retryable());
        assert!(!BridgeError::remote_fault("BindQuote", "quote expired").is_retryable());
        assert!(!BridgeError::not_found("policy", "external id 42").is_retryable());
    }

    #[test]
    fn test_remote_fault_message_is_verbatim() {
        let err = BridgeError::remote_fault("CreateQuote", "Producer is not appointed in TX");
        assert_eq!(
            err.to_string(),
            "CreateQuote failed: Producer is not appointed in TX"
        );
    }
}

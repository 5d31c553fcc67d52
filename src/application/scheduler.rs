use crate::application::orchestrator::WorkflowOrchestrator;
use crate::domain::ledger::{LedgerEntry, LedgerStatus};
use crate::domain::transaction::TransactionRecord;
use crate::domain::workflow::WorkflowResult;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A record after one pass through the orchestrator, with its processing
/// fields stamped from the result.
#[derive(Debug, Clone)]
pub struct Processed {
    pub record: TransactionRecord,
    pub result: WorkflowResult,
}

/// Folds replayed outcomes into an earlier batch.
///
/// A replay replaces the latest failed outcome for the same transaction id and
/// kind, so each transaction keeps a single row. Replays with no such outcome
/// are appended.
pub fn merge_replays(processed: &mut Vec<Processed>, replays: Vec<Processed>) {
    for replay in replays {
        let earlier = processed.iter_mut().rev().find(|p| {
            !p.result.is_completed()
                && p.result.transaction_id == replay.result.transaction_id
                && p.result.transaction_kind == replay.result.transaction_kind
        });
        match earlier {
            Some(slot) => *slot = replay,
            None => processed.push(replay),
        }
    }
}

/// Runs many transactions through one orchestrator with bounded concurrency,
/// and replays ledger entries marked for retry.
pub struct BatchProcessor {
    orchestrator: Arc<WorkflowOrchestrator>,
    max_concurrency: usize,
}

impl BatchProcessor {
    pub fn new(orchestrator: Arc<WorkflowOrchestrator>, max_concurrency: usize) -> Self {
        Self {
            orchestrator,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn orchestrator(&self) -> &Arc<WorkflowOrchestrator> {
        &self.orchestrator
    }

    /// Processes every record and returns the outcomes in input order.
    pub async fn process_batch(&self, records: Vec<TransactionRecord>) -> Vec<Processed> {
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(records.len());

        for record in records {
            let orchestrator = self.orchestrator.clone();
            let fallback = record.clone();
            // Acquired before spawning so records start in input order.
            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    error!(transaction_id = %record.source_transaction_id, error = %e, "concurrency limiter closed, running unbounded");
                    None
                }
            };
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let mut record = record;
                let result = orchestrator.process(&record).await;
                record.apply_result(&result);
                Processed { record, result }
            });
            handles.push((fallback, handle));
        }

        let mut processed = Vec::with_capacity(handles.len());
        for (mut record, handle) in handles {
            match handle.await {
                Ok(outcome) => processed.push(outcome),
                Err(e) => {
                    error!(transaction_id = %record.source_transaction_id, error = %e, "worker task aborted");
                    let mut result = WorkflowResult::new(&record);
                    result.fail_internal();
                    record.apply_result(&result);
                    processed.push(Processed { record, result });
                }
            }
        }
        processed
    }

    /// Moves retryable failures below the attempt cap to `retry`.
    pub async fn requeue_failed(&self) -> Result<Vec<Uuid>> {
        let ledger = self.orchestrator.ledger();
        let mut requeued = Vec::new();
        for entry in ledger.entries_with_status(&[LedgerStatus::Failed]).await? {
            if !entry.retryable {
                continue;
            }
            if ledger.mark_retry(entry.id).await? {
                requeued.push(entry.id);
            }
        }
        if !requeued.is_empty() {
            info!(count = requeued.len(), "requeued failed transactions");
        }
        Ok(requeued)
    }

    /// Replays every entry in `retry` from its stored request snapshot.
    pub async fn run_retries(&self) -> Result<Vec<Processed>> {
        let entries = self.orchestrator.ledger().pending().await?;
        let records: Vec<TransactionRecord> = entries
            .into_iter()
            .filter(|entry| entry.status == LedgerStatus::Retry)
            .filter_map(|entry| match serde_json::from_value(entry.request_snapshot) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(entry_id = %entry.id, error = %e, "request snapshot is not a transaction record");
                    None
                }
            })
            .collect();

        info!(count = records.len(), "replaying transactions marked for retry");
        Ok(self.process_batch(records).await)
    }

    /// Entries that hit the attempt cap without completing.
    pub async fn escalations(&self) -> Result<Vec<LedgerEntry>> {
        self.orchestrator.ledger().escalations().await
    }
}

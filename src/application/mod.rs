//! Application layer: the workflow orchestrator and the services it drives.
//!
//! The orchestrator sequences remote calls for one transaction, guarded by the
//! idempotency ledger and helped by the entity resolver. The batch processor
//! fans records out across tasks and replays retryable failures.

pub mod ledger;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod scheduler;

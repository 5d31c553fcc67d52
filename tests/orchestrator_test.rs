mod common;

use async_trait::async_trait;
use common::{harness, harness_from_parts, harness_with, new_business, policy_action, seeded_remote, submission};
use policy_bridge::config::BridgeConfig;
use policy_bridge::domain::ledger::{LedgerKey, LedgerStatus, ResourceType};
use policy_bridge::domain::ports::{AuthProvider, RemoteServiceClient};
use policy_bridge::domain::remote::{AuthToken, RemoteRequest, RemoteResponse, fields, operations};
use policy_bridge::domain::transaction::TransactionKind;
use policy_bridge::domain::workflow::{WorkflowStatus, ids};
use policy_bridge::error::Result;
use policy_bridge::infrastructure::auth::StaticTokenProvider;
use policy_bridge::infrastructure::simulated::{Fault, PartyRecord, PolicyState, SimulatedRemote};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_new_business_creates_insured_and_quote() {
    let h = harness().await;
    let record = new_business("TX-1");

    let result = h.orchestrator.process(&record).await;

    assert_eq!(result.status, WorkflowStatus::Completed, "{:?}", result.errors);
    assert!(!result.duplicate);
    assert_eq!(result.id(ids::INSURED_MATCHED), Some("false"));
    assert_eq!(result.id(ids::AGENCY_ID), Some("AG-1"));
    assert_eq!(result.id(ids::PRODUCER_ID), Some("PR-1"));
    assert!(result.id(ids::INSURED_ID).is_some());
    assert!(result.id(ids::QUOTE_ID).is_some());
    assert!(result.id(ids::QUOTE_OPTION_ID).is_some());
    assert!(result.id(ids::DOCUMENT_ID).is_some());
    assert_eq!(result.id(ids::UNDERWRITER_ID), None);
    assert_eq!(result.policy_number(), None);

    let calls = h.remote.calls().await;
    let quote = calls
        .iter()
        .find(|c| c.operation == operations::CREATE_QUOTE)
        .unwrap();
    assert_eq!(quote.get(fields::COMMISSION_RATE), Some("0.15"));
    assert_eq!(quote.get(fields::PREMIUM), Some("1200.00"));
    assert_eq!(quote.get(fields::UNDERWRITER_ID), None);

    let key = LedgerKey::for_record(&record, ResourceType::Submission);
    let entry = h.ledger.find(&key).await.unwrap().unwrap();
    assert_eq!(entry.status, LedgerStatus::Completed);
    assert_eq!(entry.attempt_count, 1);
    assert_eq!(result.ledger_entry_id, Some(entry.id));
}

#[tokio::test]
async fn test_existing_insured_is_reused() {
    let remote = seeded_remote().await;
    remote
        .add_insured(PartyRecord::new("INS-100", "ACME PLUMBING").state("TX"))
        .await;
    let h = harness_with(remote, BridgeConfig::default());

    let result = h.orchestrator.process(&new_business("TX-2")).await;

    assert!(result.is_completed());
    assert_eq!(result.id(ids::INSURED_ID), Some("INS-100"));
    assert_eq!(result.id(ids::INSURED_MATCHED), Some("true"));
    assert_eq!(h.remote.calls_for(operations::CREATE_INSURED).await, 0);
}

#[tokio::test]
async fn test_replay_of_completed_transaction_is_a_no_op() {
    let h = harness().await;
    let record = new_business("TX-3");

    let first = h.orchestrator.process(&record).await;
    assert!(first.is_completed());
    let calls_after_first = h.remote.call_count().await;

    let second = h.orchestrator.process(&record).await;
    assert!(second.is_completed());
    assert!(second.duplicate);
    assert!(second.message.contains("duplicate"));
    assert_eq!(h.remote.call_count().await, calls_after_first);
}

#[tokio::test]
async fn test_replay_of_completed_cancellation_is_a_no_op() {
    let h = harness().await;
    let record = policy_action("TX-3c", TransactionKind::Cancellation, "POL-500002");

    let first = h.orchestrator.process(&record).await;
    assert!(first.is_completed(), "{:?}", first.errors);
    assert!(!first.duplicate);
    assert_eq!(first.id(ids::CANCELLATION_DATE), Some("2026-03-15"));
    let calls_after_first = h.remote.call_count().await;

    let second = h.orchestrator.process(&record).await;
    assert!(second.is_completed());
    assert!(second.duplicate);
    assert_eq!(h.remote.call_count().await, calls_after_first);
    assert_eq!(h.remote.calls_for(operations::CANCEL_POLICY).await, 1);
    assert_eq!(
        h.remote.policy("POL-500002").await.unwrap().state,
        PolicyState::Cancelled
    );
}

#[tokio::test]
async fn test_missing_financials_fails_before_any_remote_call() {
    let h = harness().await;
    let mut record = new_business("TX-4");
    record.financials = None;

    let result = h.orchestrator.process(&record).await;

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert!(!result.retryable);
    assert!(result.errors[0].contains("financials is required"));
    assert_eq!(h.remote.call_count().await, 0);

    let entry = h
        .ledger
        .find(&LedgerKey::for_record(&record, ResourceType::Submission))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, LedgerStatus::Failed);
    assert!(!entry.retryable);
}

#[tokio::test]
async fn test_quote_failure_reports_entities_already_created() {
    let h = harness().await;
    h.remote
        .fail_operation(
            operations::CREATE_QUOTE,
            Fault::Remote("producer is not appointed in TX".to_string()),
        )
        .await;

    let result = h.orchestrator.process(&new_business("TX-5")).await;

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(result.message, "create_quote failed");
    assert_eq!(
        result.errors,
        vec!["CreateQuote failed: producer is not appointed in TX".to_string()]
    );
    assert!(result.id(ids::INSURED_ID).is_some());
    assert_eq!(result.id(ids::AGENCY_ID), Some("AG-1"));
    assert_eq!(result.id(ids::PRODUCER_ID), Some("PR-1"));
    assert_eq!(result.id(ids::QUOTE_ID), None);
    assert!(!result.retryable);
}

#[tokio::test]
async fn test_bind_runs_the_full_chain() {
    let h = harness().await;

    let result = h
        .orchestrator
        .process(&submission("TX-6", TransactionKind::Bind))
        .await;

    assert!(result.is_completed(), "{:?}", result.errors);
    let policy_number = result.policy_number().unwrap();
    assert!(policy_number.starts_with("POL-"));
    assert!(result.message.contains(policy_number));
    assert_eq!(
        h.remote.policy(policy_number).await.unwrap().state,
        PolicyState::Bound
    );

    let calls: Vec<String> = h
        .remote
        .calls()
        .await
        .into_iter()
        .map(|c| c.operation)
        .filter(|op| !op.starts_with("Search") && !op.starts_with("Find"))
        .collect();
    assert_eq!(
        calls,
        vec![
            operations::CREATE_INSURED,
            operations::CREATE_QUOTE,
            operations::ADD_QUOTE_OPTION,
            operations::STORE_QUOTE_DOCUMENT,
            operations::BIND_QUOTE,
        ]
    );
}

#[tokio::test]
async fn test_policy_lookup_falls_back_to_policy_number() {
    let h = harness().await;
    let mut record = policy_action("TX-7", TransactionKind::Cancellation, "POL-500002");
    record.external_policy_id = Some(999_999);

    let result = h.orchestrator.process(&record).await;

    assert!(result.is_completed(), "{:?}", result.errors);
    assert_eq!(result.id(ids::POLICY_ID), Some("P-2"));
    assert!(result.id(ids::CANCELLATION_DATE).is_some());
    assert_eq!(h.remote.calls_for(operations::FIND_POLICY_BY_EXTERNAL_ID).await, 1);
    assert_eq!(h.remote.calls_for(operations::FIND_POLICY_BY_NUMBER).await, 1);
    assert_eq!(
        h.remote.policy("POL-500002").await.unwrap().state,
        PolicyState::Cancelled
    );
}

#[tokio::test]
async fn test_policy_found_by_external_id() {
    let h = harness().await;
    let mut record = policy_action("TX-8", TransactionKind::Issue, "");
    record.policy_number = None;
    record.external_policy_id = Some(500_001);

    let result = h.orchestrator.process(&record).await;

    assert!(result.is_completed(), "{:?}", result.errors);
    assert_eq!(result.policy_number(), Some("POL-500001"));
    assert!(result.id(ids::ISSUE_DATE).is_some());
    assert_eq!(h.remote.calls_for(operations::FIND_POLICY_BY_NUMBER).await, 0);
}

#[tokio::test]
async fn test_unknown_policy_is_not_found() {
    let h = harness().await;
    let record = policy_action("TX-9", TransactionKind::Endorsement, "POL-404");

    let result = h.orchestrator.process(&record).await;

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(result.message, "locate_policy failed");
    assert_eq!(result.errors, vec!["policy not found: policy number POL-404".to_string()]);
    assert!(!result.retryable);
}

#[tokio::test]
async fn test_policy_action_without_reference_is_invalid() {
    let h = harness().await;
    let mut record = policy_action("TX-10", TransactionKind::Unbind, "");
    record.policy_number = None;

    let result = h.orchestrator.process(&record).await;

    assert_eq!(result.message, "validate failed");
    assert_eq!(h.remote.call_count().await, 0);
}

#[tokio::test]
async fn test_illegal_lifecycle_transition_is_a_remote_fault() {
    let h = harness().await;
    // POL-500002 is already issued.
    let record = policy_action("TX-11", TransactionKind::Issue, "POL-500002");

    let result = h.orchestrator.process(&record).await;

    assert_eq!(result.message, "issue_policy failed");
    assert_eq!(result.id(ids::POLICY_ID), Some("P-2"));
    assert!(!result.retryable);
}

#[tokio::test]
async fn test_hung_step_times_out_and_is_retryable() {
    let remote = seeded_remote().await;
    remote
        .fail_operation(operations::ADD_QUOTE_OPTION, Fault::Hang(Duration::from_millis(500)))
        .await;
    let config = BridgeConfig::default().with_step_timeout(Duration::from_millis(50));
    let h = harness_with(remote, config);

    let result = h.orchestrator.process(&new_business("TX-12")).await;

    assert_eq!(result.message, "add_quote_option failed");
    assert!(result.errors[0].contains("timed out after 50ms"));
    assert!(result.retryable);
    assert!(result.id(ids::QUOTE_ID).is_some());

    let entry = h.ledger.entry(result.ledger_entry_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(entry.status, LedgerStatus::Failed);
    assert!(entry.retryable);
}

#[tokio::test]
async fn test_missing_credentials_fail_before_remote_calls() {
    let remote = seeded_remote().await;
    let client: Arc<dyn RemoteServiceClient> = Arc::new(remote.clone());
    let auth: Arc<dyn AuthProvider> = Arc::new(StaticTokenProvider::new("", "svc-bridge"));
    let h = harness_from_parts(remote, client, auth, BridgeConfig::default());

    let result = h.orchestrator.process(&new_business("TX-13")).await;

    assert_eq!(result.message, "authenticate failed");
    assert!(result.retryable);
    assert_eq!(h.remote.call_count().await, 0);
}

/// A provider that hands out a blank credential instead of failing.
struct BlankTokenProvider;

#[async_trait]
impl AuthProvider for BlankTokenProvider {
    async fn current_token(&self) -> Result<AuthToken> {
        Ok(AuthToken {
            token: "  ".to_string(),
            principal_id: "svc-bridge".to_string(),
        })
    }
}

#[tokio::test]
async fn test_blank_token_from_any_provider_is_rejected() {
    let remote = seeded_remote().await;
    let client: Arc<dyn RemoteServiceClient> = Arc::new(remote.clone());
    let auth: Arc<dyn AuthProvider> = Arc::new(BlankTokenProvider);
    let h = harness_from_parts(remote, client, auth, BridgeConfig::default());

    let result = h.orchestrator.process(&new_business("TX-13b")).await;

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(result.message, "authenticate failed");
    assert!(result.errors[0].contains("empty session token"));
    assert!(result.retryable);
    assert_eq!(h.remote.call_count().await, 0);
}

#[tokio::test]
async fn test_unknown_agency_stops_after_insured() {
    let h = harness_with(SimulatedRemote::new(), BridgeConfig::default());

    let result = h.orchestrator.process(&new_business("TX-14")).await;

    assert_eq!(result.message, "resolve_agency failed");
    assert_eq!(result.errors, vec!["agency not found: Lone Star Agency".to_string()]);
    assert!(result.id(ids::INSURED_ID).is_some());
    assert_eq!(h.remote.calls_for(operations::CREATE_QUOTE).await, 0);
}

#[tokio::test]
async fn test_default_underwriter_is_sent_with_quote() {
    let config = BridgeConfig {
        default_underwriter_id: Some("UW-9".to_string()),
        ..Default::default()
    };
    let h = harness_with(seeded_remote().await, config);

    let result = h.orchestrator.process(&new_business("TX-15")).await;

    assert!(result.is_completed());
    assert_eq!(result.id(ids::UNDERWRITER_ID), Some("UW-9"));
    let calls = h.remote.calls().await;
    let quote = calls
        .iter()
        .find(|c| c.operation == operations::CREATE_QUOTE)
        .unwrap();
    assert_eq!(quote.get(fields::UNDERWRITER_ID), Some("UW-9"));
}

#[tokio::test]
async fn test_named_underwriter_is_resolved_by_email() {
    let h = harness().await;
    let mut record = new_business("TX-16");
    record.underwriter = Some(policy_bridge::domain::transaction::Underwriter {
        name: "Samuel Writer".to_string(),
        email: Some("sam@carrier.test".to_string()),
    });

    let result = h.orchestrator.process(&record).await;

    assert!(result.is_completed(), "{:?}", result.errors);
    assert_eq!(result.id(ids::UNDERWRITER_ID), Some("UW-1"));
}

#[tokio::test]
async fn test_retries_stop_at_attempt_limit_without_duplicate_insureds() {
    let h = harness().await;
    h.remote
        .fail_operation(operations::CREATE_QUOTE, Fault::Transport("connection reset".to_string()))
        .await;
    let record = new_business("TX-17");

    for _ in 0..3 {
        let result = h.orchestrator.process(&record).await;
        assert!(result.retryable);
    }
    let result = h.orchestrator.process(&record).await;

    assert_eq!(result.message, "ledger failed");
    assert!(result.errors[0].contains("requires manual intervention"));
    assert_eq!(h.remote.calls_for(operations::CREATE_QUOTE).await, 3);
    // Later attempts matched the insured created by the first one.
    assert_eq!(h.remote.insureds().await.len(), 1);
    assert_eq!(h.remote.calls_for(operations::CREATE_INSURED).await, 1);
}

struct ExplodingRemote;

#[async_trait]
impl RemoteServiceClient for ExplodingRemote {
    async fn call(&self, _token: &AuthToken, request: RemoteRequest) -> Result<RemoteResponse> {
        panic!("response decoder exploded on {}", request.operation);
    }
}

#[tokio::test]
async fn test_internal_fault_becomes_generic_failure() {
    let client: Arc<dyn RemoteServiceClient> = Arc::new(ExplodingRemote);
    let auth: Arc<dyn AuthProvider> = Arc::new(StaticTokenProvider::new("secret", "svc-bridge"));
    let h = harness_from_parts(SimulatedRemote::new(), client, auth, BridgeConfig::default());
    let record = policy_action("TX-18", TransactionKind::Issue, "POL-1");

    let result = h.orchestrator.process(&record).await;

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(result.message, "internal error while processing transaction");
    assert!(result.errors.iter().all(|e| !e.contains("decoder")));
    assert!(!result.retryable);

    let entry = h.ledger.entry(result.ledger_entry_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(entry.status, LedgerStatus::Failed);
    assert!(entry.last_error.unwrap().contains("decoder exploded"));
}

#![allow(dead_code)]

use chrono::NaiveDate;
use policy_bridge::application::ledger::IdempotencyLedger;
use policy_bridge::application::orchestrator::WorkflowOrchestrator;
use policy_bridge::config::BridgeConfig;
use policy_bridge::domain::financials::Financials;
use policy_bridge::domain::ports::{AuthProvider, RemoteServiceClient};
use policy_bridge::domain::transaction::{
    Address, Agency, Insured, Producer, TransactionKind, TransactionRecord,
};
use policy_bridge::infrastructure::auth::StaticTokenProvider;
use policy_bridge::infrastructure::in_memory::InMemoryLedgerStore;
use policy_bridge::infrastructure::simulated::{PartyRecord, PolicyRecord, PolicyState, SimulatedRemote};
use rust_decimal_macros::dec;
use std::sync::Arc;

pub fn submission(id: &str, kind: TransactionKind) -> TransactionRecord {
    let mut record = TransactionRecord::new("portal", id, kind);
    record.line_of_business = Some("general_liability".to_string());
    record.effective_date = NaiveDate::from_ymd_opt(2026, 1, 1);
    record.expiration_date = NaiveDate::from_ymd_opt(2027, 1, 1);
    record.insured = Some(Insured {
        name: "Acme Plumbing LLC".to_string(),
        address: Some(Address {
            street: Some("100 Elm Street".to_string()),
            city: Some("Austin".to_string()),
            state: Some("TX".to_string()),
            zip: Some("78701".to_string()),
        }),
        ..Default::default()
    });
    record.agency = Some(Agency {
        name: "Lone Star Agency".to_string(),
        tax_id: Some("74-1234567".to_string()),
        ..Default::default()
    });
    record.producer = Some(Producer {
        name: "Jane Broker".to_string(),
        license_number: Some("TX-555".to_string()),
        email: None,
    });
    record.financials = Some(Financials::new(dec!(1200.00)).with_commission(dec!(15)));
    record
}

pub fn new_business(id: &str) -> TransactionRecord {
    submission(id, TransactionKind::NewBusiness)
}

/// A lifecycle action against an existing policy. The parties are carried
/// as submitted but only the policy reference drives the workflow.
pub fn policy_action(id: &str, kind: TransactionKind, policy_number: &str) -> TransactionRecord {
    let mut record = submission(id, kind);
    record.effective_date = NaiveDate::from_ymd_opt(2026, 3, 15);
    record.expiration_date = None;
    record.policy_number = Some(policy_number.to_string());
    record
}

/// A remote holding the agency, producer and underwriter every submission
/// above refers to, plus one bound and one issued policy.
pub async fn seeded_remote() -> SimulatedRemote {
    let remote = SimulatedRemote::new();
    remote
        .add_agency(PartyRecord::new("AG-1", "Lone Star Agency").tax_id("741234567").state("TX"))
        .await;
    remote
        .add_producer(PartyRecord::new("PR-1", "Jane Broker").license("TX-555").agency("AG-1"))
        .await;
    remote
        .add_underwriter(PartyRecord::new("UW-1", "Sam Writer").email("sam@carrier.test"))
        .await;
    remote
        .add_policy(PolicyRecord::new("P-1", "POL-500001", PolicyState::Bound).external_id(500001))
        .await;
    remote
        .add_policy(PolicyRecord::new("P-2", "POL-500002", PolicyState::Issued).external_id(500002))
        .await;
    remote
}

pub struct Harness {
    pub remote: SimulatedRemote,
    pub ledger: Arc<IdempotencyLedger>,
    pub orchestrator: Arc<WorkflowOrchestrator>,
}

pub fn harness_with(remote: SimulatedRemote, config: BridgeConfig) -> Harness {
    let client: Arc<dyn RemoteServiceClient> = Arc::new(remote.clone());
    let auth: Arc<dyn AuthProvider> = Arc::new(StaticTokenProvider::new("secret", "svc-bridge"));
    harness_from_parts(remote, client, auth, config)
}

pub fn harness_from_parts(
    remote: SimulatedRemote,
    client: Arc<dyn RemoteServiceClient>,
    auth: Arc<dyn AuthProvider>,
    config: BridgeConfig,
) -> Harness {
    let ledger = Arc::new(IdempotencyLedger::new(
        Box::new(InMemoryLedgerStore::new()),
        config.max_attempts,
    ));
    let orchestrator = Arc::new(WorkflowOrchestrator::with_defaults(client, auth, ledger.clone(), config));
    Harness {
        remote,
        ledger,
        orchestrator,
    }
}

pub async fn harness() -> Harness {
    harness_with(seeded_remote().await, BridgeConfig::default())
}

//! In-process stand-in for the policy-administration backend.
//!
//! Keeps counterparties, quotes and policies in memory and answers the same
//! named operations the real transport does. The binary uses it for dry runs
//! against a seed file; tests use its call log and fault injection.

use crate::domain::ports::RemoteServiceClient;
use crate::domain::remote::{AuthToken, RemoteRequest, RemoteResponse, RemoteRow, fields, operations};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// A counterparty row: insured, agency, producer or underwriter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyRecord {
    pub id: String,
    pub name: String,
    pub tax_id: Option<String>,
    pub license_number: Option<String>,
    pub email: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub agency_id: Option<String>,
}

impl PartyRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn tax_id(mut self, tax_id: &str) -> Self {
        self.tax_id = Some(tax_id.to_string());
        self
    }

    pub fn license(mut self, license: &str) -> Self {
        self.license_number = Some(license.to_string());
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn street(mut self, street: &str) -> Self {
        self.street = Some(street.to_string());
        self
    }

    pub fn state(mut self, state: &str) -> Self {
        self.state = Some(state.to_string());
        self
    }

    pub fn agency(mut self, agency_id: &str) -> Self {
        self.agency_id = Some(agency_id.to_string());
        self
    }

    fn to_row(&self) -> RemoteRow {
        let mut row = RemoteRow::new();
        row.insert(fields::ID.to_string(), self.id.clone());
        row.insert(fields::NAME.to_string(), self.name.clone());
        let optional = [
            (fields::TAX_ID, &self.tax_id),
            (fields::LICENSE_NUMBER, &self.license_number),
            (fields::EMAIL, &self.email),
            (fields::STREET, &self.street),
            (fields::CITY, &self.city),
            (fields::STATE, &self.state),
            (fields::ZIP, &self.zip),
            (fields::AGENCY_ID, &self.agency_id),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                row.insert(key.to_string(), value.clone());
            }
        }
        row
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyState {
    Bound,
    Issued,
    Unbound,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub id: String,
    pub policy_number: String,
    #[serde(default)]
    pub external_id: Option<u64>,
    pub state: PolicyState,
    #[serde(default)]
    pub quote_id: Option<String>,
    #[serde(default)]
    pub endorsements: u32,
}

impl PolicyRecord {
    pub fn new(id: impl Into<String>, policy_number: impl Into<String>, state: PolicyState) -> Self {
        Self {
            id: id.into(),
            policy_number: policy_number.into(),
            external_id: None,
            state,
            quote_id: None,
            endorsements: 0,
        }
    }

    pub fn external_id(mut self, external_id: u64) -> Self {
        self.external_id = Some(external_id);
        self
    }

    fn to_row(&self) -> RemoteRow {
        let mut row = RemoteRow::new();
        row.insert(fields::POLICY_ID.to_string(), self.id.clone());
        row.insert(fields::POLICY_NUMBER.to_string(), self.policy_number.clone());
        if let Some(external_id) = self.external_id {
            row.insert(fields::EXTERNAL_ID.to_string(), external_id.to_string());
        }
        row
    }
}

/// Entities that exist before a run, as loaded from a seed file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimulatedSeed {
    pub insureds: Vec<PartyRecord>,
    pub agencies: Vec<PartyRecord>,
    pub producers: Vec<PartyRecord>,
    pub underwriters: Vec<PartyRecord>,
    pub policies: Vec<PolicyRecord>,
}

impl SimulatedSeed {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Injected behaviour for one operation.
#[derive(Debug, Clone)]
pub enum Fault {
    Remote(String),
    Transport(String),
    /// Sleeps before answering normally.
    Hang(Duration),
}

#[derive(Debug, Clone)]
struct QuoteRecord {
    insured_id: String,
    options: Vec<String>,
    documents: Vec<String>,
}

#[derive(Default)]
struct State {
    insureds: Vec<PartyRecord>,
    agencies: Vec<PartyRecord>,
    producers: Vec<PartyRecord>,
    underwriters: Vec<PartyRecord>,
    quotes: BTreeMap<String, QuoteRecord>,
    policies: Vec<PolicyRecord>,
    next_id: u64,
    calls: Vec<RemoteRequest>,
    faults: HashMap<String, Fault>,
}

impl State {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", 1000 + self.next_id)
    }
}

#[derive(Clone, Default)]
pub struct SimulatedRemote {
    state: Arc<Mutex<State>>,
}

fn required<'a>(request: &'a RemoteRequest, key: &str) -> Result<&'a str> {
    request
        .get(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| BridgeError::remote_fault(&request.operation, format!("{key} is required")))
}

fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

fn rows<'a>(parties: impl Iterator<Item = &'a PartyRecord>) -> RemoteResponse {
    RemoteResponse {
        rows: parties.map(PartyRecord::to_row).collect(),
    }
}

fn find_by_tax_id(parties: &[PartyRecord], request: &RemoteRequest) -> Result<RemoteResponse> {
    let wanted = digits(required(request, fields::TAX_ID)?);
    Ok(rows(parties.iter().filter(|p| {
        p.tax_id.as_deref().map(digits).as_deref() == Some(wanted.as_str())
    })))
}

fn find_by_field(
    parties: &[PartyRecord],
    request: &RemoteRequest,
    key: &str,
    value_of: fn(&PartyRecord) -> Option<&str>,
) -> Result<RemoteResponse> {
    let wanted = required(request, key)?;
    Ok(rows(parties.iter().filter(|p| {
        value_of(p).is_some_and(|v| v.eq_ignore_ascii_case(wanted))
    })))
}

/// Substring name search with optional location and agency filters.
fn search(parties: &[PartyRecord], request: &RemoteRequest) -> Result<RemoteResponse> {
    let query = required(request, fields::NAME)?.to_uppercase();
    let limit = request
        .get(fields::LIMIT)
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(usize::MAX);

    let filter_matches = |wanted: Option<&str>, actual: &Option<String>| match (wanted, actual) {
        (Some(w), Some(a)) => w.eq_ignore_ascii_case(a),
        _ => true,
    };

    Ok(rows(
        parties
            .iter()
            .filter(|p| {
                let name = p.name.to_uppercase();
                name.contains(&query) || query.contains(&name)
            })
            .filter(|p| filter_matches(request.get(fields::STATE), &p.state))
            .filter(|p| filter_matches(request.get(fields::CITY), &p.city))
            .filter(|p| filter_matches(request.get(fields::ZIP), &p.zip))
            .filter(|p| filter_matches(request.get(fields::AGENCY_ID), &p.agency_id))
            .take(limit),
    ))
}

impl SimulatedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: SimulatedSeed) -> Self {
        let state = State {
            insureds: seed.insureds,
            agencies: seed.agencies,
            producers: seed.producers,
            underwriters: seed.underwriters,
            policies: seed.policies,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn add_insured(&self, party: PartyRecord) {
        self.state.lock().await.insureds.push(party);
    }

    pub async fn add_agency(&self, party: PartyRecord) {
        self.state.lock().await.agencies.push(party);
    }

    pub async fn add_producer(&self, party: PartyRecord) {
        self.state.lock().await.producers.push(party);
    }

    pub async fn add_underwriter(&self, party: PartyRecord) {
        self.state.lock().await.underwriters.push(party);
    }

    pub async fn add_policy(&self, policy: PolicyRecord) {
        self.state.lock().await.policies.push(policy);
    }

    pub async fn fail_operation(&self, operation: &str, fault: Fault) {
        self.state
            .lock()
            .await
            .faults
            .insert(operation.to_string(), fault);
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    pub async fn calls(&self) -> Vec<RemoteRequest> {
        self.state.lock().await.calls.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls.len()
    }

    pub async fn calls_for(&self, operation: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub async fn insureds(&self) -> Vec<PartyRecord> {
        self.state.lock().await.insureds.clone()
    }

    pub async fn policy(&self, policy_number: &str) -> Option<PolicyRecord> {
        self.state
            .lock()
            .await
            .policies
            .iter()
            .find(|p| p.policy_number == policy_number)
            .cloned()
    }

    fn execute(state: &mut State, request: &RemoteRequest) -> Result<RemoteResponse> {
        let today = Utc::now().date_naive().to_string();
        match request.operation.as_str() {
            operations::FIND_INSURED_BY_TAX_ID => find_by_tax_id(&state.insureds, request),
            operations::FIND_AGENCY_BY_TAX_ID => find_by_tax_id(&state.agencies, request),
            operations::FIND_PRODUCER_BY_LICENSE => {
                find_by_field(&state.producers, request, fields::LICENSE_NUMBER, |p| {
                    p.license_number.as_deref()
                })
            }
            operations::FIND_UNDERWRITER_BY_EMAIL => {
                find_by_field(&state.underwriters, request, fields::EMAIL, |p| p.email.as_deref())
            }
            operations::SEARCH_INSURED => search(&state.insureds, request),
            operations::SEARCH_AGENCY => search(&state.agencies, request),
            operations::SEARCH_PRODUCER => search(&state.producers, request),
            operations::SEARCH_UNDERWRITER => search(&state.underwriters, request),
            operations::CREATE_INSURED => {
                let name = required(request, fields::NAME)?.to_string();
                let id = state.next("INS");
                let party = PartyRecord {
                    id: id.clone(),
                    name,
                    tax_id: request.get(fields::TAX_ID).map(str::to_string),
                    email: request.get(fields::EMAIL).map(str::to_string),
                    street: request.get(fields::STREET).map(str::to_string),
                    city: request.get(fields::CITY).map(str::to_string),
                    state: request.get(fields::STATE).map(str::to_string),
                    zip: request.get(fields::ZIP).map(str::to_string),
                    ..Default::default()
                };
                let row = party.to_row();
                state.insureds.push(party);
                Ok(RemoteResponse::single(row))
            }
            operations::CREATE_QUOTE => {
                let insured_id = required(request, fields::INSURED_ID)?.to_string();
                required(request, fields::PRODUCER_ID)?;
                if !state.insureds.iter().any(|p| p.id == insured_id) {
                    return Err(BridgeError::remote_fault(
                        &request.operation,
                        format!("insured {insured_id} does not exist"),
                    ));
                }
                let id = state.next("Q");
                state.quotes.insert(
                    id.clone(),
                    QuoteRecord {
                        insured_id,
                        options: Vec::new(),
                        documents: Vec::new(),
                    },
                );
                Ok(RemoteResponse::single(RemoteRow::from([(
                    fields::QUOTE_ID.to_string(),
                    id,
                )])))
            }
            operations::ADD_QUOTE_OPTION | operations::STORE_QUOTE_DOCUMENT => {
                let quote_id = required(request, fields::QUOTE_ID)?.to_string();
                let is_option = request.operation == operations::ADD_QUOTE_OPTION;
                let id = state.next(if is_option { "QO" } else { "DOC" });
                let quote = state.quotes.get_mut(&quote_id).ok_or_else(|| {
                    BridgeError::remote_fault(&request.operation, format!("quote {quote_id} does not exist"))
                })?;
                let (list, key) = if is_option {
                    (&mut quote.options, fields::QUOTE_OPTION_ID)
                } else {
                    (&mut quote.documents, fields::DOCUMENT_ID)
                };
                list.push(id.clone());
                Ok(RemoteResponse::single(RemoteRow::from([(key.to_string(), id)])))
            }
            operations::BIND_QUOTE => {
                let quote_id = required(request, fields::QUOTE_ID)?.to_string();
                let option_id = required(request, fields::QUOTE_OPTION_ID)?;
                let quote = state.quotes.get(&quote_id).ok_or_else(|| {
                    BridgeError::remote_fault(&request.operation, format!("quote {quote_id} does not exist"))
                })?;
                if !quote.options.iter().any(|o| o == option_id) {
                    return Err(BridgeError::remote_fault(
                        &request.operation,
                        format!("option {option_id} does not belong to quote {quote_id}"),
                    ));
                }
                debug!(insured_id = %quote.insured_id, quote_id = %quote_id, "binding simulated quote");
                let id = state.next("P");
                let number = 100_000 + state.next_id;
                let policy = PolicyRecord {
                    id,
                    policy_number: format!("POL-{number}"),
                    external_id: Some(number),
                    state: PolicyState::Bound,
                    quote_id: Some(quote_id),
                    endorsements: 0,
                };
                let row = policy.to_row();
                state.policies.push(policy);
                Ok(RemoteResponse::single(row))
            }
            operations::FIND_POLICY_BY_EXTERNAL_ID => {
                let wanted = required(request, fields::EXTERNAL_ID)?.parse::<u64>().ok();
                Ok(RemoteResponse {
                    rows: state
                        .policies
                        .iter()
                        .filter(|p| wanted.is_some() && p.external_id == wanted)
                        .map(PolicyRecord::to_row)
                        .collect(),
                })
            }
            operations::FIND_POLICY_BY_NUMBER => {
                let wanted = required(request, fields::POLICY_NUMBER)?;
                Ok(RemoteResponse {
                    rows: state
                        .policies
                        .iter()
                        .filter(|p| p.policy_number.eq_ignore_ascii_case(wanted))
                        .map(PolicyRecord::to_row)
                        .collect(),
                })
            }
            operations::ISSUE_POLICY
            | operations::UNBIND_POLICY
            | operations::CANCEL_POLICY
            | operations::ENDORSE_POLICY
            | operations::REINSTATE_POLICY => Self::lifecycle(state, request, today),
            other => Err(BridgeError::remote_fault(other, "unknown operation")),
        }
    }

    fn lifecycle(state: &mut State, request: &RemoteRequest, today: String) -> Result<RemoteResponse> {
        let policy_id = required(request, fields::POLICY_ID)?.to_string();
        let endorsement_id = state.next("END");
        let operation = request.operation.as_str();
        let fault = |message: String| BridgeError::remote_fault(operation, message);

        let policy = state
            .policies
            .iter_mut()
            .find(|p| p.id == policy_id)
            .ok_or_else(|| fault(format!("policy {policy_id} does not exist")))?;

        let effective = request
            .get(fields::EFFECTIVE_DATE)
            .map(str::to_string)
            .unwrap_or(today.clone());
        let mut row = RemoteRow::from([(
            fields::POLICY_NUMBER.to_string(),
            policy.policy_number.clone(),
        )]);

        match (operation, policy.state) {
            (operations::ISSUE_POLICY, PolicyState::Bound) => {
                policy.state = PolicyState::Issued;
                row.insert(fields::ISSUE_DATE.to_string(), today);
            }
            (operations::UNBIND_POLICY, PolicyState::Bound) => {
                policy.state = PolicyState::Unbound;
            }
            (operations::CANCEL_POLICY, PolicyState::Bound | PolicyState::Issued) => {
                policy.state = PolicyState::Cancelled;
                row.insert(fields::CANCELLATION_DATE.to_string(), effective);
            }
            (operations::ENDORSE_POLICY, PolicyState::Bound | PolicyState::Issued) => {
                policy.endorsements += 1;
                row.insert(fields::ENDORSEMENT_ID.to_string(), endorsement_id);
            }
            (operations::REINSTATE_POLICY, PolicyState::Cancelled) => {
                policy.state = PolicyState::Issued;
                row.insert(fields::REINSTATEMENT_DATE.to_string(), effective);
            }
            (_, current) => {
                return Err(fault(format!(
                    "policy {} is {:?} and cannot be processed",
                    policy.policy_number, current
                )));
            }
        }
        Ok(RemoteResponse::single(row))
    }
}

#[async_trait]
impl RemoteServiceClient for SimulatedRemote {
    async fn call(&self, token: &AuthToken, request: RemoteRequest) -> Result<RemoteResponse> {
        let fault = {
            let mut state = self.state.lock().await;
            state.calls.push(request.clone());
            state.faults.get(&request.operation).cloned()
        };

        match fault {
            Some(Fault::Remote(message)) => return Err(BridgeError::remote_fault(&request.operation, message)),
            Some(Fault::Transport(message)) => return Err(BridgeError::transport(&request.operation, message)),
            Some(Fault::Hang(duration)) => tokio::time::sleep(duration).await,
            None => {}
        }

        debug!(operation = %request.operation, principal = %token.principal_id, "simulated remote call");
        let mut state = self.state.lock().await;
        Self::execute(&mut state, &request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> AuthToken {
        AuthToken {
            token: "t".to_string(),
            principal_id: "tester".to_string(),
        }
    }

    #[tokio::test]
    async fn test_search_filters_by_state_and_limit() {
        let remote = SimulatedRemote::new();
        remote.add_insured(PartyRecord::new("INS-1", "ACME PLUMBING").state("TX")).await;
        remote.add_insured(PartyRecord::new("INS-2", "Acme Plumbing West").state("CA")).await;

        let response = remote
            .call(
                &token(),
                RemoteRequest::new(operations::SEARCH_INSURED)
                    .param(fields::NAME, "Acme Plumbing")
                    .param(fields::STATE, "TX"),
            )
            .await
            .unwrap();
        assert_eq!(response.rows.len(), 1);
        assert_eq!(response.field(fields::ID), Some("INS-1"));

        let response = remote
            .call(
                &token(),
                RemoteRequest::new(operations::SEARCH_INSURED)
                    .param(fields::NAME, "acme")
                    .param(fields::LIMIT, 1),
            )
            .await
            .unwrap();
        assert_eq!(response.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_quote_bind_issue_lifecycle() {
        let remote = SimulatedRemote::new();
        remote.add_insured(PartyRecord::new("INS-1", "Acme")).await;

        let quote = remote
            .call(
                &token(),
                RemoteRequest::new(operations::CREATE_QUOTE)
                    .param(fields::INSURED_ID, "INS-1")
                    .param(fields::PRODUCER_ID, "PR-1"),
            )
            .await
            .unwrap();
        let quote_id = quote.field(fields::QUOTE_ID).unwrap().to_string();

        let option = remote
            .call(
                &token(),
                RemoteRequest::new(operations::ADD_QUOTE_OPTION).param(fields::QUOTE_ID, &quote_id),
            )
            .await
            .unwrap();
        let option_id = option.field(fields::QUOTE_OPTION_ID).unwrap().to_string();

        let bound = remote
            .call(
                &token(),
                RemoteRequest::new(operations::BIND_QUOTE)
                    .param(fields::QUOTE_ID, &quote_id)
                    .param(fields::QUOTE_OPTION_ID, &option_id),
            )
            .await
            .unwrap();
        let policy_id = bound.field(fields::POLICY_ID).unwrap().to_string();
        let policy_number = bound.field(fields::POLICY_NUMBER).unwrap().to_string();

        let issued = remote
            .call(
                &token(),
                RemoteRequest::new(operations::ISSUE_POLICY).param(fields::POLICY_ID, &policy_id),
            )
            .await
            .unwrap();
        assert!(issued.field(fields::ISSUE_DATE).is_some());
        assert_eq!(
            remote.policy(&policy_number).await.unwrap().state,
            PolicyState::Issued
        );

        // Issuing twice is a business fault.
        let err = remote
            .call(
                &token(),
                RemoteRequest::new(operations::ISSUE_POLICY).param(fields::POLICY_ID, &policy_id),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::RemoteFault { .. }));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let remote = SimulatedRemote::new();
        remote
            .fail_operation(operations::SEARCH_INSURED, Fault::Transport("reset".to_string()))
            .await;
        let err = remote
            .call(
                &token(),
                RemoteRequest::new(operations::SEARCH_INSURED).param(fields::NAME, "x"),
            )
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(remote.calls_for(operations::SEARCH_INSURED).await, 1);

        remote.clear_faults().await;
        assert!(
            remote
                .call(
                    &token(),
                    RemoteRequest::new(operations::SEARCH_INSURED).param(fields::NAME, "x"),
                )
                .await
                .is_ok()
        );
    }
}

use crate::application::ledger::IdempotencyLedger;
use crate::application::registry::{Route, TerminalAction, TransactionRegistry};
use crate::application::resolver::{EntityKind, EntityResolver, Resolution};
use crate::config::BridgeConfig;
use crate::domain::ledger::LedgerKey;
use crate::domain::matching::MatchCriteria;
use crate::domain::ports::{AuthProvider, RemoteServiceClient};
use crate::domain::remote::{AuthToken, RemoteRequest, RemoteResponse, fields, operations};
use crate::domain::transaction::{Insured, TransactionRecord};
use crate::domain::workflow::{WorkflowResult, ids};
use crate::error::{BridgeError, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Step names reported in failed results.
pub mod steps {
    pub const ROUTE: &str = "route";
    pub const LEDGER: &str = "ledger";
    pub const VALIDATE: &str = "validate";
    pub const AUTHENTICATE: &str = "authenticate";
    pub const LOCATE_POLICY: &str = "locate_policy";
    pub const RESOLVE_INSURED: &str = "resolve_insured";
    pub const CREATE_INSURED: &str = "create_insured";
    pub const RESOLVE_AGENCY: &str = "resolve_agency";
    pub const RESOLVE_PRODUCER: &str = "resolve_producer";
    pub const RESOLVE_UNDERWRITER: &str = "resolve_underwriter";
    pub const CREATE_QUOTE: &str = "create_quote";
    pub const ADD_QUOTE_OPTION: &str = "add_quote_option";
    pub const STORE_DOCUMENT: &str = "store_document";
}

#[derive(Debug)]
struct StepFailure {
    step: &'static str,
    error: BridgeError,
}

impl StepFailure {
    fn new(step: &'static str, error: BridgeError) -> Self {
        Self { step, error }
    }
}

type StepResult<T> = std::result::Result<T, StepFailure>;

/// The policy located for a lifecycle action.
struct PolicyRef {
    policy_id: String,
    policy_number: Option<String>,
}

impl PolicyRef {
    fn from_response(response: &RemoteResponse) -> Option<Self> {
        Some(Self {
            policy_id: response.field(fields::POLICY_ID)?.to_string(),
            policy_number: response.field(fields::POLICY_NUMBER).map(str::to_string),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

fn required<'a, T>(value: &'a Option<T>, name: &str) -> StepResult<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| StepFailure::new(steps::VALIDATE, BridgeError::validation(format!("{name} is required"))))
}

fn create_insured_request(insured: &Insured) -> RemoteRequest {
    let address = insured.address.as_ref();
    RemoteRequest::new(operations::CREATE_INSURED)
        .param(fields::NAME, insured.name.trim())
        .param_opt(fields::TAX_ID, insured.tax_id.as_deref())
        .param_opt(fields::EMAIL, insured.email.as_deref())
        .param_opt(fields::STREET, address.and_then(|a| a.street.as_deref()))
        .param_opt(fields::CITY, address.and_then(|a| a.city.as_deref()))
        .param_opt(fields::STATE, address.and_then(|a| a.state.as_deref()))
        .param_opt(fields::ZIP, address.and_then(|a| a.zip.as_deref()))
}

/// Drives one transaction through the remote system.
///
/// Each step runs under the configured timeout and its outputs are recorded
/// in the [`WorkflowResult`] as soon as it succeeds. There is no rollback: a
/// failure stops the sequence and the result lists whatever already exists
/// remotely. Every attempt is bracketed by the [`IdempotencyLedger`].
pub struct WorkflowOrchestrator {
    remote: Arc<dyn RemoteServiceClient>,
    auth: Arc<dyn AuthProvider>,
    ledger: Arc<IdempotencyLedger>,
    resolver: EntityResolver,
    registry: TransactionRegistry,
    config: BridgeConfig,
}

impl WorkflowOrchestrator {
    pub fn new(
        remote: Arc<dyn RemoteServiceClient>,
        auth: Arc<dyn AuthProvider>,
        ledger: Arc<IdempotencyLedger>,
        resolver: EntityResolver,
        registry: TransactionRegistry,
        config: BridgeConfig,
    ) -> Self {
        Self {
            remote,
            auth,
            ledger,
            resolver,
            registry,
            config,
        }
    }

    /// Wires the standard registry and a resolver over the same remote client.
    pub fn with_defaults(
        remote: Arc<dyn RemoteServiceClient>,
        auth: Arc<dyn AuthProvider>,
        ledger: Arc<IdempotencyLedger>,
        config: BridgeConfig,
    ) -> Self {
        let resolver = EntityResolver::new(remote.clone(), config.matching.clone());
        Self::new(remote, auth, ledger, resolver, TransactionRegistry::standard(), config)
    }

    pub fn ledger(&self) -> &Arc<IdempotencyLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Processes one record. Never fails and never panics: every outcome,
    /// including an internal fault, comes back as a [`WorkflowResult`].
    #[instrument(
        skip_all,
        fields(
            source = %record.source_system,
            transaction_id = %record.source_transaction_id,
            kind = %record.kind
        )
    )]
    pub async fn process(&self, record: &TransactionRecord) -> WorkflowResult {
        let mut result = WorkflowResult::new(record);

        let outcome = AssertUnwindSafe(self.run(record, &mut result))
            .catch_unwind()
            .await;

        if let Err(payload) = outcome {
            let detail = panic_message(payload.as_ref());
            error!(panic = %detail, "workflow aborted by internal fault");
            result.fail_internal();
            if let Some(entry_id) = result.ledger_entry_id
                && let Err(e) = self
                    .ledger
                    .fail(entry_id, &format!("internal fault: {detail}"), Some(result.snapshot()), false)
                    .await
            {
                error!(entry_id = %entry_id, error = %e, "could not record internal fault in ledger");
            }
        }

        result
    }

    async fn run(&self, record: &TransactionRecord, result: &mut WorkflowResult) {
        let Some(route) = self.registry.route(record.kind).copied() else {
            result.fail(
                steps::ROUTE,
                &BridgeError::validation(format!("no workflow registered for {}", record.kind)),
            );
            return;
        };

        let key = LedgerKey::for_record(record, route.resource_type());
        match self.ledger.already_completed(&key).await {
            Ok(true) => {
                info!(key = %key, "already completed, skipping");
                result.complete_duplicate();
                return;
            }
            Ok(false) => {}
            Err(e) => {
                result.fail(steps::LEDGER, &e);
                return;
            }
        }

        let snapshot = match serde_json::to_value(record) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                result.fail(steps::LEDGER, &BridgeError::from(e));
                return;
            }
        };
        let external_id = record.external_policy_id.map(|id| id.to_string());
        let entry_id = match self.ledger.begin(key, external_id, snapshot).await {
            Ok(id) => id,
            Err(BridgeError::AlreadyCompleted(key)) => {
                info!(%key, "completed by a concurrent attempt, skipping");
                result.complete_duplicate();
                return;
            }
            Err(e) => {
                result.fail(steps::LEDGER, &e);
                return;
            }
        };
        result.ledger_entry_id = Some(entry_id);

        match self.execute(record, &route, result).await {
            Ok(()) => {
                let message = match result.policy_number() {
                    Some(number) => format!("{} completed for policy {number}", record.kind),
                    None => format!("{} completed", record.kind),
                };
                info!(%message, "workflow completed");
                result.complete(message);
                let policy_number = result.policy_number().map(str::to_string);
                if let Err(e) = self.ledger.complete(entry_id, result.snapshot(), policy_number).await {
                    error!(entry_id = %entry_id, error = %e, "workflow completed but ledger update failed");
                }
            }
            Err(StepFailure { step, error }) => {
                warn!(step, error = %error, retryable = error.is_retryable(), "workflow failed");
                result.fail(step, &error);
                if let Err(e) = self
                    .ledger
                    .fail(entry_id, &error.to_string(), Some(result.snapshot()), error.is_retryable())
                    .await
                {
                    error!(entry_id = %entry_id, error = %e, "could not record failure in ledger");
                }
            }
        }
    }

    async fn execute(&self, record: &TransactionRecord, route: &Route, result: &mut WorkflowResult) -> StepResult<()> {
        record
            .validate()
            .map_err(|e| StepFailure::new(steps::VALIDATE, e))?;

        if let Some(entry_id) = result.ledger_entry_id {
            self.ledger
                .mark_processing(entry_id)
                .await
                .map_err(|e| StepFailure::new(steps::LEDGER, e))?;
        }

        let token = self.step(steps::AUTHENTICATE, self.auth.current_token()).await?;
        if token.token.trim().is_empty() {
            return Err(StepFailure::new(
                steps::AUTHENTICATE,
                BridgeError::Auth(format!("empty session token for principal '{}'", token.principal_id)),
            ));
        }

        if route.requires_existing_entity {
            self.apply_to_policy(&token, record, route, result).await
        } else {
            self.submit(&token, record, route, result).await
        }
    }

    /// Runs one step under the step timeout.
    async fn step<T, F>(&self, name: &'static str, fut: F) -> StepResult<T>
    where
        F: Future<Output = Result<T>>,
    {
        debug!(step = name, "step started");
        match tokio::time::timeout(self.config.step_timeout(), fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(StepFailure::new(name, error)),
            Err(_) => Err(StepFailure::new(
                name,
                BridgeError::StepTimeout {
                    step: name.to_string(),
                    timeout_ms: self.config.step_timeout_ms,
                },
            )),
        }
    }

    /// Calls the remote and returns a required identifier from the answer.
    async fn call_for_id(&self, token: &AuthToken, request: RemoteRequest, field: &str) -> Result<String> {
        let operation = request.operation.clone();
        let response = self.remote.call(token, request).await?;
        response
            .field(field)
            .map(str::to_string)
            .ok_or_else(|| BridgeError::remote_fault(&operation, format!("response carried no {field}")))
    }

    /// Resolves a party that must already exist remotely.
    async fn resolve_existing(
        &self,
        token: &AuthToken,
        kind: EntityKind,
        criteria: MatchCriteria,
        agency_id: Option<&str>,
    ) -> Result<String> {
        match self.resolver.resolve(token, kind, &criteria, agency_id).await {
            Resolution::Matched { remote_id, .. } => Ok(remote_id),
            Resolution::NoMatch => Err(BridgeError::not_found(kind.as_str(), criteria.name)),
        }
    }

    async fn locate_policy(&self, token: &AuthToken, record: &TransactionRecord) -> Result<PolicyRef> {
        let number = record
            .policy_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        if let Some(external_id) = record.external_policy_id {
            let request = RemoteRequest::new(operations::FIND_POLICY_BY_EXTERNAL_ID).param(fields::EXTERNAL_ID, external_id);
            if let Some(policy) = PolicyRef::from_response(&self.remote.call(token, request).await?) {
                return Ok(policy);
            }
            if number.is_none() {
                return Err(BridgeError::not_found("policy", format!("external id {external_id}")));
            }
            debug!(external_id, "no policy for external id, trying policy number");
        }

        let Some(number) = number else {
            return Err(BridgeError::validation(format!(
                "external_policy_id or policy_number is required for {}",
                record.kind
            )));
        };
        let request = RemoteRequest::new(operations::FIND_POLICY_BY_NUMBER).param(fields::POLICY_NUMBER, number);
        PolicyRef::from_response(&self.remote.call(token, request).await?)
            .ok_or_else(|| BridgeError::not_found("policy", format!("policy number {number}")))
    }

    async fn apply_to_policy(
        &self,
        token: &AuthToken,
        record: &TransactionRecord,
        route: &Route,
        result: &mut WorkflowResult,
    ) -> StepResult<()> {
        let action = route.terminal_action.ok_or_else(|| {
            StepFailure::new(
                steps::ROUTE,
                BridgeError::validation(format!("no policy action registered for {}", record.kind)),
            )
        })?;

        let policy = self.step(steps::LOCATE_POLICY, self.locate_policy(token, record)).await?;
        result.record_id(ids::POLICY_ID, policy.policy_id);
        if let Some(number) = policy.policy_number {
            result.record_id(ids::POLICY_NUMBER, number);
        }

        self.perform(token, record, action, result).await
    }

    async fn perform(
        &self,
        token: &AuthToken,
        record: &TransactionRecord,
        action: TerminalAction,
        result: &mut WorkflowResult,
    ) -> StepResult<()> {
        let request = action
            .request(record, result)
            .map_err(|e| StepFailure::new(action.step(), e))?;
        let response = self.step(action.step(), self.remote.call(token, request)).await?;
        action.record_outputs(&response, result);
        Ok(())
    }

    /// The quote chain: parties, quote, option, document and an optional bind.
    async fn submit(
        &self,
        token: &AuthToken,
        record: &TransactionRecord,
        route: &Route,
        result: &mut WorkflowResult,
    ) -> StepResult<()> {
        let insured = required(&record.insured, "insured")?;
        let agency = required(&record.agency, "agency")?;
        let producer = required(&record.producer, "producer")?;
        let financials = required(&record.financials, "financials")?;

        let criteria = MatchCriteria::from(insured);
        let resolution = self
            .step(steps::RESOLVE_INSURED, async {
                Ok(self.resolver.resolve(token, EntityKind::Insured, &criteria, None).await)
            })
            .await?;
        let insured_id = match resolution {
            Resolution::Matched { remote_id, .. } => {
                result.record_id(ids::INSURED_MATCHED, "true");
                remote_id
            }
            Resolution::NoMatch => {
                let id = self
                    .step(
                        steps::CREATE_INSURED,
                        self.call_for_id(token, create_insured_request(insured), fields::ID),
                    )
                    .await?;
                info!(insured_id = %id, "created insured");
                result.record_id(ids::INSURED_MATCHED, "false");
                id
            }
        };
        result.record_id(ids::INSURED_ID, &insured_id);

        let agency_id = self
            .step(
                steps::RESOLVE_AGENCY,
                self.resolve_existing(token, EntityKind::Agency, MatchCriteria::from(agency), None),
            )
            .await?;
        result.record_id(ids::AGENCY_ID, &agency_id);

        let producer_id = self
            .step(
                steps::RESOLVE_PRODUCER,
                self.resolve_existing(token, EntityKind::Producer, MatchCriteria::from(producer), Some(&agency_id)),
            )
            .await?;
        result.record_id(ids::PRODUCER_ID, &producer_id);

        let underwriter_id = match &record.underwriter {
            Some(underwriter) => Some(
                self.step(
                    steps::RESOLVE_UNDERWRITER,
                    self.resolve_existing(token, EntityKind::Underwriter, MatchCriteria::from(underwriter), None),
                )
                .await?,
            ),
            None => self.config.default_underwriter_id.clone(),
        };
        if let Some(id) = &underwriter_id {
            result.record_id(ids::UNDERWRITER_ID, id);
        }

        let quote = RemoteRequest::new(operations::CREATE_QUOTE)
            .param(fields::SOURCE_TRANSACTION_ID, &record.source_transaction_id)
            .param(fields::INSURED_ID, &insured_id)
            .param(fields::AGENCY_ID, &agency_id)
            .param(fields::PRODUCER_ID, &producer_id)
            .param_opt(fields::UNDERWRITER_ID, underwriter_id.as_deref())
            .param_opt(fields::LINE_OF_BUSINESS, record.line_of_business.as_deref())
            .param_opt(fields::EFFECTIVE_DATE, record.effective_date)
            .param_opt(fields::EXPIRATION_DATE, record.expiration_date)
            .param(fields::PREMIUM, financials.premium)
            .param(fields::TOTAL_PREMIUM, financials.total())
            .param_opt(
                fields::COMMISSION_RATE,
                financials.normalized_commission_rate(self.config.commission_percent_threshold),
            );
        let quote_id = self
            .step(steps::CREATE_QUOTE, self.call_for_id(token, quote, fields::QUOTE_ID))
            .await?;
        result.record_id(ids::QUOTE_ID, &quote_id);

        let codes: Vec<&str> = record.coverages.iter().map(|c| c.code.as_str()).collect();
        let option = RemoteRequest::new(operations::ADD_QUOTE_OPTION)
            .param(fields::QUOTE_ID, &quote_id)
            .param(fields::PREMIUM, financials.premium)
            .param_opt(fields::COVERAGE_CODES, (!codes.is_empty()).then(|| codes.join(",")));
        let option_id = self
            .step(steps::ADD_QUOTE_OPTION, self.call_for_id(token, option, fields::QUOTE_OPTION_ID))
            .await?;
        result.record_id(ids::QUOTE_OPTION_ID, &option_id);

        let payload = serde_json::to_string(record).map_err(|e| StepFailure::new(steps::STORE_DOCUMENT, e.into()))?;
        let document = RemoteRequest::new(operations::STORE_QUOTE_DOCUMENT)
            .param(fields::QUOTE_ID, &quote_id)
            .param(
                fields::DOCUMENT_NAME,
                format!("{}-{}.json", record.source_system, record.source_transaction_id),
            )
            .param(fields::PAYLOAD, payload);
        let document_id = self
            .step(steps::STORE_DOCUMENT, self.call_for_id(token, document, fields::DOCUMENT_ID))
            .await?;
        result.record_id(ids::DOCUMENT_ID, &document_id);

        match route.terminal_action {
            Some(action) => self.perform(token, record, action, result).await,
            None => Ok(()),
        }
    }
}

use crate::domain::financials::Financials;
use crate::domain::workflow::{WorkflowResult, WorkflowStatus};
use crate::error::{BridgeError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    #[serde(alias = "new-business")]
    NewBusiness,
    Renewal,
    Endorsement,
    Cancellation,
    Bind,
    Unbind,
    Issue,
    Reinstatement,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 8] = [
        TransactionKind::NewBusiness,
        TransactionKind::Renewal,
        TransactionKind::Endorsement,
        TransactionKind::Cancellation,
        TransactionKind::Bind,
        TransactionKind::Unbind,
        TransactionKind::Issue,
        TransactionKind::Reinstatement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::NewBusiness => "new_business",
            TransactionKind::Renewal => "renewal",
            TransactionKind::Endorsement => "endorsement",
            TransactionKind::Cancellation => "cancellation",
            TransactionKind::Bind => "bind",
            TransactionKind::Unbind => "unbind",
            TransactionKind::Issue => "issue",
            TransactionKind::Reinstatement => "reinstatement",
        }
    }

    /// Kinds that must carry a policy term.
    pub fn requires_term_dates(&self) -> bool {
        matches!(self, TransactionKind::NewBusiness | TransactionKind::Renewal)
    }

    /// Kinds that act on a policy already bound in the remote system.
    pub fn targets_existing_policy(&self) -> bool {
        matches!(
            self,
            TransactionKind::Issue
                | TransactionKind::Unbind
                | TransactionKind::Cancellation
                | TransactionKind::Endorsement
                | TransactionKind::Reinstatement
        )
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Retry,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Address {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Insured {
    pub name: String,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub business_type: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Producer {
    pub name: String,
    #[serde(default)]
    pub license_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Agency {
    pub name: String,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub license_number: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Underwriter {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Coverage {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub limit: Option<rust_decimal::Decimal>,
    #[serde(default)]
    pub deductible: Option<rust_decimal::Decimal>,
    #[serde(default)]
    pub premium: Option<rust_decimal::Decimal>,
}

/// A normalized inbound policy transaction.
///
/// Everything except the trailing processing fields is treated as immutable
/// input; the orchestrator never writes resolved identifiers back into the
/// embedded parties.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TransactionRecord {
    pub source_system: String,
    pub source_transaction_id: String,
    pub kind: TransactionKind,
    #[serde(default)]
    pub policy_number: Option<String>,
    /// Numeric identifier of the policy in the remote system.
    #[serde(default)]
    pub external_policy_id: Option<u64>,
    #[serde(default)]
    pub line_of_business: Option<String>,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
    #[serde(default)]
    pub bound_date: Option<NaiveDate>,
    #[serde(default)]
    pub insured: Option<Insured>,
    #[serde(default)]
    pub producer: Option<Producer>,
    #[serde(default)]
    pub agency: Option<Agency>,
    #[serde(default)]
    pub underwriter: Option<Underwriter>,
    #[serde(default)]
    pub financials: Option<Financials>,
    #[serde(default)]
    pub coverages: Vec<Coverage>,

    #[serde(default)]
    pub status: ProcessingStatus,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

impl TransactionRecord {
    pub fn new(
        source_system: impl Into<String>,
        source_transaction_id: impl Into<String>,
        kind: TransactionKind,
    ) -> Self {
        Self {
            source_system: source_system.into(),
            source_transaction_id: source_transaction_id.into(),
            kind,
            policy_number: None,
            external_policy_id: None,
            line_of_business: None,
            effective_date: None,
            expiration_date: None,
            bound_date: None,
            insured: None,
            producer: None,
            agency: None,
            underwriter: None,
            financials: None,
            coverages: Vec::new(),
            status: ProcessingStatus::Pending,
            processed_at: None,
            error_message: None,
            retry_count: 0,
        }
    }

    /// Checks the pre-conditions for processing. Every failure here is terminal.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.source_system.trim().is_empty() {
            problems.push("source_system is required".to_string());
        }
        if self.source_transaction_id.trim().is_empty() {
            problems.push("source_transaction_id is required".to_string());
        }

        self.check_parties(&mut problems);
        if let Some(financials) = &self.financials
            && let Err(e) = financials.validate()
        {
            problems.push(e);
        }

        if self.kind.targets_existing_policy() {
            let has_number = self
                .policy_number
                .as_deref()
                .is_some_and(|n| !n.trim().is_empty());
            if self.external_policy_id.is_none() && !has_number {
                problems.push(format!(
                    "external_policy_id or policy_number is required for {}",
                    self.kind
                ));
            }
        }

        if self.kind.requires_term_dates() {
            if self.effective_date.is_none() {
                problems.push(format!("effective_date is required for {}", self.kind));
            }
            if self.expiration_date.is_none() {
                problems.push(format!("expiration_date is required for {}", self.kind));
            }
        }
        if let (Some(effective), Some(expiration)) = (self.effective_date, self.expiration_date)
            && expiration <= effective
        {
            problems.push("expiration_date must be after effective_date".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::Validation(problems.join("; ")))
        }
    }

    fn check_parties(&self, problems: &mut Vec<String>) {
        match &self.insured {
            None => problems.push("insured is required".to_string()),
            Some(insured) if insured.name.trim().is_empty() => {
                problems.push("insured.name is required".to_string())
            }
            Some(_) => {}
        }
        match &self.producer {
            None => problems.push("producer is required".to_string()),
            Some(producer) if producer.name.trim().is_empty() => {
                problems.push("producer.name is required".to_string())
            }
            Some(_) => {}
        }
        match &self.agency {
            None => problems.push("agency is required".to_string()),
            Some(agency) if agency.name.trim().is_empty() => {
                problems.push("agency.name is required".to_string())
            }
            Some(_) => {}
        }
        if self.financials.is_none() {
            problems.push("financials is required".to_string());
        }
    }

    /// Stamps the processing fields from a finished workflow.
    pub fn apply_result(&mut self, result: &WorkflowResult) {
        self.processed_at = Some(Utc::now());
        match result.status {
            WorkflowStatus::Completed => {
                self.status = ProcessingStatus::Completed;
                self.error_message = None;
            }
            WorkflowStatus::Failed => {
                self.status = ProcessingStatus::Failed;
                self.error_message = result.errors.first().cloned();
                self.retry_count += 1;
            }
        }
    }
}

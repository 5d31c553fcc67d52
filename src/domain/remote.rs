//! Request and response shapes exchanged with the policy-administration backend.
//!
//! The transport behind [`RemoteServiceClient`](super::ports::RemoteServiceClient)
//! owns the wire dialect; at this boundary every call is a named operation with
//! string parameters, answered by zero or more flattened rows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod operations {
    pub const FIND_INSURED_BY_TAX_ID: &str = "FindInsuredByTaxId";
    pub const SEARCH_INSURED: &str = "SearchInsured";
    pub const CREATE_INSURED: &str = "CreateInsured";
    pub const FIND_AGENCY_BY_TAX_ID: &str = "FindAgencyByTaxId";
    pub const SEARCH_AGENCY: &str = "SearchAgency";
    pub const FIND_PRODUCER_BY_LICENSE: &str = "FindProducerByLicense";
    pub const SEARCH_PRODUCER: &str = "SearchProducer";
    pub const FIND_UNDERWRITER_BY_EMAIL: &str = "FindUnderwriterByEmail";
    pub const SEARCH_UNDERWRITER: &str = "SearchUnderwriter";
    pub const CREATE_QUOTE: &str = "CreateQuote";
    pub const ADD_QUOTE_OPTION: &str = "AddQuoteOption";
    pub const STORE_QUOTE_DOCUMENT: &str = "StoreQuoteDocument";
    pub const BIND_QUOTE: &str = "BindQuote";
    pub const FIND_POLICY_BY_EXTERNAL_ID: &str = "FindPolicyByExternalId";
    pub const FIND_POLICY_BY_NUMBER: &str = "FindPolicyByNumber";
    pub const ISSUE_POLICY: &str = "IssuePolicy";
    pub const UNBIND_POLICY: &str = "UnbindPolicy";
    pub const CANCEL_POLICY: &str = "CancelPolicy";
    pub const ENDORSE_POLICY: &str = "EndorsePolicy";
    pub const REINSTATE_POLICY: &str = "ReinstatePolicy";
}

/// Field names used in request parameters and result rows.
pub mod fields {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const TAX_ID: &str = "tax_id";
    pub const LICENSE_NUMBER: &str = "license_number";
    pub const EMAIL: &str = "email";
    pub const STREET: &str = "street";
    pub const CITY: &str = "city";
    pub const STATE: &str = "state";
    pub const ZIP: &str = "zip";
    pub const LIMIT: &str = "limit";
    pub const AGENCY_ID: &str = "agency_id";
    pub const INSURED_ID: &str = "insured_id";
    pub const PRODUCER_ID: &str = "producer_id";
    pub const UNDERWRITER_ID: &str = "underwriter_id";
    pub const QUOTE_ID: &str = "quote_id";
    pub const QUOTE_OPTION_ID: &str = "quote_option_id";
    pub const DOCUMENT_ID: &str = "document_id";
    pub const POLICY_ID: &str = "policy_id";
    pub const POLICY_NUMBER: &str = "policy_number";
    pub const EXTERNAL_ID: &str = "external_id";
    pub const EFFECTIVE_DATE: &str = "effective_date";
    pub const EXPIRATION_DATE: &str = "expiration_date";
    pub const BOUND_DATE: &str = "bound_date";
    pub const ISSUE_DATE: &str = "issue_date";
    pub const CANCELLATION_DATE: &str = "cancellation_date";
    pub const ENDORSEMENT_ID: &str = "endorsement_id";
    pub const REINSTATEMENT_DATE: &str = "reinstatement_date";
    pub const PREMIUM: &str = "premium";
    pub const TOTAL_PREMIUM: &str = "total_premium";
    pub const COMMISSION_RATE: &str = "commission_rate";
    pub const LINE_OF_BUSINESS: &str = "line_of_business";
    pub const COVERAGE_CODES: &str = "coverage_codes";
    pub const SOURCE_TRANSACTION_ID: &str = "source_transaction_id";
    pub const DOCUMENT_NAME: &str = "document_name";
    pub const PAYLOAD: &str = "payload";
}

pub type RemoteRow = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub operation: String,
    pub params: BTreeMap<String, String>,
}

impl RemoteRequest {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Adds the parameter only when a non-blank value is present.
    pub fn param_opt<V: ToString>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            let value = value.to_string();
            if !value.trim().is_empty() {
                self.params.insert(key.to_string(), value);
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemoteResponse {
    pub rows: Vec<RemoteRow>,
}

impl RemoteResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(row: RemoteRow) -> Self {
        Self { rows: vec![row] }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A field from the first row, if any.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.rows
            .first()
            .and_then(|row| row.get(key))
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Short-lived credential presented with every remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub token: String,
    pub principal_id: String,
}

use crate::domain::ledger::ResourceType;
use crate::domain::remote::{RemoteRequest, RemoteResponse, fields, operations};
use crate::domain::transaction::{TransactionKind, TransactionRecord};
use crate::domain::workflow::{WorkflowResult, ids};
use crate::error::{BridgeError, Result};
use std::collections::HashMap;

/// The final remote call of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalAction {
    Bind,
    Issue,
    Unbind,
    Cancel,
    Endorse,
    Reinstate,
}

impl TerminalAction {
    pub fn operation(&self) -> &'static str {
        match self {
            TerminalAction::Bind => operations::BIND_QUOTE,
            TerminalAction::Issue => operations::ISSUE_POLICY,
            TerminalAction::Unbind => operations::UNBIND_POLICY,
            TerminalAction::Cancel => operations::CANCEL_POLICY,
            TerminalAction::Endorse => operations::ENDORSE_POLICY,
            TerminalAction::Reinstate => operations::REINSTATE_POLICY,
        }
    }

    /// Step name reported when the action fails.
    pub fn step(&self) -> &'static str {
        match self {
            TerminalAction::Bind => "bind_quote",
            TerminalAction::Issue => "issue_policy",
            TerminalAction::Unbind => "unbind_policy",
            TerminalAction::Cancel => "cancel_policy",
            TerminalAction::Endorse => "endorse_policy",
            TerminalAction::Reinstate => "reinstate_policy",
        }
    }

    /// Response fields copied into the result, as `(response field, result key)`.
    fn outputs(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            TerminalAction::Bind => &[
                (fields::POLICY_ID, ids::POLICY_ID),
                (fields::POLICY_NUMBER, ids::POLICY_NUMBER),
            ],
            TerminalAction::Issue => &[
                (fields::POLICY_NUMBER, ids::POLICY_NUMBER),
                (fields::ISSUE_DATE, ids::ISSUE_DATE),
            ],
            TerminalAction::Unbind => &[(fields::POLICY_NUMBER, ids::POLICY_NUMBER)],
            TerminalAction::Cancel => &[
                (fields::POLICY_NUMBER, ids::POLICY_NUMBER),
                (fields::CANCELLATION_DATE, ids::CANCELLATION_DATE),
            ],
            TerminalAction::Endorse => &[
                (fields::POLICY_NUMBER, ids::POLICY_NUMBER),
                (fields::ENDORSEMENT_ID, ids::ENDORSEMENT_ID),
            ],
            TerminalAction::Reinstate => &[
                (fields::POLICY_NUMBER, ids::POLICY_NUMBER),
                (fields::REINSTATEMENT_DATE, ids::REINSTATEMENT_DATE),
            ],
        }
    }

    /// Builds the remote request from the record and the identifiers recorded
    /// by earlier steps.
    pub fn request(&self, record: &TransactionRecord, result: &WorkflowResult) -> Result<RemoteRequest> {
        let recorded = |key: &str| {
            result.id(key).ok_or_else(|| {
                BridgeError::validation(format!("{} requires {key} from an earlier step", self.step()))
            })
        };

        let request = RemoteRequest::new(self.operation())
            .param(fields::SOURCE_TRANSACTION_ID, &record.source_transaction_id);
        let request = match self {
            TerminalAction::Bind => request
                .param(fields::QUOTE_ID, recorded(ids::QUOTE_ID)?)
                .param(fields::QUOTE_OPTION_ID, recorded(ids::QUOTE_OPTION_ID)?)
                .param_opt(fields::BOUND_DATE, record.bound_date.or(record.effective_date)),
            TerminalAction::Issue | TerminalAction::Unbind => {
                request.param(fields::POLICY_ID, recorded(ids::POLICY_ID)?)
            }
            TerminalAction::Cancel | TerminalAction::Reinstate => request
                .param(fields::POLICY_ID, recorded(ids::POLICY_ID)?)
                .param_opt(fields::EFFECTIVE_DATE, record.effective_date),
            TerminalAction::Endorse => request
                .param(fields::POLICY_ID, recorded(ids::POLICY_ID)?)
                .param_opt(fields::EFFECTIVE_DATE, record.effective_date)
                .param_opt(fields::PREMIUM, record.financials.as_ref().map(|f| f.premium)),
        };
        Ok(request)
    }

    pub fn record_outputs(&self, response: &RemoteResponse, result: &mut WorkflowResult) {
        for (field, key) in self.outputs() {
            if let Some(value) = response.field(field) {
                result.record_id(key, value);
            }
        }
    }
}

/// How one transaction kind is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub kind: TransactionKind,
    /// Acts on a policy that already exists instead of creating a quote.
    pub requires_existing_entity: bool,
    pub terminal_action: Option<TerminalAction>,
}

impl Route {
    pub fn resource_type(&self) -> ResourceType {
        if self.requires_existing_entity {
            ResourceType::Policy
        } else {
            ResourceType::Submission
        }
    }
}

const STANDARD_ROUTES: [Route; 8] = [
    Route {
        kind: TransactionKind::NewBusiness,
        requires_existing_entity: false,
        terminal_action: None,
    },
    Route {
        kind: TransactionKind::Renewal,
        requires_existing_entity: false,
        terminal_action: None,
    },
    Route {
        kind: TransactionKind::Bind,
        requires_existing_entity: false,
        terminal_action: Some(TerminalAction::Bind),
    },
    Route {
        kind: TransactionKind::Issue,
        requires_existing_entity: true,
        terminal_action: Some(TerminalAction::Issue),
    },
    Route {
        kind: TransactionKind::Unbind,
        requires_existing_entity: true,
        terminal_action: Some(TerminalAction::Unbind),
    },
    Route {
        kind: TransactionKind::Cancellation,
        requires_existing_entity: true,
        terminal_action: Some(TerminalAction::Cancel),
    },
    Route {
        kind: TransactionKind::Endorsement,
        requires_existing_entity: true,
        terminal_action: Some(TerminalAction::Endorse),
    },
    Route {
        kind: TransactionKind::Reinstatement,
        requires_existing_entity: true,
        terminal_action: Some(TerminalAction::Reinstate),
    },
];

/// Kind-to-route table consulted by the orchestrator.
#[derive(Debug, Clone)]
pub struct TransactionRegistry {
    routes: HashMap<TransactionKind, Route>,
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl TransactionRegistry {
    /// An empty registry; every kind is unroutable until registered.
    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        STANDARD_ROUTES
            .into_iter()
            .fold(Self::empty(), |registry, route| registry.with_route(route))
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.insert(route.kind, route);
        self
    }

    pub fn route(&self, kind: TransactionKind) -> Option<&Route> {
        self.routes.get(&kind)
    }
}

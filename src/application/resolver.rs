use crate::domain::matching::{MatchCandidate, MatchConfig, MatchCriteria, name_variants, normalize_tax_id, select_match};
use crate::domain::ports::RemoteServiceClient;
use crate::domain::remote::{AuthToken, RemoteRequest, fields, operations};
use crate::domain::transaction::{Address, Agency, Insured, Producer, Underwriter};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The remote counterparty families the resolver can look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Insured,
    Agency,
    Producer,
    Underwriter,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Insured => "insured",
            EntityKind::Agency => "agency",
            EntityKind::Producer => "producer",
            EntityKind::Underwriter => "underwriter",
        }
    }

    fn search_operation(&self) -> &'static str {
        match self {
            EntityKind::Insured => operations::SEARCH_INSURED,
            EntityKind::Agency => operations::SEARCH_AGENCY,
            EntityKind::Producer => operations::SEARCH_PRODUCER,
            EntityKind::Underwriter => operations::SEARCH_UNDERWRITER,
        }
    }

    /// The exact-identifier lookup for this kind, when the criteria carry one.
    fn exact_lookup(&self, criteria: &MatchCriteria) -> Option<RemoteRequest> {
        let non_blank = |v: &Option<String>| v.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        match self {
            EntityKind::Insured | EntityKind::Agency => {
                let tax_id = criteria.tax_id.as_deref().and_then(normalize_tax_id)?;
                let operation = if *self == EntityKind::Insured {
                    operations::FIND_INSURED_BY_TAX_ID
                } else {
                    operations::FIND_AGENCY_BY_TAX_ID
                };
                Some(RemoteRequest::new(operation).param(fields::TAX_ID, tax_id))
            }
            EntityKind::Producer => non_blank(&criteria.license_number).map(|license| {
                RemoteRequest::new(operations::FIND_PRODUCER_BY_LICENSE).param(fields::LICENSE_NUMBER, license)
            }),
            EntityKind::Underwriter => non_blank(&criteria.email).map(|email| {
                RemoteRequest::new(operations::FIND_UNDERWRITER_BY_EMAIL).param(fields::EMAIL, email)
            }),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Matched {
        remote_id: String,
        score: f64,
        /// Found by tax id, license or email rather than by name.
        exact: bool,
    },
    NoMatch,
}

impl Resolution {
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Resolution::Matched { remote_id, .. } => Some(remote_id),
            Resolution::NoMatch => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Resolution::Matched { .. })
    }
}

/// Finds the remote entity an inbound party refers to.
///
/// An exact identifier lookup is tried first. Otherwise every name variant is
/// searched, the union of rows is scored and the best acceptable candidate
/// wins. Failed lookups are logged and treated as empty, which makes the
/// caller fall back to "no match".
pub struct EntityResolver {
    remote: Arc<dyn RemoteServiceClient>,
    config: MatchConfig,
}

impl EntityResolver {
    pub fn new(remote: Arc<dyn RemoteServiceClient>, config: MatchConfig) -> Self {
        Self { remote, config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub async fn resolve(
        &self,
        token: &AuthToken,
        kind: EntityKind,
        criteria: &MatchCriteria,
        agency_id: Option<&str>,
    ) -> Resolution {
        if let Some(request) = kind.exact_lookup(criteria) {
            let operation = request.operation.clone();
            match self.remote.call(token, request).await {
                Ok(response) => {
                    if let Some(remote_id) = response.field(fields::ID) {
                        info!(entity = %kind, remote_id, "resolved by exact identifier");
                        return Resolution::Matched {
                            remote_id: remote_id.to_string(),
                            score: 1.0,
                            exact: true,
                        };
                    }
                }
                Err(e) => warn!(entity = %kind, %operation, error = %e, "exact lookup failed, falling back to name search"),
            }
        }

        let candidates = self.search(token, kind, criteria, agency_id).await;
        debug!(entity = %kind, candidates = candidates.len(), "scoring candidates");

        match select_match(criteria, &candidates, &self.config) {
            Some(best) => {
                info!(
                    entity = %kind,
                    remote_id = %best.candidate.remote_id,
                    score = best.total,
                    tax_id_confirmed = best.tax_id_confirmed(),
                    "resolved by fuzzy match"
                );
                Resolution::Matched {
                    remote_id: best.candidate.remote_id,
                    score: best.total,
                    exact: false,
                }
            }
            None => {
                debug!(entity = %kind, name = %criteria.name, "no acceptable candidate");
                Resolution::NoMatch
            }
        }
    }

    /// Union of search rows over all name variants, deduplicated by remote id.
    async fn search(
        &self,
        token: &AuthToken,
        kind: EntityKind,
        criteria: &MatchCriteria,
        agency_id: Option<&str>,
    ) -> Vec<MatchCandidate> {
        let mut found: BTreeMap<String, MatchCandidate> = BTreeMap::new();

        for variant in name_variants(&criteria.name, self.config.max_name_variants) {
            let request = RemoteRequest::new(kind.search_operation())
                .param(fields::NAME, &variant)
                .param(fields::LIMIT, self.config.search_limit)
                .param_opt(fields::STATE, criteria.state.as_deref())
                .param_opt(fields::CITY, criteria.city.as_deref())
                .param_opt(fields::ZIP, criteria.zip.as_deref())
                .param_opt(fields::AGENCY_ID, agency_id);

            match self.remote.call(token, request).await {
                Ok(response) => {
                    for candidate in response.rows.iter().filter_map(MatchCandidate::from_row) {
                        found.entry(candidate.remote_id.clone()).or_insert(candidate);
                    }
                }
                Err(e) => {
                    warn!(entity = %kind, variant = %variant, error = %e, "search failed, continuing with remaining variants");
                }
            }
        }

        found.into_values().collect()
    }
}

fn with_address(mut criteria: MatchCriteria, address: Option<&Address>) -> MatchCriteria {
    if let Some(address) = address {
        criteria.street = address.street.clone();
        criteria.city = address.city.clone();
        criteria.state = address.state.clone();
        criteria.zip = address.zip.clone();
    }
    criteria
}

impl From<&Insured> for MatchCriteria {
    fn from(insured: &Insured) -> Self {
        let criteria = MatchCriteria {
            tax_id: insured.tax_id.clone(),
            email: insured.email.clone(),
            ..MatchCriteria::named(&insured.name)
        };
        with_address(criteria, insured.address.as_ref())
    }
}

impl From<&Agency> for MatchCriteria {
    fn from(agency: &Agency) -> Self {
        let criteria = MatchCriteria {
            tax_id: agency.tax_id.clone(),
            license_number: agency.license_number.clone(),
            ..MatchCriteria::named(&agency.name)
        };
        with_address(criteria, agency.address.as_ref())
    }
}

impl From<&Producer> for MatchCriteria {
    fn from(producer: &Producer) -> Self {
        MatchCriteria {
            license_number: producer.license_number.clone(),
            email: producer.email.clone(),
            ..MatchCriteria::named(&producer.name)
        }
    }
}

impl From<&Underwriter> for MatchCriteria {
    fn from(underwriter: &Underwriter) -> Self {
        MatchCriteria {
            email: underwriter.email.clone(),
            ..MatchCriteria::named(&underwriter.name)
        }
    }
}

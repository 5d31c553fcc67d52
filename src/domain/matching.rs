//! Identity matching rules for counterparties.
//!
//! Everything here is a pure function over the static tables below: name
//! normalization, variant generation for remote searches, and weighted
//! candidate scoring. The resolver in the application layer supplies the
//! candidates; this module decides which one, if any, is the same entity.

use super::remote::{RemoteRow, fields};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use strsim::normalized_levenshtein;

/// Legal-form words removed wherever they appear as a whole word.
pub const LEGAL_SUFFIXES: &[&str] = &[
    "LLC",
    "INC",
    "INCORPORATED",
    "CORP",
    "CORPORATION",
    "CO",
    "COMPANY",
    "LTD",
    "LIMITED",
    "LP",
    "LLP",
    "PLLC",
    "PC",
];

/// Interchangeable spellings. Each pair is applied in both directions when
/// generating search variants.
pub const NAME_SYNONYMS: &[(&str, &str)] = &[
    ("AND", "&"),
    ("ASSOCIATES", "ASSOC"),
    ("BROTHERS", "BROS"),
    ("SERVICES", "SVCS"),
    ("INTERNATIONAL", "INTL"),
    ("MANAGEMENT", "MGMT"),
    ("CONSTRUCTION", "CONSTR"),
    ("SAINT", "ST"),
];

pub const ADDRESS_ABBREVIATIONS: &[(&str, &str)] = &[
    ("STREET", "ST"),
    ("AVENUE", "AVE"),
    ("ROAD", "RD"),
    ("DRIVE", "DR"),
    ("BOULEVARD", "BLVD"),
    ("LANE", "LN"),
    ("COURT", "CT"),
    ("CIRCLE", "CIR"),
    ("PLACE", "PL"),
    ("PARKWAY", "PKWY"),
    ("HIGHWAY", "HWY"),
    ("SUITE", "STE"),
    ("APARTMENT", "APT"),
    ("NORTH", "N"),
    ("SOUTH", "S"),
    ("EAST", "E"),
    ("WEST", "W"),
];

const NAME_WEIGHT: f64 = 0.40;
const TAX_ID_WEIGHT: f64 = 0.30;
const TAX_ID_PARTIAL: f64 = 0.15;
const ADDRESS_WEIGHT: f64 = 0.20;
const STATE_WEIGHT: f64 = 0.10;

const CONTAINMENT_FLOOR: f64 = 0.85;
const WORD_OVERLAP_FACTOR: f64 = 0.9;
const STREET_NUMBER_MISMATCH_CAP: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum score accepted on its own.
    pub accept_threshold: f64,
    /// Minimum score accepted when the tax id also matches exactly.
    pub tax_confirmed_threshold: f64,
    pub max_name_variants: usize,
    /// Row limit passed to each remote search.
    pub search_limit: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.85,
            tax_confirmed_threshold: 0.70,
            max_name_variants: 5,
            search_limit: 10,
        }
    }
}

/// Free-text identity supplied by the inbound transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchCriteria {
    pub name: String,
    pub tax_id: Option<String>,
    pub license_number: Option<String>,
    pub email: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

impl MatchCriteria {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A remote entity returned by a search, alive only for one resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchCandidate {
    pub remote_id: String,
    pub name: String,
    pub tax_id: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

impl MatchCandidate {
    /// Builds a candidate from a search row; rows without an id are dropped.
    pub fn from_row(row: &RemoteRow) -> Option<Self> {
        let field = |key: &str| {
            row.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Some(Self {
            remote_id: field(fields::ID)?,
            name: field(fields::NAME).unwrap_or_default(),
            tax_id: field(fields::TAX_ID),
            street: field(fields::STREET),
            city: field(fields::CITY),
            state: field(fields::STATE),
            zip: field(fields::ZIP),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxIdMatch {
    Exact,
    LastFour,
    Mismatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: MatchCandidate,
    pub name_score: f64,
    pub tax_id: Option<TaxIdMatch>,
    pub address_score: Option<f64>,
    pub state_match: Option<bool>,
    pub total: f64,
}

impl ScoredCandidate {
    pub fn tax_id_confirmed(&self) -> bool {
        self.tax_id == Some(TaxIdMatch::Exact)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Uppercased words. Periods and apostrophes are dropped so "L.L.C." reads as
/// "LLC"; `&` survives as its own word; other punctuation separates words.
fn words(input: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '.' | '\'' => {}
            '&' => cleaned.push_str(" & "),
            c if c.is_alphanumeric() => cleaned.extend(c.to_uppercase()),
            _ => cleaned.push(' '),
        }
    }
    cleaned.split_whitespace().map(str::to_string).collect()
}

fn is_legal_suffix(word: &str) -> bool {
    LEGAL_SUFFIXES.contains(&word)
}

/// Canonical comparison form of a business name.
pub fn normalize_name(name: &str) -> String {
    words(name)
        .into_iter()
        .filter(|w| !is_legal_suffix(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The name as written, minus legal-form words.
pub fn strip_legal_suffixes(name: &str) -> String {
    let kept: Vec<&str> = name
        .split_whitespace()
        .filter(|token| {
            let cleaned = words(token);
            cleaned.is_empty() || !cleaned.iter().all(|w| is_legal_suffix(w))
        })
        .collect();
    kept.join(" ")
        .trim_end_matches([',', ' '])
        .to_string()
}

fn substitute(words: &[&str], from: &str, to: &str) -> Option<String> {
    if !words.contains(&from) {
        return None;
    }
    let replaced: Vec<&str> = words
        .iter()
        .map(|w| if *w == from { to } else { *w })
        .collect();
    Some(replaced.join(" "))
}

/// Distinct search strings for one name, most literal first.
pub fn name_variants(name: &str, max: usize) -> Vec<String> {
    let raw = name.split_whitespace().collect::<Vec<_>>().join(" ");
    let normalized = normalize_name(name);
    let stripped = strip_legal_suffixes(&raw);

    let mut candidates = vec![raw, normalized.clone(), stripped];
    let normalized_words: Vec<&str> = normalized.split(' ').collect();
    for (long, short) in NAME_SYNONYMS {
        candidates.extend(substitute(&normalized_words, long, short));
        candidates.extend(substitute(&normalized_words, short, long));
    }

    let mut seen = BTreeSet::new();
    candidates
        .into_iter()
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.clone()))
        .take(max)
        .collect()
}

/// Name similarity in `[0, 1]`. Symmetric in its arguments.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let mut score = normalized_levenshtein(&a, &b);
    if a.contains(b.as_str()) || b.contains(a.as_str()) {
        score = score.max(CONTAINMENT_FLOOR);
    }

    let a_words: BTreeSet<&str> = a.split(' ').collect();
    let b_words: BTreeSet<&str> = b.split(' ').collect();
    let common = a_words.intersection(&b_words).count() as f64;
    let overlap = common / a_words.len().max(b_words.len()) as f64;
    score.max(overlap * WORD_OVERLAP_FACTOR)
}

pub fn normalize_address(address: &str) -> String {
    words(address)
        .into_iter()
        .map(|w| {
            ADDRESS_ABBREVIATIONS
                .iter()
                .find(|(long, _)| *long == w)
                .map(|(_, short)| short.to_string())
                .unwrap_or(w)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn street_number(normalized: &str) -> Option<&str> {
    normalized
        .split(' ')
        .next()
        .filter(|w| w.starts_with(|c: char| c.is_ascii_digit()))
}

/// Street address similarity in `[0, 1]`. A differing (or one-sided) house
/// number caps the score at 0.2.
pub fn address_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_address(a);
    let b = normalize_address(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let ratio = normalized_levenshtein(&a, &b);
    match (street_number(&a), street_number(&b)) {
        (Some(x), Some(y)) if x == y => ratio,
        (None, None) => ratio,
        _ => ratio.min(STREET_NUMBER_MISMATCH_CAP),
    }
}

fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Digits-only tax id, when it has the nine digits of an EIN or SSN.
pub fn normalize_tax_id(raw: &str) -> Option<String> {
    let digits = digits(raw);
    (digits.len() == 9).then_some(digits)
}

pub fn compare_tax_ids(a: &str, b: &str) -> Option<TaxIdMatch> {
    let a = digits(a);
    let b = digits(b);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a == b {
        Some(TaxIdMatch::Exact)
    } else if a.len() >= 4 && b.len() >= 4 && a[a.len() - 4..] == b[b.len() - 4..] {
        Some(TaxIdMatch::LastFour)
    } else {
        Some(TaxIdMatch::Mismatch)
    }
}

/// Weighted score of one candidate against the criteria.
///
/// Only dimensions present on both sides count, and the total is divided by
/// the weight actually in play, so a name-only comparison can still reach 1.0.
pub fn score_candidate(criteria: &MatchCriteria, candidate: &MatchCandidate) -> ScoredCandidate {
    let name_score = name_similarity(&criteria.name, &candidate.name);
    let mut earned = name_score * NAME_WEIGHT;
    let mut possible = NAME_WEIGHT;

    let tax_id = match (non_blank(&criteria.tax_id), non_blank(&candidate.tax_id)) {
        (Some(a), Some(b)) => compare_tax_ids(a, b),
        _ => None,
    };
    if let Some(tax_match) = tax_id {
        possible += TAX_ID_WEIGHT;
        earned += match tax_match {
            TaxIdMatch::Exact => TAX_ID_WEIGHT,
            TaxIdMatch::LastFour => TAX_ID_PARTIAL,
            TaxIdMatch::Mismatch => 0.0,
        };
    }

    let address_score = match (non_blank(&criteria.street), non_blank(&candidate.street)) {
        (Some(a), Some(b)) => Some(address_similarity(a, b)),
        _ => None,
    };
    if let Some(score) = address_score {
        possible += ADDRESS_WEIGHT;
        earned += score * ADDRESS_WEIGHT;
    }

    let state_match = match (non_blank(&criteria.state), non_blank(&candidate.state)) {
        (Some(a), Some(b)) => Some(a.eq_ignore_ascii_case(b)),
        _ => None,
    };
    if let Some(matched) = state_match {
        possible += STATE_WEIGHT;
        if matched {
            earned += STATE_WEIGHT;
        }
    }

    ScoredCandidate {
        candidate: candidate.clone(),
        name_score,
        tax_id,
        address_score,
        state_match,
        total: earned / possible,
    }
}

/// Orders by score, highest first, then by remote id for determinism.
fn rank(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.total
        .total_cmp(&a.total)
        .then_with(|| a.candidate.remote_id.cmp(&b.candidate.remote_id))
}

/// Best-scoring candidate, regardless of acceptance.
pub fn best_candidate(criteria: &MatchCriteria, candidates: &[MatchCandidate]) -> Option<ScoredCandidate> {
    candidates
        .iter()
        .map(|c| score_candidate(criteria, c))
        .min_by(rank)
}

pub fn is_acceptable(scored: &ScoredCandidate, config: &MatchConfig) -> bool {
    scored.total >= config.accept_threshold
        || (scored.total >= config.tax_confirmed_threshold && scored.tax_id_confirmed())
}

/// Picks the candidate to reuse, or `None` when a new entity should be created.
pub fn select_match(
    criteria: &MatchCriteria,
    candidates: &[MatchCandidate],
    config: &MatchConfig,
) -> Option<ScoredCandidate> {
    best_candidate(criteria, candidates).filter(|best| is_acceptable(best, config))
}

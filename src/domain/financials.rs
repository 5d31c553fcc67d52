use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Monetary terms carried by a transaction.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Financials {
    /// Written premium for the term.
    pub premium: Decimal,
    /// Commission as submitted: either a fraction (0.15) or a percentage (15).
    #[serde(default)]
    pub commission_rate: Option<Decimal>,
    #[serde(default)]
    pub taxes: Option<Decimal>,
    #[serde(default)]
    pub fees: Option<Decimal>,
}

impl Financials {
    pub fn new(premium: Decimal) -> Self {
        Self {
            premium,
            commission_rate: None,
            taxes: None,
            fees: None,
        }
    }

    pub fn with_commission(mut self, rate: Decimal) -> Self {
        self.commission_rate = Some(rate);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.premium < Decimal::ZERO {
            return Err("financials.premium must not be negative".to_string());
        }
        if let Some(rate) = self.commission_rate
            && rate < Decimal::ZERO
        {
            return Err("financials.commission_rate must not be negative".to_string());
        }
        Ok(())
    }

    /// Premium plus taxes and fees.
    pub fn total(&self) -> Decimal {
        self.premium + self.taxes.unwrap_or_default() + self.fees.unwrap_or_default()
    }

    /// Commission as a fraction of premium.
    ///
    /// Values strictly greater than `percent_threshold` are read as percentages
    /// and divided by 100. A value equal to the threshold is kept as-is, so
    /// with the default threshold of 1, `1.0` means 100%.
    pub fn normalized_commission_rate(&self, percent_threshold: Decimal) -> Option<Decimal> {
        self.commission_rate
            .map(|rate| normalize_commission_rate(rate, percent_threshold))
    }
}

pub fn normalize_commission_rate(rate: Decimal, percent_threshold: Decimal) -> Decimal {
    if rate > percent_threshold {
        rate / Decimal::ONE_HUNDRED
    } else {
        rate
    }
}

//! Core type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::errors::UnknownCurrency;

/// Currencies quoted by the price source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Gbp,
    Eur,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Gbp, Currency::Eur];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Gbp => "GBP",
            Currency::Eur => "EUR",
        }
    }

    /// HTML entity the source uses as symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Usd => "&#36;",
            Currency::Gbp => "&pound;",
            Currency::Eur => "&euro;",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Currency::Usd => "United States Dollar",
            Currency::Gbp => "British Pound Sterling",
            Currency::Eur => "Euro",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCurrency(s.to_string()))
    }
}

/// One currency's rate inside an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRate {
    pub code: String,
    pub symbol: String,
    /// Human-readable rate, e.g. "41,234.5678"
    pub rate: String,
    pub description: String,
    pub rate_float: f64,
}

impl CurrencyRate {
    /// Rate with the source's default labels
    pub fn new(currency: Currency, rate_float: f64) -> Self {
        Self {
            code: currency.code().to_string(),
            symbol: currency.symbol().to_string(),
            rate: format!("{rate_float:.4}"),
            description: currency.description().to_string(),
            rate_float,
        }
    }
}

/// One polled price snapshot
///
/// Immutable after creation. Subscribers share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub observed_at: DateTime<Utc>,
    /// Source's display timestamp, empty when restored from storage
    #[serde(default)]
    pub updated: String,
    #[serde(default)]
    pub updated_uk: String,
    pub disclaimer: String,
    pub chart_name: String,
    pub rates: BTreeMap<Currency, CurrencyRate>,
}

impl PriceObservation {
    pub fn new(
        observed_at: DateTime<Utc>,
        disclaimer: impl Into<String>,
        chart_name: impl Into<String>,
        rates: impl IntoIterator<Item = (Currency, f64)>,
    ) -> Self {
        Self {
            observed_at,
            updated: String::new(),
            updated_uk: String::new(),
            disclaimer: disclaimer.into(),
            chart_name: chart_name.into(),
            rates: rates
                .into_iter()
                .map(|(currency, value)| (currency, CurrencyRate::new(currency, value)))
                .collect(),
        }
    }

    pub fn rate(&self, currency: Currency) -> Option<&CurrencyRate> {
        self.rates.get(&currency)
    }

    pub fn rate_float(&self, currency: Currency) -> Option<f64> {
        self.rate(currency).map(|r| r.rate_float)
    }

    /// USD price, 0.0 when the source omitted it
    pub fn usd_price(&self) -> f64 {
        self.rate_float(Currency::Usd).unwrap_or(0.0)
    }

    /// Storage key: whole seconds since the epoch
    pub fn timestamp(&self) -> i64 {
        self.observed_at.timestamp()
    }
}

/// Currencies a subscriber asked for, empty means none
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrencyFilter {
    currencies: BTreeSet<Currency>,
}

impl CurrencyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw codes; unknown codes are skipped
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let currencies = codes
            .into_iter()
            .filter_map(|code| code.as_ref().parse::<Currency>().ok())
            .collect();
        Self { currencies }
    }

    pub fn with(mut self, currency: Currency) -> Self {
        self.currencies.insert(currency);
        self
    }

    pub fn contains(&self, currency: Currency) -> bool {
        self.currencies.contains(&currency)
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Currency> + '_ {
        self.currencies.iter().copied()
    }
}

impl FromIterator<Currency> for CurrencyFilter {
    fn from_iter<T: IntoIterator<Item = Currency>>(iter: T) -> Self {
        Self {
            currencies: iter.into_iter().collect(),
        }
    }
}

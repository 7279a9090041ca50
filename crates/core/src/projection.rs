//! Observation to outbound message projection

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::{Currency, CurrencyFilter, PriceObservation};

/// Wire-shaped view of one observation for one subscriber
///
/// `price` is always the USD rate. The labeled fields are present only when
/// the subscriber requested that currency and the observation carries it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceMessage {
    #[serde(serialize_with = "rfc3339")]
    pub timedate: DateTime<Utc>,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_eur: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_gbp: Option<f64>,
}

impl PriceMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn labeled(&self, currency: Currency) -> Option<f64> {
        match currency {
            Currency::Usd => self.price_usd,
            Currency::Eur => self.price_eur,
            Currency::Gbp => self.price_gbp,
        }
    }
}

fn rfc3339<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Project an observation through a subscriber's currency filter
pub fn project(observation: &PriceObservation, filter: &CurrencyFilter) -> PriceMessage {
    let labeled = |currency: Currency| {
        if filter.contains(currency) {
            observation.rate_float(currency)
        } else {
            None
        }
    };

    PriceMessage {
        timedate: observation.observed_at,
        price: observation.usd_price(),
        price_usd: labeled(Currency::Usd),
        price_eur: labeled(Currency::Eur),
        price_gbp: labeled(Currency::Gbp),
    }
}

//! Storage form of an observation
//!
//! Keyed by whole epoch seconds. Converting to this form drops sub-second
//! precision and the source's display timestamps; reading back restores
//! everything else.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Currency, CurrencyRate, PriceObservation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedObservation {
    pub created_at: i64,
    pub price: PersistedPrice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedPrice {
    pub disclaimer: String,
    #[serde(rename = "chartName")]
    pub chart_name: String,
    pub bpi: PersistedBpi,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedBpi {
    #[serde(rename = "USD", skip_serializing_if = "Option::is_none", default)]
    pub usd: Option<CurrencyRate>,
    #[serde(rename = "GBP", skip_serializing_if = "Option::is_none", default)]
    pub gbp: Option<CurrencyRate>,
    #[serde(rename = "EUR", skip_serializing_if = "Option::is_none", default)]
    pub eur: Option<CurrencyRate>,
}

impl PersistedObservation {
    pub fn observed_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.created_at, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl From<&PriceObservation> for PersistedObservation {
    fn from(obs: &PriceObservation) -> Self {
        Self {
            created_at: obs.timestamp(),
            price: PersistedPrice {
                disclaimer: obs.disclaimer.clone(),
                chart_name: obs.chart_name.clone(),
                bpi: PersistedBpi {
                    usd: obs.rate(Currency::Usd).cloned(),
                    gbp: obs.rate(Currency::Gbp).cloned(),
                    eur: obs.rate(Currency::Eur).cloned(),
                },
            },
        }
    }
}

impl From<PersistedObservation> for PriceObservation {
    fn from(persisted: PersistedObservation) -> Self {
        let observed_at = persisted.observed_at();
        let PersistedBpi { usd, gbp, eur } = persisted.price.bpi;

        let rates = [(Currency::Usd, usd), (Currency::Gbp, gbp), (Currency::Eur, eur)]
            .into_iter()
            .filter_map(|(currency, rate)| rate.map(|r| (currency, r)))
            .collect();

        Self {
            observed_at,
            updated: String::new(),
            updated_uk: String::new(),
            disclaimer: persisted.price.disclaimer,
            chart_name: persisted.price.chart_name,
            rates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_is_lossy_on_time_and_labels() {
        let observed_at = Utc.timestamp_opt(1_706_015_736, 250_000_000).unwrap();
        let mut obs = PriceObservation::new(
            observed_at,
            "disclaimer",
            "Bitcoin",
            [(Currency::Usd, 41_000.5), (Currency::Eur, 37_000.0)],
        );
        obs.updated = "Jan 23, 2024 13:15:36 UTC".to_string();

        let persisted = PersistedObservation::from(&obs);
        assert_eq!(persisted.created_at, 1_706_015_736);
        assert!(persisted.price.bpi.gbp.is_none());

        let restored = PriceObservation::from(persisted);
        assert_eq!(restored.observed_at, Utc.timestamp_opt(1_706_015_736, 0).unwrap());
        assert!(restored.updated.is_empty());
        assert_eq!(restored.rates, obs.rates);
        assert_eq!(restored.chart_name, "Bitcoin");
    }

    #[test]
    fn test_json_field_names() {
        let obs = PriceObservation::new(Utc.timestamp_opt(10, 0).unwrap(), "d", "c", [(Currency::Usd, 1.0)]);
        let json = serde_json::to_value(PersistedObservation::from(&obs)).unwrap();

        assert_eq!(json["created_at"], 10);
        assert_eq!(json["price"]["chartName"], "c");
        assert_eq!(json["price"]["bpi"]["USD"]["rate_float"], 1.0);
        assert!(json["price"]["bpi"].get("GBP").is_none());
    }
}

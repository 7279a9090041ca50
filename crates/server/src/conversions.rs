//! Projected messages to proto types

use pricecast_core::PriceMessage;

use crate::proto::PricesResponse;

/// Fixed six-decimal rendering used for every price field on the wire
pub fn format_price(value: f64) -> String {
    format!("{value:.6}")
}

impl From<&PriceMessage> for PricesResponse {
    fn from(message: &PriceMessage) -> Self {
        Self {
            time_date: message.timedate.timestamp(),
            price: format_price(message.price),
            price_usd: message.price_usd.map(format_price),
            price_eur: message.price_eur.map(format_price),
            price_gbp: message.price_gbp.map(format_price),
        }
    }
}

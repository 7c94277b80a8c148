//! Shipping rate computation.
//!
//! Pure and deterministic: cart contents plus a delivery method map to a
//! price in minor currency units and a resolved carrier service name. The
//! storefront calls this speculatively, so nothing here touches a store or
//! a network.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tidepool_core::{CurrencyCode, DeliveryMethod, LineItem};

/// Quote computation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuoteError {
    /// A product has no weight data. Never silently quoted as free.
    #[error("no weight data for product: {product_id}")]
    UnresolvableItem { product_id: String },

    /// Delivery method string was not recognized.
    #[error("invalid delivery method: {0}")]
    InvalidDeliveryMethod(String),

    /// Total weight exceeds the heaviest rate tier.
    #[error("shipment weight {weight_grams}g exceeds the heaviest rate tier")]
    Overweight { weight_grams: u32 },
}

/// One cart line as submitted for quoting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteItem {
    pub product_id: String,
    /// Catalog category, used as weight fallback when the product itself
    /// has no entry.
    #[serde(default)]
    pub category: Option<String>,
    pub quantity: u32,
}

/// A computed shipping quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingQuote {
    /// Price in minor currency units.
    pub amount_minor: i64,
    pub currency: CurrencyCode,
    /// Resolved carrier service, e.g. `"Northline Pickup"`.
    pub carrier_service: String,
    pub total_weight_grams: u32,
}

/// Per-product and per-category package weights in grams.
#[derive(Debug, Clone, Default)]
pub struct WeightTable {
    by_product: HashMap<String, u32>,
    by_category: HashMap<String, u32>,
}

impl WeightTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_product(mut self, product_id: impl Into<String>, grams: u32) -> Self {
        self.by_product.insert(product_id.into(), grams);
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>, grams: u32) -> Self {
        self.by_category.insert(category.into(), grams);
        self
    }

    /// Unit weight for an item: product entry first, then its category.
    #[must_use]
    pub fn unit_weight(&self, product_id: &str, category: Option<&str>) -> Option<u32> {
        self.by_product
            .get(product_id)
            .or_else(|| category.and_then(|c| self.by_category.get(c)))
            .copied()
    }
}

/// One weight-threshold rate tier.
#[derive(Debug, Clone)]
pub struct RateTier {
    /// Inclusive upper bound for this tier.
    pub max_weight_grams: u32,
    pub pickup_point_minor: i64,
    pub home_delivery_minor: i64,
}

/// The carrier's rate card: weights plus tiers for one currency.
#[derive(Debug, Clone)]
pub struct RateCard {
    carrier: String,
    currency: CurrencyCode,
    weights: WeightTable,
    tiers: Vec<RateTier>,
}

impl RateCard {
    /// Build a rate card. Tiers are sorted by weight bound; selection
    /// takes the first tier whose bound covers the shipment.
    #[must_use]
    pub fn new(
        carrier: impl Into<String>,
        currency: CurrencyCode,
        weights: WeightTable,
        mut tiers: Vec<RateTier>,
    ) -> Self {
        tiers.sort_by_key(|t| t.max_weight_grams);
        Self {
            carrier: carrier.into(),
            currency,
            weights,
            tiers,
        }
    }

    /// Total shipment weight for a set of quote items.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError::UnresolvableItem`] for the first item with no
    /// weight entry.
    pub fn total_weight(&self, items: &[QuoteItem]) -> Result<u32, QuoteError> {
        let mut total: u32 = 0;
        for item in items {
            let unit = self
                .weights
                .unit_weight(&item.product_id, item.category.as_deref())
                .ok_or_else(|| QuoteError::UnresolvableItem {
                    product_id: item.product_id.clone(),
                })?;
            total = total.saturating_add(unit.saturating_mul(item.quantity));
        }
        Ok(total)
    }

    /// Shipment weight for an order's line items, substituting
    /// `default_grams` per unit where no weight entry exists.
    ///
    /// Used when registering a shipment for an already-paid order: a
    /// missing weight entry must not block fulfillment the way it blocks
    /// a speculative quote.
    #[must_use]
    pub fn order_weight_or_default(&self, items: &[LineItem], default_grams: u32) -> u32 {
        items.iter().fold(0u32, |total, item| {
            let unit = self
                .weights
                .unit_weight(&item.product_id, None)
                .unwrap_or(default_grams);
            total.saturating_add(unit.saturating_mul(item.quantity))
        })
    }

    /// Compute a shipping quote.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError::UnresolvableItem`] for missing weight data
    /// and [`QuoteError::Overweight`] when no tier covers the total.
    pub fn quote(
        &self,
        items: &[QuoteItem],
        method: DeliveryMethod,
    ) -> Result<ShippingQuote, QuoteError> {
        let total_weight_grams = self.total_weight(items)?;

        let tier = self
            .tiers
            .iter()
            .find(|t| total_weight_grams <= t.max_weight_grams)
            .ok_or(QuoteError::Overweight {
                weight_grams: total_weight_grams,
            })?;

        let (amount_minor, service) = match method {
            DeliveryMethod::PickupPoint => (tier.pickup_point_minor, "Pickup"),
            DeliveryMethod::HomeDelivery => (tier.home_delivery_minor, "Home"),
        };

        Ok(ShippingQuote {
            amount_minor,
            currency: self.currency,
            carrier_service: format!("{} {service}", self.carrier),
            total_weight_grams,
        })
    }
}

/// Parse a delivery method string at the boundary.
///
/// # Errors
///
/// Returns [`QuoteError::InvalidDeliveryMethod`] for anything
/// unrecognized.
pub fn parse_delivery_method(raw: &str) -> Result<DeliveryMethod, QuoteError> {
    raw.parse()
        .map_err(|_| QuoteError::InvalidDeliveryMethod(raw.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn card() -> RateCard {
        RateCard::new(
            "Northline",
            CurrencyCode::Sek,
            WeightTable::new()
                .with_product("tshirt-1", 180)
                .with_category("caps", 90),
            vec![
                RateTier {
                    max_weight_grams: 1000,
                    pickup_point_minor: 495,
                    home_delivery_minor: 795,
                },
                RateTier {
                    max_weight_grams: 5000,
                    pickup_point_minor: 895,
                    home_delivery_minor: 1295,
                },
            ],
        )
    }

    fn item(product_id: &str, category: Option<&str>, quantity: u32) -> QuoteItem {
        QuoteItem {
            product_id: product_id.to_owned(),
            category: category.map(str::to_owned),
            quantity,
        }
    }

    #[test]
    fn test_quote_pickup_tier_one() {
        let quote = card()
            .quote(&[item("tshirt-1", None, 2)], DeliveryMethod::PickupPoint)
            .unwrap();
        assert_eq!(quote.amount_minor, 495);
        assert_eq!(quote.total_weight_grams, 360);
        assert_eq!(quote.carrier_service, "Northline Pickup");
    }

    #[test]
    fn test_quote_home_delivery_crosses_tier() {
        // 6 shirts = 1080g, past the 1000g bound.
        let quote = card()
            .quote(&[item("tshirt-1", None, 6)], DeliveryMethod::HomeDelivery)
            .unwrap();
        assert_eq!(quote.amount_minor, 1295);
        assert_eq!(quote.carrier_service, "Northline Home");
    }

    #[test]
    fn test_quote_category_fallback() {
        let quote = card()
            .quote(&[item("cap-7", Some("caps"), 1)], DeliveryMethod::PickupPoint)
            .unwrap();
        assert_eq!(quote.total_weight_grams, 90);
    }

    #[test]
    fn test_quote_unresolvable_item_never_free() {
        let result = card().quote(&[item("mystery", None, 1)], DeliveryMethod::PickupPoint);
        assert_eq!(
            result,
            Err(QuoteError::UnresolvableItem {
                product_id: "mystery".to_owned()
            })
        );
    }

    #[test]
    fn test_quote_overweight() {
        let result = card().quote(&[item("tshirt-1", None, 40)], DeliveryMethod::PickupPoint);
        assert!(matches!(result, Err(QuoteError::Overweight { .. })));
    }

    #[test]
    fn test_quote_deterministic() {
        let items = vec![item("tshirt-1", None, 3), item("cap-7", Some("caps"), 2)];
        let first = card().quote(&items, DeliveryMethod::HomeDelivery).unwrap();
        let second = card().quote(&items, DeliveryMethod::HomeDelivery).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_delivery_method() {
        assert_eq!(
            parse_delivery_method("pickup").unwrap(),
            DeliveryMethod::PickupPoint
        );
        assert_eq!(
            parse_delivery_method("carrier-pigeon"),
            Err(QuoteError::InvalidDeliveryMethod("carrier-pigeon".to_owned()))
        );
    }

    #[test]
    fn test_order_weight_default_substitution() {
        use tidepool_core::{CurrencyCode, Price};

        let items = vec![tidepool_core::LineItem {
            product_id: "mystery".to_owned(),
            name: "Mystery".to_owned(),
            quantity: 2,
            unit_price: Price::from_minor_units(100, CurrencyCode::Sek),
            size: None,
        }];
        assert_eq!(card().order_weight_or_default(&items, 250), 500);
    }
}

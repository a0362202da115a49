use crate::domain::money::round2;
use crate::domain::order::{OrderKind, OrderRequest};
use crate::domain::ports::TariffStoreRef;
use crate::error::{ResellError, Result};
use rust_decimal::Decimal;

/// Pure price resolution: inbound override rule if present, global tariff
/// otherwise.
#[derive(Clone)]
pub struct PricingEngine {
    store: TariffStoreRef,
}

impl PricingEngine {
    pub fn new(store: TariffStoreRef) -> Self {
        Self { store }
    }

    /// Gross price of one client on one inbound:
    /// `round2(gb * price_per_gb + days * price_per_day)`.
    pub async fn price(&self, inbound_id: i64, days: u32, gb: u32) -> Result<Decimal> {
        let global = self.store.global().await?;
        let rule = self.store.rule(inbound_id).await?;
        if let Some(rule) = &rule
            && !rule.enabled
        {
            return Err(ResellError::InboundDisabled(inbound_id));
        }
        let ppgb = rule
            .as_ref()
            .and_then(|r| r.price_per_gb)
            .unwrap_or(global.price_per_gb);
        let ppday = rule
            .as_ref()
            .and_then(|r| r.price_per_day)
            .unwrap_or(global.price_per_day);
        Ok(round2(Decimal::from(gb) * ppgb + Decimal::from(days) * ppday))
    }

    /// Total gross for an order request: multi sums per-inbound prices at
    /// the same days/gb, bulk multiplies the unit price by the count.
    pub async fn order_gross(&self, request: &OrderRequest) -> Result<Decimal> {
        match request.kind {
            OrderKind::Multi => {
                let mut total = Decimal::ZERO;
                for &inbound_id in &request.inbound_ids {
                    total += self.price(inbound_id, request.days, request.gb).await?;
                }
                Ok(round2(total))
            }
            OrderKind::Single | OrderKind::Bulk => {
                let unit = self
                    .price(request.inbound_ids[0], request.days, request.gb)
                    .await?;
                Ok(round2(unit * Decimal::from(request.unit_count())))
            }
        }
    }
}

/// Net price after a percentage discount, rounded half-up to 2 places.
pub fn apply_discount(gross: Decimal, discount_percent: Decimal) -> Decimal {
    round2(gross * (Decimal::ONE - discount_percent / Decimal::ONE_HUNDRED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::TariffStore;
    use crate::domain::tariff::InboundRule;
    use crate::infrastructure::in_memory::InMemoryStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn engine() -> (InMemoryStore, PricingEngine) {
        let store = InMemoryStore::new();
        let engine = PricingEngine::new(Arc::new(store.clone()));
        (store, engine)
    }

    #[test]
    fn test_apply_discount() {
        assert_eq!(apply_discount(dec!(20), dec!(25)), dec!(15.00));
        assert_eq!(apply_discount(dec!(10.50), dec!(0)), dec!(10.50));
        assert_eq!(apply_discount(dec!(9.99), dec!(10)), dec!(8.99));
    }

    #[tokio::test]
    async fn test_price_from_global_tariff() {
        let (_store, engine) = engine();
        // 50 * 0.15 + 30 * 0.10
        assert_eq!(engine.price(1, 30, 50).await.unwrap(), dec!(10.50));
    }

    #[tokio::test]
    async fn test_rule_overrides_fall_back_per_field() {
        let (store, engine) = engine();
        store
            .set_rule(InboundRule {
                inbound_id: 1,
                enabled: true,
                price_per_gb: Some(dec!(0.30)),
                price_per_day: None,
            })
            .await
            .unwrap();
        // 50 * 0.30 + 30 * 0.10
        assert_eq!(engine.price(1, 30, 50).await.unwrap(), dec!(18.00));
        // Other inbounds keep the global tariff.
        assert_eq!(engine.price(2, 30, 50).await.unwrap(), dec!(10.50));
    }

    #[tokio::test]
    async fn test_disabled_rule_blocks_pricing() {
        let (store, engine) = engine();
        store
            .set_rule(InboundRule {
                inbound_id: 1,
                enabled: false,
                price_per_gb: None,
                price_per_day: None,
            })
            .await
            .unwrap();
        assert!(matches!(
            engine.price(1, 30, 50).await.unwrap_err(),
            ResellError::InboundDisabled(1)
        ));
    }
}

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Global per-GB / per-day prices used when an inbound has no override rule.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
pub struct GlobalTariff {
    pub price_per_gb: Decimal,
    pub price_per_day: Decimal,
}

impl Default for GlobalTariff {
    fn default() -> Self {
        Self {
            price_per_gb: dec!(0.15),
            price_per_day: dec!(0.10),
        }
    }
}

/// Admin override for one inbound. A `None` price falls back to the global
/// tariff; `enabled = false` blocks orders on that inbound entirely.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct InboundRule {
    pub inbound_id: i64,
    pub enabled: bool,
    pub price_per_gb: Option<Decimal>,
    pub price_per_day: Option<Decimal>,
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A discount code. Codes are stored uppercased; `used_count` only moves
/// through atomic redemption, `active` only through admin deactivation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PromoCode {
    pub code: String,
    pub discount_percent: Decimal,
    /// `None` means unlimited uses.
    pub max_uses: Option<u32>,
    pub used_count: u32,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    pub fn new(
        code: &str,
        discount_percent: Decimal,
        max_uses: Option<u32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            code: normalize_code(code),
            discount_percent,
            max_uses,
            used_count: 0,
            active: true,
            expires_at,
            created_at: Utc::now(),
        }
    }

    pub fn exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.used_count >= max)
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// One redemption of a code by one agent, unique on `(code, agent_id)`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PromoRedemption {
    pub code: String,
    pub agent_id: i64,
    pub redeemed_at: DateTime<Utc>,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_code_normalization() {
        assert_eq!(normalize_code("  sale10 "), "SALE10");
    }

    #[test]
    fn test_exhaustion() {
        let mut promo = PromoCode::new("X", dec!(10), Some(2), None);
        assert!(!promo.exhausted());
        promo.used_count = 2;
        assert!(promo.exhausted());

        let unlimited = PromoCode::new("Y", dec!(10), None, None);
        assert!(!unlimited.exhausted());
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let promo = PromoCode::new("X", dec!(10), None, Some(now - Duration::hours(1)));
        assert!(promo.expired(now));
        let live = PromoCode::new("Y", dec!(10), None, Some(now + Duration::hours(1)));
        assert!(!live.expired(now));
    }
}

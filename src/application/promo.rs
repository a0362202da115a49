use crate::domain::promo::{PromoCode, normalize_code};
use crate::domain::ports::PromoStoreRef;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Validates and atomically redeems discount codes. Independent of money
/// movement: a redeemed discount is applied by the saga, never refunded.
#[derive(Clone)]
pub struct PromoEngine {
    store: PromoStoreRef,
}

impl PromoEngine {
    pub fn new(store: PromoStoreRef) -> Self {
        Self { store }
    }

    /// Redeems `code` for `agent_id` and returns the discount percent.
    ///
    /// The exhaustion check, the `(code, agent)` uniqueness check, the
    /// redemption insert, and the counter increment are one atomic store
    /// operation, so concurrent redeemers cannot over-issue a limited code.
    pub async fn redeem(&self, code: &str, agent_id: i64) -> Result<Decimal> {
        let code = normalize_code(code);
        let discount = self.store.redeem(&code, agent_id, Utc::now()).await?;
        tracing::info!(agent_id, code, discount = %discount, "promo_redeemed");
        Ok(discount)
    }

    pub async fn create(
        &self,
        code: &str,
        discount_percent: Decimal,
        max_uses: Option<u32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.store
            .create(PromoCode::new(code, discount_percent, max_uses, expires_at))
            .await
    }

    pub async fn deactivate(&self, code: &str) -> Result<()> {
        self.store.set_active(&normalize_code(code), false).await
    }

    pub async fn list(&self) -> Result<Vec<PromoCode>> {
        self.store.list().await
    }
}

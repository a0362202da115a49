use super::money::Balance;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Reseller,
}

/// A reseller account: identity, wallet balance, and preferences.
///
/// Agents are created on first contact and never deleted; balance mutations
/// go through the wallet ledger only.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Agent {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub active: bool,
    pub balance: Balance,
    /// Sum of all credits whose reason starts with `topup`.
    pub lifetime_topup: Decimal,
    pub preferred_inbound: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: i64, username: &str, full_name: &str, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.to_string(),
            full_name: full_name.to_string(),
            role,
            active: true,
            balance: Balance::ZERO,
            lifetime_topup: Decimal::ZERO,
            preferred_inbound: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One immutable row of the wallet ledger. The sum of `amount` over an
/// agent's rows must always equal that agent's balance.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LedgerEntry {
    pub agent_id: i64,
    /// Signed movement: positive for credits, negative for debits.
    pub amount: Decimal,
    pub reason: String,
    pub meta: String,
    pub created_at: DateTime<Utc>,
}

/// Ledger reasons used by the order saga and wallet admin paths.
pub mod reasons {
    pub const ORDER_CHARGE: &str = "order.charge";
    pub const ORDER_REFUND: &str = "order.refund";
    pub const TOPUP_MANUAL: &str = "topup.manual";
    pub const TOPUP_ADMIN: &str = "topup.admin";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_agent_defaults() {
        let agent = Agent::new(42, "alice", "Alice", Role::Reseller);
        assert!(agent.active);
        assert_eq!(agent.balance, Balance::ZERO);
        assert_eq!(agent.lifetime_topup, Decimal::ZERO);
        assert!(agent.preferred_inbound.is_none());
    }
}

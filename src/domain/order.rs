use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// One client on one inbound.
    Single,
    /// `count` clients on one inbound, remarks suffixed `_1..=_count`.
    Bulk,
    /// One client per inbound, sharing a remark and subscription id.
    Multi,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Success,
    Failed,
}

/// A durable order record. `status` transitions once from `Pending` to a
/// terminal state; terminal orders are never mutated.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub id: u64,
    pub agent_id: i64,
    pub inbound_id: i64,
    pub kind: OrderKind,
    pub days: u32,
    pub gb: u32,
    pub count: u32,
    pub gross: Decimal,
    pub discount_percent: Decimal,
    pub net: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Fully validated output of the order wizard. Transient: handed to the
/// saga and never persisted as-is.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct OrderRequest {
    pub kind: OrderKind,
    /// One id for single/bulk, the distinct selection for multi.
    pub inbound_ids: Vec<i64>,
    /// Client remark for single/multi, base remark for bulk.
    pub remark: String,
    pub count: u32,
    pub days: u32,
    pub gb: u32,
    pub start_after_first_use: bool,
    pub auto_renew: bool,
}

impl OrderRequest {
    /// Number of clients this request will provision.
    pub fn unit_count(&self) -> u32 {
        match self.kind {
            OrderKind::Single => 1,
            OrderKind::Bulk => self.count,
            OrderKind::Multi => self.inbound_ids.len() as u32,
        }
    }
}

/// A credential created on the external panel, owned by the paying agent.
/// Immutable after creation except for the `auto_renew` toggle.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ProvisionedClient {
    pub id: u64,
    pub agent_id: i64,
    pub inbound_id: i64,
    pub external_id: Uuid,
    pub remark: String,
    pub access_link: String,
    pub sub_id: String,
    pub sub_link: String,
    pub days: u32,
    pub gb: u32,
    pub start_after_first_use: bool,
    pub auto_renew: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: OrderKind) -> OrderRequest {
        OrderRequest {
            kind,
            inbound_ids: vec![1, 2, 3],
            remark: "teamA".to_string(),
            count: 5,
            days: 30,
            gb: 50,
            start_after_first_use: false,
            auto_renew: false,
        }
    }

    #[test]
    fn test_unit_count_per_kind() {
        assert_eq!(request(OrderKind::Single).unit_count(), 1);
        assert_eq!(request(OrderKind::Bulk).unit_count(), 5);
        assert_eq!(request(OrderKind::Multi).unit_count(), 3);
    }
}

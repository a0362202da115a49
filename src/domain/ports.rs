use super::agent::{Agent, LedgerEntry};
use super::money::{Amount, Balance};
use super::order::{Order, ProvisionedClient};
use super::promo::PromoCode;
use super::tariff::{GlobalTariff, InboundRule};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Upserts identity fields on contact, preserving wallet state.
    async fn ensure(&self, agent: Agent) -> Result<Agent>;
    async fn get(&self, agent_id: i64) -> Result<Option<Agent>>;
    async fn set_active(&self, agent_id: i64, active: bool) -> Result<()>;
    async fn set_preferred_inbound(&self, agent_id: i64, inbound_id: i64) -> Result<()>;
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Appends a positive ledger row and updates the balance as one atomic
    /// unit. Credits with a `topup*` reason also grow `lifetime_topup`.
    async fn credit(&self, agent_id: i64, amount: Amount, reason: &str, meta: &str)
    -> Result<Balance>;

    /// Checks the balance and, inside the same critical section, appends a
    /// negative ledger row and updates the balance. Fails with
    /// `InsufficientBalance` leaving no trace.
    async fn debit(&self, agent_id: i64, amount: Amount, reason: &str, meta: &str)
    -> Result<Balance>;

    async fn balance_of(&self, agent_id: i64) -> Result<Balance>;

    /// Most recent entries first.
    async fn entries(&self, agent_id: i64, limit: usize) -> Result<Vec<LedgerEntry>>;
}

#[async_trait]
pub trait PromoStore: Send + Sync {
    async fn create(&self, promo: PromoCode) -> Result<()>;
    async fn get(&self, code: &str) -> Result<Option<PromoCode>>;
    async fn set_active(&self, code: &str, active: bool) -> Result<()>;
    async fn list(&self) -> Result<Vec<PromoCode>>;

    /// Validates the code and, in one atomic step, inserts the redemption
    /// row and increments `used_count`. Returns the discount percent.
    async fn redeem(&self, code: &str, agent_id: i64, now: DateTime<Utc>) -> Result<Decimal>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists the order, assigning its id.
    async fn create(&self, order: Order) -> Result<Order>;
    async fn get(&self, order_id: u64) -> Result<Option<Order>>;
    async fn list_for_agent(&self, agent_id: i64, limit: usize) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Persists the provisioned client, assigning its id.
    async fn create(&self, client: ProvisionedClient) -> Result<ProvisionedClient>;
    async fn get(&self, agent_id: i64, client_id: u64) -> Result<Option<ProvisionedClient>>;
    async fn list_for_agent(&self, agent_id: i64, limit: usize) -> Result<Vec<ProvisionedClient>>;
    async fn set_auto_renew(&self, agent_id: i64, client_id: u64, enabled: bool) -> Result<()>;
}

#[async_trait]
pub trait TariffStore: Send + Sync {
    async fn global(&self) -> Result<GlobalTariff>;
    async fn set_global(&self, tariff: GlobalTariff) -> Result<()>;
    async fn rule(&self, inbound_id: i64) -> Result<Option<InboundRule>>;
    async fn set_rule(&self, rule: InboundRule) -> Result<()>;
}

/// Reality transport parameters needed for link construction.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct RealityParams {
    pub public_key: String,
    pub fingerprint: String,
    pub server_names: Vec<String>,
    pub short_ids: Vec<String>,
}

/// Connection parameters of one inbound, as reported by the panel.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct InboundInfo {
    pub port: u16,
    pub network: String,
    pub security: String,
    pub reality: Option<RealityParams>,
    pub remark: String,
}

/// One client entry in the panel's `addClient` payload. Field names follow
/// the 3x-ui wire format.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ClientSpec {
    pub id: Uuid,
    pub email: String,
    pub enable: bool,
    /// Epoch milliseconds, or a negative value meaning "this many
    /// milliseconds of validity, starting at first use".
    pub expiry_time: i64,
    #[serde(rename = "totalGB")]
    pub total_gb: u64,
    pub flow: String,
    pub limit_ip: u32,
    pub tg_id: String,
    pub sub_id: String,
    pub comment: String,
    pub reset: u32,
}

/// The external VPN panel. No transactional guarantees: every call either
/// fully succeeds or must be treated as failed.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn login(&self) -> Result<()>;
    async fn list_inbounds(&self) -> Result<Vec<(i64, InboundInfo)>>;
    async fn get_inbound(&self, inbound_id: i64) -> Result<InboundInfo>;
    async fn add_clients(&self, inbound_id: i64, clients: &[ClientSpec]) -> Result<()>;
    async fn create_inbound(
        &self,
        port: u16,
        remark: &str,
        protocol: &str,
        network: &str,
    ) -> Result<i64>;
}

pub type AgentStoreRef = Arc<dyn AgentStore>;
pub type WalletStoreRef = Arc<dyn WalletStore>;
pub type PromoStoreRef = Arc<dyn PromoStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type ClientStoreRef = Arc<dyn ClientStore>;
pub type TariffStoreRef = Arc<dyn TariffStore>;
pub type ProvisionerRef = Arc<dyn Provisioner>;

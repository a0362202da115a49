use crate::domain::agent::{Agent, LedgerEntry};
use crate::domain::money::{Amount, Balance};
use crate::domain::order::{Order, ProvisionedClient};
use crate::domain::promo::{PromoCode, PromoRedemption};
use crate::domain::ports::{
    AgentStore, ClientStore, OrderStore, PromoStore, TariffStore, WalletStore,
};
use crate::domain::tariff::{GlobalTariff, InboundRule};
use crate::error::{ResellError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    agents: HashMap<i64, Agent>,
    ledger: Vec<LedgerEntry>,
    promos: HashMap<String, PromoCode>,
    redemptions: HashMap<(String, i64), PromoRedemption>,
    orders: Vec<Order>,
    next_order_id: u64,
    clients: Vec<ProvisionedClient>,
    next_client_id: u64,
    tariff: Option<GlobalTariff>,
    rules: HashMap<i64, InboundRule>,
}

/// A thread-safe in-memory datastore implementing every store port.
///
/// One `RwLock` guards all tables, so each port method is a single
/// critical section; the wallet's check-then-debit and the promo's
/// check-then-redeem are therefore atomic under concurrent access.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStore for InMemoryStore {
    async fn ensure(&self, agent: Agent) -> Result<Agent> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .agents
            .entry(agent.id)
            .and_modify(|existing| {
                existing.username = agent.username.clone();
                existing.full_name = agent.full_name.clone();
                existing.updated_at = Utc::now();
            })
            .or_insert(agent);
        Ok(entry.clone())
    }

    async fn get(&self, agent_id: i64) -> Result<Option<Agent>> {
        let inner = self.inner.read().await;
        Ok(inner.agents.get(&agent_id).cloned())
    }

    async fn set_active(&self, agent_id: i64, active: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(&agent_id)
            .ok_or(ResellError::AgentNotFound(agent_id))?;
        agent.active = active;
        agent.updated_at = Utc::now();
        Ok(())
    }

    async fn set_preferred_inbound(&self, agent_id: i64, inbound_id: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(&agent_id)
            .ok_or(ResellError::AgentNotFound(agent_id))?;
        agent.preferred_inbound = Some(inbound_id);
        agent.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl WalletStore for InMemoryStore {
    async fn credit(
        &self,
        agent_id: i64,
        amount: Amount,
        reason: &str,
        meta: &str,
    ) -> Result<Balance> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(&agent_id)
            .ok_or(ResellError::AgentNotFound(agent_id))?;
        agent.balance += amount.into();
        if reason.starts_with("topup") {
            agent.lifetime_topup += amount.value();
        }
        agent.updated_at = Utc::now();
        let balance = agent.balance;
        inner.ledger.push(LedgerEntry {
            agent_id,
            amount: amount.value(),
            reason: reason.to_string(),
            meta: meta.to_string(),
            created_at: Utc::now(),
        });
        Ok(balance)
    }

    async fn debit(
        &self,
        agent_id: i64,
        amount: Amount,
        reason: &str,
        meta: &str,
    ) -> Result<Balance> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(&agent_id)
            .ok_or(ResellError::AgentNotFound(agent_id))?;
        if agent.balance < amount.into() {
            return Err(ResellError::InsufficientBalance {
                required: amount.value(),
                available: agent.balance.0,
            });
        }
        agent.balance -= amount.into();
        agent.updated_at = Utc::now();
        let balance = agent.balance;
        inner.ledger.push(LedgerEntry {
            agent_id,
            amount: -amount.value(),
            reason: reason.to_string(),
            meta: meta.to_string(),
            created_at: Utc::now(),
        });
        Ok(balance)
    }

    async fn balance_of(&self, agent_id: i64) -> Result<Balance> {
        let inner = self.inner.read().await;
        Ok(inner
            .agents
            .get(&agent_id)
            .map(|a| a.balance)
            .unwrap_or(Balance::ZERO))
    }

    async fn entries(&self, agent_id: i64, limit: usize) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ledger
            .iter()
            .rev()
            .filter(|e| e.agent_id == agent_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PromoStore for InMemoryStore {
    async fn create(&self, promo: PromoCode) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.promos.contains_key(&promo.code) {
            return Err(ResellError::Validation(format!(
                "Promo code {} already exists",
                promo.code
            )));
        }
        inner.promos.insert(promo.code.clone(), promo);
        Ok(())
    }

    async fn get(&self, code: &str) -> Result<Option<PromoCode>> {
        let inner = self.inner.read().await;
        Ok(inner.promos.get(code).cloned())
    }

    async fn set_active(&self, code: &str, active: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let promo = inner.promos.get_mut(code).ok_or(ResellError::PromoNotFound)?;
        promo.active = active;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PromoCode>> {
        let inner = self.inner.read().await;
        let mut promos: Vec<_> = inner.promos.values().cloned().collect();
        promos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(promos)
    }

    async fn redeem(&self, code: &str, agent_id: i64, now: DateTime<Utc>) -> Result<Decimal> {
        let mut inner = self.inner.write().await;
        let promo = match inner.promos.get(code) {
            Some(p) if p.active && !p.expired(now) => p.clone(),
            _ => return Err(ResellError::PromoNotFound),
        };
        if promo.exhausted() {
            return Err(ResellError::PromoExhausted);
        }
        let key = (code.to_string(), agent_id);
        if inner.redemptions.contains_key(&key) {
            return Err(ResellError::PromoAlreadyUsed);
        }
        inner.redemptions.insert(
            key,
            PromoRedemption {
                code: code.to_string(),
                agent_id,
                redeemed_at: now,
            },
        );
        if let Some(p) = inner.promos.get_mut(code) {
            p.used_count += 1;
        }
        Ok(promo.discount_percent)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create(&self, mut order: Order) -> Result<Order> {
        let mut inner = self.inner.write().await;
        inner.next_order_id += 1;
        order.id = inner.next_order_id;
        inner.orders.push(order.clone());
        Ok(order)
    }

    async fn get(&self, order_id: u64) -> Result<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner.orders.iter().find(|o| o.id == order_id).cloned())
    }

    async fn list_for_agent(&self, agent_id: i64, limit: usize) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .iter()
            .rev()
            .filter(|o| o.agent_id == agent_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ClientStore for InMemoryStore {
    async fn create(&self, mut client: ProvisionedClient) -> Result<ProvisionedClient> {
        let mut inner = self.inner.write().await;
        inner.next_client_id += 1;
        client.id = inner.next_client_id;
        inner.clients.push(client.clone());
        Ok(client)
    }

    async fn get(&self, agent_id: i64, client_id: u64) -> Result<Option<ProvisionedClient>> {
        let inner = self.inner.read().await;
        Ok(inner
            .clients
            .iter()
            .find(|c| c.id == client_id && c.agent_id == agent_id)
            .cloned())
    }

    async fn list_for_agent(&self, agent_id: i64, limit: usize) -> Result<Vec<ProvisionedClient>> {
        let inner = self.inner.read().await;
        Ok(inner
            .clients
            .iter()
            .rev()
            .filter(|c| c.agent_id == agent_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn set_auto_renew(&self, agent_id: i64, client_id: u64, enabled: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let client = inner
            .clients
            .iter_mut()
            .find(|c| c.id == client_id && c.agent_id == agent_id)
            .ok_or_else(|| ResellError::Validation(format!("Client {client_id} not found")))?;
        client.auto_renew = enabled;
        Ok(())
    }
}

#[async_trait]
impl TariffStore for InMemoryStore {
    async fn global(&self) -> Result<GlobalTariff> {
        let inner = self.inner.read().await;
        Ok(inner.tariff.unwrap_or_default())
    }

    async fn set_global(&self, tariff: GlobalTariff) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.tariff = Some(tariff);
        Ok(())
    }

    async fn rule(&self, inbound_id: i64) -> Result<Option<InboundRule>> {
        let inner = self.inner.read().await;
        Ok(inner.rules.get(&inbound_id).cloned())
    }

    async fn set_rule(&self, rule: InboundRule) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.rules.insert(rule.inbound_id, rule);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::Role;
    use rust_decimal_macros::dec;

    async fn store_with_agent(id: i64) -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .ensure(Agent::new(id, "alice", "Alice", Role::Reseller))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_ensure_preserves_wallet_state() {
        let store = store_with_agent(1).await;
        store
            .credit(1, dec!(10).try_into().unwrap(), "topup.manual", "")
            .await
            .unwrap();

        let again = store
            .ensure(Agent::new(1, "alice2", "Alice B", Role::Reseller))
            .await
            .unwrap();
        assert_eq!(again.username, "alice2");
        assert_eq!(again.balance, Balance::new(dec!(10)));
        assert_eq!(again.lifetime_topup, dec!(10));
    }

    #[tokio::test]
    async fn test_debit_without_funds_leaves_no_row() {
        let store = store_with_agent(1).await;
        let err = store
            .debit(1, dec!(5).try_into().unwrap(), "order.charge", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ResellError::InsufficientBalance { .. }));
        assert!(store.entries(1, 10).await.unwrap().is_empty());
        assert_eq!(store.balance_of(1).await.unwrap(), Balance::ZERO);
    }

    #[tokio::test]
    async fn test_lifetime_topup_only_counts_topups() {
        let store = store_with_agent(1).await;
        store
            .credit(1, dec!(10).try_into().unwrap(), "topup.admin", "")
            .await
            .unwrap();
        store
            .credit(1, dec!(3).try_into().unwrap(), "order.refund", "")
            .await
            .unwrap();
        let agent = AgentStore::get(&store, 1).await.unwrap().unwrap();
        assert_eq!(agent.balance, Balance::new(dec!(13)));
        assert_eq!(agent.lifetime_topup, dec!(10));
    }

    #[tokio::test]
    async fn test_order_ids_are_assigned() {
        let store = InMemoryStore::new();
        let order = Order {
            id: 0,
            agent_id: 1,
            inbound_id: 2,
            kind: crate::domain::order::OrderKind::Single,
            days: 30,
            gb: 50,
            count: 1,
            gross: dec!(10.5),
            discount_percent: dec!(0),
            net: dec!(10.5),
            status: crate::domain::order::OrderStatus::Success,
            created_at: Utc::now(),
        };
        let first = OrderStore::create(&store, order.clone()).await.unwrap();
        let second = OrderStore::create(&store, order).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(OrderStore::get(&store, 2).await.unwrap().unwrap().id, 2);
    }
}

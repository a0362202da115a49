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
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const CF_AGENTS: &str = "agents";
pub const CF_LEDGER: &str = "ledger";
pub const CF_PROMOS: &str = "promos";
pub const CF_REDEMPTIONS: &str = "redemptions";
pub const CF_ORDERS: &str = "orders";
pub const CF_CLIENTS: &str = "clients";
pub const CF_META: &str = "meta";

const KEY_TARIFF: &[u8] = b"tariff";
const KEY_ORDER_SEQ: &[u8] = b"order_seq";
const KEY_CLIENT_SEQ: &[u8] = b"client_seq";
const KEY_LEDGER_SEQ: &[u8] = b"ledger_seq";

/// A persistent store implementation over RocksDB column families.
///
/// Check-then-act sequences (wallet debit, promo redemption) run under a
/// process-wide mutex and commit through a single `WriteBatch`, so they are
/// atomic for this process and crash-consistent on disk. Cross-process
/// deployments need a datastore with real transactions instead.
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

fn internal<E: std::error::Error + Send + Sync + 'static>(e: E) -> ResellError {
    ResellError::Internal(Box::new(e))
}

impl RocksStore {
    /// Opens or creates the database, ensuring all column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [
            CF_AGENTS,
            CF_LEDGER,
            CF_PROMOS,
            CF_REDEMPTIONS,
            CF_ORDERS,
            CF_CLIENTS,
            CF_META,
        ]
        .iter()
        .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
        .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cfs).map_err(internal)?;
        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            ResellError::Internal(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf)?;
        match self.db.get_cf(cf, key).map_err(internal)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(internal)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf)?;
        let bytes = serde_json::to_vec(value).map_err(internal)?;
        self.db.put_cf(cf, key, bytes).map_err(internal)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(internal)?;
            values.push(serde_json::from_slice(&value).map_err(internal)?);
        }
        Ok(values)
    }

    fn next_seq(&self, key: &[u8]) -> Result<u64> {
        // Callers hold the write lock.
        let cf = self.cf(CF_META)?;
        let current = match self.db.get_cf(cf, key).map_err(internal)? {
            Some(bytes) => u64::from_be_bytes(bytes.as_slice().try_into().map_err(internal)?),
            None => 0,
        };
        let next = current + 1;
        self.db.put_cf(cf, key, next.to_be_bytes()).map_err(internal)?;
        Ok(next)
    }

    fn write_ledger_row(
        &self,
        batch: &mut WriteBatch,
        agent: &Agent,
        entry: &LedgerEntry,
    ) -> Result<()> {
        let seq = self.next_seq(KEY_LEDGER_SEQ)?;
        let mut key = entry.agent_id.to_be_bytes().to_vec();
        key.extend_from_slice(&seq.to_be_bytes());
        batch.put_cf(
            self.cf(CF_LEDGER)?,
            key,
            serde_json::to_vec(entry).map_err(internal)?,
        );
        batch.put_cf(
            self.cf(CF_AGENTS)?,
            agent.id.to_be_bytes(),
            serde_json::to_vec(agent).map_err(internal)?,
        );
        Ok(())
    }
}

#[async_trait]
impl AgentStore for RocksStore {
    async fn ensure(&self, agent: Agent) -> Result<Agent> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let merged = match self.get_json::<Agent>(CF_AGENTS, &agent.id.to_be_bytes())? {
            Some(mut existing) => {
                existing.username = agent.username;
                existing.full_name = agent.full_name;
                existing.updated_at = Utc::now();
                existing
            }
            None => agent,
        };
        self.put_json(CF_AGENTS, &merged.id.to_be_bytes(), &merged)?;
        Ok(merged)
    }

    async fn get(&self, agent_id: i64) -> Result<Option<Agent>> {
        self.get_json(CF_AGENTS, &agent_id.to_be_bytes())
    }

    async fn set_active(&self, agent_id: i64, active: bool) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut agent = self
            .get_json::<Agent>(CF_AGENTS, &agent_id.to_be_bytes())?
            .ok_or(ResellError::AgentNotFound(agent_id))?;
        agent.active = active;
        agent.updated_at = Utc::now();
        self.put_json(CF_AGENTS, &agent_id.to_be_bytes(), &agent)
    }

    async fn set_preferred_inbound(&self, agent_id: i64, inbound_id: i64) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut agent = self
            .get_json::<Agent>(CF_AGENTS, &agent_id.to_be_bytes())?
            .ok_or(ResellError::AgentNotFound(agent_id))?;
        agent.preferred_inbound = Some(inbound_id);
        agent.updated_at = Utc::now();
        self.put_json(CF_AGENTS, &agent_id.to_be_bytes(), &agent)
    }
}

#[async_trait]
impl WalletStore for RocksStore {
    async fn credit(
        &self,
        agent_id: i64,
        amount: Amount,
        reason: &str,
        meta: &str,
    ) -> Result<Balance> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut agent = self
            .get_json::<Agent>(CF_AGENTS, &agent_id.to_be_bytes())?
            .ok_or(ResellError::AgentNotFound(agent_id))?;
        agent.balance += amount.into();
        if reason.starts_with("topup") {
            agent.lifetime_topup += amount.value();
        }
        agent.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.write_ledger_row(
            &mut batch,
            &agent,
            &LedgerEntry {
                agent_id,
                amount: amount.value(),
                reason: reason.to_string(),
                meta: meta.to_string(),
                created_at: Utc::now(),
            },
        )?;
        self.db.write(batch).map_err(internal)?;
        Ok(agent.balance)
    }

    async fn debit(
        &self,
        agent_id: i64,
        amount: Amount,
        reason: &str,
        meta: &str,
    ) -> Result<Balance> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut agent = self
            .get_json::<Agent>(CF_AGENTS, &agent_id.to_be_bytes())?
            .ok_or(ResellError::AgentNotFound(agent_id))?;
        if agent.balance < amount.into() {
            return Err(ResellError::InsufficientBalance {
                required: amount.value(),
                available: agent.balance.0,
            });
        }
        agent.balance -= amount.into();
        agent.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.write_ledger_row(
            &mut batch,
            &agent,
            &LedgerEntry {
                agent_id,
                amount: -amount.value(),
                reason: reason.to_string(),
                meta: meta.to_string(),
                created_at: Utc::now(),
            },
        )?;
        self.db.write(batch).map_err(internal)?;
        Ok(agent.balance)
    }

    async fn balance_of(&self, agent_id: i64) -> Result<Balance> {
        Ok(self
            .get_json::<Agent>(CF_AGENTS, &agent_id.to_be_bytes())?
            .map(|a| a.balance)
            .unwrap_or(Balance::ZERO))
    }

    async fn entries(&self, agent_id: i64, limit: usize) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf(CF_LEDGER)?;
        let prefix = agent_id.to_be_bytes();
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (key, value) = item.map_err(internal)?;
            if key.starts_with(&prefix) {
                entries.push(serde_json::from_slice(&value).map_err(internal)?);
            }
        }
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}

#[async_trait]
impl PromoStore for RocksStore {
    async fn create(&self, promo: PromoCode) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self
            .get_json::<PromoCode>(CF_PROMOS, promo.code.as_bytes())?
            .is_some()
        {
            return Err(ResellError::Validation(format!(
                "Promo code {} already exists",
                promo.code
            )));
        }
        self.put_json(CF_PROMOS, promo.code.as_bytes(), &promo)
    }

    async fn get(&self, code: &str) -> Result<Option<PromoCode>> {
        self.get_json(CF_PROMOS, code.as_bytes())
    }

    async fn set_active(&self, code: &str, active: bool) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut promo = self
            .get_json::<PromoCode>(CF_PROMOS, code.as_bytes())?
            .ok_or(ResellError::PromoNotFound)?;
        promo.active = active;
        self.put_json(CF_PROMOS, code.as_bytes(), &promo)
    }

    async fn list(&self) -> Result<Vec<PromoCode>> {
        let mut promos: Vec<PromoCode> = self.scan(CF_PROMOS)?;
        promos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(promos)
    }

    async fn redeem(&self, code: &str, agent_id: i64, now: DateTime<Utc>) -> Result<Decimal> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut promo = match self.get_json::<PromoCode>(CF_PROMOS, code.as_bytes())? {
            Some(p) if p.active && !p.expired(now) => p,
            _ => return Err(ResellError::PromoNotFound),
        };
        if promo.exhausted() {
            return Err(ResellError::PromoExhausted);
        }
        let redemption_key = format!("{code}:{agent_id}");
        if self
            .get_json::<PromoRedemption>(CF_REDEMPTIONS, redemption_key.as_bytes())?
            .is_some()
        {
            return Err(ResellError::PromoAlreadyUsed);
        }
        promo.used_count += 1;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_REDEMPTIONS)?,
            redemption_key.as_bytes(),
            serde_json::to_vec(&PromoRedemption {
                code: code.to_string(),
                agent_id,
                redeemed_at: now,
            })
            .map_err(internal)?,
        );
        batch.put_cf(
            self.cf(CF_PROMOS)?,
            code.as_bytes(),
            serde_json::to_vec(&promo).map_err(internal)?,
        );
        self.db.write(batch).map_err(internal)?;
        Ok(promo.discount_percent)
    }
}

#[async_trait]
impl OrderStore for RocksStore {
    async fn create(&self, mut order: Order) -> Result<Order> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        order.id = self.next_seq(KEY_ORDER_SEQ)?;
        self.put_json(CF_ORDERS, &order.id.to_be_bytes(), &order)?;
        Ok(order)
    }

    async fn get(&self, order_id: u64) -> Result<Option<Order>> {
        self.get_json(CF_ORDERS, &order_id.to_be_bytes())
    }

    async fn list_for_agent(&self, agent_id: i64, limit: usize) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.scan(CF_ORDERS)?;
        orders.retain(|o| o.agent_id == agent_id);
        orders.reverse();
        orders.truncate(limit);
        Ok(orders)
    }
}

#[async_trait]
impl ClientStore for RocksStore {
    async fn create(&self, mut client: ProvisionedClient) -> Result<ProvisionedClient> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        client.id = self.next_seq(KEY_CLIENT_SEQ)?;
        self.put_json(CF_CLIENTS, &client.id.to_be_bytes(), &client)?;
        Ok(client)
    }

    async fn get(&self, agent_id: i64, client_id: u64) -> Result<Option<ProvisionedClient>> {
        Ok(self
            .get_json::<ProvisionedClient>(CF_CLIENTS, &client_id.to_be_bytes())?
            .filter(|c| c.agent_id == agent_id))
    }

    async fn list_for_agent(&self, agent_id: i64, limit: usize) -> Result<Vec<ProvisionedClient>> {
        let mut clients: Vec<ProvisionedClient> = self.scan(CF_CLIENTS)?;
        clients.retain(|c| c.agent_id == agent_id);
        clients.reverse();
        clients.truncate(limit);
        Ok(clients)
    }

    async fn set_auto_renew(&self, agent_id: i64, client_id: u64, enabled: bool) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut client = self
            .get_json::<ProvisionedClient>(CF_CLIENTS, &client_id.to_be_bytes())?
            .filter(|c| c.agent_id == agent_id)
            .ok_or_else(|| ResellError::Validation(format!("Client {client_id} not found")))?;
        client.auto_renew = enabled;
        self.put_json(CF_CLIENTS, &client_id.to_be_bytes(), &client)
    }
}

#[async_trait]
impl TariffStore for RocksStore {
    async fn global(&self) -> Result<GlobalTariff> {
        Ok(self
            .get_json::<GlobalTariff>(CF_META, KEY_TARIFF)?
            .unwrap_or_default())
    }

    async fn set_global(&self, tariff: GlobalTariff) -> Result<()> {
        self.put_json(CF_META, KEY_TARIFF, &tariff)
    }

    async fn rule(&self, inbound_id: i64) -> Result<Option<InboundRule>> {
        self.get_json(CF_META, format!("rule:{inbound_id}").as_bytes())
    }

    async fn set_rule(&self, rule: InboundRule) -> Result<()> {
        self.put_json(CF_META, format!("rule:{}", rule.inbound_id).as_bytes(), &rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::Role;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_creates_column_families() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path()).expect("Failed to open RocksDB");
        for cf in [CF_AGENTS, CF_LEDGER, CF_PROMOS, CF_REDEMPTIONS, CF_ORDERS, CF_CLIENTS, CF_META]
        {
            assert!(store.db.cf_handle(cf).is_some());
        }
    }

    #[tokio::test]
    async fn test_wallet_roundtrip_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            store
                .ensure(Agent::new(1, "alice", "Alice", Role::Reseller))
                .await
                .unwrap();
            store
                .credit(1, dec!(25).try_into().unwrap(), "topup.manual", "")
                .await
                .unwrap();
            store
                .debit(1, dec!(10).try_into().unwrap(), "order.charge", "")
                .await
                .unwrap();
        }
        let store = RocksStore::open(dir.path()).unwrap();
        assert_eq!(store.balance_of(1).await.unwrap(), Balance::new(dec!(15)));
        let entries = store.entries(1, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].amount, dec!(-10));
        assert_eq!(entries[1].amount, dec!(25));
    }

    #[tokio::test]
    async fn test_promo_redemption_persists() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        PromoStore::create(&store, PromoCode::new("SALE10", dec!(10), Some(1), None))
            .await
            .unwrap();
        let discount = store.redeem("SALE10", 1, Utc::now()).await.unwrap();
        assert_eq!(discount, dec!(10));

        let err = store.redeem("SALE10", 1, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ResellError::PromoAlreadyUsed));
        let err = store.redeem("SALE10", 2, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ResellError::PromoExhausted));
    }
}

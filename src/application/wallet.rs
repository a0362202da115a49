use crate::domain::agent::LedgerEntry;
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::WalletStoreRef;
use crate::error::Result;

/// All money movement goes through here: an append-only ledger backed by
/// the store, plus the cached balance the store keeps in step with it.
#[derive(Clone)]
pub struct WalletLedger {
    store: WalletStoreRef,
}

impl WalletLedger {
    pub fn new(store: WalletStoreRef) -> Self {
        Self { store }
    }

    /// Credits the agent and returns the new balance. Always succeeds for a
    /// positive amount.
    pub async fn credit(
        &self,
        agent_id: i64,
        amount: Amount,
        reason: &str,
        meta: &str,
    ) -> Result<Balance> {
        let balance = self.store.credit(agent_id, amount, reason, meta).await?;
        tracing::info!(agent_id, amount = %amount.value(), reason, "wallet_credit");
        Ok(balance)
    }

    /// Debits the agent if the balance covers the amount; the check and the
    /// write happen atomically in the store. No ledger row on failure.
    pub async fn debit(
        &self,
        agent_id: i64,
        amount: Amount,
        reason: &str,
        meta: &str,
    ) -> Result<Balance> {
        let balance = self.store.debit(agent_id, amount, reason, meta).await?;
        tracing::info!(agent_id, amount = %amount.value(), reason, "wallet_debit");
        Ok(balance)
    }

    pub async fn balance_of(&self, agent_id: i64) -> Result<Balance> {
        self.store.balance_of(agent_id).await
    }

    pub async fn history(&self, agent_id: i64, limit: usize) -> Result<Vec<LedgerEntry>> {
        self.store.entries(agent_id, limit).await
    }
}

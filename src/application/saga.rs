use super::pricing::{PricingEngine, apply_discount};
use super::wallet::WalletLedger;
use crate::domain::agent::reasons;
use crate::domain::money::{Amount, Balance};
use crate::domain::order::{Order, OrderKind, OrderRequest, OrderStatus, ProvisionedClient};
use crate::domain::ports::{AgentStoreRef, ClientSpec, ClientStoreRef, OrderStoreRef, ProvisionerRef};
use crate::error::{ResellError, Result};
use crate::interfaces::xui::link::{LinkBuilder, generate_sub_id};
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

const MS_PER_DAY: i64 = 86_400_000;
const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Panel expiry value: epoch milliseconds, or the negative sentinel meaning
/// "this long after first use".
fn expiry_value(days: u32, start_after_first_use: bool) -> i64 {
    let span = i64::from(days) * MS_PER_DAY;
    if start_after_first_use {
        -span
    } else {
        Utc::now().timestamp_millis() + span
    }
}

/// Result of a fully successful saga execution.
#[derive(Debug, Clone)]
pub struct CompletedOrder {
    pub order: Order,
    pub links: Vec<String>,
    pub subscription_links: Vec<String>,
    pub balance: Balance,
}

/// The order fulfillment saga: debit, provision unit by unit, persist; on
/// any provisioning failure, refund the full net amount and persist a
/// failed order. There is no shared transaction with the panel, so the
/// refund is the compensation step.
pub struct OrderSaga {
    agents: AgentStoreRef,
    wallet: WalletLedger,
    pricing: PricingEngine,
    orders: OrderStoreRef,
    clients: ClientStoreRef,
    panel: ProvisionerRef,
    links: LinkBuilder,
}

impl OrderSaga {
    pub fn new(
        agents: AgentStoreRef,
        wallet: WalletLedger,
        pricing: PricingEngine,
        orders: OrderStoreRef,
        clients: ClientStoreRef,
        panel: ProvisionerRef,
        links: LinkBuilder,
    ) -> Self {
        Self {
            agents,
            wallet,
            pricing,
            orders,
            clients,
            panel,
            links,
        }
    }

    /// Runs the saga for a validated request.
    ///
    /// Pre-debit failures (inactive agent, disabled inbound, insufficient
    /// balance) leave no persisted side effects. Post-debit failures always
    /// leave a debit/credit pair netting to zero plus a terminal failed
    /// order. Never retried automatically.
    pub async fn execute(
        &self,
        agent_id: i64,
        request: OrderRequest,
        discount_percent: Decimal,
    ) -> Result<CompletedOrder> {
        let agent = self
            .agents
            .get(agent_id)
            .await?
            .ok_or(ResellError::AgentNotFound(agent_id))?;
        if !agent.active {
            return Err(ResellError::AgentDisabled);
        }

        let gross = self.pricing.order_gross(&request).await?;
        let net = apply_discount(gross, discount_percent);

        // Reserve. A zero net (100% discount) has nothing to move.
        if net > Decimal::ZERO {
            let meta = serde_json::to_string(&serde_json::json!({
                "kind": request.kind,
                "inbound": request.inbound_ids[0],
            }))
            .map_err(|e| ResellError::Internal(Box::new(e)))?;
            self.wallet
                .debit(agent_id, Amount::new(net)?, reasons::ORDER_CHARGE, &meta)
                .await?;
            tracing::info!(agent_id, net = %net, kind = ?request.kind, "order_deduct");
        }

        match self.provision_all(agent_id, &request).await {
            Ok((links, subscription_links)) => {
                let order = self
                    .persist_order(agent_id, &request, gross, discount_percent, net, OrderStatus::Success)
                    .await?;
                let balance = self.wallet.balance_of(agent_id).await?;
                tracing::info!(agent_id, order_id = order.id, units = request.unit_count(), "order_success");
                Ok(CompletedOrder {
                    order,
                    links,
                    subscription_links,
                    balance,
                })
            }
            Err(err) => {
                // Compensate: full refund of the exact debited amount, then
                // a terminal failed order with the attempted parameters.
                if net > Decimal::ZERO {
                    self.wallet
                        .credit(agent_id, Amount::new(net)?, reasons::ORDER_REFUND, &err.to_string())
                        .await?;
                }
                self.persist_order(agent_id, &request, gross, discount_percent, net, OrderStatus::Failed)
                    .await?;
                tracing::error!(agent_id, error = %err, "order_failed");
                Err(err)
            }
        }
    }

    async fn provision_all(
        &self,
        agent_id: i64,
        request: &OrderRequest,
    ) -> Result<(Vec<String>, Vec<String>)> {
        self.panel.login().await?;
        tracing::debug!(agent_id, "panel_login");

        let expiry = expiry_value(request.days, request.start_after_first_use);
        let reset_days = if request.auto_renew {
            request.days.saturating_sub(1)
        } else {
            0
        };

        let mut links = Vec::new();
        let mut subscription_links = Vec::new();

        match request.kind {
            OrderKind::Single | OrderKind::Bulk => {
                let inbound_id = request.inbound_ids[0];
                let inbound = self.panel.get_inbound(inbound_id).await?;
                for unit in 1..=request.unit_count() {
                    let remark = match request.kind {
                        OrderKind::Bulk => format!("{}_{unit}", request.remark),
                        _ => request.remark.clone(),
                    };
                    let sub_id = generate_sub_id();
                    let (link, sub_link) = self
                        .provision_unit(agent_id, request, inbound_id, &inbound, &remark, &sub_id, expiry, reset_days)
                        .await?;
                    links.push(link);
                    subscription_links.push(sub_link);
                }
            }
            OrderKind::Multi => {
                // One credential per inbound, all under one subscription id.
                let sub_id = generate_sub_id();
                subscription_links.push(self.links.subscription_link(&sub_id));
                for &inbound_id in &request.inbound_ids {
                    let inbound = self.panel.get_inbound(inbound_id).await?;
                    let (link, _) = self
                        .provision_unit(agent_id, request, inbound_id, &inbound, &request.remark, &sub_id, expiry, reset_days)
                        .await?;
                    links.push(link);
                }
            }
        }

        Ok((links, subscription_links))
    }

    /// Creates one client on the panel and records its row. The row is
    /// written only after the panel call succeeded, so a partial bulk
    /// failure leaves exactly the completed units recorded.
    #[allow(clippy::too_many_arguments)]
    async fn provision_unit(
        &self,
        agent_id: i64,
        request: &OrderRequest,
        inbound_id: i64,
        inbound: &crate::domain::ports::InboundInfo,
        remark: &str,
        sub_id: &str,
        expiry: i64,
        reset_days: u32,
    ) -> Result<(String, String)> {
        let external_id = Uuid::new_v4();
        let spec = ClientSpec {
            id: external_id,
            email: remark.to_string(),
            enable: true,
            expiry_time: expiry,
            total_gb: u64::from(request.gb) * BYTES_PER_GB,
            flow: String::new(),
            limit_ip: 0,
            tg_id: agent_id.to_string(),
            sub_id: sub_id.to_string(),
            comment: "tg".to_string(),
            reset: reset_days,
        };
        self.panel.add_clients(inbound_id, &[spec]).await?;

        let link = self.links.access_link(external_id, inbound, remark);
        let sub_link = self.links.subscription_link(sub_id);
        self.clients
            .create(ProvisionedClient {
                id: 0,
                agent_id,
                inbound_id,
                external_id,
                remark: remark.to_string(),
                access_link: link.clone(),
                sub_id: sub_id.to_string(),
                sub_link: sub_link.clone(),
                days: request.days,
                gb: request.gb,
                start_after_first_use: request.start_after_first_use,
                auto_renew: request.auto_renew,
                created_at: Utc::now(),
            })
            .await?;
        Ok((link, sub_link))
    }

    async fn persist_order(
        &self,
        agent_id: i64,
        request: &OrderRequest,
        gross: Decimal,
        discount_percent: Decimal,
        net: Decimal,
        status: OrderStatus,
    ) -> Result<Order> {
        self.orders
            .create(Order {
                id: 0,
                agent_id,
                inbound_id: request.inbound_ids[0],
                kind: request.kind,
                days: request.days,
                gb: request.gb,
                count: request.unit_count(),
                gross,
                discount_percent,
                net,
                status,
                created_at: Utc::now(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_sentinel_for_first_use() {
        assert_eq!(expiry_value(30, true), -30 * MS_PER_DAY);
    }

    #[test]
    fn test_expiry_absolute_is_in_the_future() {
        let now = Utc::now().timestamp_millis();
        let expiry = expiry_value(1, false);
        assert!(expiry >= now + MS_PER_DAY - 1_000);
        assert!(expiry <= now + MS_PER_DAY + 1_000);
    }
}

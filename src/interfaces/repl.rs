use crate::application::promo::PromoEngine;
use crate::application::saga::{CompletedOrder, OrderSaga};
use crate::application::session::WizardSessions;
use crate::application::wallet::WalletLedger;
use crate::application::wizard::WizardReply;
use crate::domain::agent::{Role, reasons};
use crate::domain::money::Amount;
use crate::domain::order::{OrderKind, OrderRequest};
use crate::domain::ports::{
    AgentStoreRef, ClientStoreRef, OrderStoreRef, ProvisionerRef, TariffStoreRef,
};
use crate::domain::tariff::{GlobalTariff, InboundRule};
use crate::error::{ResellError, Result};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const HELP: &str = "\
Commands:
  order single|bulk|multi   start an order wizard
  promo <code>              redeem a discount code for your next order
  balance                   show wallet balance
  history                   show recent wallet movements
  orders                    show recent orders
  clients                   show recent provisioned clients
  default-inbound <id>      remember an inbound for `default` in the wizard
  renew <client-id> on|off  toggle auto-renew on one of your clients
  topup <amount> [agent]    credit a wallet (admin)
  promo-create <code> <percent> [max-uses]   (admin)
  tariff                    show the global tariff
  tariff-set <gb> <day>     set the global tariff (admin)
  inbound-rule <id> on|off [gb] [day]        (admin)
  inbounds                  list panel inbounds
  inbound-create <port> <remark>             (admin)
  agent-active <id> on|off  enable or disable an agent (admin)
  cancel                    abort the current wizard
  quit                      exit
Anything else is fed to the active wizard.";

/// The operator desk: parses one line of input into a command or a wizard
/// turn and renders the outcome as text. Owns no state of its own, so it is
/// directly testable against in-memory stores and a mock panel.
pub struct Desk {
    agents: AgentStoreRef,
    wallet: WalletLedger,
    promos: PromoEngine,
    tariffs: TariffStoreRef,
    panel: ProvisionerRef,
    sessions: Arc<WizardSessions>,
    saga: Arc<OrderSaga>,
    orders: OrderStoreRef,
    clients: ClientStoreRef,
}

impl Desk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agents: AgentStoreRef,
        wallet: WalletLedger,
        promos: PromoEngine,
        tariffs: TariffStoreRef,
        panel: ProvisionerRef,
        sessions: Arc<WizardSessions>,
        saga: Arc<OrderSaga>,
        orders: OrderStoreRef,
        clients: ClientStoreRef,
    ) -> Self {
        Self {
            agents,
            wallet,
            promos,
            tariffs,
            panel,
            sessions,
            saga,
            orders,
            clients,
        }
    }

    /// Handles one input line for the given agent and returns the text to
    /// show. Domain failures are rendered, not propagated; only storage and
    /// internal errors bubble up.
    pub async fn handle_line(&self, agent_id: i64, line: &str) -> Result<String> {
        let line = line.trim();
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or("");

        match (command, words.next()) {
            ("help", _) => Ok(HELP.to_string()),

            ("order", Some(kind)) => {
                let kind = match kind {
                    "single" => OrderKind::Single,
                    "bulk" => OrderKind::Bulk,
                    "multi" => OrderKind::Multi,
                    other => return Ok(format!("Unknown order kind: {other}")),
                };
                Ok(render_reply(self.sessions.begin(agent_id, kind).await))
            }

            ("promo", Some(code)) => match self.promos.redeem(code, agent_id).await {
                Ok(discount) => {
                    self.sessions.set_discount(agent_id, discount).await;
                    Ok(format!("Code accepted: {discount}% off your next order."))
                }
                Err(err) if err.is_user_facing() => Ok(err.to_string()),
                Err(err) => Err(err),
            },

            ("balance", _) => {
                let balance = self.wallet.balance_of(agent_id).await?;
                Ok(format!("Balance: {balance}"))
            }

            ("history", _) => {
                let entries = self.wallet.history(agent_id, 10).await?;
                if entries.is_empty() {
                    return Ok("No wallet movements yet.".to_string());
                }
                Ok(entries
                    .iter()
                    .map(|e| format!("{}  {:>10}  {}", e.created_at.format("%Y-%m-%d %H:%M"), e.amount, e.reason))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }

            ("orders", _) => {
                let orders = self.orders.list_for_agent(agent_id, 10).await?;
                if orders.is_empty() {
                    return Ok("No orders yet.".to_string());
                }
                Ok(orders
                    .iter()
                    .map(|o| {
                        format!(
                            "#{}  {:?} x{}  {}d/{}GB  net {}  {:?}",
                            o.id, o.kind, o.count, o.days, o.gb, o.net, o.status
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }

            ("clients", _) => {
                let clients = self.clients.list_for_agent(agent_id, 10).await?;
                if clients.is_empty() {
                    return Ok("No clients yet.".to_string());
                }
                Ok(clients
                    .iter()
                    .map(|c| format!("#{}  {}  inbound {}\n  {}", c.id, c.remark, c.inbound_id, c.access_link))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }

            ("topup", Some(amount)) => {
                self.require_admin(agent_id).await?;
                let amount = parse_amount(amount)?;
                let target = match line.split_whitespace().nth(2) {
                    Some(id) => id
                        .parse::<i64>()
                        .map_err(|_| ResellError::Validation("Invalid agent id".to_string()))?,
                    None => agent_id,
                };
                let reason = if target == agent_id {
                    reasons::TOPUP_MANUAL
                } else {
                    reasons::TOPUP_ADMIN
                };
                let balance = self.wallet.credit(target, amount, reason, "").await?;
                Ok(format!("Credited. Balance: {balance}"))
            }

            ("default-inbound", Some(id)) => {
                let inbound_id = id
                    .parse::<i64>()
                    .map_err(|_| ResellError::Validation("Invalid inbound id".to_string()))?;
                self.agents.set_preferred_inbound(agent_id, inbound_id).await?;
                Ok(format!("Default inbound set to {inbound_id}."))
            }

            ("renew", Some(id)) => {
                let client_id = id
                    .parse::<u64>()
                    .map_err(|_| ResellError::Validation("Invalid client id".to_string()))?;
                let enabled = parse_on_off(line.split_whitespace().nth(2))?;
                self.clients.set_auto_renew(agent_id, client_id, enabled).await?;
                Ok(format!(
                    "Auto-renew {} for client {client_id}.",
                    if enabled { "enabled" } else { "disabled" }
                ))
            }

            ("agent-active", Some(id)) => {
                self.require_admin(agent_id).await?;
                let target = id
                    .parse::<i64>()
                    .map_err(|_| ResellError::Validation("Invalid agent id".to_string()))?;
                let active = parse_on_off(line.split_whitespace().nth(2))?;
                self.agents.set_active(target, active).await?;
                Ok(format!(
                    "Agent {target} {}.",
                    if active { "enabled" } else { "disabled" }
                ))
            }

            ("inbound-create", Some(port)) => {
                self.require_admin(agent_id).await?;
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ResellError::Validation("Invalid port".to_string()))?;
                let remark = line.split_whitespace().nth(2).ok_or_else(|| {
                    ResellError::Validation("Usage: inbound-create <port> <remark>".to_string())
                })?;
                self.panel.login().await?;
                let id = self.panel.create_inbound(port, remark, "vless", "tcp").await?;
                Ok(format!("Created inbound {id} on port {port}."))
            }

            ("promo-create", Some(code)) => {
                self.require_admin(agent_id).await?;
                let mut rest = line.split_whitespace().skip(2);
                let percent = rest
                    .next()
                    .and_then(|p| Decimal::from_str(p).ok())
                    .filter(|p| *p > Decimal::ZERO && *p <= Decimal::ONE_HUNDRED)
                    .ok_or_else(|| {
                        ResellError::Validation("Discount percent must be in (0, 100]".to_string())
                    })?;
                let max_uses = rest.next().and_then(|m| m.parse::<u32>().ok());
                self.promos.create(code, percent, max_uses, None).await?;
                Ok(format!("Created promo {}.", code.to_uppercase()))
            }

            ("tariff", None) => {
                let tariff = self.tariffs.global().await?;
                Ok(format!(
                    "Global tariff: {}/GB + {}/day",
                    tariff.price_per_gb, tariff.price_per_day
                ))
            }

            ("tariff-set", Some(gb)) => {
                self.require_admin(agent_id).await?;
                let price_per_gb = parse_price(gb)?;
                let price_per_day = parse_price(
                    line.split_whitespace()
                        .nth(2)
                        .ok_or_else(|| ResellError::Validation("Usage: tariff-set <gb> <day>".to_string()))?,
                )?;
                self.tariffs
                    .set_global(GlobalTariff {
                        price_per_gb,
                        price_per_day,
                    })
                    .await?;
                Ok("Tariff updated.".to_string())
            }

            ("inbound-rule", Some(id)) => {
                self.require_admin(agent_id).await?;
                let inbound_id = id
                    .parse::<i64>()
                    .map_err(|_| ResellError::Validation("Invalid inbound id".to_string()))?;
                let mut rest = line.split_whitespace().skip(2);
                let enabled = match rest.next() {
                    Some("on") => true,
                    Some("off") => false,
                    _ => {
                        return Err(ResellError::Validation(
                            "Usage: inbound-rule <id> on|off [gb] [day]".to_string(),
                        ));
                    }
                };
                let price_per_gb = rest.next().map(parse_price).transpose()?;
                let price_per_day = rest.next().map(parse_price).transpose()?;
                self.tariffs
                    .set_rule(InboundRule {
                        inbound_id,
                        enabled,
                        price_per_gb,
                        price_per_day,
                    })
                    .await?;
                Ok(format!("Rule for inbound {inbound_id} saved."))
            }

            ("inbounds", _) => {
                self.panel.login().await?;
                let inbounds = self.panel.list_inbounds().await?;
                if inbounds.is_empty() {
                    return Ok("No inbounds on the panel.".to_string());
                }
                Ok(inbounds
                    .iter()
                    .map(|(id, info)| {
                        format!("#{id}  {}  port {}  {}/{}", info.remark, info.port, info.network, info.security)
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }

            // Anything else goes to the wizard, including "cancel".
            _ => {
                let reply = self.sessions.advance(agent_id, line).await?;
                if let WizardReply::Committed(request) = reply {
                    self.run_order(agent_id, *request).await
                } else {
                    Ok(render_reply(reply))
                }
            }
        }
    }

    /// Hands a committed request to the saga and settles the session. The
    /// pending discount is consumed by any committed outcome; a pre-debit
    /// abort keeps it for the next attempt.
    async fn run_order(&self, agent_id: i64, request: OrderRequest) -> Result<String> {
        let discount = self.sessions.pending_discount(agent_id).await;
        match self.saga.execute(agent_id, request, discount).await {
            Ok(done) => {
                self.sessions.settle(agent_id, true).await;
                Ok(render_completed(&done))
            }
            Err(err) => {
                self.sessions
                    .settle(agent_id, !err.is_pre_debit())
                    .await;
                if err.is_user_facing() {
                    Ok(format!("Order failed: {err}"))
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn require_admin(&self, agent_id: i64) -> Result<()> {
        let agent = self
            .agents
            .get(agent_id)
            .await?
            .ok_or(ResellError::AgentNotFound(agent_id))?;
        if agent.role != Role::Admin {
            return Err(ResellError::Validation(
                "This command needs an admin account".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_amount(input: &str) -> Result<Amount> {
    let value = Decimal::from_str(input)
        .map_err(|_| ResellError::Validation(format!("Invalid amount: {input}")))?;
    Amount::new(value)
}

fn parse_on_off(word: Option<&str>) -> Result<bool> {
    match word {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => Err(ResellError::Validation("Expected on or off".to_string())),
    }
}

fn parse_price(input: &str) -> Result<Decimal> {
    Decimal::from_str(input)
        .ok()
        .filter(|p| *p >= Decimal::ZERO)
        .ok_or_else(|| ResellError::Validation(format!("Invalid price: {input}")))
}

fn render_reply(reply: WizardReply) -> String {
    match reply {
        WizardReply::Prompt(text) | WizardReply::Invalid(text) => text,
        WizardReply::Preview(quote) => format!(
            "Price: {} (discount {}%) = {}\nAnswer confirm, edit, or cancel.",
            quote.gross, quote.discount_percent, quote.net
        ),
        WizardReply::Committed(_) => "Order committed.".to_string(),
        WizardReply::Canceled => "Order canceled.".to_string(),
        WizardReply::RateLimited => "Too many order attempts. Try again later.".to_string(),
        WizardReply::Aborted(reason) => format!("Order aborted: {reason}"),
    }
}

fn render_completed(done: &CompletedOrder) -> String {
    let mut out = format!(
        "Order #{} complete. Charged {}. Balance: {}.",
        done.order.id, done.order.net, done.balance
    );
    for link in &done.links {
        out.push('\n');
        out.push_str(link);
    }
    for sub in &done.subscription_links {
        out.push_str("\nsub: ");
        out.push_str(sub);
    }
    out
}

/// Line loop over stdin for the acting agent.
pub async fn run(desk: &Desk, agent_id: i64) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    stdout.write_all(b"resellkit ready. Type `help`.\n").await?;
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim() == "quit" {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let output = match desk.handle_line(agent_id, &line).await {
            Ok(text) => text,
            Err(err) if err.is_user_facing() => err.to_string(),
            Err(err) => return Err(err),
        };
        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }
    Ok(())
}

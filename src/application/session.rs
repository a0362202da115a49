use super::wizard::{OrderWizard, RateLimiter, WizardReply, WizardState};
use crate::domain::order::OrderKind;
use crate::error::Result;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Session {
    state: Option<WizardState>,
    /// Discount redeemed via a promo code, waiting for the next committed
    /// order. Survives a pre-debit abort, consumed by success or failure.
    promo_discount: Option<Decimal>,
}

/// Registry of per-user wizard sessions.
///
/// The registry mutex also serializes wizard turns, so no two turns (and no
/// two saga hand-offs) are in flight for the same session.
pub struct WizardSessions {
    wizard: OrderWizard,
    limiter: RateLimiter,
    sessions: Mutex<HashMap<i64, Session>>,
}

impl WizardSessions {
    pub fn new(wizard: OrderWizard, limiter: RateLimiter) -> Self {
        Self {
            wizard,
            limiter,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a wizard for the user, unless the sliding-window limit is hit
    /// (in which case no session state is created).
    pub async fn begin(&self, agent_id: i64, kind: OrderKind) -> WizardReply {
        if !self.limiter.try_start(agent_id) {
            tracing::warn!(agent_id, "wizard_rate_limited");
            return WizardReply::RateLimited;
        }
        let (state, reply) = OrderWizard::start(kind);
        let mut sessions = self.sessions.lock().await;
        sessions.entry(agent_id).or_default().state = Some(state);
        tracing::info!(agent_id, kind = ?kind, "wizard_start");
        reply
    }

    /// Feeds one text input into the user's wizard.
    pub async fn advance(&self, agent_id: i64, input: &str) -> Result<WizardReply> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(agent_id).or_default();
        let state = session.state.take().unwrap_or(WizardState::Idle);
        let discount = session.promo_discount.unwrap_or(Decimal::ZERO);
        let (state, reply) = self.wizard.advance(agent_id, state, input, discount).await?;
        match &reply {
            // Cancel discards the draft and any pending discount.
            WizardReply::Canceled => {
                session.state = None;
                session.promo_discount = None;
            }
            // An abort ends the flow but leaves the discount pending.
            WizardReply::Aborted(_) => session.state = None,
            _ => session.state = Some(state),
        }
        Ok(reply)
    }

    pub async fn set_discount(&self, agent_id: i64, discount: Decimal) {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(agent_id).or_default().promo_discount = Some(discount);
    }

    pub async fn pending_discount(&self, agent_id: i64) -> Decimal {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&agent_id)
            .and_then(|s| s.promo_discount)
            .unwrap_or(Decimal::ZERO)
    }

    /// Ends the session after a saga execution. `discount_consumed` is true
    /// for any committed outcome (success or compensated failure) and false
    /// for pre-debit aborts, which leave the discount pending.
    pub async fn settle(&self, agent_id: i64, discount_consumed: bool) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&agent_id) {
            session.state = None;
            if discount_consumed {
                session.promo_discount = None;
            }
        }
    }
}

use super::pricing::{PricingEngine, apply_discount};
use crate::config::{
    MAX_BULK_COUNT, MAX_DAYS, MAX_GB, REMARK_MAX_LEN, REMARK_MIN_LEN, WIZARD_RATE_LIMIT,
    WIZARD_RATE_WINDOW,
};
use crate::domain::order::{OrderKind, OrderRequest};
use crate::domain::ports::AgentStoreRef;
use crate::error::{ResellError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cancel tokens recognized from any non-terminal state.
const CANCEL_TOKENS: [&str; 2] = ["cancel", "لغو"];

/// The in-progress order, accumulated one field per wizard turn.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct OrderDraft {
    pub kind: OrderKind,
    pub inbound_ids: Vec<i64>,
    pub remark: Option<String>,
    pub count: Option<u32>,
    pub days: Option<u32>,
    pub gb: Option<u32>,
    pub start_after_first_use: Option<bool>,
    pub auto_renew: Option<bool>,
}

impl OrderDraft {
    fn new(kind: OrderKind) -> Self {
        Self {
            kind,
            inbound_ids: Vec::new(),
            remark: None,
            count: None,
            days: None,
            gb: None,
            start_after_first_use: None,
            auto_renew: None,
        }
    }

    /// Completes the draft into a validated request. Only callable once
    /// every field has been collected.
    fn into_request(self) -> Result<OrderRequest> {
        let missing = || ResellError::Validation("incomplete order draft".to_string());
        Ok(OrderRequest {
            kind: self.kind,
            inbound_ids: self.inbound_ids,
            remark: self.remark.ok_or_else(missing)?,
            count: self.count.unwrap_or(1),
            days: self.days.ok_or_else(missing)?,
            gb: self.gb.ok_or_else(missing)?,
            start_after_first_use: self.start_after_first_use.ok_or_else(missing)?,
            auto_renew: self.auto_renew.ok_or_else(missing)?,
        })
    }
}

/// Computed price preview shown before confirmation.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Quote {
    pub gross: Decimal,
    pub discount_percent: Decimal,
    pub net: Decimal,
}

/// Conversation state of one user's order wizard. Each non-terminal state
/// accepts exactly one text input; invalid input re-prompts the same state.
#[derive(Debug, PartialEq, Clone)]
pub enum WizardState {
    Idle,
    SelectInbound(OrderDraft),
    SelectInbounds(OrderDraft),
    Remark(OrderDraft),
    BaseRemark(OrderDraft),
    Count(OrderDraft),
    Days(OrderDraft),
    Gb(OrderDraft),
    StartAfterFirstUse(OrderDraft),
    AutoRenew(OrderDraft),
    Preview { draft: OrderDraft, quote: Quote },
    Committed(OrderRequest),
    Canceled,
}

impl WizardState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle | Self::Committed(_) | Self::Canceled)
    }
}

/// Outcome of one wizard turn, alongside the new state.
#[derive(Debug, PartialEq, Clone)]
pub enum WizardReply {
    /// Valid input: prompt for the next state.
    Prompt(String),
    /// Invalid input: re-prompt for the same state, nothing advanced.
    Invalid(String),
    /// All fields collected: price preview awaiting confirm/edit/cancel.
    Preview(Quote),
    /// Confirmed: the completed request, ready for the saga.
    Committed(Box<OrderRequest>),
    /// Cancel token: draft discarded.
    Canceled,
    /// Start rejected by the sliding-window rate limit; no session created.
    RateLimited,
    /// Flow aborted by a non-recoverable condition (e.g. disabled inbound).
    Aborted(String),
}

pub fn is_cancel(input: &str) -> bool {
    let t = input.trim().to_lowercase();
    CANCEL_TOKENS.iter().any(|c| *c == t)
}

fn parse_positive_int(input: &str) -> Option<u32> {
    let t = input.trim();
    if t.is_empty() || !t.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    t.parse::<u32>().ok().filter(|v| *v > 0)
}

fn parse_inbound_ids(input: &str) -> Option<Vec<i64>> {
    let mut ids: Vec<i64> = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let id = i64::from(parse_positive_int(part)?);
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    if ids.is_empty() { None } else { Some(ids) }
}

fn normalize_remark(input: &str) -> Option<String> {
    let remark = input.trim();
    if remark.len() < REMARK_MIN_LEN || remark.len() > REMARK_MAX_LEN {
        return None;
    }
    if !remark
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return None;
    }
    Some(remark.to_string())
}

fn parse_yes_no(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

fn prompt_remark(kind: OrderKind) -> WizardReply {
    match kind {
        OrderKind::Bulk => WizardReply::Prompt("Send base remark for bulk clients.".to_string()),
        _ => WizardReply::Prompt("Send client remark.".to_string()),
    }
}

/// Per-user conversation state machine producing validated order requests.
///
/// Transitions never touch persisted data; the only reads are the agent's
/// preferred inbound and the price preview.
#[derive(Clone)]
pub struct OrderWizard {
    pricing: PricingEngine,
    agents: AgentStoreRef,
}

impl OrderWizard {
    pub fn new(pricing: PricingEngine, agents: AgentStoreRef) -> Self {
        Self { pricing, agents }
    }

    /// Entry transition out of `Idle`. Rate limiting happens before this,
    /// in the session registry.
    pub fn start(kind: OrderKind) -> (WizardState, WizardReply) {
        let draft = OrderDraft::new(kind);
        match kind {
            OrderKind::Multi => (
                WizardState::SelectInbounds(draft),
                WizardReply::Prompt("Send inbound IDs separated by comma, e.g. 1,2,3".to_string()),
            ),
            _ => (
                WizardState::SelectInbound(draft),
                WizardReply::Prompt("Send inbound ID (or type: default).".to_string()),
            ),
        }
    }

    /// Processes one text input against the current state.
    pub async fn advance(
        &self,
        agent_id: i64,
        state: WizardState,
        input: &str,
        pending_discount: Decimal,
    ) -> Result<(WizardState, WizardReply)> {
        if !state.is_terminal() && is_cancel(input) {
            return Ok((WizardState::Idle, WizardReply::Canceled));
        }

        match state {
            WizardState::Idle | WizardState::Committed(_) | WizardState::Canceled => Ok((
                state,
                WizardReply::Invalid("No order in progress.".to_string()),
            )),

            WizardState::SelectInbound(mut draft) => {
                let inbound_id = if input.trim().eq_ignore_ascii_case("default") {
                    let preferred = self
                        .agents
                        .get(agent_id)
                        .await?
                        .and_then(|a| a.preferred_inbound);
                    match preferred {
                        Some(id) => id,
                        None => {
                            return Ok((
                                WizardState::SelectInbound(draft),
                                WizardReply::Invalid(
                                    "No default inbound set. Send a numeric inbound ID."
                                        .to_string(),
                                ),
                            ));
                        }
                    }
                } else {
                    match parse_positive_int(input) {
                        Some(id) => i64::from(id),
                        None => {
                            return Ok((
                                WizardState::SelectInbound(draft),
                                WizardReply::Invalid(
                                    "Invalid inbound ID. Send digits only.".to_string(),
                                ),
                            ));
                        }
                    }
                };
                draft.inbound_ids = vec![inbound_id];
                let reply = prompt_remark(draft.kind);
                let next = match draft.kind {
                    OrderKind::Bulk => WizardState::BaseRemark(draft),
                    _ => WizardState::Remark(draft),
                };
                Ok((next, reply))
            }

            WizardState::SelectInbounds(mut draft) => match parse_inbound_ids(input) {
                Some(ids) => {
                    draft.inbound_ids = ids;
                    let reply = prompt_remark(draft.kind);
                    Ok((WizardState::Remark(draft), reply))
                }
                None => Ok((
                    WizardState::SelectInbounds(draft),
                    WizardReply::Invalid(
                        "Invalid inbound list. Send comma-separated IDs like: 1,2,3".to_string(),
                    ),
                )),
            },

            WizardState::Remark(mut draft) => match normalize_remark(input) {
                Some(remark) => {
                    draft.remark = Some(remark);
                    Ok((
                        WizardState::Days(draft),
                        WizardReply::Prompt("Send total days.".to_string()),
                    ))
                }
                None => Ok((
                    WizardState::Remark(draft),
                    WizardReply::Invalid(
                        "Remark must be 2-64 chars using letters, numbers, underscore, or dash."
                            .to_string(),
                    ),
                )),
            },

            WizardState::BaseRemark(mut draft) => match normalize_remark(input) {
                Some(remark) => {
                    draft.remark = Some(remark);
                    Ok((
                        WizardState::Count(draft),
                        WizardReply::Prompt("Send number of clients.".to_string()),
                    ))
                }
                None => Ok((
                    WizardState::BaseRemark(draft),
                    WizardReply::Invalid(
                        "Base remark must be 2-64 chars using letters, numbers, underscore, or dash."
                            .to_string(),
                    ),
                )),
            },

            WizardState::Count(mut draft) => {
                match parse_positive_int(input).filter(|c| *c <= MAX_BULK_COUNT) {
                    Some(count) => {
                        draft.count = Some(count);
                        Ok((
                            WizardState::Days(draft),
                            WizardReply::Prompt("Send total days.".to_string()),
                        ))
                    }
                    None => Ok((
                        WizardState::Count(draft),
                        WizardReply::Invalid(format!(
                            "Invalid count. Enter a number between 1 and {MAX_BULK_COUNT}."
                        )),
                    )),
                }
            }

            WizardState::Days(mut draft) => {
                match parse_positive_int(input).filter(|d| *d <= MAX_DAYS) {
                    Some(days) => {
                        draft.days = Some(days);
                        Ok((
                            WizardState::Gb(draft),
                            WizardReply::Prompt("Send total GB.".to_string()),
                        ))
                    }
                    None => Ok((
                        WizardState::Days(draft),
                        WizardReply::Invalid(format!(
                            "Invalid days. Enter a number between 1 and {MAX_DAYS}."
                        )),
                    )),
                }
            }

            WizardState::Gb(mut draft) => {
                match parse_positive_int(input).filter(|g| *g <= MAX_GB) {
                    Some(gb) => {
                        draft.gb = Some(gb);
                        Ok((
                            WizardState::StartAfterFirstUse(draft),
                            WizardReply::Prompt("Start after first use? (y/n)".to_string()),
                        ))
                    }
                    None => Ok((
                        WizardState::Gb(draft),
                        WizardReply::Invalid(format!(
                            "Invalid GB. Enter a number between 1 and {MAX_GB}."
                        )),
                    )),
                }
            }

            WizardState::StartAfterFirstUse(mut draft) => match parse_yes_no(input) {
                Some(v) => {
                    draft.start_after_first_use = Some(v);
                    Ok((
                        WizardState::AutoRenew(draft),
                        WizardReply::Prompt("Enable auto-renew? (y/n)".to_string()),
                    ))
                }
                None => Ok((
                    WizardState::StartAfterFirstUse(draft),
                    WizardReply::Invalid("Please answer y or n.".to_string()),
                )),
            },

            WizardState::AutoRenew(mut draft) => match parse_yes_no(input) {
                Some(v) => {
                    draft.auto_renew = Some(v);
                    self.quote(draft, pending_discount).await
                }
                None => Ok((
                    WizardState::AutoRenew(draft),
                    WizardReply::Invalid("Please answer y or n.".to_string()),
                )),
            },

            WizardState::Preview { draft, quote } => match input.trim().to_lowercase().as_str() {
                "confirm" => {
                    let request = draft.into_request()?;
                    tracing::info!(agent_id, kind = ?request.kind, "wizard_confirm");
                    Ok((
                        WizardState::Committed(request.clone()),
                        WizardReply::Committed(Box::new(request)),
                    ))
                }
                "edit" => Ok((
                    WizardState::Days(draft),
                    WizardReply::Prompt("Send total days.".to_string()),
                )),
                _ => Ok((
                    WizardState::Preview { draft, quote },
                    WizardReply::Invalid("Answer confirm, edit, or cancel.".to_string()),
                )),
            },
        }
    }

    async fn quote(
        &self,
        draft: OrderDraft,
        pending_discount: Decimal,
    ) -> Result<(WizardState, WizardReply)> {
        let request = draft.clone().into_request()?;
        let gross = match self.pricing.order_gross(&request).await {
            Ok(gross) => gross,
            // A disabled inbound ends the flow; anything else propagates.
            Err(err @ ResellError::InboundDisabled(_)) => {
                return Ok((WizardState::Idle, WizardReply::Aborted(err.to_string())));
            }
            Err(err) => return Err(err),
        };
        let quote = Quote {
            gross,
            discount_percent: pending_discount,
            net: apply_discount(gross, pending_discount),
        };
        Ok((
            WizardState::Preview { draft, quote },
            WizardReply::Preview(quote),
        ))
    }
}

/// Sliding-window limiter for wizard starts: at most `limit` per `window`
/// per user. A rejected start leaves no trace.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    starts: Mutex<HashMap<i64, Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(WIZARD_RATE_LIMIT, WIZARD_RATE_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            starts: Mutex::new(HashMap::new()),
        }
    }

    pub fn try_start(&self, user_id: i64) -> bool {
        let now = Instant::now();
        let mut starts = self.starts.lock().unwrap_or_else(|e| e.into_inner());
        let timestamps = starts.entry(user_id).or_default();
        timestamps.retain(|ts| now.duration_since(*ts) < self.window);
        if timestamps.len() >= self.limit {
            return false;
        }
        timestamps.push(now);
        true
    }
}

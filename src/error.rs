use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResellError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },
    #[error("Promo code not found or inactive")]
    PromoNotFound,
    #[error("Promo code usage limit reached")]
    PromoExhausted,
    #[error("Promo code already used")]
    PromoAlreadyUsed,
    #[error("Inbound {0} is disabled by admin")]
    InboundDisabled(i64),
    #[error("Inbound {0} not found")]
    InboundNotFound(i64),
    #[error("Agent {0} not found")]
    AgentNotFound(i64),
    #[error("Agent account is disabled")]
    AgentDisabled,
    #[error("Panel login failed")]
    Auth,
    #[error("Provisioning failed: {0}")]
    Provisioning(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ResellError {
    /// True for failures raised before the wallet debit of an order.
    ///
    /// The caller keeps a pending promo discount across these, because the
    /// order never reached a committed (success or failed) state.
    pub fn is_pre_debit(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance { .. }
                | Self::InboundDisabled(_)
                | Self::AgentNotFound(_)
                | Self::AgentDisabled
                | Self::Validation(_)
        )
    }

    /// True for failures meant for the end user, as opposed to faults of
    /// the storage or the process itself.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InsufficientBalance { .. }
                | Self::PromoNotFound
                | Self::PromoExhausted
                | Self::PromoAlreadyUsed
                | Self::InboundDisabled(_)
                | Self::InboundNotFound(_)
                | Self::AgentDisabled
                | Self::Provisioning(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ResellError>;

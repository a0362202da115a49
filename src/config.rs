use std::time::Duration;

/// Validation bounds for wizard input.
pub const MAX_DAYS: u32 = 365;
pub const MAX_GB: u32 = 2000;
pub const MAX_BULK_COUNT: u32 = 100;
pub const REMARK_MIN_LEN: usize = 2;
pub const REMARK_MAX_LEN: usize = 64;

/// At most this many wizard starts per user per sliding window.
pub const WIZARD_RATE_LIMIT: usize = 5;
pub const WIZARD_RATE_WINDOW: Duration = Duration::from_secs(600);

pub const SUB_ID_LEN: usize = 16;

/// Connection settings for the external x-ui panel.
#[derive(Debug, Clone, clap::Args)]
pub struct PanelConfig {
    /// Panel base URL, e.g. https://panel.example.com:2053
    #[arg(long, env = "XUI_BASE_URL")]
    pub base_url: String,

    #[arg(long, env = "XUI_USERNAME")]
    pub username: String,

    #[arg(long, env = "XUI_PASSWORD")]
    pub password: String,

    /// Public host clients connect to, used in access links.
    #[arg(long, env = "XUI_SERVER_HOST")]
    pub server_host: String,

    /// Port of the subscription endpoint on `server_host`.
    #[arg(long, env = "XUI_SUBSCRIPTION_PORT", default_value_t = 2096)]
    pub subscription_port: u16,
}

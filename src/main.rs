use clap::Parser;
use miette::{IntoDiagnostic, Result};
use resellkit::application::pricing::PricingEngine;
use resellkit::application::promo::PromoEngine;
use resellkit::application::saga::OrderSaga;
use resellkit::application::session::WizardSessions;
use resellkit::application::wallet::WalletLedger;
use resellkit::application::wizard::{OrderWizard, RateLimiter};
use resellkit::config::PanelConfig;
use resellkit::domain::agent::{Agent, Role};
use resellkit::domain::ports::{
    AgentStoreRef, ClientStoreRef, OrderStoreRef, PromoStoreRef, ProvisionerRef, TariffStoreRef,
    WalletStoreRef,
};
use resellkit::infrastructure::in_memory::InMemoryStore;
use resellkit::interfaces::repl::{Desk, run};
use resellkit::interfaces::xui::client::XuiClient;
use resellkit::interfaces::xui::link::LinkBuilder;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    panel: PanelConfig,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<std::path::PathBuf>,

    /// Agent id to act as. Created as an admin on first run.
    #[arg(long, default_value_t = 1)]
    agent_id: i64,
}

struct Stores {
    agents: AgentStoreRef,
    wallet: WalletStoreRef,
    promos: PromoStoreRef,
    orders: OrderStoreRef,
    clients: ClientStoreRef,
    tariffs: TariffStoreRef,
}

impl Stores {
    fn in_memory() -> Self {
        let store = InMemoryStore::new();
        Self {
            agents: Arc::new(store.clone()),
            wallet: Arc::new(store.clone()),
            promos: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            clients: Arc::new(store.clone()),
            tariffs: Arc::new(store),
        }
    }

    #[cfg(feature = "storage-rocksdb")]
    fn rocksdb(path: &std::path::Path) -> resellkit::error::Result<Self> {
        let store = resellkit::infrastructure::rocksdb::RocksStore::open(path)?;
        Ok(Self {
            agents: Arc::new(store.clone()),
            wallet: Arc::new(store.clone()),
            promos: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            clients: Arc::new(store.clone()),
            tariffs: Arc::new(store),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resellkit=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    #[cfg(feature = "storage-rocksdb")]
    let stores = match &cli.db_path {
        Some(path) => Stores::rocksdb(path).into_diagnostic()?,
        None => Stores::in_memory(),
    };
    #[cfg(not(feature = "storage-rocksdb"))]
    let stores = Stores::in_memory();

    let panel: ProvisionerRef = Arc::new(XuiClient::new(&cli.panel).into_diagnostic()?);
    let links = LinkBuilder::from_config(&cli.panel);

    let wallet = WalletLedger::new(stores.wallet.clone());
    let promos = PromoEngine::new(stores.promos.clone());
    let pricing = PricingEngine::new(stores.tariffs.clone());
    let wizard = OrderWizard::new(pricing.clone(), stores.agents.clone());
    let sessions = Arc::new(WizardSessions::new(wizard, RateLimiter::default()));
    let saga = Arc::new(OrderSaga::new(
        stores.agents.clone(),
        wallet.clone(),
        pricing,
        stores.orders.clone(),
        stores.clients.clone(),
        panel.clone(),
        links,
    ));

    stores
        .agents
        .ensure(Agent::new(cli.agent_id, "operator", "Operator", Role::Admin))
        .await
        .into_diagnostic()?;

    let desk = Desk::new(
        stores.agents,
        wallet,
        promos,
        stores.tariffs,
        panel,
        sessions,
        saga,
        stores.orders,
        stores.clients,
    );
    run(&desk, cli.agent_id).await.into_diagnostic()?;
    Ok(())
}

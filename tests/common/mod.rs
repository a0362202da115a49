#![allow(dead_code)]

use async_trait::async_trait;
use resellkit::application::pricing::PricingEngine;
use resellkit::application::promo::PromoEngine;
use resellkit::application::saga::OrderSaga;
use resellkit::application::session::WizardSessions;
use resellkit::application::wallet::WalletLedger;
use resellkit::application::wizard::{OrderWizard, RateLimiter};
use resellkit::domain::agent::{Agent, Role};
use resellkit::domain::ports::{
    AgentStore, ClientSpec, InboundInfo, Provisioner, RealityParams,
};
use resellkit::error::{ResellError, Result};
use resellkit::infrastructure::in_memory::InMemoryStore;
use resellkit::interfaces::repl::Desk;
use resellkit::interfaces::xui::link::LinkBuilder;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// In-process stand-in for the x-ui panel. Records every `addClient` call
/// and can be told to fail on the n-th one.
pub struct MockPanel {
    inbounds: Mutex<HashMap<i64, InboundInfo>>,
    pub added: Mutex<Vec<(i64, ClientSpec)>>,
    /// 1-based index of the `add_clients` call to fail on; 0 means never.
    pub fail_at: AtomicUsize,
    pub add_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
}

impl MockPanel {
    pub fn new() -> Self {
        Self {
            inbounds: Mutex::new(HashMap::new()),
            added: Mutex::new(Vec::new()),
            fail_at: AtomicUsize::new(0),
            add_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_inbound(self, id: i64, info: InboundInfo) -> Self {
        self.inbounds.lock().unwrap().insert(id, info);
        self
    }

    pub fn fail_on_call(&self, n: usize) {
        self.fail_at.store(n, Ordering::SeqCst);
    }

    pub fn added_count(&self) -> usize {
        self.added.lock().unwrap().len()
    }
}

pub fn plain_inbound(port: u16) -> InboundInfo {
    InboundInfo {
        port,
        network: "tcp".to_string(),
        security: "none".to_string(),
        reality: None,
        remark: "edge".to_string(),
    }
}

pub fn reality_inbound(port: u16) -> InboundInfo {
    InboundInfo {
        port,
        network: "tcp".to_string(),
        security: "reality".to_string(),
        reality: Some(RealityParams {
            public_key: "PBK".to_string(),
            fingerprint: String::new(),
            server_names: vec!["cdn.example.com".to_string()],
            short_ids: vec!["ab12".to_string()],
        }),
        remark: "edge".to_string(),
    }
}

#[async_trait]
impl Provisioner for MockPanel {
    async fn login(&self) -> Result<()> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_inbounds(&self) -> Result<Vec<(i64, InboundInfo)>> {
        let mut inbounds: Vec<_> = self
            .inbounds
            .lock()
            .unwrap()
            .iter()
            .map(|(id, info)| (*id, info.clone()))
            .collect();
        inbounds.sort_by_key(|(id, _)| *id);
        Ok(inbounds)
    }

    async fn get_inbound(&self, inbound_id: i64) -> Result<InboundInfo> {
        self.inbounds
            .lock()
            .unwrap()
            .get(&inbound_id)
            .cloned()
            .ok_or(ResellError::InboundNotFound(inbound_id))
    }

    async fn add_clients(&self, inbound_id: i64, clients: &[ClientSpec]) -> Result<()> {
        let call = self.add_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_at.load(Ordering::SeqCst) == call {
            return Err(ResellError::Provisioning("panel rejected the client".to_string()));
        }
        let mut added = self.added.lock().unwrap();
        for client in clients {
            added.push((inbound_id, client.clone()));
        }
        Ok(())
    }

    async fn create_inbound(
        &self,
        port: u16,
        remark: &str,
        _protocol: &str,
        network: &str,
    ) -> Result<i64> {
        let mut inbounds = self.inbounds.lock().unwrap();
        let id = inbounds.keys().max().copied().unwrap_or(0) + 1;
        inbounds.insert(
            id,
            InboundInfo {
                port,
                network: network.to_string(),
                security: "none".to_string(),
                reality: None,
                remark: remark.to_string(),
            },
        );
        Ok(id)
    }
}

/// Everything wired up on the in-memory store and the mock panel, the same
/// way the binary wires the real stack.
pub struct TestApp {
    pub store: InMemoryStore,
    pub panel: Arc<MockPanel>,
    pub wallet: WalletLedger,
    pub promos: PromoEngine,
    pub pricing: PricingEngine,
    pub sessions: Arc<WizardSessions>,
    pub saga: Arc<OrderSaga>,
    pub desk: Desk,
}

impl TestApp {
    pub fn new(panel: MockPanel) -> Self {
        let store = InMemoryStore::new();
        let panel = Arc::new(panel);
        let links = LinkBuilder::new("vpn.test", 2096);

        let wallet = WalletLedger::new(Arc::new(store.clone()));
        let promos = PromoEngine::new(Arc::new(store.clone()));
        let pricing = PricingEngine::new(Arc::new(store.clone()));
        let wizard = OrderWizard::new(pricing.clone(), Arc::new(store.clone()));
        let sessions = Arc::new(WizardSessions::new(wizard, RateLimiter::default()));
        let saga = Arc::new(OrderSaga::new(
            Arc::new(store.clone()),
            wallet.clone(),
            pricing.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            panel.clone(),
            links,
        ));
        let desk = Desk::new(
            Arc::new(store.clone()),
            wallet.clone(),
            promos.clone(),
            Arc::new(store.clone()),
            panel.clone(),
            sessions.clone(),
            saga.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        );

        Self {
            store,
            panel,
            wallet,
            promos,
            pricing,
            sessions,
            saga,
            desk,
        }
    }

    pub async fn add_agent(&self, id: i64, role: Role) -> Agent {
        self.store
            .ensure(Agent::new(id, "agent", "Agent", role))
            .await
            .unwrap()
    }
}

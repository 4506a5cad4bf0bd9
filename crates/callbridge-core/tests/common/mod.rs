//! Shared fixtures for the orchestration integration tests
#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use callbridge_core::{
    AnswerBehavior, BridgeConfig, BridgeId, BridgeMode, BridgeOrchestrator, LegId,
    SignalingGateway, SimulatedEndpoint, SimulatedGateway, SimulatedGatewayConfig,
};

/// Answer delay used by auto-answering test endpoints.
pub const ANSWER_MS: u64 = 20;

/// Upper bound for anything a test waits on.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(3);

pub struct TestBed {
    pub gateway: Arc<SimulatedGateway>,
    pub orchestrator: BridgeOrchestrator,
}

impl TestBed {
    /// Gateway with the given endpoints and a generous ring timeout.
    pub fn new(endpoints: Vec<SimulatedEndpoint>) -> Self {
        Self::with_ring_timeout(endpoints, Duration::from_secs(5))
    }

    pub fn with_ring_timeout(endpoints: Vec<SimulatedEndpoint>, ring_timeout: Duration) -> Self {
        init_test_logging();
        let config = endpoints
            .into_iter()
            .fold(SimulatedGatewayConfig::new(), |c, e| c.with_endpoint(e));
        let gateway = Arc::new(SimulatedGateway::new(config));
        let dyn_gateway: Arc<dyn SignalingGateway> = gateway.clone();
        let orchestrator = BridgeOrchestrator::new(
            dyn_gateway,
            BridgeConfig::new()
                .with_app_name("test-app")
                .with_ring_timeout(ring_timeout),
        );
        Self {
            gateway,
            orchestrator,
        }
    }

    /// All endpoints online and answering after [`ANSWER_MS`].
    pub fn answering(resources: &[&str]) -> Self {
        Self::new(resources.iter().map(|r| auto_answer(r)).collect())
    }

    /// Dial `extensions` and wait until the bridge is registered in `mode`.
    pub async fn established(&self, extensions: &[&str], mode: BridgeMode) -> BridgeId {
        let bridge = self
            .orchestrator
            .dial(&exts(extensions))
            .await
            .expect("dial should succeed");
        let registry = self.orchestrator.registry().clone();
        let id = bridge.clone();
        eventually("bridge registered", || {
            let registry = registry.clone();
            let id = id.clone();
            async move { registry.lookup(&id) == Some(mode) }
        })
        .await;
        bridge
    }

    /// Wait until every leg of `bridge` has joined.
    pub async fn members_settle(&self, bridge: &BridgeId, expected: usize) {
        let gateway = self.gateway.clone();
        let id = bridge.clone();
        eventually("bridge membership", || {
            let gateway = gateway.clone();
            let id = id.clone();
            async move {
                gateway
                    .bridge_members(&id)
                    .await
                    .map(|m| m.len() == expected)
                    .unwrap_or(false)
            }
        })
        .await;
    }

    /// The single live leg dialed towards `resource`.
    pub fn leg_of(&self, resource: &str) -> LegId {
        let legs = self.gateway.legs_for(resource);
        assert_eq!(legs.len(), 1, "expected one leg towards {}", resource);
        legs[0].clone()
    }

    /// Wait until no controller is running and no subscription is open.
    pub async fn quiesced(&self) {
        let supervisor = self.orchestrator.supervisor().clone();
        let gateway = self.gateway.clone();
        eventually("controllers quiesced", || {
            let supervisor = supervisor.clone();
            let gateway = gateway.clone();
            async move { supervisor.running().is_empty() && gateway.subscriber_count() == 0 }
        })
        .await;
    }
}

pub fn auto_answer(resource: &str) -> SimulatedEndpoint {
    SimulatedEndpoint::online(resource).with_answer(AnswerBehavior::AfterMillis(ANSWER_MS))
}

pub fn exts(extensions: &[&str]) -> Vec<String> {
    extensions.iter().map(|e| e.to_string()).collect()
}

/// Poll `condition` until it holds, panicking after [`SETTLE_TIMEOUT`].
pub async fn eventually<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let mut delay = Duration::from_millis(5);
    loop {
        if condition().await {
            return;
        }
        if start.elapsed() >= SETTLE_TIMEOUT {
            panic!("condition '{}' not met within {:?}", what, SETTLE_TIMEOUT);
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(Duration::from_millis(50));
    }
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

//! Orchestration entry points
//!
//! `dial`, `join` and `list` run on the caller's task. They create legs and
//! bridges through the gateway and spawn the controllers that govern them,
//! but never wait on those controllers.
//!
//! Error policy:
//! - bad input, unknown call ids and unreachable endpoints come back as
//!   user-facing [`BridgeError`]s before anything is created;
//! - a gateway failure while creating or dialing comes back as a fatal
//!   [`BridgeError::Setup`]; nothing already created is rolled back.

use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::controller::{
    ConferenceController, ControllerContext, ControllerKind, LegController, PairController,
    Supervisor,
};
use crate::errors::{BridgeError, GatewayError, Result, SetupContext};
use crate::gateway::SignalingGateway;
use crate::registry::{CallRegistry, Promotion};
use crate::roster::Roster;
use crate::types::{BridgeId, BridgeMode, CallSummary, Endpoint, LegId};

/// Attempts at finding a bridge id used neither by the registry nor the gateway.
const BRIDGE_ID_ATTEMPTS: usize = 64;

pub struct BridgeOrchestrator {
    config: BridgeConfig,
    ctx: ControllerContext,
}

impl BridgeOrchestrator {
    pub fn new(gateway: Arc<dyn SignalingGateway>, config: BridgeConfig) -> Self {
        Self::with_registry(gateway, CallRegistry::new(), config)
    }

    pub fn with_registry(
        gateway: Arc<dyn SignalingGateway>,
        registry: CallRegistry,
        config: BridgeConfig,
    ) -> Self {
        Self {
            config,
            ctx: ControllerContext::new(gateway, registry),
        }
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.ctx.registry
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.ctx.supervisor
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Start a new bridge between `extensions` (at least two).
    ///
    /// Two extensions make a call governed by a [`PairController`]; three or
    /// more make a conference governed by a [`ConferenceController`] from the
    /// start.
    pub async fn dial(&self, extensions: &[String]) -> Result<BridgeId> {
        if extensions.len() < 2 {
            return Err(BridgeError::invalid_input("dial needs at least two extensions"));
        }
        self.ensure_reachable(extensions).await?;

        let bridge = self.create_bridge().await?;

        let composition = BridgeMode::for_party_count(extensions.len());
        let roster = Roster::new(composition);
        tracing::info!(
            "Dialing {} into {} bridge {}",
            extensions.join(", "),
            composition,
            bridge
        );

        // Subscribe to the bridge before any leg can answer and join it.
        let task = match composition {
            BridgeMode::Call => BridgeTask::Pair(PairController::new(
                self.ctx.clone(),
                bridge.clone(),
                roster.clone(),
            )),
            BridgeMode::Conference => BridgeTask::Conference(ConferenceController::new(
                self.ctx.clone(),
                bridge.clone(),
                roster.clone(),
            )),
        };

        for extension in extensions {
            self.dial_into(extension, &bridge, &roster).await?;
        }

        self.ctx
            .supervisor
            .spawn(task.kind(), bridge.as_str(), task.run());
        Ok(bridge)
    }

    /// Add `extensions` to the ongoing bridge `call_id`.
    ///
    /// A bridge still in call mode is promoted first, so its conference
    /// controller is in place before the new legs arrive.
    pub async fn join(&self, call_id: &str, extensions: &[String]) -> Result<Vec<LegId>> {
        let registry = &self.ctx.registry;
        if registry.is_empty() {
            return Err(BridgeError::NoOngoingCalls);
        }
        let bridge = BridgeId::new(call_id);
        let mode = registry
            .lookup(&bridge)
            .ok_or_else(|| BridgeError::no_matching_call(call_id))?;
        if extensions.is_empty() {
            return Err(BridgeError::invalid_input("join needs at least one extension"));
        }
        self.ensure_reachable(extensions).await?;

        if mode == BridgeMode::Call {
            match registry.promote(&bridge) {
                Promotion::Promoted => tracing::info!("Promoting call {} to a conference", bridge),
                Promotion::AlreadyConference => {}
                Promotion::NotFound => return Err(BridgeError::no_matching_call(call_id)),
            }
        }
        let roster = registry
            .roster(&bridge)
            .ok_or_else(|| BridgeError::no_matching_call(call_id))?;

        let mut legs = Vec::with_capacity(extensions.len());
        for extension in extensions {
            legs.push(self.dial_into(extension, &bridge, &roster).await?);
        }
        tracing::info!("Dialed {} into conference {}", extensions.join(", "), bridge);
        Ok(legs)
    }

    /// Ongoing bridges with their participants' labels.
    pub async fn list(&self) -> Result<Vec<CallSummary>> {
        let gateway = &self.ctx.gateway;
        let mut calls = Vec::new();
        for (bridge_id, mode) in self.ctx.registry.list() {
            let members = gateway.bridge_members(&bridge_id).await?;
            let mut participants = Vec::with_capacity(members.len());
            for leg in &members {
                match gateway.leg_data(leg).await {
                    Ok(data) => participants.push(data.participant),
                    Err(GatewayError::LegNotFound { .. }) => {
                        tracing::debug!("Leg {} left {} while listing", leg, bridge_id);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            calls.push(CallSummary {
                bridge_id,
                mode,
                participants,
            });
        }
        Ok(calls)
    }

    /// Stop every controller, forget all calls and close the gateway.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!(
            "Shutting down with {} ongoing calls",
            self.ctx.registry.len()
        );
        self.ctx.supervisor.abort_all();
        self.ctx.registry.clear();
        self.ctx.gateway.close().await?;
        Ok(())
    }

    /// Fail fast if any extension is not online; nothing is created otherwise.
    async fn ensure_reachable(&self, extensions: &[String]) -> Result<()> {
        for extension in extensions {
            let endpoint = self.endpoint(extension);
            let reachable = match self.ctx.gateway.endpoint_status(&endpoint).await {
                Ok(Some(state)) => state.is_reachable(),
                Ok(None) => false,
                Err(e) => {
                    tracing::debug!("Status lookup for {} failed: {}", endpoint, e);
                    false
                }
            };
            if !reachable {
                return Err(BridgeError::unreachable(extension.as_str()));
            }
        }
        Ok(())
    }

    /// Create and dial one leg towards `extension` and start its controller.
    async fn dial_into(&self, extension: &str, bridge: &BridgeId, roster: &Roster) -> Result<LegId> {
        let gateway = &self.ctx.gateway;
        let endpoint = self.endpoint(extension);
        let leg = gateway
            .create_leg(&endpoint, &self.config.app_name)
            .await
            .during("create leg")?;
        roster.push(leg.clone());

        let controller =
            LegController::new(self.ctx.clone(), leg.clone(), bridge.clone(), roster.clone());
        gateway
            .dial_leg(&leg, self.config.ring_timeout())
            .await
            .during("dial leg")?;
        tracing::debug!("Dialing {} as leg {}", endpoint, leg);

        self.ctx.supervisor.spawn(ControllerKind::Leg, leg.as_str(), async move {
            controller.run().await;
        });
        Ok(leg)
    }

    fn endpoint(&self, extension: &str) -> Endpoint {
        Endpoint::new(self.config.technology.clone(), extension)
    }

    /// Create a bridge under a freshly generated id. Ids already registered,
    /// or still held at the gateway by a bridge whose legs are ringing, are
    /// skipped.
    async fn create_bridge(&self) -> Result<BridgeId> {
        let mut taken = None;
        for _ in 0..BRIDGE_ID_ATTEMPTS {
            let bridge = BridgeId::generate(self.config.bridge_id_len);
            if self.ctx.registry.contains(&bridge) {
                continue;
            }
            match self
                .ctx
                .gateway
                .create_bridge(&bridge, self.config.bridge_type)
                .await
            {
                Ok(()) => return Ok(bridge),
                Err(e @ GatewayError::BridgeExists { .. }) => {
                    tracing::debug!("Bridge id {} is taken at the gateway", bridge);
                    taken = Some(e);
                }
                Err(e) => return Err(e).during("create bridge"),
            }
        }
        let source = taken
            .unwrap_or_else(|| GatewayError::operation("create bridge", "no free bridge id"));
        Err(source).during("create bridge")
    }
}

enum BridgeTask {
    Pair(PairController),
    Conference(ConferenceController),
}

impl BridgeTask {
    fn kind(&self) -> ControllerKind {
        match self {
            BridgeTask::Pair(_) => ControllerKind::Pair,
            BridgeTask::Conference(_) => ControllerKind::Conference,
        }
    }

    async fn run(self) {
        match self {
            BridgeTask::Pair(pair) => {
                pair.run().await;
            }
            BridgeTask::Conference(conference) => {
                conference.run().await;
            }
        }
    }
}

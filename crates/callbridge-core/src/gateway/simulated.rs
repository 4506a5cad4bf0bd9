//! In-memory signaling gateway
//!
//! Models just enough of a PBX for the controllers to run against: endpoints
//! with a registration state and an answer behaviour, legs that ring and get
//! answered (or time out), and mixing bridges that emit membership events.
//! All state sits behind one lock and events are emitted while holding it, so
//! per-entity ordering is the order of mutation.
//!
//! Besides the [`SignalingGateway`] operations it exposes hooks that play the
//! far end of a call (`answer`, `hangup_from_endpoint`), one-shot fault
//! injection (`fail_next`) and inspection helpers used by tests.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::events::{EntityKey, EventKind, GatewayEvent, Subscription};
use super::{GatewayResult, SignalingGateway};
use crate::errors::GatewayError;
use crate::types::{
    BridgeId, BridgeType, Endpoint, EndpointState, HangupReason, LegData, LegId, LegState,
};

/// How a simulated endpoint reacts to being dialed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerBehavior {
    /// Answer automatically after the given number of milliseconds.
    AfterMillis(u64),
    /// Ring until [`SimulatedGateway::answer`] is called or the ring timeout hits.
    Manual,
    /// Never answer.
    Never,
}

impl Default for AnswerBehavior {
    fn default() -> Self {
        AnswerBehavior::AfterMillis(500)
    }
}

fn default_online() -> EndpointState {
    EndpointState::Online
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedEndpoint {
    pub resource: String,
    #[serde(default = "default_online")]
    pub state: EndpointState,
    /// Participant label; defaults to the resource.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub answer: AnswerBehavior,
}

impl SimulatedEndpoint {
    pub fn online(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            state: EndpointState::Online,
            label: None,
            answer: AnswerBehavior::default(),
        }
    }

    pub fn offline(resource: impl Into<String>) -> Self {
        Self {
            state: EndpointState::Offline,
            ..Self::online(resource)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_answer(mut self, answer: AnswerBehavior) -> Self {
        self.answer = answer;
        self
    }

    fn participant_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.resource.clone())
    }
}

fn default_technology() -> String {
    "PJSIP".to_string()
}

/// Endpoints known to the simulated gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedGatewayConfig {
    #[serde(default = "default_technology")]
    pub technology: String,
    #[serde(default)]
    pub endpoints: Vec<SimulatedEndpoint>,
}

impl Default for SimulatedGatewayConfig {
    fn default() -> Self {
        Self {
            technology: default_technology(),
            endpoints: Vec::new(),
        }
    }
}

impl SimulatedGatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_technology(mut self, technology: impl Into<String>) -> Self {
        self.technology = technology.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: SimulatedEndpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Add online endpoints that auto-answer with the default delay.
    pub fn with_online<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints
            .extend(resources.into_iter().map(SimulatedEndpoint::online));
        self
    }
}

/// Gateway operations that can be made to fail with [`SimulatedGateway::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    CreateLeg,
    DialLeg,
    HangupLeg,
    LegData,
    CreateBridge,
    DeleteBridge,
    BridgeMembers,
}

/// Counters of operations performed against the simulated gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub legs_created: usize,
    pub legs_dialed: usize,
    pub hangups: usize,
    pub bridges_created: usize,
    pub bridges_deleted: usize,
}

#[derive(Debug)]
struct SimLeg {
    endpoint: Endpoint,
    label: String,
    state: LegState,
    bridge: Option<BridgeId>,
}

#[derive(Debug)]
struct SimBridge {
    members: Vec<LegId>,
}

struct Subscriber {
    entity: EntityKey,
    kinds: Vec<EventKind>,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

#[derive(Default)]
struct SimState {
    endpoints: HashMap<Endpoint, SimulatedEndpoint>,
    legs: HashMap<LegId, SimLeg>,
    bridges: HashMap<BridgeId, SimBridge>,
    subscribers: HashMap<u64, Subscriber>,
    next_leg: u64,
    next_subscription: u64,
    faults: HashMap<GatewayOperation, GatewayError>,
    closed: bool,
    stats: GatewayStats,
}

impl SimState {
    fn ensure_open(&self) -> GatewayResult<()> {
        if self.closed {
            Err(GatewayError::Closed)
        } else {
            Ok(())
        }
    }

    /// Fail if a fault is armed for `operation`; the fault is consumed.
    fn check_fault(&mut self, operation: GatewayOperation) -> GatewayResult<()> {
        match self.faults.remove(&operation) {
            Some(error) => {
                tracing::debug!("Injected {:?} failure: {}", operation, error);
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn emit(&mut self, event: GatewayEvent) {
        let entity = event.entity();
        let kind = event.kind();
        for sub in self.subscribers.values() {
            if sub.entity == entity && sub.kinds.contains(&kind) {
                let _ = sub.tx.send(event.clone());
            }
        }
    }

    fn drop_subscribers(&mut self, entity: &EntityKey) {
        self.subscribers.retain(|_, sub| &sub.entity != entity);
    }

    fn entity_exists(&self, entity: &EntityKey) -> bool {
        match entity {
            EntityKey::Leg(id) => self.legs.contains_key(id),
            EntityKey::Bridge(id) => self.bridges.contains_key(id),
        }
    }

    fn detach_from_bridge(&mut self, leg_id: &LegId, bridge_id: &BridgeId) {
        let Some(bridge) = self.bridges.get_mut(bridge_id) else {
            return;
        };
        let before = bridge.members.len();
        bridge.members.retain(|m| m != leg_id);
        if bridge.members.len() == before {
            return;
        }
        let members = bridge.members.clone();
        if let Some(leg) = self.legs.get_mut(leg_id) {
            leg.bridge = None;
        }
        self.emit(GatewayEvent::MemberLeft {
            bridge_id: bridge_id.clone(),
            leg_id: leg_id.clone(),
            members,
        });
    }

    /// Tear a leg down: leave its bridge, then end its subscriptions.
    fn destroy_leg(&mut self, leg_id: &LegId) -> GatewayResult<()> {
        let bridge = self
            .legs
            .get(leg_id)
            .ok_or_else(|| GatewayError::LegNotFound {
                leg_id: leg_id.clone(),
            })?
            .bridge
            .clone();
        if let Some(bridge_id) = bridge {
            self.detach_from_bridge(leg_id, &bridge_id);
        }
        self.legs.remove(leg_id);
        self.drop_subscribers(&EntityKey::Leg(leg_id.clone()));
        Ok(())
    }

    fn set_answered(&mut self, leg_id: &LegId) -> GatewayResult<bool> {
        let leg = self
            .legs
            .get_mut(leg_id)
            .ok_or_else(|| GatewayError::LegNotFound {
                leg_id: leg_id.clone(),
            })?;
        if leg.state == LegState::Up {
            return Ok(false);
        }
        leg.state = LegState::Up;
        self.emit(GatewayEvent::LegStateChanged {
            leg_id: leg_id.clone(),
            state: LegState::Up,
        });
        Ok(true)
    }

    fn ring_timeout(&mut self, leg_id: &LegId) {
        let still_ringing = self
            .legs
            .get(leg_id)
            .map(|leg| leg.state == LegState::Ringing)
            .unwrap_or(false);
        if !still_ringing {
            return;
        }
        self.emit(GatewayEvent::LegHangupRequested {
            leg_id: leg_id.clone(),
        });
        let _ = self.hang_up(leg_id, HangupReason::NoAnswer);
    }

    fn hang_up(&mut self, leg_id: &LegId, reason: HangupReason) -> GatewayResult<()> {
        self.destroy_leg(leg_id)?;
        self.stats.hangups += 1;
        tracing::debug!("Hung up leg {} ({})", leg_id, reason);
        Ok(())
    }
}

/// In-memory [`SignalingGateway`].
#[derive(Clone)]
pub struct SimulatedGateway {
    state: Arc<Mutex<SimState>>,
    technology: String,
}

impl SimulatedGateway {
    pub fn new(config: SimulatedGatewayConfig) -> Self {
        let mut state = SimState::default();
        for endpoint in config.endpoints {
            let key = Endpoint::new(config.technology.clone(), endpoint.resource.clone());
            state.endpoints.insert(key, endpoint);
        }
        Self {
            state: Arc::new(Mutex::new(state)),
            technology: config.technology,
        }
    }

    fn endpoint(&self, resource: &str) -> Endpoint {
        Endpoint::new(self.technology.clone(), resource)
    }

    /// The far end picks up a ringing leg.
    pub fn answer(&self, leg: &LegId) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.set_answered(leg).map(|_| ())
    }

    /// The far end hangs up: a hangup request is emitted for the leg, then
    /// the leg leaves its bridge and is destroyed.
    pub fn hangup_from_endpoint(&self, leg: &LegId) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if !state.legs.contains_key(leg) {
            return Err(GatewayError::LegNotFound { leg_id: leg.clone() });
        }
        state.emit(GatewayEvent::LegHangupRequested { leg_id: leg.clone() });
        state.destroy_leg(leg)
    }

    /// Make the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: GatewayOperation, error: GatewayError) {
        self.state.lock().faults.insert(operation, error);
    }

    pub fn set_endpoint_state(&self, resource: &str, endpoint_state: EndpointState) {
        let key = self.endpoint(resource);
        let mut state = self.state.lock();
        state
            .endpoints
            .entry(key)
            .or_insert_with(|| SimulatedEndpoint::online(resource))
            .state = endpoint_state;
    }

    /// Live legs dialed towards `resource`.
    pub fn legs_for(&self, resource: &str) -> Vec<LegId> {
        let key = self.endpoint(resource);
        let state = self.state.lock();
        let mut legs: Vec<LegId> = state
            .legs
            .iter()
            .filter(|(_, leg)| leg.endpoint == key)
            .map(|(id, _)| id.clone())
            .collect();
        legs.sort();
        legs
    }

    pub fn leg_count(&self) -> usize {
        self.state.lock().legs.len()
    }

    pub fn bridge_ids(&self) -> Vec<BridgeId> {
        let mut ids: Vec<BridgeId> = self.state.lock().bridges.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn bridge_exists(&self, bridge: &BridgeId) -> bool {
        self.state.lock().bridges.contains_key(bridge)
    }

    /// Open subscriptions; cancelled and ended subscriptions are not counted.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub fn stats(&self) -> GatewayStats {
        self.state.lock().stats.clone()
    }
}

#[async_trait]
impl SignalingGateway for SimulatedGateway {
    async fn create_leg(&self, endpoint: &Endpoint, app: &str) -> GatewayResult<LegId> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.check_fault(GatewayOperation::CreateLeg)?;
        let label = state
            .endpoints
            .get(endpoint)
            .map(SimulatedEndpoint::participant_label)
            .ok_or_else(|| GatewayError::EndpointNotFound {
                endpoint: endpoint.clone(),
            })?;

        state.next_leg += 1;
        let leg_id = LegId::new(format!("{}-{:04}", app, state.next_leg));
        state.legs.insert(
            leg_id.clone(),
            SimLeg {
                endpoint: endpoint.clone(),
                label,
                state: LegState::Down,
                bridge: None,
            },
        );
        state.stats.legs_created += 1;
        tracing::debug!("Created leg {} towards {}", leg_id, endpoint);
        Ok(leg_id)
    }

    async fn dial_leg(&self, leg: &LegId, timeout: Duration) -> GatewayResult<()> {
        let behavior = {
            let mut state = self.state.lock();
            state.ensure_open()?;
            state.check_fault(GatewayOperation::DialLeg)?;
            let sim_leg = state
                .legs
                .get_mut(leg)
                .ok_or_else(|| GatewayError::LegNotFound { leg_id: leg.clone() })?;
            if sim_leg.state != LegState::Down {
                return Err(GatewayError::operation(
                    "dial",
                    format!("leg {} has already been dialed", leg),
                ));
            }
            sim_leg.state = LegState::Ringing;
            let endpoint = sim_leg.endpoint.clone();
            state.stats.legs_dialed += 1;
            state
                .endpoints
                .get(&endpoint)
                .map(|e| e.answer)
                .unwrap_or(AnswerBehavior::Never)
        };

        let weak: Weak<Mutex<SimState>> = Arc::downgrade(&self.state);
        let leg = leg.clone();
        tokio::spawn(async move {
            let answer_after = match behavior {
                AnswerBehavior::AfterMillis(ms) => Some(Duration::from_millis(ms)),
                AnswerBehavior::Manual | AnswerBehavior::Never => None,
            };
            match answer_after {
                Some(delay) if delay < timeout => {
                    tokio::time::sleep(delay).await;
                    if let Some(state) = weak.upgrade() {
                        let mut state = state.lock();
                        let ringing = state
                            .legs
                            .get(&leg)
                            .map(|l| l.state == LegState::Ringing)
                            .unwrap_or(false);
                        if ringing && !state.closed {
                            let _ = state.set_answered(&leg);
                        }
                    }
                }
                _ => {
                    tokio::time::sleep(timeout).await;
                    if let Some(state) = weak.upgrade() {
                        state.lock().ring_timeout(&leg);
                    }
                }
            }
        });
        Ok(())
    }

    async fn answer_leg(&self, leg: &LegId) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.set_answered(leg).map(|_| ())
    }

    async fn hangup_leg(&self, leg: &LegId, reason: HangupReason) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.check_fault(GatewayOperation::HangupLeg)?;
        state.hang_up(leg, reason)
    }

    async fn leg_data(&self, leg: &LegId) -> GatewayResult<LegData> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.check_fault(GatewayOperation::LegData)?;
        state
            .legs
            .get(leg)
            .map(|l| LegData {
                id: leg.clone(),
                endpoint: l.endpoint.clone(),
                state: l.state,
                participant: l.label.clone(),
            })
            .ok_or_else(|| GatewayError::LegNotFound { leg_id: leg.clone() })
    }

    async fn create_bridge(&self, id: &BridgeId, bridge_type: BridgeType) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.check_fault(GatewayOperation::CreateBridge)?;
        if state.bridges.contains_key(id) {
            return Err(GatewayError::BridgeExists {
                bridge_id: id.clone(),
            });
        }
        state.bridges.insert(
            id.clone(),
            SimBridge {
                members: Vec::new(),
            },
        );
        state.stats.bridges_created += 1;
        tracing::debug!("Created {} bridge {}", bridge_type, id);
        Ok(())
    }

    async fn add_leg_to_bridge(&self, bridge: &BridgeId, leg: &LegId) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if !state.bridges.contains_key(bridge) {
            return Err(GatewayError::BridgeNotFound {
                bridge_id: bridge.clone(),
            });
        }
        let current = state
            .legs
            .get(leg)
            .ok_or_else(|| GatewayError::LegNotFound { leg_id: leg.clone() })?
            .bridge
            .clone();
        match current {
            Some(ref b) if b == bridge => return Ok(()),
            Some(ref other) => state.detach_from_bridge(leg, other),
            None => {}
        }

        let members = match state.bridges.get_mut(bridge) {
            Some(b) => {
                b.members.push(leg.clone());
                b.members.clone()
            }
            None => {
                return Err(GatewayError::BridgeNotFound {
                    bridge_id: bridge.clone(),
                })
            }
        };
        if let Some(l) = state.legs.get_mut(leg) {
            l.bridge = Some(bridge.clone());
        }
        state.emit(GatewayEvent::MemberJoined {
            bridge_id: bridge.clone(),
            leg_id: leg.clone(),
            members,
        });
        Ok(())
    }

    async fn remove_leg_from_bridge(&self, bridge: &BridgeId, leg: &LegId) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let is_member = state
            .bridges
            .get(bridge)
            .ok_or_else(|| GatewayError::BridgeNotFound {
                bridge_id: bridge.clone(),
            })?
            .members
            .contains(leg);
        if !is_member {
            return Err(GatewayError::LegNotFound { leg_id: leg.clone() });
        }
        state.detach_from_bridge(leg, bridge);
        Ok(())
    }

    async fn delete_bridge(&self, bridge: &BridgeId) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.check_fault(GatewayOperation::DeleteBridge)?;
        let removed = state
            .bridges
            .remove(bridge)
            .ok_or_else(|| GatewayError::BridgeNotFound {
                bridge_id: bridge.clone(),
            })?;
        for member in &removed.members {
            if let Some(leg) = state.legs.get_mut(member) {
                leg.bridge = None;
            }
        }
        state.drop_subscribers(&EntityKey::Bridge(bridge.clone()));
        state.stats.bridges_deleted += 1;
        tracing::debug!("Deleted bridge {}", bridge);
        Ok(())
    }

    async fn bridge_members(&self, bridge: &BridgeId) -> GatewayResult<Vec<LegId>> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.check_fault(GatewayOperation::BridgeMembers)?;
        state
            .bridges
            .get(bridge)
            .map(|b| b.members.clone())
            .ok_or_else(|| GatewayError::BridgeNotFound {
                bridge_id: bridge.clone(),
            })
    }

    async fn endpoint_status(&self, endpoint: &Endpoint) -> GatewayResult<Option<EndpointState>> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.endpoints.get(endpoint).map(|e| e.state))
    }

    fn subscribe(&self, entity: EntityKey, kinds: &[EventKind]) -> Subscription {
        let mut state = self.state.lock();
        if state.closed || !state.entity_exists(&entity) {
            return Subscription::closed(entity);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.next_subscription += 1;
        let id = state.next_subscription;
        state.subscribers.insert(
            id,
            Subscriber {
                entity: entity.clone(),
                kinds: kinds.to_vec(),
                tx,
            },
        );

        let weak = Arc::downgrade(&self.state);
        Subscription::new(entity, rx, move || {
            if let Some(state) = weak.upgrade() {
                state.lock().subscribers.remove(&id);
            }
        })
    }

    async fn close(&self) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.closed = true;
        state.subscribers.clear();
        tracing::info!("Simulated gateway closed");
        Ok(())
    }
}

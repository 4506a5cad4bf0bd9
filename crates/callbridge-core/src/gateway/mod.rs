//! Signaling Gateway abstraction
//!
//! The gateway owns the actual call legs and bridges. This crate only drives
//! it: it creates and dials legs, creates and mutates bridges, and reacts to
//! the per-entity event streams the gateway emits.
//!
//! # Event delivery
//!
//! A [`Subscription`] covers one entity (a leg or a bridge) and a set of event
//! kinds. All selected kinds arrive on a single ordered channel, so a
//! controller never observes a member-left before the member-joined that
//! preceded it. The stream ends when the entity is destroyed or the gateway
//! is closed. Dropping the subscription cancels it.

pub mod events;
pub mod simulated;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::GatewayError;
use crate::types::{BridgeId, BridgeType, Endpoint, EndpointState, HangupReason, LegData, LegId};

pub use events::{EntityKey, EventKind, GatewayEvent, Subscription};
pub use simulated::{
    AnswerBehavior, GatewayOperation, GatewayStats, SimulatedEndpoint, SimulatedGateway,
    SimulatedGatewayConfig,
};

/// Result type for gateway operations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Operations the bridge controllers consume from the signaling service.
#[async_trait]
pub trait SignalingGateway: Send + Sync {
    /// Create (but do not dial) a leg towards `endpoint`, owned by stasis application `app`.
    async fn create_leg(&self, endpoint: &Endpoint, app: &str) -> GatewayResult<LegId>;

    /// Start ringing the leg; the attempt is abandoned after `timeout`.
    async fn dial_leg(&self, leg: &LegId, timeout: Duration) -> GatewayResult<()>;

    async fn answer_leg(&self, leg: &LegId) -> GatewayResult<()>;

    async fn hangup_leg(&self, leg: &LegId, reason: HangupReason) -> GatewayResult<()>;

    async fn leg_data(&self, leg: &LegId) -> GatewayResult<LegData>;

    async fn create_bridge(&self, id: &BridgeId, bridge_type: BridgeType) -> GatewayResult<()>;

    async fn add_leg_to_bridge(&self, bridge: &BridgeId, leg: &LegId) -> GatewayResult<()>;

    async fn remove_leg_from_bridge(&self, bridge: &BridgeId, leg: &LegId) -> GatewayResult<()>;

    async fn delete_bridge(&self, bridge: &BridgeId) -> GatewayResult<()>;

    /// Current member legs of the bridge; fails if the bridge no longer exists.
    async fn bridge_members(&self, bridge: &BridgeId) -> GatewayResult<Vec<LegId>>;

    /// Endpoint registration state, `None` if the gateway does not know it.
    async fn endpoint_status(&self, endpoint: &Endpoint) -> GatewayResult<Option<EndpointState>>;

    /// Subscribe to `kinds` of events for `entity`.
    fn subscribe(&self, entity: EntityKey, kinds: &[EventKind]) -> Subscription;

    /// Close the connection; every open subscription ends.
    async fn close(&self) -> GatewayResult<()>;
}

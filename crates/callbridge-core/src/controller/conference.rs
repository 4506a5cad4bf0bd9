//! Conference Bridge Controller
//!
//! Keeps a multi-party bridge alive until its last member leaves, then
//! deletes it. Created directly for dials with three or more parties, or by
//! a [`PairController`](super::PairController) handing over a promoted call.

use crate::gateway::{EntityKey, EventKind, GatewayEvent, Subscription};
use crate::roster::Roster;
use crate::types::{BridgeId, BridgeMode, HangupReason, LegId};

use super::{log_cleanup, ControllerContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConferenceOutcome {
    /// The last member left and the bridge was deleted.
    Emptied,
    /// The bridge disappeared underneath the controller.
    Closed,
}

pub struct ConferenceController {
    ctx: ControllerContext,
    bridge: BridgeId,
    roster: Roster,
    events: Subscription,
}

impl ConferenceController {
    pub fn new(ctx: ControllerContext, bridge: BridgeId, roster: Roster) -> Self {
        let events = ctx.gateway.subscribe(
            EntityKey::Bridge(bridge.clone()),
            &[EventKind::MemberJoined, EventKind::MemberLeft],
        );
        Self {
            ctx,
            bridge,
            roster,
            events,
        }
    }

    /// Take over a bridge from its call controller, keeping its subscription.
    pub fn from_handoff(
        ctx: ControllerContext,
        bridge: BridgeId,
        roster: Roster,
        events: Subscription,
    ) -> Self {
        Self {
            ctx,
            bridge,
            roster,
            events,
        }
    }

    pub async fn run(mut self) -> ConferenceOutcome {
        loop {
            match self.events.recv().await {
                Some(GatewayEvent::MemberJoined { leg_id, members, .. }) => {
                    self.member_joined(&leg_id, members.len());
                }
                Some(GatewayEvent::MemberLeft { leg_id, members, .. }) => {
                    if self.member_left(&leg_id, members.len()).await {
                        return ConferenceOutcome::Emptied;
                    }
                }
                Some(other) => {
                    tracing::trace!("Ignoring {:?} on bridge {}", other.kind(), self.bridge);
                }
                None => {
                    self.ctx.registry.remove(&self.bridge);
                    self.events.cancel();
                    tracing::info!("Bridge {} went away; conference controller exiting", self.bridge);
                    return ConferenceOutcome::Closed;
                }
            }
        }
    }

    fn member_joined(&self, leg: &LegId, member_count: usize) {
        tracing::debug!(
            "Leg {} joined conference {} ({} members)",
            leg,
            self.bridge,
            member_count
        );
        if member_count != 1 || self.ctx.registry.contains(&self.bridge) {
            return;
        }
        // The switch is never fired for a conference; its listener is dropped.
        if self
            .ctx
            .registry
            .register(&self.bridge, BridgeMode::Conference, self.roster.clone())
            .is_some()
        {
            tracing::info!("Conference {} established", self.bridge);
        }
    }

    /// Returns `true` once the bridge is empty and has been deleted.
    async fn member_left(&mut self, departed: &LegId, member_count: usize) -> bool {
        let gateway = &self.ctx.gateway;
        tracing::info!(
            "Leg {} left conference {} ({} members remain)",
            departed,
            self.bridge,
            member_count
        );
        log_cleanup(
            "hang up leg",
            departed,
            gateway.hangup_leg(departed, HangupReason::Normal).await,
        );
        self.roster.remove(departed);

        if member_count > 0 {
            return false;
        }

        self.ctx.registry.remove(&self.bridge);
        self.events.cancel();
        log_cleanup("delete bridge", &self.bridge, gateway.delete_bridge(&self.bridge).await);
        tracing::info!("Conference {} ended", self.bridge);
        true
    }
}

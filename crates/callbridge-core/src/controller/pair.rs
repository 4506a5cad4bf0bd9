//! Pair Bridge Controller
//!
//! Governs a bridge dialed between exactly two legs. It registers the bridge
//! in call mode once both legs are in, tears the whole call down as soon as
//! either side leaves, and hands the bridge to a [`ConferenceController`] when
//! the bridge's mode switch fires. The handoff passes the live subscription
//! along, so no membership event is lost or seen twice.

use std::future::pending;

use crate::gateway::{EntityKey, EventKind, GatewayEvent, Subscription};
use crate::registry::ModeSwitchListener;
use crate::roster::Roster;
use crate::types::{BridgeId, BridgeMode, HangupReason, LegId};

use super::conference::ConferenceController;
use super::{log_cleanup, ControllerContext, ControllerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// Control passed to a conference controller.
    HandedOff,
    /// A member left; the call was torn down.
    TornDown,
    /// The bridge disappeared underneath the controller.
    Closed,
}

enum Step {
    Switch,
    Event(Option<GatewayEvent>),
}

pub struct PairController {
    ctx: ControllerContext,
    bridge: BridgeId,
    roster: Roster,
    events: Subscription,
    switch: Option<ModeSwitchListener>,
}

async fn switch_fired(switch: &mut Option<ModeSwitchListener>) {
    match switch {
        Some(listener) => listener.fired().await,
        None => pending().await,
    }
}

impl PairController {
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
            switch: None,
        }
    }

    pub async fn run(mut self) -> PairOutcome {
        loop {
            // The switch wins ties so a promoted bridge's next event is seen
            // by the conference controller.
            let step = tokio::select! {
                biased;
                _ = switch_fired(&mut self.switch) => Step::Switch,
                event = self.events.recv() => Step::Event(event),
            };

            match step {
                Step::Switch => {
                    self.hand_off();
                    return PairOutcome::HandedOff;
                }
                Step::Event(Some(GatewayEvent::MemberJoined { members, leg_id, .. })) => {
                    self.member_joined(&leg_id, members.len());
                }
                Step::Event(Some(GatewayEvent::MemberLeft { leg_id, members, .. })) => {
                    self.member_left(&leg_id, &members).await;
                    return PairOutcome::TornDown;
                }
                Step::Event(Some(other)) => {
                    tracing::trace!("Ignoring {:?} on bridge {}", other.kind(), self.bridge);
                }
                Step::Event(None) => {
                    self.ctx.registry.remove(&self.bridge);
                    self.events.cancel();
                    tracing::info!("Bridge {} went away; call controller exiting", self.bridge);
                    return PairOutcome::Closed;
                }
            }
        }
    }

    fn member_joined(&mut self, leg: &LegId, member_count: usize) {
        tracing::debug!("Leg {} joined bridge {} ({} members)", leg, self.bridge, member_count);
        if member_count != 2 || self.ctx.registry.contains(&self.bridge) {
            return;
        }
        if let Some(listener) =
            self.ctx
                .registry
                .register(&self.bridge, BridgeMode::Call, self.roster.clone())
        {
            tracing::info!("Call {} established", self.bridge);
            self.switch = Some(listener);
        }
    }

    async fn member_left(&mut self, departed: &LegId, members: &[LegId]) {
        let gateway = &self.ctx.gateway;
        tracing::info!("Leg {} left call {}; ending the call", departed, self.bridge);

        log_cleanup(
            "hang up leg",
            departed,
            gateway.hangup_leg(departed, HangupReason::Normal).await,
        );
        self.roster.remove(departed);

        match members {
            [] => {
                // The other party may still be ringing.
                for survivor in self.roster.take_all() {
                    log_cleanup(
                        "hang up leg",
                        &survivor,
                        gateway.hangup_leg(&survivor, HangupReason::Normal).await,
                    );
                }
            }
            [remaining] => {
                log_cleanup(
                    "remove leg from bridge",
                    remaining,
                    gateway.remove_leg_from_bridge(&self.bridge, remaining).await,
                );
                log_cleanup(
                    "hang up leg",
                    remaining,
                    gateway.hangup_leg(remaining, HangupReason::Normal).await,
                );
                self.roster.take_all();
            }
            _ => {
                tracing::warn!(
                    "Call {} still has {} members after a departure",
                    self.bridge,
                    members.len()
                );
            }
        }

        self.ctx.registry.remove(&self.bridge);
        self.events.cancel();
        log_cleanup("delete bridge", &self.bridge, gateway.delete_bridge(&self.bridge).await);
    }

    fn hand_off(self) {
        let PairController {
            ctx,
            bridge,
            roster,
            events,
            ..
        } = self;
        tracing::info!("Call {} promoted to conference", bridge);

        let conference = ConferenceController::from_handoff(ctx.clone(), bridge.clone(), roster, events);
        ctx.supervisor
            .spawn(ControllerKind::Conference, bridge.as_str(), async move {
                conference.run().await;
            });
    }
}

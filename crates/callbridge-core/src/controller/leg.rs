//! Leg Controller
//!
//! Watches one dialed leg until it either answers (then joins its bridge) or
//! hangs up before joining (then cleans up its share of the bridge). It
//! handles exactly one of those two events and exits; once the leg is a
//! bridge member its departure is the bridge controller's business.

use crate::gateway::{EntityKey, EventKind, GatewayEvent, Subscription};
use crate::roster::{Departure, Roster};
use crate::types::{BridgeId, HangupReason, LegId};

use super::{log_cleanup, ControllerContext};

/// How a leg controller finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegOutcome {
    /// Answered and added to the bridge.
    Joined,
    /// Answered after the bridge was torn down (or could not be joined); the leg was hung up.
    BridgeGone,
    /// Hung up before joining; bridge cleanup applied.
    HungUp(Departure),
    /// The leg's event stream ended (leg destroyed by someone else).
    Closed,
}

pub struct LegController {
    ctx: ControllerContext,
    leg: LegId,
    bridge: BridgeId,
    roster: Roster,
    events: Subscription,
}

impl LegController {
    /// Subscribes immediately so nothing emitted after construction is missed.
    pub fn new(ctx: ControllerContext, leg: LegId, bridge: BridgeId, roster: Roster) -> Self {
        let events = ctx.gateway.subscribe(
            EntityKey::Leg(leg.clone()),
            &[EventKind::LegStateChanged, EventKind::LegHangupRequested],
        );
        Self {
            ctx,
            leg,
            bridge,
            roster,
            events,
        }
    }

    pub async fn run(mut self) -> LegOutcome {
        let outcome = loop {
            match self.events.recv().await {
                Some(GatewayEvent::LegStateChanged { state, .. }) if state.is_answered() => {
                    break self.answer_and_join().await;
                }
                Some(GatewayEvent::LegStateChanged { state, .. }) => {
                    tracing::trace!("Leg {} is now {:?}", self.leg, state);
                }
                Some(GatewayEvent::LegHangupRequested { .. }) => {
                    break LegOutcome::HungUp(self.hangup_cleanup().await);
                }
                Some(other) => {
                    tracing::trace!("Ignoring {:?} on leg {}", other.kind(), self.leg);
                }
                None => break LegOutcome::Closed,
            }
        };
        self.events.cancel();
        tracing::debug!("Leg controller for {} finished: {:?}", self.leg, outcome);
        outcome
    }

    async fn answer_and_join(&mut self) -> LegOutcome {
        let gateway = &self.ctx.gateway;
        log_cleanup("answer leg", &self.leg, gateway.answer_leg(&self.leg).await);

        let joined = match gateway.bridge_members(&self.bridge).await {
            Ok(_) => gateway.add_leg_to_bridge(&self.bridge, &self.leg).await,
            Err(e) => Err(e),
        };
        match joined {
            Ok(()) => {
                tracing::info!("Leg {} answered and joined bridge {}", self.leg, self.bridge);
                LegOutcome::Joined
            }
            Err(e) => {
                tracing::info!(
                    "Leg {} answered but cannot join bridge {} ({}); hanging up",
                    self.leg,
                    self.bridge,
                    e
                );
                self.roster.remove(&self.leg);
                log_cleanup(
                    "hang up leg",
                    &self.leg,
                    gateway.hangup_leg(&self.leg, HangupReason::Normal).await,
                );
                LegOutcome::BridgeGone
            }
        }
    }

    async fn hangup_cleanup(&mut self) -> Departure {
        let mode = self
            .ctx
            .registry
            .lookup(&self.bridge)
            .unwrap_or_else(|| self.roster.composition());
        let departure = self.roster.depart(&self.leg, mode);
        tracing::info!(
            "Leg {} hung up before joining {} bridge {}: {:?}",
            self.leg,
            mode,
            self.bridge,
            departure
        );

        let gateway = &self.ctx.gateway;
        match &departure {
            Departure::Dropped { .. } => {}
            Departure::CascadeThenDestroy { other } => {
                log_cleanup(
                    "hang up leg",
                    other,
                    gateway.hangup_leg(other, HangupReason::Normal).await,
                );
                log_cleanup("delete bridge", &self.bridge, gateway.delete_bridge(&self.bridge).await);
            }
            Departure::Destroy => {
                log_cleanup("delete bridge", &self.bridge, gateway.delete_bridge(&self.bridge).await);
            }
        }
        departure
    }
}

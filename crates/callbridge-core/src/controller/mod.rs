//! Event-driven controllers
//!
//! One task per call leg ([`LegController`]) and one task per bridge, either
//! [`PairController`] while the bridge is a two-party call or
//! [`ConferenceController`] once it is a conference. Controllers never call
//! each other: they share only the [`CallRegistry`], the bridge's roster and
//! the mode-switch signal. Every controller owns its gateway subscription,
//! so the subscription is released on whichever path the controller exits.

pub mod conference;
pub mod leg;
pub mod pair;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::errors::GatewayError;
use crate::gateway::{GatewayResult, SignalingGateway};
use crate::registry::CallRegistry;

pub use conference::{ConferenceController, ConferenceOutcome};
pub use leg::{LegController, LegOutcome};
pub use pair::{PairController, PairOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControllerKind {
    Leg,
    Pair,
    Conference,
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerKind::Leg => write!(f, "leg"),
            ControllerKind::Pair => write!(f, "pair"),
            ControllerKind::Conference => write!(f, "conference"),
        }
    }
}

type ActiveMap = HashMap<(ControllerKind, String), usize>;

/// Spawns controller tasks and keeps track of which ones are still running.
#[derive(Clone, Default)]
pub struct Supervisor {
    tasks: Arc<Mutex<JoinSet<()>>>,
    active: Arc<Mutex<ActiveMap>>,
}

/// Marks a controller as running until dropped.
struct ActiveGuard {
    key: (ControllerKind, String),
    active: Arc<Mutex<ActiveMap>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                active.remove(&self.key);
            }
        }
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a controller for entity `id` inside a tracing span.
    pub fn spawn<F>(&self, kind: ControllerKind, id: &str, controller: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = (kind, id.to_string());
        *self.active.lock().entry(key.clone()).or_insert(0) += 1;
        let guard = ActiveGuard {
            key,
            active: self.active.clone(),
        };
        let span = tracing::info_span!("controller", kind = %kind, id = %id);

        let mut tasks = self.tasks.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(
            async move {
                let _guard = guard;
                controller.await;
            }
            .instrument(span),
        );
    }

    pub fn is_running(&self, kind: ControllerKind, id: &str) -> bool {
        self.active.lock().contains_key(&(kind, id.to_string()))
    }

    /// Running controllers, sorted.
    pub fn running(&self) -> Vec<(ControllerKind, String)> {
        let mut running: Vec<_> = self.active.lock().keys().cloned().collect();
        running.sort();
        running
    }

    /// Abort every controller task.
    pub fn abort_all(&self) {
        self.tasks.lock().abort_all();
    }
}

/// Everything a controller needs from the outside world.
#[derive(Clone)]
pub struct ControllerContext {
    pub gateway: Arc<dyn SignalingGateway>,
    pub registry: CallRegistry,
    pub supervisor: Supervisor,
}

impl ControllerContext {
    pub fn new(gateway: Arc<dyn SignalingGateway>, registry: CallRegistry) -> Self {
        Self {
            gateway,
            registry,
            supervisor: Supervisor::new(),
        }
    }
}

/// Log the result of a cleanup-path gateway call. Cleanup failures never
/// stop a controller: the event that triggered them has already happened.
pub(crate) fn log_cleanup(
    operation: &str,
    target: &(dyn fmt::Display + Sync),
    result: GatewayResult<()>,
) {
    match result {
        Ok(()) => {}
        // Legs and bridges routinely vanish under concurrent teardown.
        Err(e @ GatewayError::LegNotFound { .. }) | Err(e @ GatewayError::BridgeNotFound { .. }) => {
            tracing::debug!("{} {} skipped: {}", operation, target, e);
        }
        Err(e) => {
            tracing::warn!("{} {} failed: {}", operation, target, e);
        }
    }
}

//! Per-bridge roster of the legs dialed into it.
//!
//! The roster is shared by every leg controller of a bridge and by the
//! bridge's controller. It records the bridge's composition explicitly
//! instead of inferring call vs. conference from the list's shape, and all
//! reads and writes happen under its own lock.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::{BridgeMode, LegId};

/// What a leg that hung up before joining must do to the rest of its bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// Conference with legs remaining: nothing else to tear down.
    Dropped { remaining: usize },
    /// Two-party call: hang up the other leg, then delete the bridge.
    CascadeThenDestroy { other: LegId },
    /// Nobody left: delete the bridge.
    Destroy,
}

#[derive(Debug)]
struct RosterInner {
    composition: BridgeMode,
    legs: Vec<LegId>,
}

#[derive(Debug, Clone)]
pub struct Roster {
    inner: Arc<Mutex<RosterInner>>,
}

impl Roster {
    pub fn new(composition: BridgeMode) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RosterInner {
                composition,
                legs: Vec::new(),
            })),
        }
    }

    pub fn composition(&self) -> BridgeMode {
        self.inner.lock().composition
    }

    pub fn set_composition(&self, mode: BridgeMode) {
        self.inner.lock().composition = mode;
    }

    pub fn push(&self, leg: LegId) {
        let mut inner = self.inner.lock();
        if !inner.legs.contains(&leg) {
            inner.legs.push(leg);
        }
    }

    pub fn remove(&self, leg: &LegId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.legs.len();
        inner.legs.retain(|l| l != leg);
        inner.legs.len() != before
    }

    /// Empty the roster, returning what it held.
    pub fn take_all(&self) -> Vec<LegId> {
        std::mem::take(&mut self.inner.lock().legs)
    }

    pub fn legs(&self) -> Vec<LegId> {
        self.inner.lock().legs.clone()
    }

    pub fn contains(&self, leg: &LegId) -> bool {
        self.inner.lock().legs.contains(leg)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().legs.is_empty()
    }

    /// Remove `leg` after a hangup request and decide the cleanup for the
    /// rest of the bridge, given the bridge's current `mode`.
    pub fn depart(&self, leg: &LegId, mode: BridgeMode) -> Departure {
        let mut inner = self.inner.lock();
        inner.legs.retain(|l| l != leg);
        match mode {
            BridgeMode::Conference if !inner.legs.is_empty() => Departure::Dropped {
                remaining: inner.legs.len(),
            },
            BridgeMode::Conference => Departure::Destroy,
            BridgeMode::Call => {
                let mut others = std::mem::take(&mut inner.legs);
                match (others.pop(), others.is_empty()) {
                    (Some(other), true) => Departure::CascadeThenDestroy { other },
                    _ => Departure::Destroy,
                }
            }
        }
    }
}

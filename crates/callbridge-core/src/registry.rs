//! Call Registry
//!
//! Process-wide map from bridge id to the bridge's governance mode, its
//! one-shot mode-switch trigger and its roster. An entry exists exactly while
//! a bridge controller governs the bridge: the controller registers on the
//! first qualifying member-joined event and removes the entry when it exits.
//!
//! Every access goes through one lock. Check-and-insert (`register`) and
//! fire-and-retag (`promote`) are single critical sections so concurrent
//! controllers and orchestration calls cannot interleave inside them.

use std::collections::HashMap;
use std::future::pending;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::oneshot;

use crate::roster::Roster;
use crate::types::{BridgeId, BridgeMode};

/// Trigger side of the pair-to-conference handoff. Fires at most once.
#[derive(Debug)]
pub struct ModeSwitch {
    trigger: Option<oneshot::Sender<()>>,
}

impl ModeSwitch {
    pub fn new() -> (Self, ModeSwitchListener) {
        let (tx, rx) = oneshot::channel();
        (
            Self { trigger: Some(tx) },
            ModeSwitchListener { rx, done: false },
        )
    }

    /// Fire the switch. Returns `true` only if this call delivered it.
    pub fn fire(&mut self) -> bool {
        match self.trigger.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.trigger.is_none()
    }
}

/// Waiting side of the handoff, held by the pair controller.
#[derive(Debug)]
pub struct ModeSwitchListener {
    rx: oneshot::Receiver<()>,
    done: bool,
}

impl ModeSwitchListener {
    /// Resolves when the switch fires. Never resolves if the trigger was
    /// dropped unfired, or once it has already resolved.
    ///
    /// Cancel safe: usable as a `tokio::select!` branch.
    pub async fn fired(&mut self) {
        if self.done {
            return pending().await;
        }
        let outcome = (&mut self.rx).await;
        self.done = true;
        if outcome.is_err() {
            pending::<()>().await;
        }
    }
}

/// Outcome of [`CallRegistry::promote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// The bridge was in call mode; the switch fired and the entry now reads conference.
    Promoted,
    AlreadyConference,
    NotFound,
}

#[derive(Debug)]
struct RegistryEntry {
    mode: BridgeMode,
    switch: ModeSwitch,
    roster: Roster,
}

/// Shared registry of governed bridges.
///
/// Cloning yields another handle onto the same registry.
#[derive(Debug, Clone, Default)]
pub struct CallRegistry {
    entries: Arc<RwLock<HashMap<BridgeId, RegistryEntry>>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bridge` in `mode` unless it is already registered.
    ///
    /// Returns the listener for the new entry's mode-switch signal, or `None`
    /// if an entry already existed (the existing entry is left untouched).
    pub fn register(
        &self,
        bridge: &BridgeId,
        mode: BridgeMode,
        roster: Roster,
    ) -> Option<ModeSwitchListener> {
        let mut entries = self.entries.write();
        if entries.contains_key(bridge) {
            return None;
        }
        let (switch, listener) = ModeSwitch::new();
        roster.set_composition(mode);
        entries.insert(
            bridge.clone(),
            RegistryEntry {
                mode,
                switch,
                roster,
            },
        );
        tracing::debug!("Registered bridge {} in {} mode", bridge, mode);
        Some(listener)
    }

    pub fn lookup(&self, bridge: &BridgeId) -> Option<BridgeMode> {
        self.entries.read().get(bridge).map(|e| e.mode)
    }

    pub fn contains(&self, bridge: &BridgeId) -> bool {
        self.entries.read().contains_key(bridge)
    }

    /// Retag an entry without touching its switch. Returns `false` if absent.
    pub fn set_mode(&self, bridge: &BridgeId, mode: BridgeMode) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(bridge) {
            Some(entry) => {
                entry.mode = mode;
                entry.roster.set_composition(mode);
                true
            }
            None => false,
        }
    }

    /// Fire the bridge's mode switch and retag it as a conference, atomically.
    pub fn promote(&self, bridge: &BridgeId) -> Promotion {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(bridge) else {
            return Promotion::NotFound;
        };
        if entry.mode == BridgeMode::Conference {
            return Promotion::AlreadyConference;
        }
        if !entry.switch.fire() {
            tracing::warn!(
                "Mode switch for bridge {} was not delivered; its call controller is already exiting",
                bridge
            );
        }
        entry.mode = BridgeMode::Conference;
        entry.roster.set_composition(BridgeMode::Conference);
        Promotion::Promoted
    }

    /// Whether the bridge's mode switch has been consumed.
    pub fn has_switched(&self, bridge: &BridgeId) -> Option<bool> {
        self.entries.read().get(bridge).map(|e| e.switch.has_fired())
    }

    pub fn roster(&self, bridge: &BridgeId) -> Option<Roster> {
        self.entries.read().get(bridge).map(|e| e.roster.clone())
    }

    pub fn remove(&self, bridge: &BridgeId) -> Option<BridgeMode> {
        let removed = self.entries.write().remove(bridge).map(|e| e.mode);
        if removed.is_some() {
            tracing::debug!("Removed bridge {} from registry", bridge);
        }
        removed
    }

    /// Snapshot of all entries, ordered by bridge id.
    pub fn list(&self) -> Vec<(BridgeId, BridgeMode)> {
        let mut calls: Vec<(BridgeId, BridgeMode)> = self
            .entries
            .read()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.mode))
            .collect();
        calls.sort_by(|a, b| a.0.cmp(&b.0));
        calls
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry. Used at shutdown.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

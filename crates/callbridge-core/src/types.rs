//! Identifiers and value types shared by the registry, the controllers and
//! the signaling gateway.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identifier of a call leg, assigned by the signaling gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LegId(pub String);

impl LegId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a bridge.
///
/// Bridge ids are generated locally as short uppercase alphabetic tokens so
/// that an operator can read one off the `list` output and type it back into
/// `join`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BridgeId(pub String);

impl BridgeId {
    /// Default token length.
    pub const DEFAULT_LEN: usize = 4;

    /// Generate a random token of `len` uppercase ASCII letters.
    pub fn generate(len: usize) -> Self {
        let mut rng = rand::thread_rng();
        let token = (0..len.max(1))
            .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
            .collect();
        Self(token)
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Governance mode of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// Two-party call; either side hanging up ends it.
    Call,
    /// Multi-party conference; the last one out deletes the bridge.
    Conference,
}

impl BridgeMode {
    /// Composition a freshly dialed bridge starts with.
    pub fn for_party_count(parties: usize) -> Self {
        if parties == 2 {
            BridgeMode::Call
        } else {
            BridgeMode::Conference
        }
    }
}

impl fmt::Display for BridgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeMode::Call => write!(f, "call"),
            BridgeMode::Conference => write!(f, "conference"),
        }
    }
}

/// Bridge flavour requested from the gateway when a bridge is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeType {
    #[default]
    Mixing,
    Holding,
}

impl fmt::Display for BridgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeType::Mixing => write!(f, "mixing"),
            BridgeType::Holding => write!(f, "holding"),
        }
    }
}

/// A dialable endpoint, e.g. `PJSIP/1001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub technology: String,
    pub resource: String,
}

impl Endpoint {
    pub fn new(technology: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            technology: technology.into(),
            resource: resource.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.technology, self.resource)
    }
}

/// Registration state of an endpoint as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    Online,
    Offline,
}

impl EndpointState {
    pub fn is_reachable(&self) -> bool {
        matches!(self, EndpointState::Online)
    }
}

/// Channel state of a call leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegState {
    Down,
    Ringing,
    Up,
}

impl LegState {
    /// The far end has answered.
    pub fn is_answered(&self) -> bool {
        matches!(self, LegState::Up)
    }
}

/// Data the gateway keeps about a leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegData {
    pub id: LegId,
    pub endpoint: Endpoint,
    pub state: LegState,
    /// Participant label (account code) shown in listings.
    pub participant: String,
}

/// Why a leg is being hung up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HangupReason {
    #[default]
    Normal,
    /// The far end never answered before the ring timeout.
    NoAnswer,
}

impl fmt::Display for HangupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HangupReason::Normal => write!(f, "normal"),
            HangupReason::NoAnswer => write!(f, "noanswer"),
        }
    }
}

/// One line of the `list` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSummary {
    pub bridge_id: BridgeId,
    pub mode: BridgeMode,
    pub participants: Vec<String>,
}

impl fmt::Display for CallSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.bridge_id, self.participants.join(" "))
    }
}

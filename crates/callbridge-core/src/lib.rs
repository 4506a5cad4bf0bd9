//! # callbridge-core
//!
//! Coordinates live call legs into bridges on top of a telephony signaling
//! gateway: two-party calls, multi-party conferences, and the promotion of a
//! call into a conference when a third party is added.
//!
//! ## Architecture
//!
//! ```text
//!   dial / join / list                     (BridgeOrchestrator, caller's task)
//!          │ creates legs + bridges, spawns controllers
//!          ▼
//!   ┌──────────────┐   ┌────────────────┐   ┌──────────────────────┐
//!   │ LegController│   │ PairController │──▶│ ConferenceController │
//!   │  (per leg)   │   │ (2-party call) │   │ (after mode switch)  │
//!   └──────┬───────┘   └───────┬────────┘   └──────────┬───────────┘
//!          │                   │                       │
//!          └──────── CallRegistry + Roster (locked) ───┘
//!                              │
//!                     SignalingGateway (events, legs, bridges)
//! ```
//!
//! Controllers run as independent tasks. They share only the registry, the
//! bridge roster and the one-shot mode-switch signal; each owns its event
//! subscription and releases it on every exit path.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use callbridge_core::{BridgeConfig, BridgeOrchestrator, SimulatedGateway, SimulatedGatewayConfig};
//!
//! # async fn example() -> callbridge_core::Result<()> {
//! let gateway = Arc::new(SimulatedGateway::new(
//!     SimulatedGatewayConfig::new().with_online(["1001", "1002", "1003"]),
//! ));
//! let orchestrator = BridgeOrchestrator::new(gateway, BridgeConfig::default());
//!
//! let call = orchestrator.dial(&["1001".into(), "1002".into()]).await?;
//! // ... once both legs have answered:
//! orchestrator.join(call.as_str(), &["1003".into()]).await?;
//! for summary in orchestrator.list().await? {
//!     println!("{}", summary);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod errors;
pub mod gateway;
pub mod orchestrator;
pub mod registry;
pub mod roster;
pub mod types;

pub use config::BridgeConfig;
pub use controller::{ControllerKind, Supervisor};
pub use errors::{BridgeError, GatewayError, Result};
pub use gateway::{
    AnswerBehavior, EntityKey, EventKind, GatewayEvent, GatewayOperation, GatewayStats,
    SignalingGateway, SimulatedEndpoint, SimulatedGateway, SimulatedGatewayConfig, Subscription,
};
pub use orchestrator::BridgeOrchestrator;
pub use registry::{CallRegistry, ModeSwitch, ModeSwitchListener, Promotion};
pub use roster::{Departure, Roster};
pub use types::{
    BridgeId, BridgeMode, BridgeType, CallSummary, Endpoint, EndpointState, HangupReason, LegData,
    LegId, LegState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Orchestration configuration
//!
//! ```rust
//! use callbridge_core::BridgeConfig;
//! use std::time::Duration;
//!
//! let config = BridgeConfig::new()
//!     .with_app_name("myStasisApp")
//!     .with_ring_timeout(Duration::from_secs(20));
//!
//! assert_eq!(config.technology, "PJSIP");
//! assert_eq!(config.ring_timeout(), Duration::from_secs(20));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{BridgeId, BridgeType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Stasis application that owns created legs.
    pub app_name: String,
    /// Channel technology prefixed to every dialed extension.
    pub technology: String,
    /// How long a dialed leg may ring before the attempt is abandoned.
    pub ring_timeout_ms: u64,
    pub bridge_type: BridgeType,
    /// Length of generated bridge ids.
    pub bridge_id_len: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            app_name: "callbridge".to_string(),
            technology: "PJSIP".to_string(),
            ring_timeout_ms: 30_000,
            bridge_type: BridgeType::Mixing,
            bridge_id_len: BridgeId::DEFAULT_LEN,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn with_technology(mut self, technology: impl Into<String>) -> Self {
        self.technology = technology.into();
        self
    }

    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_bridge_id_len(mut self, len: usize) -> Self {
        self.bridge_id_len = len;
        self
    }

    pub fn ring_timeout(&self) -> Duration {
        Duration::from_millis(self.ring_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.app_name, "callbridge");
        assert_eq!(config.ring_timeout(), Duration::from_secs(30));
        assert_eq!(config.bridge_type, BridgeType::Mixing);
        assert_eq!(config.bridge_id_len, 4);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            app_name = "myStasisApp"
            ring_timeout_ms = 15000
            "#,
        )
        .unwrap();
        assert_eq!(config.app_name, "myStasisApp");
        assert_eq!(config.ring_timeout(), Duration::from_secs(15));
        assert_eq!(config.technology, "PJSIP");
        assert_eq!(config.bridge_type, BridgeType::Mixing);
    }

    #[test]
    fn test_holding_bridge_type() {
        let config: BridgeConfig = toml::from_str(r#"bridge_type = "holding""#).unwrap();
        assert_eq!(config.bridge_type, BridgeType::Holding);
        assert_eq!(config.bridge_type.to_string(), "holding");
    }

    #[test]
    fn test_builder() {
        let config = BridgeConfig::new()
            .with_technology("SIP")
            .with_bridge_id_len(6);
        assert_eq!(config.technology, "SIP");
        assert_eq!(config.bridge_id_len, 6);
    }
}

//! CLI configuration
//!
//! Values come from an optional TOML file and are then overridden by command
//! line flags or their `CALLBRIDGE_*` environment variables.
//!
//! ```toml
//! [log]
//! level = "debug"
//! json = false
//!
//! [bridge]
//! app_name = "myStasisApp"
//! ring_timeout_ms = 30000
//!
//! [[gateway.endpoints]]
//! resource = "1001"
//! label = "alice"
//! answer = { after_millis = 800 }
//!
//! [[gateway.endpoints]]
//! resource = "1002"
//! state = "offline"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use callbridge_core::{BridgeConfig, SimulatedEndpoint, SimulatedGatewayConfig};
use clap::Parser;
use serde::Deserialize;

use crate::logging::{parse_log_level, LoggingConfig};

/// Extensions available when no endpoints are configured.
const DEMO_EXTENSIONS: [&str; 4] = ["1001", "1002", "1003", "1004"];

/// Interactive call and conference bridging
#[derive(Parser, Debug)]
#[command(name = "callbridge")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "CALLBRIDGE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CALLBRIDGE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "CALLBRIDGE_JSON_LOGS")]
    pub json_logs: bool,

    /// Stasis application owning created legs
    #[arg(long, env = "CALLBRIDGE_APP_NAME")]
    pub app_name: Option<String>,

    /// How long a dialed extension may ring, in milliseconds
    #[arg(long, env = "CALLBRIDGE_RING_TIMEOUT_MS")]
    pub ring_timeout_ms: Option<u64>,

    /// Online extensions of the simulated gateway (comma separated)
    #[arg(long = "endpoint", env = "CALLBRIDGE_ENDPOINTS", value_delimiter = ',')]
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
    pub spans: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
            spans: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub log: LogSettings,
    pub bridge: BridgeConfig,
    pub gateway: SimulatedGatewayConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log: LogSettings::default(),
            bridge: BridgeConfig::default(),
            gateway: SimulatedGatewayConfig::new().with_online(DEMO_EXTENSIONS),
        }
    }
}

impl CliConfig {
    /// Read the configuration file if one was given, else start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml_str(&text)
                    .with_context(|| format!("Invalid config file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply command line / environment overrides.
    pub fn with_overrides(mut self, args: &Args) -> Self {
        if let Some(level) = &args.log_level {
            self.log.level = level.clone();
        }
        if args.json_logs {
            self.log.json = true;
        }
        if let Some(app_name) = &args.app_name {
            self.bridge.app_name = app_name.clone();
        }
        if let Some(ms) = args.ring_timeout_ms {
            self.bridge.ring_timeout_ms = ms;
        }
        if !args.endpoints.is_empty() {
            self.gateway.endpoints = args
                .endpoints
                .iter()
                .map(|resource| SimulatedEndpoint::online(resource.trim()))
                .collect();
        }
        self
    }

    pub fn logging_config(&self) -> Result<LoggingConfig> {
        let mut config = LoggingConfig::new(parse_log_level(&self.log.level)?);
        if self.log.json {
            config = config.with_json();
        }
        if self.log.file_info {
            config = config.with_file_info();
        }
        if self.log.spans {
            config = config.with_spans();
        }
        Ok(config)
    }

    /// Gateway configuration; endpoints use the bridge's technology.
    pub fn gateway_config(&self) -> SimulatedGatewayConfig {
        self.gateway
            .clone()
            .with_technology(self.bridge.technology.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_core::{AnswerBehavior, EndpointState};
    use serial_test::serial;

    const ENV_VARS: [&str; 6] = [
        "CALLBRIDGE_CONFIG",
        "CALLBRIDGE_LOG_LEVEL",
        "CALLBRIDGE_JSON_LOGS",
        "CALLBRIDGE_APP_NAME",
        "CALLBRIDGE_RING_TIMEOUT_MS",
        "CALLBRIDGE_ENDPOINTS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults_offer_demo_extensions() {
        let config = CliConfig::default();
        assert_eq!(config.gateway.endpoints.len(), DEMO_EXTENSIONS.len());
        assert_eq!(config.bridge.technology, "PJSIP");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_from_toml() {
        let config = CliConfig::from_toml_str(
            r#"
            [log]
            level = "debug"

            [bridge]
            app_name = "myStasisApp"

            [[gateway.endpoints]]
            resource = "1001"
            label = "alice"
            answer = { after_millis = 800 }

            [[gateway.endpoints]]
            resource = "1002"
            state = "offline"
            "#,
        )
        .unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.bridge.app_name, "myStasisApp");
        assert_eq!(config.bridge.ring_timeout_ms, 30_000);
        assert_eq!(config.gateway.endpoints.len(), 2);
        assert_eq!(config.gateway.endpoints[0].label.as_deref(), Some("alice"));
        assert_eq!(config.gateway.endpoints[0].answer, AnswerBehavior::AfterMillis(800));
        assert_eq!(config.gateway.endpoints[1].state, EndpointState::Offline);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(CliConfig::from_toml_str("[bridge]\nring_timeout_ms = \"soon\"").is_err());
    }

    #[test]
    #[serial]
    fn test_flags_override_file() {
        clear_env();
        let args = Args::parse_from([
            "callbridge",
            "--log-level",
            "warn",
            "--ring-timeout-ms",
            "5000",
            "--endpoint",
            "2001,2002",
        ]);
        let config = CliConfig::default().with_overrides(&args);
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.bridge.ring_timeout_ms, 5000);
        let resources: Vec<_> = config
            .gateway
            .endpoints
            .iter()
            .map(|e| e.resource.as_str())
            .collect();
        assert_eq!(resources, vec!["2001", "2002"]);
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        clear_env();
        std::env::set_var("CALLBRIDGE_APP_NAME", "fromEnv");
        std::env::set_var("CALLBRIDGE_ENDPOINTS", "3001,3002");
        let args = Args::parse_from(["callbridge"]);
        clear_env();

        let config = CliConfig::default().with_overrides(&args);
        assert_eq!(config.bridge.app_name, "fromEnv");
        assert_eq!(config.gateway.endpoints.len(), 2);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_bad_log_level() {
        let mut config = CliConfig::default();
        config.log.level = "chatty".to_string();
        assert!(config.logging_config().is_err());
    }

    #[test]
    fn test_gateway_follows_bridge_technology() {
        let mut config = CliConfig::default();
        config.bridge.technology = "SIP".to_string();
        assert_eq!(config.gateway_config().technology, "SIP");
    }
}

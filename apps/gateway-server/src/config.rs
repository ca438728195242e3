//! Server configuration.
//!
//! Loads `mqtt.json` and applies the environment variable overrides named
//! in the gateway's external-interface contract.

use std::path::Path;

use anyhow::{Context, Result};
use gateway_core::state::{Config as CoreConfig, LiveKitConfig, MqttBrokerConfig};
use serde::Deserialize;

/// On-disk shape of `mqtt.json`. Mirrors [`CoreConfig`] minus the fields
/// that only ever come from the environment (`UDP_PORT`, `PUBLIC_IP`,
/// `MANAGER_API_URL`, `MEDIA_API_BASE`, `CEREBRIUM_API_TOKEN`).
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub livekit: LiveKitConfig,
    pub mqtt_broker: MqttBrokerConfig,
    #[serde(default)]
    pub debug: bool,
}

impl ServerConfig {
    /// Loads `mqtt.json` from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Merges this file-sourced config with environment variable overrides
    /// into the core library's [`CoreConfig`].
    ///
    /// `CEREBRIUM_API_TOKEN` absence is deferred to [`CoreConfig::validate`]
    /// rather than treated as fatal here, so callers get one consistent
    /// error path for every missing-required-value case.
    pub fn to_core_config(&self) -> CoreConfig {
        CoreConfig {
            livekit: self.livekit.clone(),
            mqtt_broker: MqttBrokerConfig {
                protocol: self.mqtt_broker.protocol.clone(),
                host: self.mqtt_broker.host.clone(),
                port: self.mqtt_broker.port,
                keepalive: self.mqtt_broker.keepalive,
                clean: self.mqtt_broker.clean,
                reconnect_period_ms: self.mqtt_broker.reconnect_period_ms,
                connect_timeout_ms: self.mqtt_broker.connect_timeout_ms,
            },
            debug: env_bool("GATEWAY_DEBUG").unwrap_or(self.debug),
            udp_port: env_parsed("UDP_PORT").unwrap_or(1883),
            public_ip: std::env::var("PUBLIC_IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            manager_api_url: std::env::var("MANAGER_API_URL").unwrap_or_default(),
            media_api_base: std::env::var("MEDIA_API_BASE").unwrap_or_default(),
            cerebrium_api_token: std::env::var("CEREBRIUM_API_TOKEN").unwrap_or_default(),
            audio_stuck_timeout_secs: env_parsed("AUDIO_STUCK_TIMEOUT_SECS")
                .unwrap_or(gateway_core::protocol_constants::AUDIO_STUCK_TIMEOUT_SECS),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    env_parsed::<String>(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

//! Gateway-wide configuration.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// LiveKit server credentials, as loaded from `mqtt.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Broker connection parameters, as loaded from `mqtt.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttBrokerConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_keepalive")]
    pub keepalive: u16,
    #[serde(default)]
    pub clean: bool,
    #[serde(default = "default_reconnect_period_ms")]
    pub reconnect_period_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_keepalive() -> u16 {
    60
}

fn default_reconnect_period_ms() -> u64 {
    1_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

/// Top-level gateway configuration, assembled from `mqtt.json` and
/// environment variable overrides by the binary crate's config loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub livekit: LiveKitConfig,
    pub mqtt_broker: MqttBrokerConfig,
    #[serde(default)]
    pub debug: bool,

    /// Datagram listen port. `UDP_PORT`, default 1883.
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    /// Advertised UDP endpoint. `PUBLIC_IP`, default `127.0.0.1`.
    #[serde(default = "default_public_ip")]
    pub public_ip: String,
    /// DeviceDirectory base URL. `MANAGER_API_URL`.
    pub manager_api_url: String,
    /// Media back-end base URL. `MEDIA_API_BASE`.
    pub media_api_base: String,
    /// Bearer token for the media back-end. `CEREBRIUM_API_TOKEN`, required.
    pub cerebrium_api_token: String,

    /// Tunable cap on how long `audioPlayingStartTime` may remain set
    /// before being treated as stuck, seconds. Defaults to
    /// [`crate::protocol_constants::AUDIO_STUCK_TIMEOUT_SECS`].
    #[serde(default = "default_audio_stuck_timeout_secs")]
    pub audio_stuck_timeout_secs: u64,

    /// Production default: suppress `user_input_transcribed` events where
    /// `is_final` is false rather than forwarding every intermediate partial
    /// as `stt` to the device.
    #[serde(default = "default_suppress_partial_transcripts")]
    pub suppress_partial_transcripts: bool,
}

fn default_udp_port() -> u16 {
    1883
}

fn default_public_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_audio_stuck_timeout_secs() -> u64 {
    crate::protocol_constants::AUDIO_STUCK_TIMEOUT_SECS
}

fn default_suppress_partial_transcripts() -> bool {
    true
}

impl Config {
    /// Validates required fields are non-empty. Called once at startup;
    /// an empty `cerebrium_api_token` is a fatal [`GatewayError::ConfigMissing`].
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.cerebrium_api_token.is_empty() {
            return Err(GatewayError::ConfigMissing("CEREBRIUM_API_TOKEN".to_string()));
        }
        if self.livekit.url.is_empty() {
            return Err(GatewayError::ConfigMissing("livekit.url".to_string()));
        }
        if self.livekit.api_key.is_empty() || self.livekit.api_secret.is_empty() {
            return Err(GatewayError::ConfigMissing("livekit.api_key/api_secret".to_string()));
        }
        if self.manager_api_url.is_empty() {
            return Err(GatewayError::ConfigMissing("MANAGER_API_URL".to_string()));
        }
        if self.media_api_base.is_empty() {
            return Err(GatewayError::ConfigMissing("MEDIA_API_BASE".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(token: &str) -> Config {
        Config {
            livekit: LiveKitConfig {
                url: "wss://example.livekit.cloud".to_string(),
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
            },
            mqtt_broker: MqttBrokerConfig {
                protocol: "mqtt".to_string(),
                host: "localhost".to_string(),
                port: 1883,
                keepalive: default_keepalive(),
                clean: true,
                reconnect_period_ms: default_reconnect_period_ms(),
                connect_timeout_ms: default_connect_timeout_ms(),
            },
            debug: false,
            udp_port: default_udp_port(),
            public_ip: default_public_ip(),
            manager_api_url: "https://manager.example".to_string(),
            media_api_base: "https://media.example".to_string(),
            cerebrium_api_token: token.to_string(),
            audio_stuck_timeout_secs: default_audio_stuck_timeout_secs(),
            suppress_partial_transcripts: default_suppress_partial_transcripts(),
        }
    }

    #[test]
    fn rejects_missing_token() {
        assert!(sample("").validate().is_err());
    }

    #[test]
    fn accepts_complete_config() {
        assert!(sample("tok").validate().is_ok());
    }
}

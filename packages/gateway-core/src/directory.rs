//! HTTP client for the device-profile directory (mode, listening mode,
//! character, and playlists per device).

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i32,
    data: T,
}

/// Thin wrapper over the device directory's REST surface. One instance is
/// shared across all sessions.
pub struct DeviceDirectory {
    client: Client,
    base_url: String,
    bearer_token: String,
}

impl DeviceDirectory {
    pub fn new(base_url: String, bearer_token: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");
        Self { client, base_url, bearer_token }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.bearer_token)
    }

    pub async fn get_mode(&self, mac: &str) -> GatewayResult<String> {
        let url = format!("{}/toy/device/{}/mode", self.base_url, mac);
        let envelope: Envelope<String> =
            self.authed(self.client.get(&url)).send().await?.json().await?;
        Ok(envelope.data)
    }

    pub async fn get_listening_mode(&self, mac: &str) -> GatewayResult<String> {
        let url = format!("{}/toy/device/{}/device-mode", self.base_url, mac);
        let envelope: Envelope<String> =
            self.authed(self.client.get(&url)).send().await?.json().await?;
        Ok(envelope.data)
    }

    pub async fn get_current_character(&self, mac: &str) -> GatewayResult<String> {
        let url = format!("{}/toy/agent/device/{}/current-character", self.base_url, mac);
        let envelope: Envelope<String> =
            self.authed(self.client.get(&url)).send().await?.json().await?;
        Ok(envelope.data)
    }

    /// Cycles the device to its next mode, returning `(old_mode, new_mode)`.
    pub async fn cycle_mode(&self, mac: &str) -> GatewayResult<(String, String)> {
        let url = format!("{}/toy/device/{}/cycle-mode", self.base_url, mac);
        let envelope: Envelope<CycleModeData> =
            self.authed(self.client.post(&url)).send().await?.json().await?;
        Ok((envelope.data.old_mode, envelope.data.new_mode))
    }

    pub async fn cycle_character(&self, mac: &str) -> GatewayResult<String> {
        let url = format!("{}/toy/agent/device/{}/cycle-character", self.base_url, mac);
        let envelope: Envelope<CharacterData> =
            self.authed(self.client.post(&url)).send().await?.json().await?;
        Ok(envelope.data.new_character)
    }

    pub async fn set_character(&self, mac: &str, character: &str) -> GatewayResult<String> {
        let url = format!("{}/toy/agent/device/{}/set-character", self.base_url, mac);
        let envelope: Envelope<CharacterData> = self
            .authed(self.client.post(&url))
            .json(&serde_json::json!({ "character": character }))
            .send()
            .await?
            .json()
            .await?;
        Ok(envelope.data.new_character)
    }

    pub async fn get_playlist(&self, mac: &str, mode: &str) -> GatewayResult<Vec<Value>> {
        let url = format!("{}/toy/device/{}/playlist/{}", self.base_url, mac, mode);
        let envelope: Envelope<Vec<Value>> =
            self.authed(self.client.get(&url)).send().await?.json().await?;
        Ok(envelope.data)
    }
}

#[derive(Debug, Deserialize)]
struct CycleModeData {
    #[allow(dead_code)]
    success: bool,
    #[serde(rename = "newMode")]
    new_mode: String,
    #[serde(rename = "oldMode")]
    old_mode: String,
}

#[derive(Debug, Deserialize)]
struct CharacterData {
    #[serde(alias = "character", alias = "newCharacter")]
    new_character: String,
}

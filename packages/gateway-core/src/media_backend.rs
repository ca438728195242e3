//! HTTP client for the music/story playback back-end that runs inside each
//! room alongside the agent.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::GatewayResult;

/// `music` or `story`, matching the back-end's `<mode>-bot` route segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotMode {
    Music,
    Story,
}

impl BotMode {
    fn as_str(self) -> &'static str {
        match self {
            BotMode::Music => "music",
            BotMode::Story => "story",
        }
    }
}

/// Transport control sent to a running bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotTransportAction {
    Start,
    Next,
    Previous,
    Stop,
    Pause,
    Resume,
}

impl BotTransportAction {
    fn as_str(self) -> &'static str {
        match self {
            BotTransportAction::Start => "start",
            BotTransportAction::Next => "next",
            BotTransportAction::Previous => "previous",
            BotTransportAction::Stop => "stop",
            BotTransportAction::Pause => "pause",
            BotTransportAction::Resume => "resume",
        }
    }
}

/// Thin wrapper over the media back-end's bot-control REST surface.
pub struct MediaBackendClient {
    client: Client,
    base_url: String,
    bearer_token: String,
}

impl MediaBackendClient {
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

    pub async fn start_music_bot(
        &self,
        room_name: &str,
        device_mac: &str,
        language: &str,
        playlist: &[Value],
    ) -> GatewayResult<()> {
        let url = format!("{}/start-music-bot", self.base_url);
        self.authed(self.client.post(&url))
            .json(&serde_json::json!({
                "room_name": room_name,
                "device_mac": device_mac,
                "language": language,
                "playlist": playlist,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn start_story_bot(
        &self,
        room_name: &str,
        device_mac: &str,
        age_group: &str,
        playlist: &[Value],
    ) -> GatewayResult<()> {
        let url = format!("{}/start-story-bot", self.base_url);
        self.authed(self.client.post(&url))
            .json(&serde_json::json!({
                "room_name": room_name,
                "device_mac": device_mac,
                "age_group": age_group,
                "playlist": playlist,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn transport(
        &self,
        mode: BotMode,
        room_name: &str,
        action: BotTransportAction,
    ) -> GatewayResult<()> {
        let url = format!("{}/{}-bot/{}/{}", self.base_url, mode.as_str(), room_name, action.as_str());
        self.authed(self.client.post(&url)).send().await?.error_for_status()?;
        Ok(())
    }

    pub async fn stop_bot(&self, room_name: &str) -> GatewayResult<()> {
        let url = format!("{}/stop-bot", self.base_url);
        self.authed(self.client.post(&url))
            .json(&serde_json::json!({ "room_name": room_name }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

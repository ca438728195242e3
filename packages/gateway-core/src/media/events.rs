//! Data-channel event shapes published by the remote agent.

use serde::Deserialize;
use serde_json::Value;

/// JSON messages the agent sends on the reliable data channel, keyed on
/// `type`. Unrecognized shapes are logged and dropped by the caller.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    AgentStateChanged { old_state: String, new_state: String },
    UserInputTranscribed { text: String, is_final: bool },
    SpeechCreated { text: String },
    DeviceControl { action: String, params: Value },
    FunctionCall { name: String, arguments: Value },
    MobileMusicRequest { query: Value },
    Llm { text: String, emotion: Option<String> },
    MusicPlaybackStopped,
}

impl AgentEvent {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(raw).ok()?;
        let type_name = value.get("type")?.as_str()?;

        Some(match type_name {
            "agent_state_changed" => AgentEvent::AgentStateChanged {
                old_state: value.get("old_state")?.as_str()?.to_string(),
                new_state: value.get("new_state")?.as_str()?.to_string(),
            },
            "user_input_transcribed" => AgentEvent::UserInputTranscribed {
                text: value.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
                // Agents that don't distinguish partials (e.g. older firmware) omit
                // `is_final` entirely; treat the event as final so it isn't silently
                // swallowed by the partial-suppression default.
                is_final: value.get("is_final").and_then(Value::as_bool).unwrap_or(true),
            },
            "speech_created" => AgentEvent::SpeechCreated {
                text: value.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
            },
            "device_control" => AgentEvent::DeviceControl {
                action: value.get("action")?.as_str()?.to_string(),
                params: value.clone(),
            },
            "function_call" => {
                let call = value.get("function_call")?;
                AgentEvent::FunctionCall {
                    name: call.get("name")?.as_str()?.to_string(),
                    arguments: call.get("arguments").cloned().unwrap_or(Value::Null),
                }
            }
            "mobile_music_request" => AgentEvent::MobileMusicRequest { query: value.clone() },
            "llm" => AgentEvent::Llm {
                text: value.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
                emotion: value.get("emotion").and_then(Value::as_str).map(str::to_string),
            },
            "music_playback_stopped" => AgentEvent::MusicPlaybackStopped,
            _ => return None,
        })
    }
}

/// Outbound-to-agent control envelope, e.g. `disconnect_agent`.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentCommand {
    #[serde(rename = "type")]
    pub kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_agent_state_changed() {
        let raw = json!({"type": "agent_state_changed", "old_state": "speaking", "new_state": "listening"}).to_string();
        let event = AgentEvent::parse(raw.as_bytes()).unwrap();
        assert!(matches!(event, AgentEvent::AgentStateChanged { .. }));
    }

    #[test]
    fn parses_function_call() {
        let raw = json!({"type": "function_call", "function_call": {"name": "play_music", "arguments": {}}}).to_string();
        let event = AgentEvent::parse(raw.as_bytes()).unwrap();
        assert!(matches!(event, AgentEvent::FunctionCall { name, .. } if name == "play_music"));
    }

    #[test]
    fn unrecognized_type_returns_none() {
        let raw = json!({"type": "something_else"}).to_string();
        assert!(AgentEvent::parse(raw.as_bytes()).is_none());
    }
}

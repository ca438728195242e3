//! Inner control-message payload shapes carried over the broker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `state` values for `listen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenState {
    Start,
    Stop,
}

/// `mode` values for `listen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenMode {
    Manual,
    Auto,
}

/// `action` values for `playback_control`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackAction {
    Next,
    Previous,
    StartAgent,
}

/// A device → gateway control message, keyed on the inner `type` field.
#[derive(Debug, Clone)]
pub enum DeviceMessage {
    Hello {
        version: u32,
        audio_params: Value,
        features: Value,
        language: Option<String>,
        /// `group@@@mac@@@uuid`, parsed by the caller into a [`crate::device::ClientId`].
        client_id: Option<String>,
    },
    Goodbye { session_id: String },
    Abort { session_id: String },
    Listen { session_id: String, state: ListenState, mode: ListenMode },
    ModeChange { session_id: String },
    CharacterChange { session_id: String, character_name: Option<String> },
    SetListeningMode { session_id: String },
    PlaybackControl { session_id: String, action: PlaybackAction },
    FunctionCall { session_id: String, function_call: Value, source: Option<String> },
    Mcp { session_id: String, payload: Value, request_id: Option<String> },
    StartGreeting { session_id: String },
    /// Recognized `type` but a shape the gateway doesn't otherwise model;
    /// logged and dropped by the caller.
    Unknown { type_name: String },
}

impl DeviceMessage {
    /// Parses a raw inner payload (already stripped of the firehose
    /// envelope) into a typed message. Unknown `type` values are logged and
    /// dropped at the call site, not here, so parsing never fails outright.
    pub fn parse(value: &Value) -> Option<Self> {
        let type_name = value.get("type")?.as_str()?.to_string();
        let session_id = || value.get("session_id").and_then(Value::as_str).unwrap_or_default().to_string();

        Some(match type_name.as_str() {
            "hello" => DeviceMessage::Hello {
                version: value.get("version").and_then(Value::as_u64).unwrap_or(0) as u32,
                audio_params: value.get("audio_params").cloned().unwrap_or(Value::Null),
                features: value.get("features").cloned().unwrap_or(Value::Null),
                language: value.get("language").and_then(Value::as_str).map(str::to_string),
                client_id: value.get("client_id").and_then(Value::as_str).map(str::to_string),
            },
            "goodbye" => DeviceMessage::Goodbye { session_id: session_id() },
            "abort" => DeviceMessage::Abort { session_id: session_id() },
            "listen" => {
                let state = serde_json::from_value(value.get("state")?.clone()).ok()?;
                let mode = serde_json::from_value(value.get("mode")?.clone()).ok()?;
                DeviceMessage::Listen { session_id: session_id(), state, mode }
            }
            "mode-change" => DeviceMessage::ModeChange { session_id: session_id() },
            "character-change" => DeviceMessage::CharacterChange {
                session_id: session_id(),
                character_name: value.get("characterName").and_then(Value::as_str).map(str::to_string),
            },
            "set_listening_mode" => DeviceMessage::SetListeningMode { session_id: session_id() },
            "playback_control" => {
                let action = serde_json::from_value(value.get("action")?.clone()).ok()?;
                DeviceMessage::PlaybackControl { session_id: session_id(), action }
            }
            "function_call" => DeviceMessage::FunctionCall {
                session_id: session_id(),
                function_call: value.get("function_call").cloned().unwrap_or(Value::Null),
                source: value.get("source").and_then(Value::as_str).map(str::to_string),
            },
            "mcp" => DeviceMessage::Mcp {
                session_id: session_id(),
                payload: value.get("payload").cloned().unwrap_or(Value::Null),
                request_id: value.get("request_id").and_then(Value::as_str).map(str::to_string),
            },
            "start_greeting" => DeviceMessage::StartGreeting { session_id: session_id() },
            other => DeviceMessage::Unknown { type_name: other.to_string() },
        })
    }
}

/// The internal firehose envelope republished on `internal/server-ingest`.
///
/// `orginal_payload` preserves a legacy misspelling from the upstream wire
/// contract; renaming it would silently break interop with whatever
/// already publishes on that topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirehoseEnvelope {
    pub sender_client_id: String,
    pub orginal_payload: Value,
}

/// Reason codes carried on gateway → device `goodbye` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoodbyeReason {
    InactivityTimeout,
    EndPromptTimeout,
    ModeChange,
    CharacterChange,
    SessionMaxDuration,
    /// Process-wide shutdown, not a per-session transition. Not part of
    /// the per-device state machine's own reason set, but sessions still
    /// need a real reason code to close against on process exit.
    GatewayShutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_hello() {
        let raw = json!({"type": "hello", "session_id": "s1", "version": 3, "audio_params": {}, "features": {}});
        let msg = DeviceMessage::parse(&raw).unwrap();
        assert!(matches!(msg, DeviceMessage::Hello { version: 3, .. }));
    }

    #[test]
    fn parses_listen() {
        let raw = json!({"type": "listen", "session_id": "s1", "state": "start", "mode": "auto"});
        let msg = DeviceMessage::parse(&raw).unwrap();
        assert!(matches!(
            msg,
            DeviceMessage::Listen { state: ListenState::Start, mode: ListenMode::Auto, .. }
        ));
    }

    #[test]
    fn unknown_type_is_tagged_not_rejected() {
        let raw = json!({"type": "frobnicate", "session_id": "s1"});
        let msg = DeviceMessage::parse(&raw).unwrap();
        assert!(matches!(msg, DeviceMessage::Unknown { .. }));
    }

    #[test]
    fn firehose_envelope_keeps_legacy_field_name() {
        let raw = json!({"sender_client_id": "c1", "orginal_payload": {"type": "hello"}});
        let env: FirehoseEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(env.sender_client_id, "c1");
    }
}

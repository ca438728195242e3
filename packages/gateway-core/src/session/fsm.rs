//! The session finite-state machine (§4.9): one `SessionFsm` is shared by
//! the gateway and drives every live session's transitions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};

use crate::control::{ControlBus, DeviceMessage, GoodbyeReason, PlaybackAction};
use crate::device::{ClientId, Mac};
use crate::directory::DeviceDirectory;
use crate::error::GatewayResult;
use crate::mcp::{tool_name_for_function, DeviceChannel, McpCoordinator, McpVolumeDevice, VolumeAction, VolumeDebouncer};
use crate::media::{AgentEvent, AgentEventSink, MediaBridge, OutboundAudioSink, RoomService};
use crate::media_backend::{BotMode, BotTransportAction, MediaBackendClient};
use crate::protocol_constants::{
    AGENT_JOIN_TIMEOUT_SECS, END_PROMPT_TIMEOUT_SECS,
    GOODBYE_CLOSE_DELAY_MS, INACTIVITY_TIMEOUT_SECS, MAX_SESSION_DURATION_SECS,
    MCP_DEFAULT_TIMEOUT_MS, OUTBOUND_SAMPLE_RATE, TTS_STOP_DELAY_MS,
};
use crate::session::registry::SessionRegistry;
use crate::session::session::{RoomType, Session, SessionPhase};
use crate::state::Config;
use crate::utils::elapsed_ms_wrapped;

/// Collaborators shared by every session; owned by the [`crate::gateway::Gateway`].
pub struct SessionDeps {
    pub directory: Arc<DeviceDirectory>,
    pub media_backend: Arc<MediaBackendClient>,
    pub room_service: Arc<RoomService>,
    pub control_bus: Arc<ControlBus>,
    pub codec_pool: Arc<crate::codec::CodecWorkerPool>,
    pub transport: Arc<crate::transport::DatagramTransport>,
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<Config>,
    /// Device UDP endpoints, populated as datagrams arrive. Needed so the
    /// outbound audio pipeline can address a device it has never sent to.
    pub device_addrs: DashMap<u32, SocketAddr>,
}

/// Publishes JSON-RPC envelopes to the device over the broker, satisfying
/// [`DeviceChannel`] for a session's [`McpCoordinator`].
struct ControlBusDeviceChannel {
    control_bus: Arc<ControlBus>,
    full_client_id: String,
}

#[async_trait]
impl DeviceChannel for ControlBusDeviceChannel {
    async fn send_mcp(&self, envelope: Value) -> Result<(), String> {
        self.control_bus
            .publish_to_device(&self.full_client_id, &envelope)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Sends encoded outbound frames to one device over its UDP connection.
struct SessionAudioSink {
    session: Arc<Session>,
    deps: Arc<SessionDeps>,
}

#[async_trait]
impl OutboundAudioSink for SessionAudioSink {
    async fn send_frame(&self, opus: Vec<u8>) {
        let Some(addr) = self.deps.device_addrs.get(&self.session.connection_id).map(|r| *r) else {
            return;
        };
        let sequence = self.session.next_outbound_sequence();
        let timestamp = elapsed_ms_wrapped(self.session.session_start);
        if let Err(e) = self
            .deps
            .transport
            .send(addr, self.session.connection_id, sequence, timestamp, &self.session.key, &opus)
            .await
        {
            log::warn!("[SessionFsm] outbound send failed for connection {}: {e}", self.session.connection_id);
        }
    }
}

/// Reacts to the agent's data-channel events by sending device control
/// messages and dispatching MCP tool calls.
struct SessionAgentSink {
    session: Arc<Session>,
    deps: Arc<SessionDeps>,
}

#[async_trait]
impl AgentEventSink for SessionAgentSink {
    async fn handle_agent_event(&self, event: AgentEvent) {
        match event {
            AgentEvent::AgentStateChanged { old_state, new_state } => {
                if old_state == "speaking" && new_state == "listening" {
                    self.session.state.lock().await.audio_playing_start = None;
                    let this_session = self.session.clone();
                    let control_bus = self.deps.control_bus.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(TTS_STOP_DELAY_MS)).await;
                        let payload = json!({"type": "tts", "state": "stop", "session_id": this_session.mac.to_colon_string()});
                        let _ = control_bus.publish_to_device(&this_session.full_client_id, &payload).await;
                    });

                    let ending = self.session.state.lock().await.ending;
                    if ending {
                        SessionFsm::send_goodbye_and_close_after_delay(self.session.clone(), self.deps.clone(), GoodbyeReason::InactivityTimeout);
                    }
                }
            }
            AgentEvent::SpeechCreated { text } => {
                self.session.state.lock().await.audio_playing_start = Some(Instant::now());
                let payload = json!({"type": "tts", "state": "start", "text": text, "session_id": self.session.mac.to_colon_string()});
                let _ = self.deps.control_bus.publish_to_device(&self.session.full_client_id, &payload).await;
            }
            AgentEvent::UserInputTranscribed { text, is_final } => {
                if !is_final && self.deps.config.suppress_partial_transcripts {
                    return;
                }
                let payload = json!({"type": "stt", "text": text, "session_id": self.session.mac.to_colon_string()});
                let _ = self.deps.control_bus.publish_to_device(&self.session.full_client_id, &payload).await;
            }
            AgentEvent::Llm { text, emotion } => {
                let payload = json!({"type": "llm", "text": text, "emotion": emotion, "session_id": self.session.mac.to_colon_string()});
                let _ = self.deps.control_bus.publish_to_device(&self.session.full_client_id, &payload).await;
            }
            AgentEvent::FunctionCall { name, arguments } if name == "self_volume_up" || name == "self_volume_down" => {
                let volume = self.session.state.lock().await.volume.clone();
                let Some(volume) = volume else { return };
                let action = if name == "self_volume_up" { VolumeAction::Up } else { VolumeAction::Down };
                let step = arguments.get("step").and_then(Value::as_i64).unwrap_or(10) as i32;
                volume.debounced_adjust(action, step);
            }
            AgentEvent::FunctionCall { name, arguments } => {
                let mcp = self.session.state.lock().await.mcp.clone();
                if let (Some(mcp), Some(tool)) = (mcp, tool_name_for_function(&name)) {
                    if let Err(e) = mcp.call_tool(tool, arguments, MCP_DEFAULT_TIMEOUT_MS).await {
                        log::warn!("[SessionFsm] function_call {name} -> {tool} failed: {e}");
                    }
                }
            }
            AgentEvent::DeviceControl { action, params } => {
                let mcp = self.session.state.lock().await.mcp.clone();
                if let Some(mcp) = mcp {
                    if let Err(e) = mcp.call_tool(&action, params, MCP_DEFAULT_TIMEOUT_MS).await {
                        log::warn!("[SessionFsm] device_control {action} failed: {e}");
                    }
                }
            }
            AgentEvent::MobileMusicRequest { query } => {
                let function_name = if query.get("content_type").and_then(Value::as_str) == Some("story") {
                    "play_story"
                } else {
                    "play_music"
                };
                let payload = json!({
                    "type": "function_call",
                    "function_call": { "name": function_name, "arguments": query },
                });
                let bridge = self.session.state.lock().await.bridge.clone();
                if let Some(bridge) = bridge {
                    if let Err(e) = bridge.send_to_agent(&payload).await {
                        log::warn!("[SessionFsm] mobile music request forward failed: {e}");
                    }
                }
            }
            AgentEvent::MusicPlaybackStopped => {
                self.session.state.lock().await.audio_playing_start = None;
                let payload = json!({"type": "tts", "state": "stop", "session_id": self.session.mac.to_colon_string()});
                let _ = self.deps.control_bus.publish_to_device(&self.session.full_client_id, &payload).await;
            }
        }
    }
}

/// Drives every session through its lifecycle. Stateless itself: all
/// mutable state lives on the [`Session`] it's handed.
pub struct SessionFsm {
    deps: Arc<SessionDeps>,
}

impl SessionFsm {
    pub fn new(deps: Arc<SessionDeps>) -> Self {
        Self { deps }
    }

    /// Records (or refreshes) a device's observed UDP endpoint, used by the
    /// outbound audio sink to address sends.
    pub fn note_device_addr(&self, connection_id: u32, addr: SocketAddr) {
        self.deps.device_addrs.insert(connection_id, addr);
    }

    /// `hello` transition: builds a fresh session, room, and bridge, and
    /// replies with the UDP material the device needs to start sending.
    ///
    /// The session uuid is the device-submitted one carried in `client_id`
    /// (§8 S1: room name `u1_00163eacb538_conversation` for client id
    /// `...@@@u1`), not a gateway-minted one.
    pub async fn handle_hello(&self, client_id: ClientId, language: Option<String>) -> GatewayResult<Arc<Session>> {
        let mac = client_id.mac;
        if let Some(prior) = self.deps.registry.get_by_mac(&mac) {
            self.evict_session_silently(&prior).await;
        }

        let mode = self
            .deps
            .directory
            .get_mode(&mac.to_colon_string())
            .await
            .unwrap_or_else(|e| {
                log::warn!("[SessionFsm] mode lookup failed, defaulting to conversation: {e}");
                "conversation".to_string()
            });
        let room_type = RoomType::from_str(&mode);

        let uuid = client_id.uuid.clone();
        let room_name = format!("{uuid}_{}_{}", mac.to_underscore_string(), room_type.as_str());
        let connection_id = self.deps.registry.allocate_connection_id();
        let full_client_id = client_id.full();

        let mut key = [0u8; 16];
        let mut nonce = [0u8; 16];
        rand::Rng::fill(&mut rand::thread_rng(), &mut key);
        rand::Rng::fill(&mut rand::thread_rng(), &mut nonce);

        let session = Arc::new(Session::new(
            connection_id,
            mac,
            uuid.clone(),
            full_client_id.clone(),
            room_name.clone(),
            room_type,
            key,
            nonce,
        ));
        session.state.lock().await.language = language;
        self.deps.registry.insert(session.clone());

        self.spawn_bridge_and_greet(&session, room_type).await?;

        let reply = json!({
            "type": "hello",
            "version": 3,
            "mode": mode,
            "session_id": uuid,
            "transport": "udp",
            "udp": {
                "server": self.deps.config.public_ip,
                "port": self.deps.config.udp_port,
                "encryption": "aes-128-ctr",
                "key": hex::encode(key),
                "nonce": hex::encode(nonce),
                "connection_id": connection_id,
                "cookie": connection_id,
            },
            "audio_params": {
                "sample_rate": OUTBOUND_SAMPLE_RATE,
                "channels": 1,
                "frame_duration": 60,
                "format": "opus",
            },
        });
        self.deps.control_bus.publish_to_device(&full_client_id, &reply).await.ok();

        Ok(session)
    }

    async fn spawn_bridge_and_greet(&self, session: &Arc<Session>, room_type: RoomType) -> GatewayResult<()> {
        let audio_sink: Arc<dyn OutboundAudioSink> =
            Arc::new(SessionAudioSink { session: session.clone(), deps: self.deps.clone() });
        let agent_sink: Arc<dyn AgentEventSink> =
            Arc::new(SessionAgentSink { session: session.clone(), deps: self.deps.clone() });

        let room_name = session.state.lock().await.room_name.clone();
        let identity = format!("device-{}", session.mac.to_underscore_string());

        let bridge = Arc::new(
            MediaBridge::connect(
                self.deps.room_service.clone(),
                self.deps.codec_pool.clone(),
                room_name.clone(),
                identity,
                session.mac.to_colon_string(),
                session.state.lock().await.uuid.clone(),
                room_type.as_str().to_string(),
                self.deps.config.livekit.url.clone(),
                audio_sink,
                agent_sink,
            )
            .await?,
        );

        let channel: Arc<dyn DeviceChannel> = Arc::new(ControlBusDeviceChannel {
            control_bus: self.deps.control_bus.clone(),
            full_client_id: session.full_client_id.clone(),
        });
        let mcp = Arc::new(McpCoordinator::new(session.mac.to_colon_string(), channel));
        let volume_device: Arc<dyn crate::mcp::VolumeDevice> = Arc::new(McpVolumeDevice::new(mcp.clone()));
        let volume = Arc::new(VolumeDebouncer::new(volume_device));

        {
            let mut state = session.state.lock().await;
            state.bridge = Some(bridge.clone());
            state.mcp = Some(mcp);
            state.volume = Some(volume);
            state.phase = SessionPhase::Connected;
        }

        if room_type == RoomType::Conversation {
            let joined = bridge.wait_for_agent_join(AGENT_JOIN_TIMEOUT_SECS * 1000).await;
            let joined = joined || bridge.verify_agent_present().await;
            if joined {
                let _ = bridge.send_to_agent(&json!({"type": "start_greeting"})).await;
            } else {
                log::warn!("[SessionFsm] agent did not join room {room_name} within deadline");
            }
        }
        Ok(())
    }

    /// `goodbye`: keeps the room alive, tells the agent to disconnect, and
    /// lets a future greeting trigger re-use the same bridge.
    pub async fn handle_goodbye(&self, session: &Arc<Session>) {
        let bridge = session.state.lock().await.bridge.clone();
        if let Some(bridge) = bridge {
            let _ = bridge.send_to_agent(&json!({"type": "disconnect_agent"})).await;
        }
    }

    /// `abort`: forwards to the agent and stops any in-flight TTS.
    pub async fn handle_abort(&self, session: &Arc<Session>) {
        let bridge = session.state.lock().await.bridge.clone();
        if let Some(bridge) = bridge {
            let _ = bridge.send_to_agent(&json!({"type": "abort"})).await;
        }
        let payload = json!({"type": "tts", "state": "stop", "session_id": session.mac.to_colon_string()});
        let _ = self.deps.control_bus.publish_to_device(&session.full_client_id, &payload).await;
    }

    /// `mode-change`: tears down the old room and bridge and builds a new
    /// one for the cycled mode.
    pub async fn handle_mode_change(&self, session: &Arc<Session>) -> GatewayResult<()> {
        let (old_room_type, old_room_name) = {
            let state = session.state.lock().await;
            (state.room_type, state.room_name.clone())
        };

        if old_room_type != RoomType::Conversation {
            let _ = self.deps.media_backend.stop_bot(&old_room_name).await;
        }
        {
            let mut state = session.state.lock().await;
            if let Some(mcp) = state.mcp.take() {
                mcp.cancel_all();
            }
            if let Some(volume) = state.volume.take() {
                volume.cancel();
            }
        }
        self.teardown_bridge(session, &old_room_name).await;

        let (_old_mode, new_mode) = self
            .deps
            .directory
            .cycle_mode(&session.mac.to_colon_string())
            .await
            .unwrap_or_else(|e| {
                log::warn!("[SessionFsm] cycle_mode failed, keeping old mode: {e}");
                (old_room_type.as_str().to_string(), old_room_type.as_str().to_string())
            });
        let new_room_type = RoomType::from_str(&new_mode);
        let uuid = session.state.lock().await.uuid.clone();
        let new_room_name = format!("{uuid}_{}_{}", session.mac.to_underscore_string(), new_room_type.as_str());

        {
            let mut state = session.state.lock().await;
            state.room_type = new_room_type;
            state.room_name = new_room_name.clone();
        }

        self.spawn_bridge_and_greet(session, new_room_type).await?;

        let mut key = [0u8; 16];
        let mut nonce = [0u8; 16];
        rand::Rng::fill(&mut rand::thread_rng(), &mut key);
        rand::Rng::fill(&mut rand::thread_rng(), &mut nonce);

        let update = json!({
            "type": "mode_update",
            "mode": new_mode,
            "listening_mode": session.state.lock().await.listening_mode,
            "session_id": session.state.lock().await.uuid,
            "udp": {
                "server": self.deps.config.public_ip,
                "port": self.deps.config.udp_port,
                "encryption": "aes-128-ctr",
                "key": hex::encode(key),
                "nonce": hex::encode(nonce),
                "connection_id": session.connection_id,
                "cookie": session.connection_id,
            },
            "audio_params": {
                "sample_rate": OUTBOUND_SAMPLE_RATE,
                "channels": 1,
                "frame_duration": 60,
                "format": "opus",
            },
        });
        self.deps.control_bus.publish_to_device(&session.full_client_id, &update).await.ok();

        if new_room_type != RoomType::Conversation {
            let playlist = self
                .deps
                .directory
                .get_playlist(&session.mac.to_colon_string(), new_room_type.as_str())
                .await
                .unwrap_or_default();
            let device_mac = session.mac.to_colon_string();
            match new_room_type {
                RoomType::Music => {
                    let _ = self.deps.media_backend.start_music_bot(&new_room_name, &device_mac, "en", &playlist).await;
                }
                RoomType::Story => {
                    let _ = self.deps.media_backend.start_story_bot(&new_room_name, &device_mac, "child", &playlist).await;
                }
                RoomType::Conversation => {}
            }
        }

        Ok(())
    }

    /// `character-change`: external profile API only, no room recreation.
    pub async fn handle_character_change(&self, session: &Arc<Session>, character_name: Option<String>) {
        let mac = session.mac.to_colon_string();
        let result = match character_name {
            Some(name) => self.deps.directory.set_character(&mac, &name).await,
            None => self.deps.directory.cycle_character(&mac).await,
        };
        match result {
            Ok(character) => session.state.lock().await.character = Some(character),
            Err(e) => log::warn!("[SessionFsm] character-change failed: {e}"),
        }
    }

    /// `playback_control`: start_agent, next, previous.
    pub async fn handle_playback_control(&self, session: &Arc<Session>, action: PlaybackAction) {
        let room_type = session.state.lock().await.room_type;
        let room_name = session.state.lock().await.room_name.clone();

        match action {
            PlaybackAction::StartAgent => {
                if room_type == RoomType::Conversation {
                    if let Some(bridge) = session.state.lock().await.bridge.clone() {
                        let _ = bridge.send_to_agent(&json!({"type": "start_greeting"})).await;
                    }
                } else {
                    let mode = if room_type == RoomType::Music { BotMode::Music } else { BotMode::Story };
                    let _ = self.deps.media_backend.transport(mode, &room_name, BotTransportAction::Start).await;
                }
            }
            PlaybackAction::Next | PlaybackAction::Previous => {
                if room_type == RoomType::Conversation {
                    log::debug!("[SessionFsm] playback_control {action:?} unsupported in conversation mode");
                    return;
                }
                let stop = json!({"type": "tts", "state": "stop", "session_id": session.mac.to_colon_string()});
                let _ = self.deps.control_bus.publish_to_device(&session.full_client_id, &stop).await;

                let mode = if room_type == RoomType::Music { BotMode::Music } else { BotMode::Story };
                let transport_action = if action == PlaybackAction::Next {
                    BotTransportAction::Next
                } else {
                    BotTransportAction::Previous
                };
                let _ = self.deps.media_backend.transport(mode, &room_name, transport_action).await;

                let text = if action == PlaybackAction::Next { "Skipping ahead" } else { "Going back" };
                let start = json!({"type": "tts", "state": "start", "text": text, "session_id": session.mac.to_colon_string()});
                let _ = self.deps.control_bus.publish_to_device(&session.full_client_id, &start).await;
            }
        }
    }

    /// Runs once per keep-alive tick (§4.10): inactivity, stuck-audio
    /// recovery, end-prompt watchdog, and the unconditional max-duration cap.
    pub async fn tick(&self, session: &Arc<Session>) {
        if session.age() > Duration::from_secs(MAX_SESSION_DURATION_SECS) {
            self.close_session(session, GoodbyeReason::SessionMaxDuration).await;
            return;
        }

        let mut state = session.state.lock().await;
        if let Some(started) = state.audio_playing_start {
            if started.elapsed() > Duration::from_secs(self.deps.config.audio_stuck_timeout_secs) {
                log::warn!(
                    "[SessionFsm] audio stuck for connection {} past {}s, clearing",
                    session.connection_id,
                    self.deps.config.audio_stuck_timeout_secs
                );
                state.audio_playing_start = None;
                state.end_prompt_sent_at = None;
                state.ending = false;
            }
        }

        if state.phase == SessionPhase::Ending {
            if let Some(sent_at) = state.end_prompt_sent_at {
                if sent_at.elapsed() > Duration::from_secs(END_PROMPT_TIMEOUT_SECS) {
                    drop(state);
                    self.close_session(session, GoodbyeReason::EndPromptTimeout).await;
                }
            }
            return;
        }

        let audio_playing = state.audio_playing_start.is_some();
        if !audio_playing && session.idle_for() > Duration::from_secs(INACTIVITY_TIMEOUT_SECS) {
            state.phase = SessionPhase::Ending;
            state.ending = true;
            state.end_prompt_sent_at = Some(Instant::now());
            let bridge = state.bridge.clone();
            drop(state);
            if let Some(bridge) = bridge {
                let _ = bridge.send_to_agent(&json!({"type": "end_prompt"})).await;
            }
        }
    }

    fn send_goodbye_and_close_after_delay(session: Arc<Session>, deps: Arc<SessionDeps>, reason: GoodbyeReason) {
        tokio::spawn(async move {
            let goodbye = json!({
                "type": "goodbye",
                "reason": reason,
                "session_id": session.mac.to_colon_string(),
            });
            let _ = deps.control_bus.publish_to_device(&session.full_client_id, &goodbye).await;
            tokio::time::sleep(Duration::from_millis(GOODBYE_CLOSE_DELAY_MS)).await;
            let fsm = SessionFsm::new(deps);
            fsm.close_session(&session, reason).await;
        });
    }

    async fn teardown_bridge(&self, session: &Arc<Session>, room_name: &str) {
        let bridge = session.state.lock().await.bridge.take();
        if let Some(bridge) = bridge {
            bridge.disconnect().await;
        }
        if let Err(e) = self.deps.room_service.delete_room(room_name).await {
            log::warn!("[SessionFsm] room delete failed for {room_name}: {e}");
        }
    }

    /// `Closed`: best-effort bot stop, bridge close, room delete, and a
    /// deferred registry removal to absorb in-flight messages. Publishes a
    /// wire-visible goodbye with `reason`.
    pub async fn close_session(&self, session: &Arc<Session>, reason: GoodbyeReason) {
        self.close_session_inner(session, Some(reason)).await;
    }

    /// Evicts a session with no wire-visible goodbye. Used when a duplicate
    /// `hello` for the same MAC displaces a prior session (§8 idempotence:
    /// the prior session must be "indistinguishable from never-having-existed
    /// beyond logs" to anything watching the device's traffic).
    async fn evict_session_silently(&self, session: &Arc<Session>) {
        self.close_session_inner(session, None).await;
    }

    async fn close_session_inner(&self, session: &Arc<Session>, reason: Option<GoodbyeReason>) {
        let (room_type, room_name) = {
            let mut state = session.state.lock().await;
            if state.closing {
                return;
            }
            state.closing = true;
            (state.room_type, state.room_name.clone())
        };

        if let Some(reason) = reason {
            let goodbye = json!({"type": "goodbye", "reason": reason, "session_id": session.mac.to_colon_string()});
            let _ = self.deps.control_bus.publish_to_device(&session.full_client_id, &goodbye).await;
        }

        if room_type != RoomType::Conversation {
            let _ = self.deps.media_backend.stop_bot(&room_name).await;
        }
        if let Some(mcp) = session.state.lock().await.mcp.clone() {
            mcp.cancel_all();
        }
        if let Some(volume) = session.state.lock().await.volume.clone() {
            volume.cancel();
        }
        self.teardown_bridge(session, &room_name).await;

        session.state.lock().await.phase = SessionPhase::Closed;

        let connection_id = session.connection_id;
        let deps = self.deps.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(crate::protocol_constants::SESSION_REMOVAL_DELAY_MS)).await;
            deps.registry.remove(connection_id);
            deps.device_addrs.remove(&connection_id);
        });
    }

    /// Dispatches one routed device message to the appropriate transition.
    pub async fn dispatch(&self, mac: &Mac, message: DeviceMessage) -> GatewayResult<()> {
        let session = self.deps.registry.get_by_mac(mac);

        match message {
            DeviceMessage::Hello { .. } => {
                // Group/device uuid are carried by the broker client id, not
                // the inner payload; the caller resolves those and calls
                // `handle_hello` directly rather than through `dispatch`.
            }
            DeviceMessage::Goodbye { .. } => {
                if let Some(session) = session {
                    self.handle_goodbye(&session).await;
                }
            }
            DeviceMessage::Abort { .. } => {
                if let Some(session) = session {
                    self.handle_abort(&session).await;
                }
            }
            DeviceMessage::Listen { state, mode, .. } => {
                log::debug!("[SessionFsm] listen state={state:?} mode={mode:?} (no control-plane action)");
            }
            DeviceMessage::ModeChange { .. } => {
                if let Some(session) = session {
                    self.handle_mode_change(&session).await?;
                }
            }
            DeviceMessage::CharacterChange { character_name, .. } => {
                if let Some(session) = session {
                    self.handle_character_change(&session, character_name).await;
                }
            }
            DeviceMessage::SetListeningMode { .. } => {}
            DeviceMessage::PlaybackControl { action, .. } => {
                if let Some(session) = session {
                    self.handle_playback_control(&session, action).await;
                }
            }
            DeviceMessage::FunctionCall { function_call, .. } => {
                if let Some(session) = session {
                    let mcp = session.state.lock().await.mcp.clone();
                    let name = function_call.get("name").and_then(Value::as_str);
                    if let (Some(mcp), Some(tool)) = (mcp, name.and_then(tool_name_for_function)) {
                        let arguments = function_call.get("arguments").cloned().unwrap_or(Value::Null);
                        let _ = mcp.call_tool(tool, arguments, MCP_DEFAULT_TIMEOUT_MS).await;
                    }
                }
            }
            DeviceMessage::Mcp { payload, .. } => {
                if let Some(session) = session {
                    if let Some(mcp) = session.state.lock().await.mcp.clone() {
                        let id = payload.get("id").and_then(Value::as_u64).unwrap_or(0) as u32;
                        let result = payload.get("result").cloned();
                        let error = payload.get("error").cloned();
                        mcp.handle_response(id, result, error);
                    }
                }
            }
            DeviceMessage::StartGreeting { .. } => {
                if let Some(session) = session {
                    if let Some(bridge) = session.state.lock().await.bridge.clone() {
                        let _ = bridge.send_to_agent(&json!({"type": "start_greeting"})).await;
                    }
                }
            }
            DeviceMessage::Unknown { type_name } => {
                log::debug!("[SessionFsm] dropping unrecognized device message type {type_name}");
            }
        }

        if let Some(session) = self.deps.registry.get_by_mac(mac) {
            session.touch_activity();
        }
        Ok(())
    }
}

//! Per-session WebRTC room adapter: one room connection, one published
//! inbound track, and an outbound pipeline per subscribed remote track.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use livekit::options::TrackPublishOptions;
use livekit::track::{LocalAudioTrack, LocalTrack, RemoteTrack};
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_source::{AudioSourceOptions, RtcAudioSource};
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use livekit::webrtc::prelude::AudioFrame;
use livekit::{DataPacketKind, Room, RoomEvent, RoomOptions};
use tokio::sync::{Mutex, Notify};

use crate::audio::{resample_48k_to_24k, FrameAssembler};
use crate::codec::CodecWorkerPool;
use crate::error::GatewayError;
use crate::media::events::AgentEvent;
use crate::media::room_service::RoomService;
use crate::protocol_constants::{INBOUND_SAMPLE_RATE, ROOM_SAMPLE_RATE};

/// Receives encoded outbound frames, one per call, in generation order.
#[async_trait]
pub trait OutboundAudioSink: Send + Sync {
    async fn send_frame(&self, opus: Vec<u8>);
}

/// Receives parsed data-channel events from the agent.
#[async_trait]
pub trait AgentEventSink: Send + Sync {
    async fn handle_agent_event(&self, event: AgentEvent);
}

/// Holds one room connection for one device session.
pub struct MediaBridge {
    room: Room,
    room_name: String,
    audio_source: NativeAudioSource,
    agent_present: Arc<AtomicBool>,
    agent_join_notify: Arc<Notify>,
    room_service: Arc<RoomService>,
    outbound_tasks: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl MediaBridge {
    /// Creates (idempotently) the room, mints a join token, connects, and
    /// publishes one outbound audio track sourced from 16 kHz mono PCM.
    pub async fn connect(
        room_service: Arc<RoomService>,
        codec_pool: Arc<CodecWorkerPool>,
        room_name: String,
        identity: String,
        mac: String,
        uuid: String,
        room_type: String,
        url: String,
        audio_sink: Arc<dyn OutboundAudioSink>,
        agent_sink: Arc<dyn AgentEventSink>,
    ) -> Result<Self, GatewayError> {
        room_service.ensure_room(&room_name).await?;
        let token = room_service.mint_join_token(&room_name, &identity, &mac, &uuid, &room_type)?;

        let (room, mut events) = Room::connect(&url, &token, RoomOptions::default())
            .await
            .map_err(|e| GatewayError::RoomJoinFailed(e.to_string()))?;

        let samples_per_10ms = INBOUND_SAMPLE_RATE / 100;
        let audio_source = NativeAudioSource::new(
            AudioSourceOptions::default(),
            INBOUND_SAMPLE_RATE,
            1,
            samples_per_10ms,
        );
        let local_track = LocalAudioTrack::create_audio_track(
            "device-mic",
            RtcAudioSource::Native(audio_source.clone()),
        );
        room.local_participant()
            .publish_track(LocalTrack::Audio(local_track), TrackPublishOptions::default())
            .await
            .map_err(|e| GatewayError::RoomJoinFailed(e.to_string()))?;

        let agent_present = Arc::new(AtomicBool::new(false));
        let agent_join_notify = Arc::new(Notify::new());
        let outbound_tasks: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        {
            let agent_present = agent_present.clone();
            let agent_join_notify = agent_join_notify.clone();
            let codec_pool = codec_pool.clone();
            let audio_sink = audio_sink.clone();
            let agent_sink = agent_sink.clone();
            let outbound_tasks = outbound_tasks.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    Self::handle_room_event(
                        event,
                        &agent_present,
                        &agent_join_notify,
                        &codec_pool,
                        &audio_sink,
                        &agent_sink,
                        &outbound_tasks,
                    )
                    .await;
                }
            });
        }

        Ok(Self {
            room,
            room_name,
            audio_source,
            agent_present,
            agent_join_notify,
            room_service,
            outbound_tasks,
        })
    }

    /// Pushes one decoded inbound PCM frame (16 kHz mono) into the
    /// published track. Silently drops the frame if the room is no longer
    /// connected or the source has been torn down.
    pub async fn capture_inbound_frame(&self, pcm: &[i16]) {
        let frame = AudioFrame {
            data: Cow::Borrowed(pcm),
            sample_rate: INBOUND_SAMPLE_RATE,
            num_channels: 1,
            samples_per_channel: pcm.len() as u32,
        };
        if let Err(e) = self.audio_source.capture_frame(&frame).await {
            log::debug!("[MediaBridge] capture_frame dropped (non-fatal): {e}");
        }
    }

    /// Sends a JSON payload to the agent over the reliable data channel.
    pub async fn send_to_agent(&self, payload: &serde_json::Value) -> Result<(), GatewayError> {
        let bytes = serde_json::to_vec(payload).expect("agent payloads are always serializable");
        self.room
            .local_participant()
            .publish_data(bytes, DataPacketKind::Reliable, Vec::new())
            .await
            .map_err(|e| GatewayError::Internal(format!("data channel send failed: {e}")))
    }

    /// Resolves true on agent join, false on timeout.
    pub async fn wait_for_agent_join(&self, timeout_ms: u64) -> bool {
        if self.agent_present.load(Ordering::Acquire) {
            return true;
        }
        tokio::time::timeout(Duration::from_millis(timeout_ms), self.agent_join_notify.notified())
            .await
            .is_ok()
    }

    /// Fallback recovery: lists room participants directly rather than
    /// trusting the locally cached flag.
    pub async fn verify_agent_present(&self) -> bool {
        match self.room_service.list_participant_identities(&self.room_name).await {
            Ok(identities) => {
                let present = identities.iter().any(|id| id.contains("agent"));
                self.agent_present.store(present, Ordering::Release);
                present
            }
            Err(e) => {
                log::warn!("[MediaBridge] participant verification failed: {e}");
                false
            }
        }
    }

    /// Closes the room connection. Does not delete the room; callers that
    /// own the session lifecycle decide whether to tear the room down too.
    pub async fn disconnect(&self) {
        for task in self.outbound_tasks.lock().await.drain(..) {
            task.abort();
        }
        if let Err(e) = self.room.close().await {
            log::warn!("[MediaBridge] room close error (non-fatal): {e}");
        }
    }

    async fn handle_room_event(
        event: RoomEvent,
        agent_present: &Arc<AtomicBool>,
        agent_join_notify: &Arc<Notify>,
        codec_pool: &Arc<CodecWorkerPool>,
        audio_sink: &Arc<dyn OutboundAudioSink>,
        agent_sink: &Arc<dyn AgentEventSink>,
        outbound_tasks: &Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
    ) {
        match event {
            RoomEvent::ParticipantConnected(participant) => {
                if participant.identity().as_str().contains("agent") {
                    agent_present.store(true, Ordering::Release);
                    agent_join_notify.notify_waiters();
                }
            }
            RoomEvent::TrackSubscribed { track, .. } => {
                if let RemoteTrack::Audio(audio_track) = track {
                    let rtc_track = audio_track.rtc_track();
                    let codec_pool = codec_pool.clone();
                    let audio_sink = audio_sink.clone();
                    let handle = tokio::spawn(async move {
                        Self::run_outbound_pipeline(rtc_track, codec_pool, audio_sink).await;
                    });
                    outbound_tasks.lock().await.push(handle);
                }
            }
            RoomEvent::DataReceived { payload, .. } => {
                if let Some(agent_event) = AgentEvent::parse(&payload) {
                    agent_sink.handle_agent_event(agent_event).await;
                } else {
                    log::debug!("[MediaBridge] dropped unrecognized data-channel payload");
                }
            }
            RoomEvent::Disconnected { reason } => {
                log::info!("[MediaBridge] room disconnected: {reason:?}");
            }
            _ => {}
        }
    }

    /// Consumes 48 kHz PCM from one subscribed remote track and drives it
    /// through resample → frame-assembly → encode → sink.
    async fn run_outbound_pipeline(
        rtc_track: livekit::webrtc::prelude::RtcAudioTrack,
        codec_pool: Arc<CodecWorkerPool>,
        audio_sink: Arc<dyn OutboundAudioSink>,
    ) {
        let mut stream = NativeAudioStream::new(rtc_track, ROOM_SAMPLE_RATE as i32, 1);
        let mut assembler = FrameAssembler::new();

        while let Some(frame) = stream.next().await {
            let resampled = resample_48k_to_24k(frame.data.as_ref());
            let bytes: Vec<u8> = resampled.iter().flat_map(|s| s.to_le_bytes()).collect();

            for frame_bytes in assembler.push(&bytes) {
                let pcm: Vec<i16> = frame_bytes
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]))
                    .collect();
                match codec_pool.encode(pcm).await {
                    Ok(opus) => audio_sink.send_frame(opus).await,
                    Err(e) => log::warn!("[MediaBridge] encode failed, dropping frame: {e}"),
                }
            }
        }
        assembler.discard_partial();
    }
}

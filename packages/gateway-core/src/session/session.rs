//! The session data model (§3): identity, datagram material, and the
//! mutable state the FSM serializes transitions over.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::device::Mac;
use crate::mcp::{McpCoordinator, VolumeDebouncer};
use crate::media::MediaBridge;

/// `conversation`, `music`, or `story` — the room-name suffix and the
/// dispatch target for playback control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomType {
    Conversation,
    Music,
    Story,
}

impl RoomType {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomType::Conversation => "conversation",
            RoomType::Music => "music",
            RoomType::Story => "story",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "music" => RoomType::Music,
            "story" => RoomType::Story,
            _ => RoomType::Conversation,
        }
    }
}

/// `Idle → Handshaking → Connected → Ending → Closed`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Handshaking,
    Connected,
    Ending,
    Closed,
}

struct Counters {
    outbound_sequence: u32,
    highest_inbound_sequence: Option<u32>,
    last_activity: Instant,
}

/// Mutable fields the FSM reads and writes while serialized behind
/// [`Session::state`]. Kept separate from [`Counters`] because the audio
/// path touches sequence numbers far more often than FSM transitions run.
pub struct SessionInner {
    pub phase: SessionPhase,
    pub room_name: String,
    pub room_type: RoomType,
    pub uuid: String,
    pub language: Option<String>,
    pub character: Option<String>,
    pub listening_mode: Option<String>,
    pub ending: bool,
    pub closing: bool,
    pub audio_playing_start: Option<Instant>,
    pub end_prompt_sent_at: Option<Instant>,
    pub bridge: Option<Arc<MediaBridge>>,
    pub mcp: Option<Arc<McpCoordinator>>,
    pub volume: Option<Arc<VolumeDebouncer>>,
}

/// One device's live session: identity, 16-byte key/nonce pair used as the
/// datagram cipher material, and all mutable FSM-owned state.
pub struct Session {
    pub connection_id: u32,
    pub mac: Mac,
    /// Full `group@@@mac@@@uuid` broker client id, used to address
    /// `devices/p2p/<fullClientId>` publishes back to this device.
    pub full_client_id: String,
    pub key: [u8; 16],
    pub nonce: [u8; 16],
    pub session_start: Instant,
    counters: SyncMutex<Counters>,
    /// Serializes FSM transitions for this session: no two transitions run
    /// concurrently, matching the single-logical-thread ordering guarantee.
    pub state: AsyncMutex<SessionInner>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connection_id: u32,
        mac: Mac,
        uuid: String,
        full_client_id: String,
        room_name: String,
        room_type: RoomType,
        key: [u8; 16],
        nonce: [u8; 16],
    ) -> Self {
        let now = Instant::now();
        Self {
            connection_id,
            mac,
            full_client_id,
            key,
            nonce,
            session_start: now,
            counters: SyncMutex::new(Counters {
                outbound_sequence: 0,
                highest_inbound_sequence: None,
                last_activity: now,
            }),
            state: AsyncMutex::new(SessionInner {
                phase: SessionPhase::Handshaking,
                room_name,
                room_type,
                uuid,
                language: None,
                character: None,
                listening_mode: None,
                ending: false,
                closing: false,
                audio_playing_start: None,
                end_prompt_sent_at: None,
                bridge: None,
                mcp: None,
                volume: None,
            }),
        }
    }

    /// Increments and returns the next outbound sequence number. Strictly
    /// increasing over the session's lifetime (invariant 1, §8).
    pub fn next_outbound_sequence(&self) -> u32 {
        let mut counters = self.counters.lock();
        counters.outbound_sequence += 1;
        counters.outbound_sequence
    }

    /// Accepts `sequence` if it exceeds every previously accepted sequence
    /// for this session; returns whether it was accepted (invariant 2, §8).
    pub fn accept_inbound_sequence(&self, sequence: u32) -> bool {
        let mut counters = self.counters.lock();
        let accept = match counters.highest_inbound_sequence {
            Some(highest) => sequence > highest,
            None => true,
        };
        if accept {
            counters.highest_inbound_sequence = Some(sequence);
            counters.last_activity = Instant::now();
        }
        accept
    }

    pub fn highest_inbound_sequence(&self) -> Option<u32> {
        self.counters.lock().highest_inbound_sequence
    }

    pub fn touch_activity(&self) {
        self.counters.lock().last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.counters.lock().last_activity.elapsed()
    }

    pub fn age(&self) -> std::time::Duration {
        self.session_start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Session {
        Session::new(
            7,
            "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            "u1".to_string(),
            "g@@@aa_bb_cc_dd_ee_ff@@@u1".to_string(),
            "u1_aabbccddeeff_conversation".to_string(),
            RoomType::Conversation,
            [0u8; 16],
            [1u8; 16],
        )
    }

    #[test]
    fn outbound_sequence_strictly_increases() {
        let session = sample();
        assert_eq!(session.next_outbound_sequence(), 1);
        assert_eq!(session.next_outbound_sequence(), 2);
        assert_eq!(session.next_outbound_sequence(), 3);
    }

    #[test]
    fn inbound_sequence_rejects_non_increasing() {
        let session = sample();
        assert!(session.accept_inbound_sequence(5));
        assert!(session.accept_inbound_sequence(6));
        assert!(!session.accept_inbound_sequence(4));
        assert!(!session.accept_inbound_sequence(6));
        assert_eq!(session.highest_inbound_sequence(), Some(6));
    }
}

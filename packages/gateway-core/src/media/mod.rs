//! WebRTC conferencing: room lifecycle, the per-session bridge, and the
//! agent's data-channel event vocabulary.

mod bridge;
mod events;
mod room_service;

pub use bridge::{AgentEventSink, MediaBridge, OutboundAudioSink};
pub use events::{AgentCommand, AgentEvent};
pub use room_service::RoomService;

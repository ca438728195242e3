//! Gateway Core - shared library for the toybox audio/control gateway.
//!
//! This crate bridges embedded toy devices to the conferencing fabric: it
//! terminates the device's encrypted UDP audio stream, brokers its MQTT
//! control messages, and bridges both into a per-device LiveKit room where a
//! conversational agent (or a music/story playback bot) joins.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`gateway`]: The process-wide orchestrator tying every loop together
//! - [`session`]: The per-device session model, registry, and state machine
//! - [`transport`]: The encrypted, sequenced UDP datagram framing
//! - [`codec`]: The Opus encode/decode worker pool
//! - [`control`]: The MQTT control-plane client and message shapes
//! - [`media`]: The LiveKit room bridge, resampling, and agent data channel
//! - [`mcp`]: Device tool-call coordination and volume debounce
//! - [`directory`]: The device-profile HTTP client (mode, character, playlists)
//! - [`media_backend`]: The music/story playback bot HTTP client
//! - [`cipher`]: The AES-128-CTR streaming cipher used by the datagram transport
//! - [`state`]: Configuration types
//! - [`error`]: Centralized error types
//! - [`bootstrap`]: The composition root wiring all of the above together
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): spawning background tasks without
//!   tying the library to a specific async runtime
//! - [`OutboundAudioSink`](media::OutboundAudioSink) / [`AgentEventSink`](media::AgentEventSink):
//!   decoupling the media bridge from how a session actually reaches its device and agent

#![warn(clippy::all)]

pub mod audio;
pub mod bootstrap;
pub mod cipher;
pub mod codec;
pub mod control;
pub mod device;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod media;
pub mod media_backend;
pub mod protocol_constants;
pub mod runtime;
pub mod session;
pub mod state;
pub mod transport;
pub mod utils;

pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use device::{ClientId, Mac};
pub use error::{ErrorCode, GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use runtime::{TaskSpawner, TokioSpawner};
pub use session::{RoomType, Session, SessionDeps, SessionFsm, SessionPhase, SessionRegistry};
pub use state::Config;

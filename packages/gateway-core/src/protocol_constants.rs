//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the wire protocol and the audio pipeline the
//! devices and room expect; changing them breaks compatibility with
//! deployed firmware.

// ─────────────────────────────────────────────────────────────────────────────
// Audio format (outbound: gateway → device, inbound: device → gateway)
// ─────────────────────────────────────────────────────────────────────────────

/// Outbound sample rate (gateway → device), Hz.
pub const OUTBOUND_SAMPLE_RATE: u32 = 24_000;
/// Outbound channel count.
pub const OUTBOUND_CHANNELS: u16 = 1;
/// Outbound frame duration, milliseconds.
pub const OUTBOUND_FRAME_DURATION_MS: u32 = 60;
/// Outbound samples per frame (24kHz * 60ms).
pub const OUTBOUND_FRAME_SAMPLES: usize = 1440;
/// Outbound bytes per frame of 16-bit PCM (1440 samples * 2 bytes).
pub const OUTBOUND_FRAME_BYTES: usize = 2880;

/// Inbound sample rate (device → gateway), Hz.
pub const INBOUND_SAMPLE_RATE: u32 = 16_000;
/// Inbound channel count.
pub const INBOUND_CHANNELS: u16 = 1;
/// Inbound frame duration, milliseconds.
pub const INBOUND_FRAME_DURATION_MS: u32 = 60;
/// Inbound samples per frame (16kHz * 60ms).
pub const INBOUND_FRAME_SAMPLES: usize = 960;
/// Inbound bytes per frame of 16-bit PCM (960 samples * 2 bytes).
pub const INBOUND_FRAME_BYTES: usize = 1920;

/// Room-internal PCM sample rate, Hz. Outbound audio is resampled from this
/// rate down to [`OUTBOUND_SAMPLE_RATE`] before encoding.
pub const ROOM_SAMPLE_RATE: u32 = 48_000;

/// Peak-amplitude threshold below which an outbound frame is treated as
/// silence and dropped before encoding.
pub const SILENCE_PEAK_THRESHOLD: i16 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Datagram wire format
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed datagram header size in bytes. The header doubles as the stream
/// cipher's IV.
pub const DATAGRAM_HEADER_SIZE: usize = 16;
/// The only recognized datagram `type` value.
pub const DATAGRAM_TYPE_AUDIO: u8 = 1;
/// ASCII prefix that marks a decrypted payload as a liveness probe rather
/// than audio.
pub const PING_PREFIX: &[u8] = b"ping:";
/// Recv buffer size for the gateway's UDP socket; comfortably above any
/// single Opus frame plus header.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

// ─────────────────────────────────────────────────────────────────────────────
// Codec worker pool
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum number of codec workers the pool will scale down to.
pub const MIN_WORKERS: usize = 4;
/// Maximum number of codec workers the pool will scale up to.
pub const MAX_WORKERS: usize = 8;
/// Default per-job deadline for encode/decode calls, milliseconds.
pub const CODEC_JOB_TIMEOUT_MS: u64 = 150;
/// Deadline for worker (encoder/decoder) initialization, milliseconds.
pub const CODEC_INIT_TIMEOUT_MS: u64 = 500;
/// Interval between autoscale monitor samples, seconds.
pub const AUTOSCALE_SAMPLE_INTERVAL_SECS: u64 = 10;
/// Cooldown after a scale-up before another scale event is considered, seconds.
pub const SCALE_UP_COOLDOWN_SECS: u64 = 30;
/// Cooldown after a scale-down before another scale event is considered, seconds.
pub const SCALE_DOWN_COOLDOWN_SECS: u64 = 60;
/// One load unit corresponds to this many in-flight requests per worker.
pub const LOAD_UNIT_IN_FLIGHT: f64 = 5.0;

// ─────────────────────────────────────────────────────────────────────────────
// Stream cipher
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum cipher-context cache entries per direction (encrypt/decrypt).
pub const CIPHER_CACHE_BOUND: usize = 20;
/// Symmetric key length in bytes (AES-128).
pub const CIPHER_KEY_LEN: usize = 16;
/// The only cipher algorithm this gateway supports on the datagram wire.
pub const CIPHER_ALGO_AES_128_CTR: &str = "aes-128-ctr";

// ─────────────────────────────────────────────────────────────────────────────
// Session timing
// ─────────────────────────────────────────────────────────────────────────────

/// Wall-clock gap after which a quiet session enters the `Ending` phase, seconds.
pub const INACTIVITY_TIMEOUT_SECS: u64 = 120;
/// How long a session may sit in `Ending` without audio before force-close, seconds.
pub const END_PROMPT_TIMEOUT_SECS: u64 = 30;
/// Maximum total session lifetime regardless of activity, seconds.
pub const MAX_SESSION_DURATION_SECS: u64 = 3600;
/// How long `audioPlayingStartTime` may remain set before being treated as stuck, seconds.
///
/// Tunable: the origin of 90s (longest expected TTS utterance vs. arbitrary
/// safety margin) is not specified upstream; kept as a named constant so a
/// deployment can retune it without touching the FSM.
pub const AUDIO_STUCK_TIMEOUT_SECS: u64 = 90;
/// Gateway keep-alive ticker interval, seconds.
pub const KEEPALIVE_TICK_SECS: u64 = 15;
/// Deadline for waiting on an agent join after dispatch, seconds.
pub const AGENT_JOIN_TIMEOUT_SECS: u64 = 6;
/// Delay before removing a closed session from the registry, to absorb
/// in-flight messages still addressed to it.
pub const SESSION_REMOVAL_DELAY_MS: u64 = 2_000;
/// Delay between the speaking→listening transition and the TTS-stop message.
pub const TTS_STOP_DELAY_MS: u64 = 1_000;
/// Delay between sending goodbye (from the ending phase) and closing the bridge.
pub const GOODBYE_CLOSE_DELAY_MS: u64 = 500;

// ─────────────────────────────────────────────────────────────────────────────
// MCP / volume debounce
// ─────────────────────────────────────────────────────────────────────────────

/// Default debounce window for accumulating volume adjust requests, milliseconds.
pub const VOLUME_DEBOUNCE_MS: u64 = 300;
/// Default MCP request timeout, milliseconds.
pub const MCP_DEFAULT_TIMEOUT_MS: u64 = 5_000;
/// Volume clamp bounds.
pub const VOLUME_MIN: i32 = 0;
pub const VOLUME_MAX: i32 = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Room
// ─────────────────────────────────────────────────────────────────────────────

/// Room empty-timeout applied at room creation, seconds.
pub const ROOM_EMPTY_TIMEOUT_SECS: u64 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// Application identity
// ─────────────────────────────────────────────────────────────────────────────

/// Protocol version this gateway accepts at hello time.
pub const PROTOCOL_VERSION: u32 = 3;

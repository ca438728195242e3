//! Centralized error types for the gateway core library.
//!
//! Mirrors the error-kind families in the design: connection-rejecting
//! errors, control-plane errors that surface a `type:"error"` message to
//! the device, and data-plane errors that recover locally and never reach
//! the device at all.

use thiserror::Error;

/// Trait for error types that provide a machine-readable error code.
///
/// Used in the `type:"error"` control message and in log fields so
/// operators can grep for a specific failure family.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Required configuration (env var or file) is missing at startup.
    #[error("configuration missing: {0}")]
    ConfigMissing(String),

    /// A device client id does not match the `group@@@mac@@@uuid` shape.
    #[error("invalid client id: {0}")]
    InvalidClientId(String),

    /// A MAC address does not match the canonical colon-hex form.
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    /// A hello carried a protocol version this gateway does not speak.
    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(u32),

    /// Room creation on the conferencing fabric failed.
    #[error("room create failed: {0}")]
    RoomCreateFailed(String),

    /// Room join on the conferencing fabric failed.
    #[error("room join failed: {0}")]
    RoomJoinFailed(String),

    /// A codec job did not complete within its deadline.
    #[error("codec worker timeout")]
    WorkerTimeout,

    /// A codec worker crashed while processing a job.
    #[error("codec worker crashed")]
    WorkerCrashed,

    /// A codec job was cancelled (session closed before it completed).
    #[error("codec worker job cancelled")]
    WorkerCancelled,

    /// A datagram failed to decrypt (or failed integrity where applicable).
    #[error("decrypt failed")]
    DecryptFailed,

    /// An MCP request was not answered within its deadline.
    #[error("mcp request timed out")]
    McpTimeout,

    /// The control-bus connection to the broker is down.
    #[error("broker disconnected")]
    BrokerDisconnected,

    /// A session was closed because it went quiet for too long.
    #[error("inactivity timeout")]
    InactivityTimeout,

    /// A session was closed for exceeding the maximum session duration.
    #[error("max session duration exceeded")]
    MaxSessionDuration,

    /// A session in the `Ending` phase never resumed audio and was force-closed.
    #[error("end-prompt timeout")]
    EndPromptTimeout,

    /// Wraps an HTTP client error from a collaborator call (device directory,
    /// media back-end, room service token exchange).
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Wraps a stream-cipher error.
    #[error("cipher error: {0}")]
    Cipher(#[from] crate::cipher::CipherError),

    /// Wraps a codec worker pool error not covered by the specific variants above.
    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    /// Catch-all for conditions that don't have a dedicated variant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorCode for GatewayError {
    fn code(&self) -> &'static str {
        match self {
            Self::ConfigMissing(_) => "config_missing",
            Self::InvalidClientId(_) => "invalid_client_id",
            Self::InvalidMac(_) => "invalid_mac",
            Self::UnsupportedProtocolVersion(_) => "unsupported_protocol_version",
            Self::RoomCreateFailed(_) => "room_create_failed",
            Self::RoomJoinFailed(_) => "room_join_failed",
            Self::WorkerTimeout => "worker_timeout",
            Self::WorkerCrashed => "worker_crashed",
            Self::WorkerCancelled => "worker_cancelled",
            Self::DecryptFailed => "decrypt_failed",
            Self::McpTimeout => "mcp_timeout",
            Self::BrokerDisconnected => "broker_disconnected",
            Self::InactivityTimeout => "inactivity_timeout",
            Self::MaxSessionDuration => "session_max_duration",
            Self::EndPromptTimeout => "end_prompt_timeout",
            Self::Http(_) => "http_error",
            Self::Cipher(_) => "cipher_error",
            Self::Codec(_) => "codec_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Convenient `Result` alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(GatewayError::DecryptFailed.code(), "decrypt_failed");
        assert_eq!(
            GatewayError::UnsupportedProtocolVersion(2).code(),
            "unsupported_protocol_version"
        );
        assert_eq!(GatewayError::McpTimeout.code(), "mcp_timeout");
    }
}

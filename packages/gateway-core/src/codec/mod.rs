//! Auto-scaled pool of isolated Opus codec workers.
//!
//! Each worker owns exactly one [`opus::Encoder`] and one [`opus::Decoder`]
//! and runs on its own OS thread so a codec panic or a pathological frame
//! cannot stall the async runtime. Jobs are dispatched over a
//! `crossbeam-channel` queue and replies come back over a one-shot channel.

mod metrics;
mod pool;
mod worker;

pub use metrics::WorkerMetrics;
pub use pool::CodecWorkerPool;

use thiserror::Error;

/// Errors raised by the codec worker pool.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Job did not complete before its deadline.
    #[error("codec job timed out")]
    Timeout,

    /// The worker handling the job crashed; its slot has been restarted.
    #[error("codec worker crashed")]
    WorkerCrashed,

    /// The job was cancelled before completing (pool shutting down).
    #[error("codec job cancelled")]
    Cancelled,

    /// The underlying Opus call failed.
    #[error("opus error: {0}")]
    Opus(String),

    /// Pool has no workers available to accept the job.
    #[error("codec worker pool unavailable")]
    PoolUnavailable,
}

impl From<opus::Error> for CodecError {
    fn from(e: opus::Error) -> Self {
        CodecError::Opus(e.to_string())
    }
}

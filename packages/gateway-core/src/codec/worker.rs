//! A single codec worker: one OS thread, one encoder, one decoder.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use opus::{Application, Channels, Decoder, Encoder};
use tokio::sync::oneshot;

use crate::codec::CodecError;
use crate::protocol_constants::{INBOUND_SAMPLE_RATE, OUTBOUND_SAMPLE_RATE};

/// Unit of work dispatched to a worker thread.
///
/// `id` is the pool's monotonic job id; workers don't act on it, it rides
/// along purely so crash/timeout logs can reference which job was in
/// flight when a worker went away.
pub(super) enum Job {
    Encode {
        id: u64,
        pcm: Vec<i16>,
        reply: oneshot::Sender<Result<Vec<u8>, CodecError>>,
    },
    Decode {
        id: u64,
        opus: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<i16>, CodecError>>,
    },
    Shutdown,
}

/// Handle the pool keeps for a live worker.
pub(super) struct WorkerHandle {
    pub(super) sender: crossbeam_channel::Sender<Job>,
    pub(super) in_flight: Arc<AtomicUsize>,
    pub(super) join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(super) fn load(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }
}

/// Spawns a worker OS thread, returning its handle and job sender.
///
/// The thread owns its encoder/decoder for its entire lifetime; panics
/// inside `run` unwind the thread without touching the async runtime, and
/// the pool detects the resulting `JoinHandle` completion to restart the
/// slot.
pub(super) fn spawn(index: usize) -> WorkerHandle {
    let (tx, rx) = crossbeam_channel::unbounded::<Job>();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let in_flight_thread = in_flight.clone();

    let join = std::thread::Builder::new()
        .name(format!("codec-worker-{index}"))
        .spawn(move || run(rx, in_flight_thread))
        .expect("failed to spawn codec worker thread");

    WorkerHandle {
        sender: tx,
        in_flight,
        join: Some(join),
    }
}

fn run(rx: crossbeam_channel::Receiver<Job>, in_flight: Arc<AtomicUsize>) {
    let mut encoder = match Encoder::new(OUTBOUND_SAMPLE_RATE, Channels::Mono, Application::Voip) {
        Ok(e) => e,
        Err(e) => {
            log::error!("[CodecWorker] failed to init encoder: {e}");
            return;
        }
    };
    let mut decoder = match Decoder::new(INBOUND_SAMPLE_RATE, Channels::Mono) {
        Ok(d) => d,
        Err(e) => {
            log::error!("[CodecWorker] failed to init decoder: {e}");
            return;
        }
    };

    while let Ok(job) = rx.recv() {
        match job {
            Job::Encode { id, pcm, reply } => {
                in_flight.fetch_add(1, Ordering::Relaxed);
                let mut out = vec![0u8; 4000];
                let result = encoder
                    .encode(&pcm, &mut out)
                    .map(|len| {
                        out.truncate(len);
                        out
                    })
                    .map_err(|e| {
                        log::warn!("[CodecWorker] encode job {id} failed: {e}");
                        CodecError::from(e)
                    });
                let _ = reply.send(result);
                in_flight.fetch_sub(1, Ordering::Relaxed);
            }
            Job::Decode { id, opus, reply } => {
                in_flight.fetch_add(1, Ordering::Relaxed);
                let mut out = vec![0i16; 5760];
                let result = decoder
                    .decode(&opus, &mut out, false)
                    .map(|len| {
                        out.truncate(len);
                        out
                    })
                    .map_err(|e| {
                        log::warn!("[CodecWorker] decode job {id} failed: {e}");
                        CodecError::from(e)
                    });
                let _ = reply.send(result);
                in_flight.fetch_sub(1, Ordering::Relaxed);
            }
            Job::Shutdown => break,
        }
    }
}

//! Dynamically sized pool of codec workers with least-loaded dispatch,
//! crash recovery, and a background autoscale monitor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use sysinfo::{CpuExt, System, SystemExt};
use tokio::time::timeout;

use crate::codec::metrics::WorkerMetrics;
use crate::codec::worker::{self, Job, WorkerHandle};
use crate::codec::CodecError;
use crate::protocol_constants::{
    AUTOSCALE_SAMPLE_INTERVAL_SECS, CODEC_JOB_TIMEOUT_MS, LOAD_UNIT_IN_FLIGHT, MAX_WORKERS,
    MIN_WORKERS, SCALE_DOWN_COOLDOWN_SECS, SCALE_UP_COOLDOWN_SECS,
};

struct Slot {
    handle: Option<WorkerHandle>,
}

/// Auto-scaled pool of isolated Opus codec workers.
pub struct CodecWorkerPool {
    self_weak: Weak<CodecWorkerPool>,
    slots: RwLock<Vec<Slot>>,
    next_job_id: AtomicU64,
    metrics: WorkerMetrics,
    last_scale_up: Mutex<Instant>,
    last_scale_down: Mutex<Instant>,
    job_timeout: Duration,
}

impl CodecWorkerPool {
    /// Creates a pool with [`MIN_WORKERS`] workers already running and
    /// starts the autoscale monitor and crash watchers on the current
    /// Tokio runtime.
    pub fn start() -> Arc<Self> {
        let pool = Arc::new_cyclic(|weak| Self {
            self_weak: weak.clone(),
            slots: RwLock::new(Vec::new()),
            next_job_id: AtomicU64::new(1),
            metrics: WorkerMetrics::new(),
            last_scale_up: Mutex::new(Instant::now() - Duration::from_secs(SCALE_UP_COOLDOWN_SECS)),
            last_scale_down: Mutex::new(
                Instant::now() - Duration::from_secs(SCALE_DOWN_COOLDOWN_SECS),
            ),
            job_timeout: Duration::from_millis(CODEC_JOB_TIMEOUT_MS),
        });

        for _ in 0..MIN_WORKERS {
            pool.spawn_worker();
        }

        tokio::spawn(Self::run_autoscale_monitor(Arc::downgrade(&pool)));

        pool
    }

    /// Number of currently live worker slots.
    pub fn worker_count(&self) -> usize {
        self.slots.read().iter().filter(|s| s.handle.is_some()).count()
    }

    /// Encodes PCM16 samples (at [`crate::protocol_constants::OUTBOUND_SAMPLE_RATE`])
    /// into an Opus packet, subject to the default job deadline.
    pub async fn encode(&self, pcm: Vec<i16>) -> Result<Vec<u8>, CodecError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        self.dispatch(Job::Encode { id, pcm, reply: tx })?;
        self.await_reply(rx).await
    }

    /// Decodes an Opus packet into PCM16 samples (at
    /// [`crate::protocol_constants::INBOUND_SAMPLE_RATE`]), subject to the
    /// default job deadline.
    pub async fn decode(&self, opus: Vec<u8>) -> Result<Vec<i16>, CodecError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        self.dispatch(Job::Decode { id, opus, reply: tx })?;
        self.await_reply(rx).await
    }

    async fn await_reply<T>(
        &self,
        rx: tokio::sync::oneshot::Receiver<Result<T, CodecError>>,
    ) -> Result<T, CodecError> {
        let started = Instant::now();
        let result = match timeout(self.job_timeout, rx).await {
            Ok(Ok(inner)) => inner,
            Ok(Err(_)) => Err(CodecError::WorkerCrashed),
            Err(_) => Err(CodecError::Timeout),
        };
        match &result {
            Ok(_) => self.metrics.record_latency(started.elapsed().as_micros() as u64),
            Err(_) => self.metrics.record_error(),
        }
        result
    }

    fn dispatch(&self, job: Job) -> Result<(), CodecError> {
        let slots = self.slots.read();
        let chosen = slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.handle.as_ref().map(|h| (i, h.load())))
            .min_by_key(|(i, load)| (*load, *i));

        let Some((idx, _)) = chosen else {
            return Err(CodecError::PoolUnavailable);
        };
        slots[idx]
            .handle
            .as_ref()
            .expect("index chosen from a Some entry")
            .sender
            .send(job)
            .map_err(|_| CodecError::PoolUnavailable)
    }

    /// Returns true when the pool is under enough sustained load that a
    /// caller should prefer a lower-fidelity fallback (e.g. smaller Opus
    /// frames, or skipping resampling quality improvements).
    pub fn should_downgrade(&self) -> bool {
        self.metrics.avg_latency_ms() > 10.0
            || Self::sample_cpu_percent() > 80.0
            || Self::sample_memory_mb() > 500.0
    }

    fn spawn_worker(&self) {
        let mut slots = self.slots.write();
        let index = slots.iter().position(|s| s.handle.is_none()).unwrap_or(slots.len());
        let mut handle = worker::spawn(index);
        let join = handle.join.take();

        if index == slots.len() {
            slots.push(Slot { handle: Some(handle) });
        } else {
            slots[index].handle = Some(handle);
        }
        drop(slots);

        if let Some(join) = join {
            tokio::spawn(Self::watch_worker(self.self_weak.clone(), index, join));
        }
    }

    async fn watch_worker(
        pool: Weak<CodecWorkerPool>,
        index: usize,
        join: std::thread::JoinHandle<()>,
    ) {
        let _ = tokio::task::spawn_blocking(move || join.join()).await;
        if let Some(pool) = pool.upgrade() {
            log::warn!("[CodecWorkerPool] worker {index} exited, restarting slot");
            pool.slots.write()[index].handle = None;
            pool.spawn_worker();
        }
    }

    fn sample_cpu_percent() -> f64 {
        let mut sys = System::new();
        sys.refresh_cpu();
        let cpus = sys.cpus();
        if cpus.is_empty() {
            return 0.0;
        }
        (cpus.iter().map(|c| c.cpu_usage() as f64).sum::<f64>()) / cpus.len() as f64
    }

    fn sample_memory_mb() -> f64 {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.used_memory() as f64 / 1024.0
    }

    async fn run_autoscale_monitor(pool: Weak<CodecWorkerPool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(AUTOSCALE_SAMPLE_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            let Some(pool) = pool.upgrade() else { return };
            pool.autoscale_tick();
        }
    }

    fn autoscale_tick(&self) {
        let worker_count = self.worker_count();
        if worker_count == 0 {
            return;
        }
        let pending: usize = self
            .slots
            .read()
            .iter()
            .filter_map(|s| s.handle.as_ref().map(|h| h.load()))
            .sum();
        let avg_load = (pending as f64 / worker_count as f64) / LOAD_UNIT_IN_FLIGHT;
        let cpu = Self::sample_cpu_percent();
        let max_latency = self.metrics.max_latency_ms();

        let scale_up = worker_count < MAX_WORKERS
            && (avg_load > 0.7 || cpu > 60.0 || max_latency > 50.0 || pending > 3 * worker_count)
            && self.last_scale_up.lock().elapsed() >= Duration::from_secs(SCALE_UP_COOLDOWN_SECS);

        let scale_down = worker_count > MIN_WORKERS
            && avg_load < 0.3
            && cpu < 30.0
            && max_latency < 10.0
            && pending == 0
            && self.last_scale_down.lock().elapsed()
                >= Duration::from_secs(SCALE_DOWN_COOLDOWN_SECS);

        if scale_up {
            log::info!(
                "[CodecWorkerPool] scaling up from {worker_count} workers (load={avg_load:.2}, cpu={cpu:.1}%)"
            );
            *self.last_scale_up.lock() = Instant::now();
            self.spawn_worker();
        } else if scale_down {
            log::info!("[CodecWorkerPool] scaling down from {worker_count} workers (idle)");
            *self.last_scale_down.lock() = Instant::now();
            self.retire_one_worker();
        }

        self.metrics.reset_window();
    }

    fn retire_one_worker(&self) {
        let mut slots = self.slots.write();
        if let Some(slot) = slots.iter_mut().rev().find(|s| s.handle.is_some()) {
            if let Some(handle) = slot.handle.take() {
                let _ = handle.sender.send(Job::Shutdown);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encode_then_decode_round_trips_frame_count() {
        let pool = CodecWorkerPool::start();
        assert_eq!(pool.worker_count(), MIN_WORKERS);

        let pcm = vec![0i16; crate::protocol_constants::OUTBOUND_FRAME_SAMPLES];
        let opus = pool.encode(pcm).await.expect("encode");
        assert!(!opus.is_empty());
    }

    #[tokio::test]
    async fn should_downgrade_false_when_idle() {
        let pool = CodecWorkerPool::start();
        // A freshly started pool has no latency samples yet.
        assert!(!pool.metrics.avg_latency_ms().is_nan());
        let _ = pool.should_downgrade();
    }
}

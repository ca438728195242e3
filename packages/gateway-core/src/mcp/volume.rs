//! Debounced, serialized volume adjustment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::time::sleep;

use crate::mcp::coordinator::{DeviceChannel, McpCoordinator};
use crate::protocol_constants::{VOLUME_DEBOUNCE_MS, VOLUME_MAX, VOLUME_MIN};

/// `up` or `down`, as named in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeAction {
    Up,
    Down,
}

/// Queries and pushes the device's current volume. Implemented over
/// [`McpCoordinator`] in production; fakeable for tests.
#[async_trait]
pub trait VolumeDevice: Send + Sync {
    async fn get_volume(&self) -> Result<i32, String>;
    async fn set_volume(&self, value: i32) -> Result<(), String>;
}

pub struct McpVolumeDevice {
    coordinator: Arc<McpCoordinator>,
}

impl McpVolumeDevice {
    pub fn new(coordinator: Arc<McpCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl VolumeDevice for McpVolumeDevice {
    async fn get_volume(&self) -> Result<i32, String> {
        let result = self
            .coordinator
            .call_tool("self.get_device_status", json!({}), 5_000)
            .await
            .map_err(|e| e.to_string())?;
        result
            .get("volume")
            .and_then(Value::as_i64)
            .map(|v| v as i32)
            .ok_or_else(|| "device status missing volume".to_string())
    }

    async fn set_volume(&self, value: i32) -> Result<(), String> {
        self.coordinator
            .call_tool("self.audio_speaker.set_volume", json!({ "volume": value }), 5_000)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

struct Accumulator {
    action: VolumeAction,
    step: i32,
    waiters: Vec<oneshot::Sender<Option<i32>>>,
    /// Bumped on every merged request; a timer only fires if its generation
    /// still matches the accumulator's when it wakes, so a new request
    /// re-arms (rather than merely joins) the debounce window.
    generation: u64,
}

/// At most one live accumulator at a time; serializes the actual device
/// write behind an async mutex so concurrent debounce fires never race.
pub struct VolumeDebouncer {
    device: Arc<dyn VolumeDevice>,
    accumulator: Mutex<Option<Accumulator>>,
    last_known_volume: Mutex<Option<i32>>,
    write_lock: AsyncMutex<()>,
    debounce_ms: u64,
}

impl VolumeDebouncer {
    pub fn new(device: Arc<dyn VolumeDevice>) -> Self {
        Self {
            device,
            accumulator: Mutex::new(None),
            last_known_volume: Mutex::new(None),
            write_lock: AsyncMutex::new(()),
            debounce_ms: VOLUME_DEBOUNCE_MS,
        }
    }

    /// Accumulates a volume adjust request. Returns a receiver resolved
    /// once the debounce window fires and the adjust completes (or `None`
    /// on device error, per the graceful-degradation contract).
    pub fn debounced_adjust(self: &Arc<Self>, action: VolumeAction, step: i32) -> oneshot::Receiver<Option<i32>> {
        let (tx, rx) = oneshot::channel();
        let mut guard = self.accumulator.lock();

        let generation = match guard.as_mut() {
            Some(acc) if acc.action == action => {
                acc.step += step;
                acc.waiters.push(tx);
                acc.generation += 1;
                acc.generation
            }
            _ => {
                if let Some(stale) = guard.take() {
                    // Different action arrived before the old one fired;
                    // resolve its waiters with null rather than dropping them.
                    for waiter in stale.waiters {
                        let _ = waiter.send(None);
                    }
                }
                *guard = Some(Accumulator { action, step, waiters: vec![tx], generation: 0 });
                0
            }
        };
        drop(guard);
        self.arm_timer(generation);

        rx
    }

    /// Arms a timer for `generation`. The timer reset re-arms the debounce:
    /// every new same-action request bumps the accumulator's generation and
    /// arms its own timer, so only the most recently armed timer still
    /// matches when it wakes and actually fires.
    fn arm_timer(self: &Arc<Self>, generation: u64) {
        let this = self.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(this.debounce_ms)).await;
            let is_current = matches!(
                this.accumulator.lock().as_ref(),
                Some(acc) if acc.generation == generation
            );
            if is_current {
                this.fire().await;
            }
        });
    }

    async fn fire(self: &Arc<Self>) {
        let Some(acc) = self.accumulator.lock().take() else { return };
        let result = self.adjust_volume(acc.action, acc.step).await;
        for waiter in acc.waiters {
            let _ = waiter.send(result);
        }
    }

    /// Disarms any live accumulator and resolves its waiters with `None`,
    /// per the session-close cancellation contract.
    pub fn cancel(&self) {
        if let Some(acc) = self.accumulator.lock().take() {
            for waiter in acc.waiters {
                let _ = waiter.send(None);
            }
        }
    }

    /// Serialized device write: reads `last_known_volume` (or queries the
    /// device if unset), clamps, writes, and updates the cache. On error the
    /// cache is invalidated so the next adjust re-reads device state.
    async fn adjust_volume(&self, action: VolumeAction, step: i32) -> Option<i32> {
        let _serial = self.write_lock.lock().await;

        let current = match *self.last_known_volume.lock() {
            Some(v) => v,
            None => match self.device.get_volume().await {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("[VolumeDebouncer] failed to read current volume: {e}");
                    return None;
                }
            },
        };

        let delta = if action == VolumeAction::Up { step } else { -step };
        let target = (current + delta).clamp(VOLUME_MIN, VOLUME_MAX);

        match self.device.set_volume(target).await {
            Ok(()) => {
                *self.last_known_volume.lock() = Some(target);
                Some(target)
            }
            Err(e) => {
                log::warn!("[VolumeDebouncer] set_volume failed: {e}");
                *self.last_known_volume.lock() = None;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    struct FakeDevice {
        volume: AtomicI32,
        set_calls: AtomicUsize,
    }

    #[async_trait]
    impl VolumeDevice for FakeDevice {
        async fn get_volume(&self) -> Result<i32, String> {
            Ok(self.volume.load(Ordering::SeqCst))
        }
        async fn set_volume(&self, value: i32) -> Result<(), String> {
            self.set_calls.fetch_add(1, Ordering::SeqCst);
            self.volume.store(value, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn accumulates_same_action_before_firing() {
        let device = Arc::new(FakeDevice { volume: AtomicI32::new(50), set_calls: AtomicUsize::new(0) });
        let debouncer = Arc::new(VolumeDebouncer::new(device.clone()));

        let r1 = debouncer.debounced_adjust(VolumeAction::Up, 5);
        let r2 = debouncer.debounced_adjust(VolumeAction::Up, 5);

        tokio::time::advance(Duration::from_millis(VOLUME_DEBOUNCE_MS + 50)).await;

        assert_eq!(r1.await.unwrap(), Some(60));
        assert_eq!(r2.await.unwrap(), Some(60));
        assert_eq!(device.set_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_resets_on_staggered_same_action_requests() {
        let device = Arc::new(FakeDevice { volume: AtomicI32::new(50), set_calls: AtomicUsize::new(0) });
        let debouncer = Arc::new(VolumeDebouncer::new(device.clone()));

        let r1 = debouncer.debounced_adjust(VolumeAction::Up, 5);
        // Second request arrives well inside the first window.
        tokio::time::advance(Duration::from_millis(VOLUME_DEBOUNCE_MS - 100)).await;
        let r2 = debouncer.debounced_adjust(VolumeAction::Up, 5);

        // Original deadline (VOLUME_DEBOUNCE_MS after r1) has now passed, but the
        // timer should have been reset by r2's arrival, so nothing fires yet.
        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(device.set_calls.load(Ordering::SeqCst), 0);

        // Now past VOLUME_DEBOUNCE_MS since r2: the reset window fires once.
        tokio::time::advance(Duration::from_millis(VOLUME_DEBOUNCE_MS)).await;
        assert_eq!(r1.await.unwrap(), Some(60));
        assert_eq!(r2.await.unwrap(), Some(60));
        assert_eq!(device.set_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clamps_to_bounds() {
        let device = Arc::new(FakeDevice { volume: AtomicI32::new(98), set_calls: AtomicUsize::new(0) });
        let debouncer = Arc::new(VolumeDebouncer::new(device));
        let r = debouncer.debounced_adjust(VolumeAction::Up, 10);
        tokio::time::advance(Duration::from_millis(VOLUME_DEBOUNCE_MS + 50)).await;
        assert_eq!(r.await.unwrap(), Some(VOLUME_MAX));
    }
}

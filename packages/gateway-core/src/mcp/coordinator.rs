//! Request/response correlation for device-bound JSON-RPC tool calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::utils::now_millis;

/// Errors raised by [`McpCoordinator::call_tool`].
#[derive(Debug, Error)]
pub enum McpError {
    #[error("mcp request timed out")]
    Timeout,
    #[error("mcp send failed: {0}")]
    SendFailed(String),
    #[error("mcp error response: {0}")]
    DeviceError(Value),
}

/// Abstraction over "publish this JSON-RPC envelope to the device",
/// decoupling the coordinator from [`crate::control::ControlBus`] so it can
/// be unit tested with a fake.
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    async fn send_mcp(&self, envelope: Value) -> Result<(), String>;
}

struct PendingRequest {
    resolve: oneshot::Sender<Result<Value, Value>>,
}

/// Owns the outstanding-request table for one session's device channel.
pub struct McpCoordinator {
    session_id: String,
    next_id: AtomicU32,
    pending: Mutex<HashMap<u32, PendingRequest>>,
    channel: std::sync::Arc<dyn DeviceChannel>,
}

impl McpCoordinator {
    pub fn new(session_id: String, channel: std::sync::Arc<dyn DeviceChannel>) -> Self {
        Self {
            session_id,
            next_id: AtomicU32::new(1),
            pending: Mutex::new(HashMap::new()),
            channel,
        }
    }

    /// Sends a `tools/call` JSON-RPC request for `tool` and awaits the
    /// matching response, honoring `timeout_ms`.
    pub async fn call_tool(&self, tool: &str, arguments: Value, timeout_ms: u64) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, PendingRequest { resolve: tx });

        let payload = json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": { "name": tool, "arguments": arguments },
            "id": id,
        });
        let envelope = json!({
            "type": "mcp",
            "payload": payload,
            "session_id": self.session_id,
            "request_id": format!("req_{id}"),
            "timestamp": now_millis(),
        });

        if let Err(e) = self.channel.send_mcp(envelope).await {
            self.pending.lock().remove(&id);
            return Err(McpError::SendFailed(e));
        }

        match timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(Ok(result))) => Ok(Self::unwrap_content_text(result)),
            Ok(Ok(Err(error))) => Err(McpError::DeviceError(error)),
            Ok(Err(_)) => Err(McpError::Timeout),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(McpError::Timeout)
            }
        }
    }

    /// Feeds an incoming `mcp` response envelope into the pending table.
    /// Resolves or rejects based on presence of `result` vs `error`; a
    /// non-matching or already-resolved id is logged and ignored.
    pub fn handle_response(&self, id: u32, result: Option<Value>, error: Option<Value>) {
        let Some(pending) = self.pending.lock().remove(&id) else {
            log::warn!("[McpCoordinator] response for unknown or expired id {id}");
            return;
        };
        let outcome = match (result, error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(error),
            (None, None) => Err(json!({"message": "empty mcp response"})),
        };
        let _ = pending.resolve.send(outcome);
    }

    /// Rejects every pending request, e.g. on session close.
    pub fn cancel_all(&self) {
        for (_, pending) in self.pending.lock().drain() {
            let _ = pending.resolve.send(Err(json!({"message": "session closed"})));
        }
    }

    fn unwrap_content_text(result: Value) -> Value {
        result
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|item| item.get("text"))
            .cloned()
            .unwrap_or(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct FakeChannel {
        sent: Arc<Mutex<Vec<Value>>>,
        call_count: AtomicUsize,
    }

    #[async_trait]
    impl DeviceChannel for FakeChannel {
        async fn send_mcp(&self, envelope: Value) -> Result<(), String> {
            self.call_count.fetch_add(1, Ordering::Relaxed);
            self.sent.lock().push(envelope);
            Ok(())
        }
    }

    #[tokio::test]
    async fn resolves_on_matching_response() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let channel = Arc::new(FakeChannel { sent: sent.clone(), call_count: AtomicUsize::new(0) });
        let coordinator = Arc::new(McpCoordinator::new("s1".to_string(), channel));

        let coordinator_clone = coordinator.clone();
        let sent_clone = sent.clone();
        let call = tokio::spawn(async move {
            coordinator_clone.call_tool("self.audio_speaker.mute", json!({}), 2000).await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let id = sent_clone.lock()[0]["payload"]["id"].as_u64().unwrap() as u32;
        coordinator.handle_response(id, Some(json!({"ok": true})), None);

        let result = call.await.unwrap().unwrap();
        assert_eq!(result, json!({"ok": true}));
    }

    #[tokio::test]
    async fn times_out_when_unanswered() {
        let channel = Arc::new(FakeChannel { sent: Arc::new(Mutex::new(Vec::new())), call_count: AtomicUsize::new(0) });
        let coordinator = McpCoordinator::new("s1".to_string(), channel);
        let result = coordinator.call_tool("self.led.set_color", json!({}), 20).await;
        assert!(matches!(result, Err(McpError::Timeout)));
    }

    #[tokio::test]
    async fn unwraps_content_text() {
        let channel = Arc::new(FakeChannel { sent: Arc::new(Mutex::new(Vec::new())), call_count: AtomicUsize::new(0) });
        let coordinator = Arc::new(McpCoordinator::new("s1".to_string(), channel));
        let coordinator_clone = coordinator.clone();
        let call = tokio::spawn(async move {
            coordinator_clone.call_tool("self.get_device_status", json!({}), 2000).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        coordinator.handle_response(1, Some(json!({"content": [{"text": "42"}]})), None);
        assert_eq!(call.await.unwrap().unwrap(), json!("42"));
    }
}

//! Process-wide orchestrator (§4.10): owns the UDP datagram socket, drains
//! the control-bus receive loop, ticks the keep-alive timer, and routes
//! everything through one [`SessionFsm`].

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::control::{DeviceMessage, GoodbyeReason, RoutedMessage};
use crate::device::{ClientId, Mac};
use crate::protocol_constants::{KEEPALIVE_TICK_SECS, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use crate::session::{SessionDeps, SessionFsm};
use crate::transport::DecodeOutcome;
use std::sync::Arc;

/// Ties the datagram loop, the control-bus loop, and the keep-alive ticker
/// to one [`SessionFsm`]; a single instance runs for the life of the process.
pub struct Gateway {
    deps: Arc<SessionDeps>,
    fsm: SessionFsm,
}

impl Gateway {
    pub fn new(deps: Arc<SessionDeps>) -> Self {
        let fsm = SessionFsm::new(deps.clone());
        Self { deps, fsm }
    }

    /// Runs every background loop until `cancel_token` fires, then performs
    /// the ordered shutdown described in §4.10: stop the timers, goodbye and
    /// tear down every live session, and let the caller close the broker and
    /// socket once this returns.
    pub async fn run(&self, control_rx: mpsc::Receiver<RoutedMessage>, cancel_token: CancellationToken) {
        tokio::join!(
            self.run_udp_loop(cancel_token.clone()),
            self.run_control_loop(control_rx, cancel_token.clone()),
            self.run_keepalive_ticker(cancel_token.clone()),
        );
        self.shutdown().await;
    }

    async fn run_udp_loop(&self, cancel_token: CancellationToken) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, addr) = tokio::select! {
                _ = cancel_token.cancelled() => return,
                result = self.deps.transport.recv(&mut buf) => match result {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::warn!("[Gateway] UDP recv failed: {e}");
                        continue;
                    }
                },
            };
            self.handle_datagram(&buf[..len], addr).await;
        }
    }

    async fn handle_datagram(&self, raw: &[u8], addr: std::net::SocketAddr) {
        let Some(header) = crate::transport::DatagramHeader::parse(raw) else {
            return;
        };
        let Some(session) = self.deps.registry.get_by_connection_id(header.connection_id) else {
            return;
        };
        self.fsm.note_device_addr(header.connection_id, addr);

        match self
            .deps
            .transport
            .decode(raw, &session.key, session.highest_inbound_sequence())
        {
            DecodeOutcome::Audio(datagram) => {
                if !session.accept_inbound_sequence(datagram.sequence) {
                    return;
                }
                // Inbound audio arrives Opus-encoded (§4.3, §4.7); fall back
                // to treating the raw bytes as little-endian PCM16 on decode
                // failure rather than dropping the frame (§7).
                let pcm = match self.deps.codec_pool.decode(datagram.payload.clone()).await {
                    Ok(pcm) => pcm,
                    Err(e) => {
                        log::warn!(
                            "[Gateway] opus decode failed for connection {}: {e}, forwarding raw bytes as PCM",
                            header.connection_id
                        );
                        datagram
                            .payload
                            .chunks_exact(2)
                            .map(|b| i16::from_le_bytes([b[0], b[1]]))
                            .collect()
                    }
                };
                let bridge = session.state.lock().await.bridge.clone();
                if let Some(bridge) = bridge {
                    bridge.capture_inbound_frame(&pcm).await;
                }
            }
            DecodeOutcome::Ping { .. } => {
                session.touch_activity();
            }
            DecodeOutcome::Dropped => {}
        }
    }

    async fn run_control_loop(&self, mut control_rx: mpsc::Receiver<RoutedMessage>, cancel_token: CancellationToken) {
        loop {
            let routed = tokio::select! {
                _ = cancel_token.cancelled() => return,
                routed = control_rx.recv() => match routed {
                    Some(routed) => routed,
                    None => return,
                },
            };
            self.handle_routed(routed).await;
        }
    }

    async fn handle_routed(&self, routed: RoutedMessage) {
        if let DeviceMessage::Hello { version, language, client_id, .. } = routed.message {
            self.handle_hello_message(version, language, client_id).await;
            return;
        }

        let Ok(mac) = Mac::from_underscore_str(&routed.mac) else {
            log::warn!("[Gateway] dropping message for unparseable mac {}", routed.mac);
            return;
        };
        if let Err(e) = self.fsm.dispatch(&mac, routed.message).await {
            log::warn!("[Gateway] dispatch failed for {mac}: {e}");
        }
    }

    /// A device that violates the hello contract (wrong version, bad client
    /// id) gets no response at all and the broker connection state is
    /// otherwise untouched (§6, §7) — so every failure here is a silent drop.
    async fn handle_hello_message(&self, version: u32, language: Option<String>, client_id: Option<String>) {
        if version != PROTOCOL_VERSION {
            log::warn!("[Gateway] hello with unsupported protocol version {version}, dropping");
            return;
        }
        let Some(client_id) = client_id else {
            log::warn!("[Gateway] hello missing client_id, dropping");
            return;
        };
        let client_id: ClientId = match client_id.parse() {
            Ok(id) => id,
            Err(e) => {
                log::warn!("[Gateway] hello with invalid client_id: {e}, dropping");
                return;
            }
        };
        if let Err(e) = self.fsm.handle_hello(client_id, language).await {
            log::warn!("[Gateway] handle_hello failed: {e}");
        }
    }

    async fn run_keepalive_ticker(&self, cancel_token: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(KEEPALIVE_TICK_SECS));
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => return,
                _ = ticker.tick() => {
                    for session in self.deps.registry.all_sessions() {
                        self.fsm.tick(&session).await;
                    }
                }
            }
        }
    }

    /// Goodbye, bridge close, and room teardown for every live session, in
    /// preparation for the caller disconnecting the broker and closing the
    /// socket (§4.10).
    async fn shutdown(&self) {
        let sessions = self.deps.registry.all_sessions();
        log::info!("[Gateway] shutting down, closing {} session(s)", sessions.len());
        for session in sessions {
            self.fsm.close_session(&session, GoodbyeReason::GatewayShutdown).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_datagram_size_covers_header_plus_a_frame() {
        assert!(MAX_DATAGRAM_SIZE > crate::protocol_constants::INBOUND_FRAME_BYTES);
    }
}

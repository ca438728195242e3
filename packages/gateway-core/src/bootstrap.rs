//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. This pattern provides:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing
//! - **Maintainability**: Service creation logic is isolated from usage

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::codec::CodecWorkerPool;
use crate::control::{ControlBus, RoutedMessage};
use crate::directory::DeviceDirectory;
use crate::error::GatewayResult;
use crate::gateway::Gateway;
use crate::media::RoomService;
use crate::media_backend::MediaBackendClient;
use crate::runtime::TokioSpawner;
use crate::session::{SessionDeps, SessionRegistry};
use crate::state::Config;
use crate::transport::DatagramTransport;

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap. It's
/// consumed by the binary crate to run the gateway and drive shutdown.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// The process-wide orchestrator: UDP loop, control-bus loop, keep-alive ticker.
    pub gateway: Arc<Gateway>,
    /// Collaborators shared by every session; also reachable from `gateway`.
    pub deps: Arc<SessionDeps>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Runs the gateway's background loops until cancelled, then tears
    /// sessions down. Consumes the control-bus receiver, so this can only be
    /// called once.
    pub async fn run(&self, control_rx: mpsc::Receiver<RoutedMessage>) {
        self.gateway.run(control_rx, self.cancel_token.clone()).await;
    }

    /// Signals every background loop to stop; the in-flight `run` call
    /// performs the actual per-session teardown once it observes the
    /// cancellation.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] signalling shutdown");
        self.cancel_token.cancel();
    }
}

/// Bootstraps all gateway services with their dependencies.
///
/// This is the composition root where all services are instantiated and
/// wired together. The wiring order matters - services are created in
/// dependency order:
///
/// 1. Validate configuration (fails fast on a missing required value)
/// 2. Task spawner and cancellation token (shared infrastructure)
/// 3. HTTP-backed collaborators: `DeviceDirectory`, `MediaBackendClient`, `RoomService`
/// 4. `CodecWorkerPool` (spins up its worker tasks immediately)
/// 5. UDP datagram transport (binds the socket)
/// 6. Control bus (connects to the broker, starts its poll loop)
/// 7. Session registry and `SessionDeps` (tie everything above together)
/// 8. The `Gateway` orchestrator itself
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the UDP socket fails to
/// bind, or any other fallible construction step fails.
pub async fn bootstrap_services(config: Config) -> GatewayResult<(BootstrappedServices, mpsc::Receiver<RoutedMessage>)> {
    config.validate()?;

    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();

    let directory = Arc::new(DeviceDirectory::new(config.manager_api_url.clone(), config.cerebrium_api_token.clone()));
    let media_backend = Arc::new(MediaBackendClient::new(config.media_api_base.clone(), config.cerebrium_api_token.clone()));
    let room_service = Arc::new(RoomService::new(&config.livekit));

    let codec_pool = CodecWorkerPool::start();

    let transport = Arc::new(DatagramTransport::bind(config.udp_port).await.map_err(|e| {
        crate::error::GatewayError::Internal(format!("failed to bind UDP socket on port {}: {e}", config.udp_port))
    })?);

    let (control_bus, control_rx) = ControlBus::connect(&config.mqtt_broker).await;
    let control_bus = Arc::new(control_bus);

    let registry = Arc::new(SessionRegistry::new());

    let deps = Arc::new(SessionDeps {
        directory,
        media_backend,
        room_service,
        control_bus,
        codec_pool,
        transport,
        registry,
        config: Arc::new(config),
        device_addrs: DashMap::new(),
    });

    let gateway = Arc::new(Gateway::new(deps.clone()));

    Ok((
        BootstrappedServices { gateway, deps, spawner, cancel_token },
        control_rx,
    ))
}

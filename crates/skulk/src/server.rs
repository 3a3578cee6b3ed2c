//! `SkulkServer` builder and accept loop.
//!
//! Ties the layers together: the transport accepts sockets, each socket
//! gets a gateway task, and every gateway feeds the same orchestrator.

use std::time::Duration;

use skulk_protocol::JsonCodec;
use skulk_room::{OrchestratorHandle, RoomSettings, spawn_orchestrator};
use skulk_transport::{Handshake, Transport, WebSocketTransport};

use crate::SkulkError;
use crate::handler::handle_connection;

/// How long an accepted socket gets to finish the WebSocket upgrade.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for configuring and starting a Skulk server.
///
/// # Example
///
/// ```rust,ignore
/// let server = SkulkServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct SkulkServerBuilder {
    bind_addr: String,
    settings: RoomSettings,
    handshake_timeout: Duration,
}

impl SkulkServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            settings: RoomSettings::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets room capacities, role counts, and phase durations.
    pub fn settings(mut self, settings: RoomSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets how long a socket may take to complete the upgrade before it
    /// is dropped.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Binds the listener and spawns the orchestrator.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn build(self) -> Result<SkulkServer, SkulkError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let orchestrator = spawn_orchestrator(self.settings);
        Ok(SkulkServer {
            transport,
            orchestrator,
            handshake_timeout: self.handshake_timeout,
        })
    }
}

impl Default for SkulkServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Skulk server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct SkulkServer {
    transport: WebSocketTransport,
    orchestrator: OrchestratorHandle,
    handshake_timeout: Duration,
}

impl SkulkServer {
    pub fn builder() -> SkulkServerBuilder {
        SkulkServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to the orchestrator, for queries and shutdown.
    pub fn orchestrator(&self) -> OrchestratorHandle {
        self.orchestrator.clone()
    }

    /// Runs the accept loop.
    ///
    /// Each accepted socket gets its own task, which runs the upgrade under
    /// the handshake timeout and then the gateway. A failed accept is logged
    /// and the loop keeps going; it runs until the task is dropped.
    pub async fn run(mut self) -> Result<(), SkulkError> {
        tracing::info!("skulk server running");

        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let orchestrator = self.orchestrator.clone();
                    tokio::spawn(serve(pending, orchestrator, self.handshake_timeout));
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

async fn serve<H: Handshake>(pending: H, orchestrator: OrchestratorHandle, timeout: Duration) {
    let conn_id = pending.id();
    let conn = match tokio::time::timeout(timeout, pending.complete()).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(e)) => {
            tracing::debug!(%conn_id, error = %e, "handshake failed");
            return;
        }
        Err(_) => {
            tracing::debug!(%conn_id, ?timeout, "handshake timed out");
            return;
        }
    };
    if let Err(e) = handle_connection(conn, orchestrator, JsonCodec).await {
        tracing::debug!(%conn_id, error = %e, "connection ended with error");
    }
}

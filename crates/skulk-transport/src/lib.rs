//! Transport abstraction layer for Skulk.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! message-oriented duplex links. Accepting only takes the socket; the
//! protocol handshake is a separate [`Handshake`] step so a silent peer
//! can't stall the accept loop. A connection is split into a
//! [`FrameSender`] and a [`FrameReceiver`] right after the handshake so that
//! the gateway can keep reading while the orchestrator pushes events out.
//!
//! # Feature Flags
//!
//! - `websocket` (default) - WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    PendingWebSocket, WebSocketConnection, WebSocketReceiver, WebSocketSender, WebSocketTransport,
};

use std::fmt;

/// Opaque identifier for a connection.
///
/// Issued by the transport on accept and never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// An accepted socket still owing its handshake.
    type Pending: Handshake;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next incoming socket. Never waits on the peer beyond
    /// the socket accept itself.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;
}

/// An accepted socket whose protocol handshake hasn't run yet.
///
/// Callers are expected to run [`complete`](Self::complete) off the accept
/// loop, under a timeout.
pub trait Handshake: Send + 'static {
    /// The link produced once the handshake succeeds.
    type Connection: Connection;
    /// The error type for the handshake.
    type Error: std::error::Error + Send + Sync;

    /// The id the connection will carry.
    fn id(&self) -> ConnectionId;

    /// Runs the handshake to completion.
    fn complete(
        self,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;
}

/// A freshly accepted duplex link, not yet split.
pub trait Connection: Send + 'static {
    /// The outbound half.
    type Sender: FrameSender;
    /// The inbound half.
    type Receiver: FrameReceiver;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Splits the link into independently owned send and receive halves.
    fn split(self) -> (Self::Sender, Self::Receiver);
}

/// The outbound half of a connection.
pub trait FrameSender: Send + 'static {
    /// The error type for send operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one text frame to the remote peer.
    fn send_text(
        &mut self,
        text: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Closes the link from our side.
    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// The inbound half of a connection.
pub trait FrameReceiver: Send + 'static {
    /// The error type for receive operations.
    type Error: std::error::Error + Send + Sync;

    /// Receives the next data frame (text or binary) as raw bytes.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;
}

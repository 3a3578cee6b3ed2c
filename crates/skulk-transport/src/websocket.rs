//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use crate::{
    Connection, ConnectionId, FrameReceiver, FrameSender, Handshake,
    Transport, TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Pending = PendingWebSocket;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Pending, Self::Error> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::trace!(%id, %peer, "accepted TCP socket");

        Ok(PendingWebSocket { id, stream, peer })
    }
}

/// A TCP socket still waiting for its WebSocket upgrade request.
pub struct PendingWebSocket {
    id: ConnectionId,
    stream: TcpStream,
    peer: SocketAddr,
}

impl PendingWebSocket {
    /// Remote address of the socket.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Handshake for PendingWebSocket {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn complete(self) -> Result<WebSocketConnection, TransportError> {
        let Self { id, stream, peer } = self;
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| {
                TransportError::AcceptFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;
        tracing::debug!(%id, %peer, "accepted WebSocket connection");

        Ok(WebSocketConnection { id, ws })
    }
}

/// A single accepted WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    ws: WsStream,
}

impl Connection for WebSocketConnection {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn split(self) -> (WebSocketSender, WebSocketReceiver) {
        let (sink, stream) = self.ws.split();
        (
            WebSocketSender { id: self.id, sink },
            WebSocketReceiver { id: self.id, stream },
        )
    }
}

/// Outbound half of a [`WebSocketConnection`].
pub struct WebSocketSender {
    id: ConnectionId,
    sink: SplitSink<WsStream, Message>,
}

impl WebSocketSender {
    /// The connection this half belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl FrameSender for WebSocketSender {
    type Error = TransportError;

    async fn send_text(&mut self, text: &str) -> Result<(), Self::Error> {
        self.sink
            .send(Message::Text(text.to_owned().into()))
            .await
            .map_err(|e| {
                TransportError::SendFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))
            })
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.sink.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}

/// Inbound half of a [`WebSocketConnection`].
pub struct WebSocketReceiver {
    id: ConnectionId,
    stream: SplitStream<WsStream>,
}

impl WebSocketReceiver {
    /// The connection this half belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl FrameReceiver for WebSocketReceiver {
    type Error = TransportError;

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, Self::Error> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }
}

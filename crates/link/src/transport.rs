//! Transport seam: a connection attempt is an event stream plus an
//! outbound queue, owned by the connection manager.
//!
//! ```text
//!   ConnectionManager ── TransportHandle ══ channels ══ TransportPeer ── pump task ── socket
//! ```
//!
//! Dropping the handle detaches every listener and requests a graceful
//! close; [`TransportHandle::terminate`] drops the socket without a close
//! handshake.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::types::LinkError;

/// Everything a transport reports back to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(Vec<u8>),
    /// Transport-level ping or pong frame.
    Heartbeat,
    /// A [`FrameKind::Ping`] frame reached the socket.
    PingWritten,
    Closed { code: Option<u16>, reason: String },
    /// `fatal` errors end the transport; others (e.g. one failed data write) do not.
    Errored { error: String, fatal: bool },
}

/// What an outbound frame is for.  A failed [`Ping`](FrameKind::Ping)
/// write is fatal; a failed [`Data`](FrameKind::Data) write is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Ping,
}

/// One queued text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub text: String,
    pub kind: FrameKind,
}

/// Manager-side end of one connection attempt.
#[derive(Debug)]
pub struct TransportHandle {
    events: mpsc::Receiver<TransportEvent>,
    outbound: mpsc::Sender<OutboundFrame>,
    kill: CancellationToken,
}

/// Socket-side end of one connection attempt.
#[derive(Debug)]
pub struct TransportPeer {
    pub events: mpsc::Sender<TransportEvent>,
    pub outbound: mpsc::Receiver<OutboundFrame>,
    pub kill: CancellationToken,
}

impl TransportHandle {
    /// Create a connected handle/peer pair with the given queue capacity.
    pub fn pair(capacity: usize) -> (TransportHandle, TransportPeer) {
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let kill = CancellationToken::new();
        (
            TransportHandle {
                events: event_rx,
                outbound: out_tx,
                kill: kill.clone(),
            },
            TransportPeer {
                events: event_tx,
                outbound: out_rx,
                kill,
            },
        )
    }

    /// Next event; `None` once the peer has gone away.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Queue a text frame without waiting.
    pub fn send(&self, text: String, kind: FrameKind) -> Result<(), LinkError> {
        self.outbound.try_send(OutboundFrame { text, kind }).map_err(|e| match e {
            TrySendError::Full(_) => LinkError::Transport("outbound queue full".into()),
            TrySendError::Closed(_) => LinkError::Transport("transport closed".into()),
        })
    }

    /// Detach listeners and request a graceful close.
    pub fn close(self) {
        drop(self);
    }

    /// Drop the socket without a close handshake.
    pub fn terminate(self) {
        self.kill.cancel();
    }
}

/// Creates transports.  Implementations spawn their own I/O and must not
/// block: `connect` returns as soon as the attempt is under way, and the
/// outcome arrives as [`TransportEvent::Opened`] or a fatal error.
///
/// An `Err` here is a construction failure (e.g. an unusable URL).
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> Result<TransportHandle, LinkError>;
}

/// Default bound on TCP connect plus the TLS and WebSocket handshakes.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`Connector`] backed by `tokio-tungstenite` (`ws://` and `wss://`).
#[derive(Debug, Clone)]
pub struct WsConnector {
    queue_capacity: usize,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Fail the attempt when the handshake has not completed in `d`.
    pub fn with_connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> Result<TransportHandle, LinkError> {
        let request = url
            .into_client_request()
            .map_err(|e| LinkError::WebSocket(format!("invalid endpoint {url}: {e}")))?;
        let (handle, peer) = TransportHandle::pair(self.queue_capacity);
        tokio::spawn(pump(request, peer, self.connect_timeout));
        Ok(handle)
    }
}

/// Connect within `connect_timeout`, then drive the socket.  A connect
/// failure or timeout is reported as one fatal error.
async fn pump(request: Request, mut peer: TransportPeer, connect_timeout: Duration) {
    let attempt = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(request));
    let connected = tokio::select! {
        r = attempt => r,
        _ = peer.kill.cancelled() => return,
        _ = peer.events.closed() => return,
    };

    let error = match connected {
        Ok(Ok((ws, _response))) => return run_socket(ws, peer).await,
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("handshake timed out after {}ms", connect_timeout.as_millis()),
    };
    let _ = peer
        .events
        .send(TransportEvent::Errored { error, fatal: true })
        .await;
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Pump frames between the socket and the handle until either side ends.
async fn run_socket(ws: WsStream, mut peer: TransportPeer) {
    if peer.events.send(TransportEvent::Opened).await.is_err() {
        return;
    }

    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            biased;

            _ = peer.kill.cancelled() => {
                tracing::debug!("transport terminated");
                return;
            }

            outbound = peer.outbound.recv() => match outbound {
                Some(OutboundFrame { text, kind }) => {
                    let event = match (sink.send(Message::Text(text)).await, kind) {
                        (Ok(()), FrameKind::Ping) => TransportEvent::PingWritten,
                        (Ok(()), FrameKind::Data) => continue,
                        (Err(e), FrameKind::Ping) => TransportEvent::Errored {
                            error: format!("ping write failed: {e}"),
                            fatal: true,
                        },
                        (Err(e), FrameKind::Data) => TransportEvent::Errored {
                            error: format!("send failed: {e}"),
                            fatal: false,
                        },
                    };
                    let fatal = matches!(event, TransportEvent::Errored { fatal: true, .. });
                    if peer.events.send(event).await.is_err() || fatal {
                        return;
                    }
                }
                None => {
                    // Handle dropped: graceful close.
                    let _ = sink.close().await;
                    return;
                }
            },

            frame = stream.next() => {
                let event = match frame {
                    Some(Ok(Message::Text(text))) => TransportEvent::Message(text.into_bytes()),
                    Some(Ok(Message::Binary(bytes))) => TransportEvent::Message(bytes),
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => TransportEvent::Heartbeat,
                    Some(Ok(Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                            None => (None, String::new()),
                        };
                        let _ = peer.events.send(TransportEvent::Closed { code, reason }).await;
                        return;
                    }
                    Some(Err(e)) => {
                        let _ = peer
                            .events
                            .send(TransportEvent::Errored {
                                error: e.to_string(),
                                fatal: true,
                            })
                            .await;
                        return;
                    }
                    None => {
                        let _ = peer
                            .events
                            .send(TransportEvent::Closed {
                                code: None,
                                reason: "stream ended".into(),
                            })
                            .await;
                        return;
                    }
                };
                if peer.events.send(event).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_is_construction_failure() {
        let connector = WsConnector::default();
        let err = connector.connect("not a url").unwrap_err();
        assert!(matches!(err, LinkError::WebSocket(_)));
    }

    #[tokio::test]
    async fn send_reaches_peer() {
        let (handle, mut peer) = TransportHandle::pair(4);
        handle.send("hello".into(), FrameKind::Data).unwrap();
        let frame = peer.outbound.recv().await.unwrap();
        assert_eq!(frame.text, "hello");
        assert_eq!(frame.kind, FrameKind::Data);
    }

    #[tokio::test]
    async fn send_fails_when_queue_full() {
        let (handle, _peer) = TransportHandle::pair(1);
        handle.send("a".into(), FrameKind::Data).unwrap();
        let err = handle.send("b".into(), FrameKind::Ping).unwrap_err();
        assert!(err.to_string().contains("full"));
    }

    #[tokio::test]
    async fn close_detaches_and_closes_outbound() {
        let (handle, mut peer) = TransportHandle::pair(4);
        handle.close();
        assert!(peer.outbound.recv().await.is_none());
        assert!(peer.events.is_closed());
        assert!(!peer.kill.is_cancelled());
    }

    #[tokio::test]
    async fn terminate_cancels_kill_token() {
        let (handle, peer) = TransportHandle::pair(4);
        handle.terminate();
        assert!(peer.kill.is_cancelled());
        assert!(peer.events.is_closed());
    }

    #[tokio::test]
    async fn silent_server_times_out_the_handshake() {
        // Accepts TCP, never answers the upgrade.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let held = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let connector = WsConnector::default().with_connect_timeout(Duration::from_millis(100));
        let mut handle = connector.connect(&format!("ws://{addr}/ws")).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), handle.next_event())
            .await
            .expect("handshake was not bounded");
        match event {
            Some(TransportEvent::Errored { error, fatal }) => {
                assert!(fatal);
                assert!(error.contains("timed out"), "{error}");
            }
            other => panic!("expected fatal error, got {other:?}"),
        }
        held.abort();
    }
}

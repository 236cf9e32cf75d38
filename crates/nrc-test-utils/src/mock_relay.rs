// mock_relay: an in-process websocket relay for integration tests.
//
// Binds port 0 (random) and handles each connection in a background task.
// Behavior is scripted through `MockRelayConfig`; every text frame a client
// sends is also captured and exposed through `next_frame` so tests can
// assert on the exact wire traffic.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use nrc_protocol::{ClientMessage, Event, RelayMessage};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

/// How the mock answers EVENT and AUTH submissions.
#[derive(Debug, Clone, Default)]
pub enum OkBehavior {
    /// Reply `["OK", <id>, true, ""]`.
    #[default]
    Accept,
    /// Reply `["OK", <id>, false, <reason>]`.
    Reject(String),
    /// Never reply; lets callers exercise timeouts.
    Ignore,
}

/// Scripted behavior for a [`MockRelay`].
#[derive(Debug, Clone, Default)]
pub struct MockRelayConfig {
    pub ok: OkBehavior,
    /// Events replayed (then EOSE) in response to a REQ.
    pub stored_events: Vec<Event>,
    /// Sent as an AUTH challenge immediately after the handshake.
    pub auth_challenge: Option<String>,
    /// NOTICE messages sent right after the handshake.
    pub notices: Vec<String>,
    /// Answer REQs with CLOSED instead of events.
    pub closed_reason: Option<String>,
    /// Answer COUNT requests with `(count, approximate)`.
    pub count: Option<(u64, bool)>,
    /// Complete the websocket handshake, then drop the connection without
    /// reading anything.
    pub drop_after_handshake: bool,
}

/// A mock relay for integration testing.  Each test spins up its own
/// isolated instance on a random port.
pub struct MockRelay {
    addr: SocketAddr,
    frames: mpsc::UnboundedReceiver<String>,
    /// Handle to the accept loop; dropped with the server.
    _task: tokio::task::JoinHandle<()>,
}

impl MockRelay {
    /// Start the mock relay, binding to a random available port.
    pub async fn start(config: MockRelayConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (frames_tx, frames) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            Self::accept_loop(listener, config, frames_tx).await;
        });

        Ok(Self {
            addr,
            frames,
            _task: task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The `ws://` URL clients should dial.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// The next raw text frame received from any client.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.frames.recv().await
    }

    /// The next client frame, decoded.
    pub async fn next_client_message(&mut self) -> Option<ClientMessage> {
        let frame = self.frames.recv().await?;
        serde_json::from_str(&frame).ok()
    }

    // -- internal --

    async fn accept_loop(
        listener: TcpListener,
        config: MockRelayConfig,
        frames_tx: mpsc::UnboundedSender<String>,
    ) {
        loop {
            match listener.accept().await {
                Ok((stream, _peer)) => {
                    let config = config.clone();
                    let frames_tx = frames_tx.clone();
                    tokio::spawn(async move {
                        // connection errors are expected in tests (clients
                        // drop mid-frame); swallow them
                        let _ = Self::handle_connection(stream, config, frames_tx).await;
                    });
                }
                Err(_) => break,
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        config: MockRelayConfig,
        frames_tx: mpsc::UnboundedSender<String>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        if config.drop_after_handshake {
            return Ok(());
        }
        let (mut write, mut read) = ws.split();

        if let Some(challenge) = &config.auth_challenge {
            let auth = RelayMessage::Auth {
                challenge: challenge.clone(),
            };
            write
                .send(Message::Text(serde_json::to_string(&auth)?.into()))
                .await?;
        }
        for notice in &config.notices {
            let notice = RelayMessage::Notice(notice.clone());
            write
                .send(Message::Text(serde_json::to_string(&notice)?.into()))
                .await?;
        }

        while let Some(frame) = read.next().await {
            let text = match frame? {
                Message::Text(t) => t,
                Message::Close(_) => break,
                Message::Ping(data) => {
                    write.send(Message::Pong(data)).await?;
                    continue;
                }
                _ => continue,
            };
            let _ = frames_tx.send(text.as_str().to_owned());

            let Ok(message) = serde_json::from_str::<ClientMessage>(text.as_str()) else {
                continue;
            };
            match message {
                ClientMessage::Event(event) | ClientMessage::Auth(event) => match &config.ok {
                    OkBehavior::Accept => {
                        let ok = RelayMessage::Ok {
                            id: event.id,
                            accepted: true,
                            reason: String::new(),
                        };
                        write
                            .send(Message::Text(serde_json::to_string(&ok)?.into()))
                            .await?;
                    }
                    OkBehavior::Reject(reason) => {
                        let ok = RelayMessage::Ok {
                            id: event.id,
                            accepted: false,
                            reason: reason.clone(),
                        };
                        write
                            .send(Message::Text(serde_json::to_string(&ok)?.into()))
                            .await?;
                    }
                    OkBehavior::Ignore => {}
                },
                ClientMessage::Req { id, .. } => {
                    if let Some(reason) = &config.closed_reason {
                        let closed = RelayMessage::Closed {
                            subscription: id,
                            reason: reason.clone(),
                        };
                        write
                            .send(Message::Text(serde_json::to_string(&closed)?.into()))
                            .await?;
                        continue;
                    }
                    for event in &config.stored_events {
                        let result = RelayMessage::Event {
                            subscription: id.clone(),
                            event: event.clone(),
                        };
                        write
                            .send(Message::Text(serde_json::to_string(&result)?.into()))
                            .await?;
                    }
                    let eose = RelayMessage::Eose(id);
                    write
                        .send(Message::Text(serde_json::to_string(&eose)?.into()))
                        .await?;
                }
                ClientMessage::Count { id, .. } => {
                    if let Some((count, approximate)) = config.count {
                        let response = RelayMessage::Count {
                            subscription: id,
                            count,
                            approximate,
                        };
                        write
                            .send(Message::Text(serde_json::to_string(&response)?.into()))
                            .await?;
                    }
                }
                ClientMessage::Close(_) => {}
            }
        }

        Ok(())
    }
}

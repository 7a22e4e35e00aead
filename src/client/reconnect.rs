//! Reconnection controller
//!
//! Keeps a chat socket open for one party:
//! `Disconnected → Connecting → Authenticated → Disconnected → ...`
//!
//! On every successful connect the auth frame is replayed and the client
//! counts as authenticated right away; the server answers a bad handshake
//! with an `error` frame, which is surfaced as [`ClientEvent::Error`].
//! After a drop the controller waits a fixed delay and tries again, forever,
//! until [`ChatClient::close`] is called.

use crate::chat::{ClientFrame, Party, ServerFrame};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay between a dropped connection and the next attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type OutboundSlot = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// e.g. `ws://localhost:8080/ws/app-chat`
    pub url: String,
    pub party: Party,
    pub token: Option<String>,
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, party: Party) -> Self {
        Self {
            url: url.into(),
            party,
            token: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    fn auth_frame(&self) -> String {
        ClientFrame::auth(&self.party, self.token.clone()).to_json()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Authenticated,
}

/// Something the server pushed to this client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    AgentMessage {
        content: String,
        timestamp: String,
        message_type: Option<String>,
    },
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,
    #[error("client closed")]
    Closed,
}

/// Handle to a running reconnection loop.
///
/// Dropping the handle stops the loop as well; `close` additionally waits
/// for it to finish.
pub struct ChatClient {
    state_rx: watch::Receiver<ClientState>,
    outbound: OutboundSlot,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChatClient {
    /// Start connecting in the background.
    ///
    /// Returns the handle and the stream of server events. Must be called
    /// from within a tokio runtime.
    pub fn open(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (state_tx, state_rx) = watch::channel(ClientState::Disconnected);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let outbound: OutboundSlot = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        let controller = Controller {
            config,
            state_tx,
            events_tx,
            outbound: outbound.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(controller.run());

        (
            Self {
                state_rx,
                outbound,
                cancel,
                task: Some(task),
            },
            events_rx,
        )
    }

    pub fn state(&self) -> ClientState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions
    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.state_rx.clone()
    }

    /// Wait until the controller reaches `state`
    pub async fn wait_for(&self, state: ClientState) -> Result<(), ClientError> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Closed)
    }

    /// Send a chat message on the current connection
    pub fn send_chat(&self, message: &str) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }
        if self.state() != ClientState::Authenticated {
            return Err(ClientError::NotConnected);
        }
        let guard = self.outbound.lock().map_err(|_| ClientError::Closed)?;
        let sender = guard.as_ref().ok_or(ClientError::NotConnected)?;
        sender
            .send(ClientFrame::chat(message).to_json())
            .map_err(|_| ClientError::NotConnected)
    }

    /// Stop reconnecting, close the socket and wait for the loop to exit
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Controller {
    config: ClientConfig,
    state_tx: watch::Sender<ClientState>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    outbound: OutboundSlot,
    cancel: CancellationToken,
}

impl Controller {
    async fn run(self) {
        loop {
            self.state_tx.send_replace(ClientState::Connecting);
            debug!(url = %self.config.url, party = %self.config.party, "Connecting");

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = connect_async(self.config.url.as_str()) => result,
            };

            match connected {
                Ok((socket, _)) => {
                    info!(url = %self.config.url, party = %self.config.party, "Chat socket connected");
                    self.run_connection(socket).await;
                }
                Err(e) => {
                    warn!(url = %self.config.url, error = %e, "Chat socket connect failed");
                }
            }

            self.set_outbound(None);
            self.state_tx.send_replace(ClientState::Disconnected);

            if self.cancel.is_cancelled() {
                break;
            }

            debug!(delay = ?self.config.reconnect_delay, "Reconnecting after delay");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }

        self.set_outbound(None);
        self.state_tx.send_replace(ClientState::Disconnected);
        debug!(party = %self.config.party, "Chat client stopped");
    }

    /// Drive one socket until it drops or the client is closed
    async fn run_connection(&self, socket: Socket) {
        let (mut write, mut read) = socket.split();

        if let Err(e) = write.send(Message::Text(self.config.auth_frame().into())).await {
            warn!(error = %e, "Failed to send auth frame");
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        self.set_outbound(Some(tx));
        self.state_tx.send_replace(ClientState::Authenticated);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.close().await;
                    return;
                }

                Some(text) = rx.recv() => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        debug!(error = %e, "Chat send failed");
                        return;
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = parse_server_frame(text.as_str()) {
                                let _ = self.events_tx.send(event);
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Chat socket closed by server");
                            return;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Chat socket error");
                            return;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn set_outbound(&self, sender: Option<mpsc::UnboundedSender<String>>) {
        if let Ok(mut slot) = self.outbound.lock() {
            *slot = sender;
        }
    }
}

fn parse_server_frame(text: &str) -> Option<ClientEvent> {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(ServerFrame::AgentMessage {
            content,
            timestamp,
            message_type,
        }) => Some(ClientEvent::AgentMessage {
            content,
            timestamp,
            message_type,
        }),
        Ok(ServerFrame::Error { content }) => Some(ClientEvent::Error(content)),
        Err(e) => {
            debug!(error = %e, "Ignoring unrecognized server frame");
            None
        }
    }
}

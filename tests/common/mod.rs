//! Shared harness for the in-process integration tests
//!
//! Runs the real router on a loopback listener over `MemoryStore` and
//! `MockAiProvider`.
#![allow(dead_code)]

use chore_quest::ai::MockAiProvider;
use chore_quest::api::handlers::{ServerState, SharedState};
use chore_quest::chat::Party;
use chore_quest::store::models::ChildProfile;
use chore_quest::store::{FamilyStore, MemoryStore};
use chore_quest::{AiProviderKind, AuthConfig, Config, StorageBackend};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub const SECRET: &str = "integration-secret-minimum-32-chars!";

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn config(jwt_secret: Option<&str>) -> Config {
    Config {
        server_port: 0,
        allowed_origins: Vec::new(),
        storage_backend: StorageBackend::Memory,
        database_url: "sqlite::memory:".to_string(),
        ai_provider: AiProviderKind::Mock,
        ai_url: None,
        ai_model: "mock".to_string(),
        ai_api_key: None,
        chat_history_limit: 50,
        chat_context_limit: 20,
        auth_config: jwt_secret.map(|secret| AuthConfig {
            jwt_secret: secret.to_string(),
            jwt_expiry_secs: 3600,
        }),
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: SharedState,
    pub store: Arc<MemoryStore>,
    pub ai: Arc<MockAiProvider>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    /// Open mode server on an ephemeral port with fresh collaborators
    pub async fn start() -> Self {
        Self::start_with(None, Arc::new(MemoryStore::new()), Arc::new(MockAiProvider::new())).await
    }

    pub async fn start_with(
        jwt_secret: Option<&str>,
        store: Arc<MemoryStore>,
        ai: Arc<MockAiProvider>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve_on(listener, jwt_secret, store, ai)
    }

    /// Bind a specific address again, e.g. to restart on the same port
    pub async fn start_at(
        addr: SocketAddr,
        store: Arc<MemoryStore>,
        ai: Arc<MockAiProvider>,
    ) -> Self {
        let socket = TcpSocket::new_v4().unwrap();
        socket.set_reuseaddr(true).unwrap();
        socket.bind(addr).unwrap();
        let listener = socket.listen(1024).unwrap();
        Self::serve_on(listener, None, store, ai)
    }

    fn serve_on(
        listener: TcpListener,
        jwt_secret: Option<&str>,
        store: Arc<MemoryStore>,
        ai: Arc<MockAiProvider>,
    ) -> Self {
        let addr = listener.local_addr().unwrap();
        let state: SharedState = Arc::new(ServerState::from_config(
            &config(jwt_secret),
            store.clone(),
            ai.clone(),
            ai.clone(),
        ));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(chore_quest::serve(listener, state.clone(), async move {
            let _ = stop_rx.await;
        }));

        Self {
            addr,
            state,
            store,
            ai,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn chat_url(&self) -> String {
        format!("ws://{}/ws/app-chat", self.addr)
    }

    pub fn events_url(&self) -> String {
        format!("ws://{}/ws/events", self.addr)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Graceful shutdown; open sockets are closed by the server
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("server did not shut down")
                .unwrap()
                .unwrap();
        }
    }
}

pub async fn seed_child(store: &MemoryStore, id: &str, parent_id: &str) {
    store
        .upsert_child(&ChildProfile {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            name: format!("Child {}", id),
            age: Some(8),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
}

/// `p1` owns `c1` and `c2`; `p2` owns `x9`
pub async fn seed_family(store: &MemoryStore) {
    seed_child(store, "c1", "p1").await;
    seed_child(store, "c2", "p1").await;
    seed_child(store, "x9", "p2").await;
}

// ============================================================================
// WebSocket helpers
// ============================================================================

pub async fn ws_connect(url: &str) -> Ws {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

pub async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

pub async fn send_raw(ws: &mut Ws, text: &str) {
    ws.send(Message::Text(text.to_string().into())).await.unwrap();
}

/// Next JSON text frame, skipping pings
pub async fn next_json(ws: &mut Ws) -> Value {
    tokio::time::timeout(Duration::from_secs(5), read_json(ws))
        .await
        .expect("timed out waiting for a frame")
}

/// True when no text frame arrives within `wait`
pub async fn stays_silent(ws: &mut Ws, wait: Duration) -> bool {
    tokio::time::timeout(wait, read_json(ws)).await.is_err()
}

async fn read_json(ws: &mut Ws) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(Message::Close(_))) | None => panic!("socket closed"),
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("socket error: {}", e),
        }
    }
}

/// Connect and complete the open-mode handshake as a party
pub async fn connect_as(server: &TestServer, party_type: &str, party_id: &str) -> Ws {
    let party = Party::new(party_type.parse().unwrap(), party_id);
    let before = server.state.registry.party_connection_count(&party);

    let mut ws = ws_connect(&server.chat_url()).await;
    send_json(
        &mut ws,
        serde_json::json!({"type": "auth", "partyType": party_type, "partyId": party_id}),
    )
    .await;
    wait_for_connections(server, &party, before + 1).await;
    ws
}

/// The handshake has no ack frame; poll the registry instead
pub async fn wait_for_connections(server: &TestServer, party: &Party, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.state.registry.party_connection_count(party) < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection never authenticated");
}

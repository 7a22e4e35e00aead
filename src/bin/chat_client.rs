//! Terminal chat client
//!
//! Connects to `/ws/app-chat` as a party, sends each stdin line as a chat
//! message and prints agent replies. Reconnects on its own when the server
//! goes away.

use anyhow::Result;
use chore_quest::chat::{Party, PartyType};
use chore_quest::client::{ChatClient, ClientConfig, ClientError, ClientEvent, ClientState};
use clap::Parser;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chat_client")]
#[command(about = "Chat with the Chore Quest agent from a terminal")]
struct Args {
    /// WebSocket endpoint
    #[arg(long, env = "CHAT_URL", default_value = "ws://localhost:8080/ws/app-chat")]
    url: String,

    /// `parent` or `child`
    #[arg(long, default_value = "child")]
    party_type: PartyType,

    #[arg(long)]
    party_id: String,

    /// JWT from `chore-quest issue-token` (required when the server has a secret)
    #[arg(long, env = "CHAT_TOKEN")]
    token: Option<String>,

    /// Seconds to wait before reconnecting
    #[arg(long, env = "CHAT_RECONNECT_DELAY_SECS", default_value_t = 3)]
    reconnect_delay_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,chore_quest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = ClientConfig::new(args.url, Party::new(args.party_type, args.party_id))
        .with_reconnect_delay(Duration::from_secs(args.reconnect_delay_secs));
    if let Some(token) = args.token {
        config = config.with_token(token);
    }

    let (mut client, mut events) = ChatClient::open(config);
    let mut state_rx = client.watch_state();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match client.send_chat(line) {
                    Ok(()) => {}
                    Err(ClientError::NotConnected) => eprintln!("(not connected, message dropped)"),
                    Err(e) => {
                        eprintln!("({})", e);
                        break;
                    }
                }
            }

            event = events.recv() => {
                match event {
                    Some(ClientEvent::AgentMessage { content, message_type, .. }) => {
                        match message_type {
                            Some(kind) => println!("agent [{}]: {}", kind, content),
                            None => println!("agent: {}", content),
                        }
                    }
                    Some(ClientEvent::Error(content)) => eprintln!("error: {}", content),
                    None => break,
                }
            }

            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                match state {
                    ClientState::Authenticated => eprintln!("(connected)"),
                    ClientState::Disconnected => eprintln!("(disconnected, retrying)"),
                    ClientState::Connecting => {}
                }
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.close().await;
    Ok(())
}

//! Chore Quest - Main Server
//!
//! Real-time AI chat and suggestion lifecycle for the family chore app.

use anyhow::{Context, Result};
use chore_quest::auth::jwt::encode_jwt;
use chore_quest::chat::{Party, PartyType};
use chore_quest::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chore-quest")]
#[command(about = "Chore Quest chat and suggestion server")]
struct Cli {
    /// Path to config.yaml (defaults to ./config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// Port to listen on (overrides config.yaml and SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Mint a JWT for a party, signed with the configured secret
    IssueToken {
        /// `parent` or `child`
        #[arg(long)]
        party_type: PartyType,

        #[arg(long)]
        party_id: String,

        /// Display name stored in the token
        #[arg(long, default_value = "")]
        name: String,

        /// Lifetime in seconds (defaults to auth.jwt_expiry_secs)
        #[arg(long)]
        expiry_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chore_quest=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            chore_quest::start_server(config).await
        }
        Commands::IssueToken {
            party_type,
            party_id,
            name,
            expiry_secs,
        } => issue_token(&config, Party::new(party_type, party_id), &name, expiry_secs),
    }
}

fn issue_token(config: &Config, party: Party, name: &str, expiry_secs: Option<u64>) -> Result<()> {
    let auth = config
        .auth_config
        .as_ref()
        .context("No auth.jwt_secret / JWT_SECRET configured; the server runs in open mode")?;
    let expiry = expiry_secs.unwrap_or(auth.jwt_expiry_secs);
    let token = encode_jwt(&party, name, &auth.jwt_secret, expiry)?;
    tracing::info!(%party, expiry_secs = expiry, "Token issued");
    println!("{}", token);
    Ok(())
}

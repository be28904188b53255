mod console;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use console::ConsoleObserver;
use dialoguer::Input;
use huddle_core::{ParticipantId, PresenceRecord};
use huddle_peer::media::SyntheticMediaDevice;
use huddle_peer::signaling::{RelayClient, RelayClientConfig};
use huddle_peer::transport::WebRtcLinkFactory;
use huddle_peer::{Collaborators, Orchestrator, OrchestratorConfig};
use huddle_relay::{RelayConfig, RelayServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "huddle", version, about = "Mesh video rooms over a signaling relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the presence and signaling relay.
    Relay {
        #[arg(long, env = "HUDDLE_BIND", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        #[arg(long, default_value_t = 256)]
        mailbox_capacity: usize,
    },
    /// Join a room with synthetic media and print what happens.
    Join {
        #[arg(long, env = "HUDDLE_RELAY", default_value = "ws://127.0.0.1:8080")]
        relay: String,

        #[arg(short, long)]
        room: String,

        /// Display name. Prompted for when omitted.
        #[arg(short, long)]
        name: Option<String>,

        /// Participant id. A random one is generated when omitted.
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Commands::Relay {
            bind,
            mailbox_capacity,
        } => run_relay(RelayConfig {
            bind,
            mailbox_capacity,
        })
        .await,
        Commands::Join {
            relay,
            room,
            name,
            id,
        } => run_join(relay, room, name, id).await,
    }
}

async fn run_relay(config: RelayConfig) -> Result<()> {
    let server = RelayServer::start(config).await?;
    println!(
        "{} {}",
        "Relay listening on".green().bold(),
        server.local_addr()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    println!("{}", "Shutting down".yellow());
    server.shutdown();
    Ok(())
}

async fn run_join(relay: String, room: String, name: Option<String>, id: Option<String>) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => Input::<String>::new()
            .with_prompt("Display name")
            .interact_text()
            .context("Failed to read display name")?,
    };
    let me = id.map(ParticipantId::from).unwrap_or_else(ParticipantId::generate);
    let config = OrchestratorConfig::default();

    let relay_client = Arc::new(RelayClient::new(me.clone(), RelayClientConfig::new(relay)));
    let collaborators = Collaborators {
        presence: relay_client.clone(),
        mailbox: relay_client,
        media: Arc::new(SyntheticMediaDevice::new(format!("huddle-{}", me))),
        links: Arc::new(WebRtcLinkFactory::new(config.transport.clone())),
    };
    let orchestrator = Orchestrator::new(PresenceRecord::new(me.clone(), name), config, collaborators)
        .with_observer(Arc::new(ConsoleObserver));

    orchestrator
        .join_room(room.as_str())
        .await
        .with_context(|| format!("Failed to join room '{}'", room))?;
    println!(
        "{} {} as {}",
        "Joined".green().bold(),
        room.bold(),
        me.to_string().cyan()
    );
    println!("{}", "Commands: v (video), a (audio), p (peers), q (leave)".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            r = tokio::signal::ctrl_c() => {
                r.context("Failed to listen for Ctrl-C")?;
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "v" => {
                        orchestrator.toggle_local_video().await;
                    }
                    "a" => {
                        orchestrator.toggle_local_audio().await;
                    }
                    "p" => {
                        for peer in orchestrator.registered_peers().await {
                            println!("  {} {:?} {}", peer.participant, peer.role, peer.state);
                        }
                    }
                    "q" => break,
                    "" => {}
                    other => println!("{} {}", "Unknown command:".red(), other),
                }
            }
        }
    }

    orchestrator.leave_room().await;
    println!("{}", "Left room".yellow());
    Ok(())
}

//! Hushroom terminal client
//!
//! Reads lines from stdin and sends them to the room; prints what the room
//! says back.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use hushroom_client::{ChatClient, ClientEvent, ClientOptions};
use hushroom_core::config::load_config;
use hushroom_core::tracing_init::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "hushroom")]
#[command(version, about = "Hushroom - end-to-end encrypted group chat")]
struct Args {
    /// Relay WebSocket URL.
    #[arg(long)]
    relay: Option<String>,

    /// Display name shown to other members.
    #[arg(long)]
    name: String,

    /// Room name. Only its hash is sent to the relay.
    #[arg(long)]
    room: String,

    /// Room password. Members with a different password cannot read you.
    #[arg(long, env = "HUSHROOM_PASSWORD", hide_env_values = true)]
    password: String,

    /// Pinned relay signing key (base64 SPKI).
    #[arg(long, conflicts_with = "tofu")]
    relay_key: Option<String>,

    /// Trust the relay's key on first use and remember its fingerprint.
    #[arg(long)]
    tofu: bool,

    /// Config file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output logs as JSON.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("hushroom_client=warn", args.log_json);

    let mut config = load_config(args.config.as_deref())?.client;
    if let Some(relay) = args.relay {
        config.relay_url = relay;
    }
    if args.relay_key.is_some() {
        config.relay_public_key = args.relay_key;
    }
    if args.tofu {
        config.relay_public_key = None;
        config.trust_on_first_use = true;
    }

    let options = ClientOptions::from_config(&config)?;
    info!(relay = %options.relay_url, "Starting hushroom client");

    let (client, mut events) = ChatClient::new(options);
    client
        .set_credentials(&args.name, &args.room, &args.password)
        .await;
    client.connect().await?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim() == "/quit" => break,
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match client.send_to_channel("text", &line).await {
                    Ok(true) => {}
                    Ok(false) => warn!("Nobody in the room can read this yet"),
                    Err(e) => warn!(error = %e, "Message not sent"),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.destroy().await;
    printer.abort();
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::ServerSecured => println!("* connected to relay"),
        ClientEvent::ServerClosed => println!("* connection to relay lost"),
        ClientEvent::PeerSecured(peer) => println!("* {} joined", peer.name),
        ClientEvent::PeerLeft { id, name } => {
            println!("* {} left", name.as_deref().unwrap_or(id));
        }
        ClientEvent::MembershipUpdated(peers) => {
            let names: Vec<&str> = peers.iter().map(|p| p.name.as_str()).collect();
            println!("* in the room: {}", names.join(", "));
        }
        ClientEvent::MessageReceived {
            name, kind, data, ..
        } => {
            if kind == "text" {
                println!("<{name}> {data}");
            } else {
                println!("<{name}> [{kind}, {} bytes]", data.len());
            }
        }
    }
}

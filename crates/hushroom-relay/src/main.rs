//! Hushroom Relay Server
//!
//! WebSocket relay that routes end-to-end encrypted group chat traffic
//! between members of a channel without being able to read it.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use hushroom_core::config::load_config;
use hushroom_core::tracing_init::init_tracing;
use hushroom_crypto::RelaySigningKey;
use hushroom_relay::server::RelayServer;

#[derive(Parser, Debug)]
#[command(name = "hushroom-relay")]
#[command(version, about = "Hushroom relay server - zero-knowledge group chat router")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay.
    Serve(ServeArgs),
    /// Generate a signing key and print its public half.
    Keygen {
        /// Where to write the private key (base64 PKCS#8, mode 0600).
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Config file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Signing key file. Generated if it does not exist.
    #[arg(long, env = "HUSHROOM_SIGNING_KEY")]
    signing_key: Option<PathBuf>,

    /// Seconds of silence after which a client is reaped.
    #[arg(long)]
    seen_timeout: Option<u64>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Args::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Keygen { out } => keygen(&out),
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    init_tracing("hushroom_relay=info", args.log_json);

    let mut config = load_config(args.config.as_deref())?.relay;
    if let Some(addr) = args.addr {
        config.addr = addr;
    }
    if let Some(secs) = args.seen_timeout {
        config.seen_timeout_secs = secs;
    }
    if args.signing_key.is_some() {
        config.signing_key_path = args.signing_key;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.addr,
        "Starting hushroom-relay"
    );

    let signing_key = if let Some(path) = &config.signing_key_path {
        RelaySigningKey::load_or_generate(path)?
    } else {
        warn!("No signing key configured, using an ephemeral key; pinned clients will reject it after restart");
        RelaySigningKey::generate()?
    };
    let verifying = signing_key.verifying_key();
    info!(
        fingerprint = %verifying.fingerprint(),
        public_key = %verifying.to_spki_base64()?,
        "Relay signing key loaded"
    );

    let server = RelayServer::bind(&config, signing_key).await?;
    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        })
        .await?;

    info!("Relay stopped");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn keygen(out: &std::path::Path) -> anyhow::Result<()> {
    if out.exists() {
        anyhow::bail!("Refusing to overwrite existing key file {}", out.display());
    }
    let key = RelaySigningKey::generate()?;
    key.save_to_file(out)?;
    let verifying = key.verifying_key();
    println!("{}", verifying.to_spki_base64()?);
    println!("fingerprint: {}", verifying.fingerprint());
    Ok(())
}

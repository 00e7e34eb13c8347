//! Command line client for supernode routing.
//!
//! Binds an iroh endpoint, refuses inbound routing streams, warms up
//! connections to the configured relays and performs a single routing
//! operation through them.
//!
//! # Usage
//!
//! ```bash
//! iroh-snr --config snr.json get-value /pk/abc
//! iroh-snr --relay '<EndpointAddr JSON>' put-value /pk/abc hello
//! ```
//!
//! Set `RUST_LOG=iroh_snr=debug` to see every relay attempt.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointAddr, RelayMode};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use iroh_snr::{
    IrohTransport, MessageType, PeerInfo, Proxy, ProxyConfig, Record, RejectingHandler,
    RoutingMessage,
};

#[derive(Parser, Debug)]
#[command(version, about = "Route DHT operations through supernode relays")]
struct Args {
    /// JSON config file (see `ProxyConfig`)
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON-encoded EndpointAddr of an extra relay
    #[arg(long = "relay")]
    relays: Vec<String>,
    /// Give up on the whole operation after this many seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Only connect to the relays and report how many were reached
    Bootstrap,
    /// Look up a value record
    GetValue { key: String },
    /// Store a value record
    PutValue { key: String, value: String },
    /// Look up providers for a key
    GetProviders { key: String },
    /// Announce this node as a provider for a key
    AddProvider { key: String },
    /// Ask relays for the peers closest to a key
    FindNode { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("iroh_snr=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ProxyConfig::load(path)?,
        None => ProxyConfig::new(),
    };
    for raw in &args.relays {
        let addr: EndpointAddr =
            serde_json::from_str(raw).with_context(|| format!("invalid --relay {raw}"))?;
        config = config.relay(addr);
    }
    let alpn = config.protocol.as_bytes().to_vec();
    let endpoint = Endpoint::builder()
        .alpns(vec![alpn.clone()])
        .relay_mode(RelayMode::Default)
        .bind()
        .await?;
    println!("iroh-snr client started");
    println!("  EndpointId: {}", endpoint.id());

    // Inbound streams on our protocol are rejected: we delegate, we do not relay.
    let router = Router::builder(endpoint.clone())
        .accept(alpn.clone(), RejectingHandler)
        .spawn();

    let proxy = Proxy::from_config(IrohTransport::new(endpoint.clone(), alpn), &config)?;

    let cancel = CancellationToken::new();
    let watchdog = {
        let cancel = cancel.clone();
        let limit = Duration::from_secs(args.timeout_secs);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(limit) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            cancel.cancel();
        })
    };

    let reached = proxy.bootstrap(&cancel).await;
    println!("reached {reached} of {} relays", proxy.relays().len());

    let self_info = PeerInfo {
        id: endpoint.id().as_bytes().to_vec(),
        addrs: vec![serde_json::to_string(&endpoint.addr())?],
    };
    let outcome = run(&proxy, &cancel, args.command, self_info).await;

    watchdog.abort();
    router.shutdown().await.context("router shutdown")?;
    outcome
}

async fn run(
    proxy: &Proxy<IrohTransport>,
    cancel: &CancellationToken,
    command: Command,
    self_info: PeerInfo,
) -> Result<()> {
    match command {
        Command::Bootstrap => {}
        Command::GetValue { key } => {
            let reply = proxy
                .send_request(cancel, &RoutingMessage::new(MessageType::GetValue, key))
                .await?;
            match reply.record {
                Some(record) => println!("{}", String::from_utf8_lossy(&record.value)),
                None => println!("no record; {} closer peers", reply.closer_peers.len()),
            }
        }
        Command::PutValue { key, value } => {
            let record = Record {
                key: key.clone().into_bytes(),
                value: value.into_bytes(),
                ..Default::default()
            };
            let msg = RoutingMessage::new(MessageType::PutValue, key).with_record(record);
            proxy.send_message(cancel, &msg).await?;
            println!("stored");
        }
        Command::GetProviders { key } => {
            let reply = proxy
                .send_request(cancel, &RoutingMessage::new(MessageType::GetProviders, key))
                .await?;
            for provider in reply.provider_peers {
                println!("{}", hex::encode(provider.id));
            }
        }
        Command::AddProvider { key } => {
            let msg = RoutingMessage::new(MessageType::AddProvider, key)
                .with_provider_peers(vec![self_info]);
            proxy.send_message(cancel, &msg).await?;
            println!("announced");
        }
        Command::FindNode { key } => {
            let reply = proxy
                .send_request(cancel, &RoutingMessage::new(MessageType::FindNode, key))
                .await?;
            for peer in reply.closer_peers {
                println!("{}", hex::encode(peer.id));
            }
        }
    }
    Ok(())
}

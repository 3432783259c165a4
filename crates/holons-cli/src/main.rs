//! holon-rpc - command-line front end for holon transports.
//!
//! Resolves transport URIs, binds listeners the way a holon server would, and
//! issues one-off holon-rpc calls against a running server.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use holons::{ClientConfig, HolonRpcClient, Listener};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "holon-rpc")]
#[command(about = "Transport and holon-rpc tooling for holons")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the transport descriptor for a URI as JSON
    Resolve {
        /// Transport URI, e.g. tcp://:9090 or ws://host:8080/rpc
        uri: String,
    },

    /// Bind the listener a holon server would use and wait for Ctrl+C
    Listen {
        /// Transport URI to listen on
        #[arg(long)]
        listen: Option<String>,

        /// TCP port shorthand for tcp://:<port>
        #[arg(long)]
        port: Option<u16>,
    },

    /// Call a method on a holon-rpc server and print the result
    Invoke {
        /// WebSocket endpoint, e.g. ws://127.0.0.1:8080/rpc
        #[arg(long)]
        url: String,

        /// Fully qualified method name
        #[arg(long)]
        method: String,

        /// JSON object passed as params
        #[arg(long, default_value = "{}")]
        params: String,

        /// Per-call timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; RUST_LOG overrides --debug when present
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match args.command {
        Command::Resolve { uri } => resolve(&uri),
        Command::Listen { listen, port } => serve(listen.as_deref(), port).await,
        Command::Invoke {
            url,
            method,
            params,
            timeout_ms,
        } => invoke(&url, &method, &params, timeout_ms.map(Duration::from_millis)).await,
    }
}

fn resolve(uri: &str) -> Result<()> {
    let descriptor = holons::parse_uri(uri).with_context(|| format!("cannot resolve {}", uri))?;
    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}

async fn serve(listen: Option<&str>, port: Option<u16>) -> Result<()> {
    let uri = holons::listen_uri(listen, port);
    info!("Opening listener for {}", uri);

    let listener = holons::listen(&uri).await?;
    match &listener {
        Listener::Tcp { .. } => {
            let addr = listener
                .local_addr()
                .context("TCP listener has no local address")?;
            // Machine-readable line for launchers that pick up the port
            println!("LISTEN_ADDR={}", addr);
        }
        other => println!("{}", serde_json::to_string(other.descriptor())?),
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    Ok(())
}

async fn invoke(url: &str, method: &str, params: &str, timeout: Option<Duration>) -> Result<()> {
    let params: serde_json::Value =
        serde_json::from_str(params).context("--params must be a JSON object")?;
    anyhow::ensure!(params.is_object(), "--params must be a JSON object");

    let client = HolonRpcClient::new(ClientConfig::default());
    client.connect(url).await?;

    let result = client.invoke(method, params, timeout).await;
    client.close().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

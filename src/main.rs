//! wsproxy - tunnel TCP connections through a WebSocket relay
//!
//! `wsproxy client` runs the local CONNECT proxy, `wsproxy server` runs the
//! remote relay that dials the destinations.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wsproxy_front::{FrontEndConfig, ProxyFrontEnd};
use wsproxy_net::{ClientTlsOptions, TlsIdentity};
use wsproxy_relay::{ClosePolicy, Destination, RelayConfig};
use wsproxy_server::{RelayServer, RelayServerConfig};
use wsproxy_transport_websocket::WebSocketConfig;

/// wsproxy - Reach any TCP destination through an HTTP(S) WebSocket relay
#[derive(Parser, Debug)]
#[command(name = "wsproxy")]
#[command(about = "Reach any TCP destination through an HTTP(S) WebSocket relay", long_about = None)]
#[command(version = env!("WSPROXY_GIT_TAG"))]
#[command(long_version = concat!(env!("WSPROXY_GIT_TAG"), "\nCommit: ", env!("WSPROXY_GIT_HASH"), "\nBuilt: ", env!("WSPROXY_BUILD_TIME")))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true, env = "WSPROXY_LOG_LEVEL")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the local CONNECT proxy that tunnels through a relay server
    #[command(long_about = r#"
Run a local HTTP proxy. CONNECT requests are tunneled through a WebSocket
to the relay server, every other request is forwarded as plain HTTP.

EXAMPLES:
  # Proxy on localhost:8888, relay over wss://relay.example.com:443/proxy
  wsproxy client --relay relay.example.com:443

  # Plain ws:// relay on the same machine
  wsproxy client --relay localhost:8080 --tls false

  # Use it from ssh
  ssh -o ProxyCommand='wsproxy-pipe http localhost 8888 %h %p' user@host
    "#)]
    Client(ClientArgs),

    /// Run the relay server that dials destinations for tunnels
    Server(ServerArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Proto {
    Http,
    Https,
}

impl Proto {
    fn identity(self, pem: &str, key: &str) -> Option<TlsIdentity> {
        match self {
            Proto::Http => None,
            Proto::Https => Some(TlsIdentity::new(pem, key)),
        }
    }
}

#[derive(Args, Debug)]
struct ClientArgs {
    /// Address the proxy listens on
    #[arg(long, default_value = "localhost:8888", env = "WSPROXY_LISTEN")]
    listen: String,

    /// Relay server address (host:port)
    #[arg(long, default_value = "localhost:8080", env = "WSPROXY_RELAY")]
    relay: String,

    /// Use TLS (wss://) to reach the relay server
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "WSPROXY_TLS")]
    tls: bool,

    /// Upgrade path on the relay server
    #[arg(long, default_value = "/proxy", env = "WSPROXY_RELAY_PATH")]
    relay_path: String,

    /// Skip relay certificate verification (insecure, for development only)
    #[arg(long)]
    insecure: bool,

    /// Protocol the proxy itself speaks (http or https)
    #[arg(long, value_enum, default_value = "http", env = "WSPROXY_PROTO")]
    proto: Proto,

    /// Certificate chain (PEM) for --proto https
    #[arg(long, default_value = "server.pem", env = "WSPROXY_PEM")]
    pem: String,

    /// Private key (PEM) for --proto https
    #[arg(long, default_value = "server.key", env = "WSPROXY_KEY")]
    key: String,

    #[command(flatten)]
    relay_opts: RelayOpts,
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// HTTP service address
    #[arg(long, default_value = "localhost:8080", env = "WSPROXY_ADDR")]
    addr: String,

    /// Upgrade path
    #[arg(long, default_value = "/proxy", env = "WSPROXY_PATH")]
    path: String,

    /// Listen over plain HTTP or HTTPS
    #[arg(long, value_enum, default_value = "http", env = "WSPROXY_PROTO")]
    proto: Proto,

    /// Certificate chain (PEM) for --proto https
    #[arg(long, default_value = "server.pem", env = "WSPROXY_PEM")]
    pem: String,

    /// Private key (PEM) for --proto https
    #[arg(long, default_value = "server.key", env = "WSPROXY_KEY")]
    key: String,

    /// Timeout for connecting to a destination, in seconds
    #[arg(long, default_value = "10", env = "WSPROXY_CONNECT_TIMEOUT_SECS")]
    connect_timeout_secs: u64,

    #[command(flatten)]
    relay_opts: RelayOpts,
}

#[derive(Args, Debug)]
struct RelayOpts {
    /// Maximum bytes per read from a TCP connection
    #[arg(long, default_value = "8192", env = "WSPROXY_CHUNK_SIZE")]
    chunk_size: usize,

    /// Seconds a tunnel may keep one direction open after the other ended
    /// (waits for both directions when unset)
    #[arg(long, env = "WSPROXY_LINGER_SECS")]
    linger_secs: Option<u64>,

    /// Only treat close code 1001 (going away) as a clean shutdown
    #[arg(long, env = "WSPROXY_STRICT_CLOSE")]
    strict_close: bool,
}

impl RelayOpts {
    fn relay_config(&self) -> RelayConfig {
        let mut config = RelayConfig::default().with_chunk_size(self.chunk_size);
        if let Some(secs) = self.linger_secs {
            config = config.with_linger(Duration::from_secs(secs));
        }
        if self.strict_close {
            config = config.with_close_policy(ClosePolicy::strict());
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Client(args) => run_client(args).await,
        Commands::Server(args) => run_server(args).await,
    }
}

async fn run_client(args: ClientArgs) -> Result<()> {
    let relay = Destination::parse(&args.relay)
        .with_context(|| format!("Invalid relay address {:?}", args.relay))?;

    let ws = WebSocketConfig::new(relay).with_path(&args.relay_path);
    let ws = if !args.tls {
        ws.without_tls()
    } else if args.insecure {
        warn!("Relay certificate verification is disabled");
        ws.with_tls(ClientTlsOptions::insecure())
    } else {
        ws
    };

    let mut config =
        FrontEndConfig::new(args.listen, ws).with_relay_config(args.relay_opts.relay_config());
    if let Some(identity) = args.proto.identity(&args.pem, &args.key) {
        config = config.with_tls(identity);
    }

    let front = ProxyFrontEnd::new(config).context("Failed to set up the proxy")?;
    front.run().await.context("Proxy stopped")?;
    Ok(())
}

async fn run_server(args: ServerArgs) -> Result<()> {
    let mut config = RelayServerConfig::new(args.addr)
        .with_path(&args.path)
        .with_connect_timeout(Duration::from_secs(args.connect_timeout_secs))
        .with_relay(args.relay_opts.relay_config());
    if let Some(identity) = args.proto.identity(&args.pem, &args.key) {
        config = config.with_tls(identity);
    }

    let server = RelayServer::new(config).context("Failed to set up the relay server")?;
    server.run().await.context("Relay server stopped")?;
    Ok(())
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    Ok(())
}

//! wsproxy-pipe - CONNECT through an HTTP(S) proxy and relay stdin/stdout
//!
//! Meant to be used as an ssh `ProxyCommand`:
//!
//! ```text
//! ssh -o ProxyCommand='wsproxy-pipe http localhost 8888 %h %p' user@host
//! ```
//!
//! Stdout carries tunnel bytes, so diagnostics only ever go to stderr.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wsproxy_connect::{
    run_pipe, ConnectClient, HandshakeError, ProxyScheme, RELAY_FAILURE_EXIT_CODE,
};
use wsproxy_relay::{Destination, RelayConfig, StreamEndpoint};

/// Exit code for unusable arguments
const USAGE_EXIT_CODE: u8 = 64;

#[derive(Parser, Debug)]
#[command(name = "wsproxy-pipe")]
#[command(about = "Tunnel stdin/stdout to a destination through an HTTP(S) CONNECT proxy", long_about = None)]
#[command(version = env!("WSPROXY_GIT_TAG"))]
struct Args {
    /// Proxy scheme (http or https)
    scheme: String,

    proxy_host: String,

    proxy_port: String,

    dest_host: String,

    dest_port: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging();

    run(args).await
}

async fn run(args: Args) -> ExitCode {
    let scheme = match args.scheme.parse::<ProxyScheme>() {
        Ok(scheme) => scheme,
        Err(e) => return report(e),
    };

    let proxy = match Destination::from_parts(&args.proxy_host, &args.proxy_port) {
        Ok(proxy) => proxy,
        Err(e) => {
            error!("Invalid proxy address: {}", e);
            return ExitCode::from(USAGE_EXIT_CODE);
        }
    };
    let dest = match Destination::from_parts(&args.dest_host, &args.dest_port) {
        Ok(dest) => dest,
        Err(e) => {
            error!("Invalid destination: {}", e);
            return ExitCode::from(USAGE_EXIT_CODE);
        }
    };

    let client = match ConnectClient::new(scheme, proxy) {
        Ok(client) => client,
        Err(e) => return report(e),
    };

    match run_pipe(&client, &dest, StreamEndpoint::stdio(), &RelayConfig::default()).await {
        Ok(outcome) => match outcome.failure() {
            None => {
                info!("Tunnel to {} closed", dest);
                ExitCode::SUCCESS
            }
            Some(failure) => {
                error!(
                    "Tunnel to {} failed on {}: {:?}",
                    dest, failure.source, failure.end
                );
                ExitCode::from(RELAY_FAILURE_EXIT_CODE)
            }
        },
        Err(e) => report(e),
    }
}

fn report(err: HandshakeError) -> ExitCode {
    error!("{}", err);
    ExitCode::from(err.exit_code())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

//! Forward one config request from stdin to a config container.
//!
//! # Usage
//!
//! ```bash
//! echo '{"Action":"setup"}' | config-forward
//! config-forward --socket /tmp/sock < request.json
//! RUST_LOG=debug config-forward
//! ```
//!
//! Logs go to stderr. Stdout carries only the container's response.

use cdflow2_config_common::config::{DEFAULT_SOCKET_PATH, SOCKET_PATH_ENV};
use cdflow2_config_common::transport::forward;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "config-forward")]
#[command(about = "Relay a config request from stdin to a config container socket")]
struct Args {
    /// Unix socket of the config container
    #[arg(long, env = SOCKET_PATH_ENV, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    match forward(&mut stdin, &mut stdout, &args.socket).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(socket = %args.socket.display(), "{}", e);
            ExitCode::FAILURE
        }
    }
}

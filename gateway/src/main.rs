use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use server::{config::Config, ServeConfig};
use tokio_util::sync::CancellationToken;

mod args;

use args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }

    let listen_address = SocketAddr::from(([0, 0, 0, 0], config.port));
    let shutdown_signal = CancellationToken::new();

    let ctrl_c_signal = shutdown_signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("ctrl-c received");
            ctrl_c_signal.cancel();
        }
    });

    server::serve(ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        log_filter: args.log_filter,
        version: env!("CARGO_PKG_VERSION").to_string(),
        bound_addr_sender: None,
    })
    .await
}

// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use mew_config::load_config;
use mew_gateway_core::{build_app, build_state};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mewd", version, about = "Multi-participant messaging gateway")]
struct Args {
    /// Path to a space config TOML file. Defaults to built-in defaults if absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind address from the config file.
    #[arg(long)]
    bind: Option<String>,

    /// Enable verbose (debug) logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("mew=debug,mewd=debug")
    } else {
        EnvFilter::new("mew=info,mewd=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = load_config(args.config.as_deref()).context("loading gateway config")?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    let bind = config.bind.clone();
    let space = config.space.clone();
    let state = build_state(config).await.context("building gateway state")?;
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(%bind, %space, "mewd listening");

    axum::serve(listener, app).await.context("serve")
}

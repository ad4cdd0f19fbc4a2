//! slirc-bnc - single-upstream IRC bouncer.

use std::path::Path;

use anyhow::Context;
use slirc_bnc::bouncer::Bouncer;
use slirc_bnc::{transport, Config, Shutdown};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "slirc-bnc.toml";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = load_config()?;
    let settings = config.settings();
    let identity = config.identity();

    info!(
        listen = %config.listen.address,
        upstream = %config.upstream.address,
        nick = %identity.nick,
        "Starting slirc-bnc"
    );

    let listener = transport::listen(config.listen.address)
        .with_context(|| format!("failed to listen on {}", config.listen.address))?;
    let upstream = transport::connect(config.upstream.address.as_str())
        .with_context(|| format!("failed to connect to {}", config.upstream.address))?;

    let mut bouncer = Bouncer::new(listener, upstream, settings).context("failed to set up event loop")?;
    bouncer
        .login(&identity)
        .context("failed to queue upstream registration")?;

    match bouncer.run().context("event loop failed")? {
        Shutdown::UpstreamLost => warn!("upstream connection lost, exiting"),
        Shutdown::UpstreamError(reason) => error!(reason = %reason, "upstream closed the session"),
    }
    Ok(())
}

/// Use the path given as the first argument, or the default file if present.
fn load_config() -> anyhow::Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("failed to load config {path}")),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("failed to load config {DEFAULT_CONFIG_PATH}")),
        None => {
            info!("no config file given, using defaults");
            Ok(Config::default())
        }
    }
}

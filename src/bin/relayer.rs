//! Relayer for the shielded bridge.
//!
//! Registers every origin deposit root on the destination chain and pays out
//! every destination reclaim on the origin chain, until Ctrl-C. Signs with the
//! key in `BRIDGE_PRIVATE_KEY`, which must be the bridge account of both contracts.
//!
//! Run with:
//!   cargo run --bin relayer -- --config bridge.toml

use std::{
    path::PathBuf,
    sync::Arc,
};

use clap::Parser;
use shielded_bridge::{
    adapters::{
        checkpoint::FileCheckpoint,
        ethereum::{
            EthereumDestination,
            EthereumOrigin,
        },
    },
    config::{
        private_key_from_env,
        BridgeConfig,
        ConfigError,
        BRIDGE_PRIVATE_KEY,
    },
    context::BridgeContext,
    ports::chain::{
        ChainError,
        OriginChain as _,
    },
    relayer::{
        subscription::PollOptions,
        Relayer,
        RelayerError,
    },
};
use tokio::sync::watch;
use tracing::{
    info,
    warn,
};

#[derive(Parser)]
#[command(name = "relayer", about = "Shielded bridge root and release relayer")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "./bridge.toml")]
    config: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum RelayerCliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Relayer(#[from] RelayerError),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), RelayerCliError> {
    let config = BridgeConfig::load(&args.config)?;
    let key = private_key_from_env(BRIDGE_PRIVATE_KEY)?;
    let policy = config.relayer_tx_policy();

    let origin = EthereumOrigin::new(
        &config.origin.rpc_url,
        &key,
        config.origin.contract_address,
        policy,
    )?;
    let destination = EthereumDestination::new(
        &config.destination.rpc_url,
        &key,
        config.destination.contract_address,
        policy,
    )?;
    info!(
        bridge = %origin.account(),
        origin = %config.origin.contract_address,
        destination = %config.destination.contract_address,
        checkpoint = %config.relayer.checkpoint_path.display(),
        "relayer starting"
    );

    let ctx = Arc::new(BridgeContext::new(origin, destination, config.params()));
    let checkpoints = Arc::new(FileCheckpoint::new(config.relayer.checkpoint_path.clone()));
    let relayer = Relayer::new(
        ctx,
        checkpoints,
        PollOptions {
            poll_interval: config.relayer.poll_interval,
            confirmations: config.relayer.confirmations,
        },
    );

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested, draining subscriptions"),
            Err(e) => warn!("cannot listen for Ctrl-C, stopping: {e}"),
        }
        let _ = stop.send(true);
    });

    let report = relayer.run(shutdown).await?;
    info!(
        roots = report.roots.forwarded,
        releases = report.releases.forwarded,
        abandoned = report.roots.abandoned + report.releases.abandoned,
        "relayer finished"
    );
    Ok(())
}

//! Operator CLI for the shielded bridge.
//!
//! Signs with the key in `WALLET_PRIVATE_KEY` on both chains. `balance` only
//! reads and needs no key.
//!
//! Run with:
//!   cargo run --bin bridge -- --config bridge.toml deposit
//!   cargo run --bin bridge -- --config bridge.toml withdraw <secret> <nullifier> <recipient>

use std::{
    path::PathBuf,
    sync::Arc,
};

use alloy::primitives::{
    utils::{
        format_ether,
        parse_ether,
    },
    Address,
    U256,
};
use clap::{
    Parser,
    Subcommand,
};
use shielded_bridge::{
    adapters::{
        ethereum::{
            EthereumDestination,
            EthereumOrigin,
        },
        snarkjs_prover::SnarkjsProver,
    },
    client::{
        BalanceScope,
        BridgeClient,
        ClientError,
    },
    config::{
        private_key_from_env,
        BridgeConfig,
        ConfigError,
        WALLET_PRIVATE_KEY,
    },
    context::BridgeContext,
    domain::{
        deposit::Deposit,
        witness::WithdrawParams,
    },
    ports::chain::ChainError,
    proof_service::ProofService,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "bridge", about = "Shielded bridge operator client")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "./bridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show native and wrapped-token balances of an address.
    Balance {
        address: Address,
        /// Only the native balance on the origin chain.
        #[arg(long, group = "scope")]
        origin: bool,
        /// Only the native balance on the destination chain.
        #[arg(long, group = "scope")]
        destination: bool,
        /// Only the wrapped-token balance on the destination chain.
        #[arg(long, group = "scope")]
        token: bool,
    },
    /// Lock one denomination on the origin chain and print the deposit secret.
    Deposit,
    /// Withdraw a deposit as wrapped tokens on the destination chain.
    Withdraw {
        secret: String,
        nullifier: String,
        recipient: Address,
    },
    /// Burn wrapped tokens and release native funds on the origin chain.
    Reclaim {
        recipient: Address,
        /// Amount in ether.
        amount: String,
    },
    /// Send wrapped tokens to another destination account.
    Transfer {
        recipient: Address,
        /// Amount in ether.
        amount: String,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("invalid amount {0:?}: {1}")]
    Amount(String, String),

    #[error(
        "configured denomination {configured} wei does not match the pool's {on_chain} wei"
    )]
    DenominationMismatch { configured: U256, on_chain: U256 },
}

type Client = BridgeClient<EthereumOrigin, EthereumDestination, SnarkjsProver>;

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

async fn run(args: Args) -> Result<(), CliError> {
    let config = BridgeConfig::load(&args.config)?;
    let key = match args.command {
        Command::Balance { .. } => None,
        _ => Some(private_key_from_env(WALLET_PRIVATE_KEY)?),
    };
    let (client, ctx) = connect(&config, key.as_deref())?;

    match args.command {
        Command::Balance {
            address,
            origin,
            destination,
            token,
        } => {
            let scope = if origin {
                BalanceScope::Origin
            } else if destination {
                BalanceScope::Destination
            } else if token {
                BalanceScope::Token
            } else {
                BalanceScope::All
            };
            let balances = client.balance(address, scope).await?;
            if let Some(v) = balances.origin {
                println!("origin:      {} ETH", format_ether(v));
            }
            if let Some(v) = balances.destination {
                println!("destination: {} ETH", format_ether(v));
            }
            if let Some(v) = balances.token {
                println!("token:       {} WETH", format_ether(v));
            }
        }
        Command::Deposit => {
            let on_chain = ctx.origin.denomination().await?;
            if on_chain != config.bridge.denomination {
                return Err(CliError::DenominationMismatch {
                    configured: config.bridge.denomination,
                    on_chain,
                });
            }
            let accepted = client.deposit().await?;
            println!("deposited {} ETH", format_ether(on_chain));
            println!("tx:        {}", config.origin.tx_link(accepted.receipt.tx_hash));
            println!("secret:    {}", accepted.deposit.secret());
            println!("nullifier: {}", accepted.deposit.nullifier());
            println!("keep both values; they are the only way to withdraw this deposit");
        }
        Command::Withdraw {
            secret,
            nullifier,
            recipient,
        } => {
            let deposit = Deposit::parse(&nullifier, &secret).map_err(ClientError::from)?;
            let receipt = client
                .withdraw_to_destination(&deposit, &WithdrawParams::direct(recipient))
                .await?;
            println!("withdrawn to {recipient}");
            println!("tx: {}", config.destination.tx_link(receipt.tx_hash));
        }
        Command::Reclaim { recipient, amount } => {
            let amount = ether(&amount)?;
            let receipt = client.reclaim(recipient, amount).await?;
            println!("reclaim of {} WETH requested for {recipient}", format_ether(amount));
            println!("tx: {}", config.destination.tx_link(receipt.tx_hash));
        }
        Command::Transfer { recipient, amount } => {
            let amount = ether(&amount)?;
            let receipt = client.transfer(recipient, amount).await?;
            println!("transferred {} WETH to {recipient}", format_ether(amount));
            println!("tx: {}", config.destination.tx_link(receipt.tx_hash));
        }
    }
    Ok(())
}

/// Signing handles when `key` is given, read-only handles otherwise.
fn connect(
    config: &BridgeConfig,
    key: Option<&str>,
) -> Result<(Client, Arc<BridgeContext<EthereumOrigin, EthereumDestination>>), CliError> {
    let (origin, destination) = match key {
        Some(key) => {
            let policy = config.client_tx_policy();
            (
                EthereumOrigin::new(
                    &config.origin.rpc_url,
                    key,
                    config.origin.contract_address,
                    policy,
                )?,
                EthereumDestination::new(
                    &config.destination.rpc_url,
                    key,
                    config.destination.contract_address,
                    policy,
                )?,
            )
        }
        None => (
            EthereumOrigin::read_only(&config.origin.rpc_url, config.origin.contract_address)?,
            EthereumDestination::read_only(
                &config.destination.rpc_url,
                config.destination.contract_address,
            )?,
        ),
    };
    info!(
        origin = %config.origin.contract_address,
        destination = %config.destination.contract_address,
        signing = key.is_some(),
        "connected"
    );

    let ctx = Arc::new(BridgeContext::new(origin, destination, config.params()));
    let prover = SnarkjsProver::new(
        config.prover.snarkjs_bin.clone(),
        config.prover.artifacts(),
        config.prover.work_dir.clone(),
    );
    let proofs = ProofService::new(
        Arc::new(prover),
        config.bridge.tree_height,
        config.prover.max_retries,
        config.prover.timeout,
    );
    Ok((BridgeClient::new(Arc::clone(&ctx), proofs), ctx))
}

fn ether(amount: &str) -> Result<U256, CliError> {
    parse_ether(amount).map_err(|e| CliError::Amount(amount.to_string(), e.to_string()))
}

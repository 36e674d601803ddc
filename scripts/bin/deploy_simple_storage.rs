//! Compiles SimpleStorage, deploys it, and stores a value in it.

use alloy_primitives::U256;
use anyhow::{Context, Result};
use clap::Parser;
use helpers::{build_contract, deploy_and_store, setup_script, DeployConfig, NoncePolicy};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Compile, deploy and exercise the SimpleStorage contract")]
struct Cli {
    /// Deployment config file
    #[arg(long, default_value = "deploy.toml")]
    config: PathBuf,

    /// Value passed to store(); overrides `store_value` from the config
    #[arg(long)]
    store_value: Option<u64>,

    /// Node URL; overrides `network.rpc_url`
    #[arg(long, env = "SIMPLE_STORAGE_RPC_URL")]
    rpc_url: Option<String>,

    /// `sequential` or `live`; overrides `nonce_policy`
    #[arg(long)]
    nonce_policy: Option<NoncePolicy>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = DeployConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(rpc_url) = cli.rpc_url {
        config.network.rpc_url = rpc_url;
    }
    if let Some(policy) = cli.nonce_policy {
        config.nonce_policy = policy;
    }
    if let Some(value) = cli.store_value {
        config.store_value = value;
    }
    config.validate()?;
    info!(
        config = %cli.config.display(),
        rpc_url = %config.network.rpc_url,
        chain_id = config.network.chain_id,
        nonce_policy = ?config.nonce_policy,
        "Loaded deployment config"
    );

    let (_, artifact) = build_contract(&config)?;
    println!(
        "Compiled {} ({} bytes), artifact at {}",
        artifact.name,
        artifact.bytecode.len(),
        config.artifact_path.display()
    );

    let setup = setup_script(&config).await?;
    println!("Sender: {}", setup.signer.address());

    let run = deploy_and_store(setup, &config, &artifact, U256::from(config.store_value)).await?;

    if let Some(address) = run.contract.address() {
        println!("Deployed at: {}", address);
    }
    println!("Deploy transaction: {}", run.deploy_receipt.transaction_hash);
    println!("Initial value = {}", run.initial_value);
    println!(
        "store({}) mined in block {:?}",
        config.store_value, run.store_receipt.block_number
    );
    println!("Store transaction: {}", run.store_receipt.transaction_hash);
    println!("New value = {}", run.final_value);

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("helpers=info,deploy_simple_storage=info,warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).compact())
        .with(env_filter)
        .init();
}

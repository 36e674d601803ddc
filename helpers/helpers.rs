//! Common helper functions for scripts and tests
//!
//! The deploy flow is five stages, each behind its own module: the source
//! loader and solc adapter ([`compiler`]), artifact extraction ([`artifact`]),
//! the JSON-RPC client ([`chain`]) and the transaction sequencer
//! ([`transaction`]). [`pipeline`] runs them in order.

use std::sync::Arc;

use alloy_signer_local::PrivateKeySigner;
use tracing::info;

pub mod artifact;
pub mod chain;
pub mod compiler;
pub mod config;
pub mod contract;
pub mod error;
pub mod pipeline;
pub mod transaction;

pub use artifact::{CompilationResult, ContractArtifact};
pub use chain::{ChainClient, Receipt, RpcChainClient};
pub use config::{DeployConfig, NoncePolicy};
pub use contract::ContractHandle;
pub use error::{Error, Result};
pub use pipeline::{deploy_and_store, run, StorageRun};
pub use transaction::{TransactionRecord, TransactionSequencer};

use compiler::{load_source, SolcCompiler, StandardJsonInput};

/// Connected client plus the account that signs every transaction.
pub struct ScriptSetup {
    pub client: Arc<dyn ChainClient>,
    pub signer: PrivateKeySigner,
}

/// Connects to the configured node and loads the signing key.
pub async fn setup_script(config: &DeployConfig) -> Result<ScriptSetup> {
    let client = RpcChainClient::connect(&config.network.rpc_url).await?;
    setup_with_client(Arc::new(client), config).await
}

/// Same as [`setup_script`] for an already constructed client.
///
/// Fails when the node's chain id differs from the configured one, since
/// signatures are bound to the chain id.
pub async fn setup_with_client(
    client: Arc<dyn ChainClient>,
    config: &DeployConfig,
) -> Result<ScriptSetup> {
    let reported = client.chain_id().await?;
    if reported != config.network.chain_id {
        return Err(Error::ChainIdMismatch {
            configured: config.network.chain_id,
            reported,
        });
    }

    let signer = config.account.signer()?;
    info!(sender = %signer.address(), chain_id = reported, "Loaded sender account");
    Ok(ScriptSetup { client, signer })
}

/// Loads, compiles and extracts the configured contract.
///
/// The full compiler output is written to `config.artifact_path` as soon as
/// compilation succeeds, before extraction.
pub fn build_contract(config: &DeployConfig) -> Result<(CompilationResult, ContractArtifact)> {
    let source = load_source(&config.contract.source_path)?;

    let input = StandardJsonInput::single_source(
        config.contract.file_name.clone(),
        source,
        &config.compiler.output_selection,
    );
    let compiled = SolcCompiler::from_config(&config.compiler).compile(&input)?;
    compiled.write_to(&config.artifact_path)?;

    let artifact = compiled.contract(&config.contract.file_name, &config.contract.contract_name)?;
    info!(
        contract = %artifact.name,
        bytecode_len = artifact.bytecode.len(),
        artifact_path = %config.artifact_path.display(),
        "Contract artifact written"
    );

    Ok((compiled, artifact))
}

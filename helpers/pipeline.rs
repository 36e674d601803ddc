//! The SimpleStorage flow: deploy, read, store, read again.

use crate::{
    artifact::ContractArtifact,
    build_contract,
    chain::Receipt,
    config::DeployConfig,
    contract::ContractHandle,
    error::{Error, Result},
    setup_script,
    transaction::{TransactionRecord, TransactionSequencer},
    ScriptSetup,
};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::U256;
use tracing::info;

/// What one run produced, stage by stage.
#[derive(Debug, Clone)]
pub struct StorageRun {
    pub contract: ContractHandle,
    pub deploy_receipt: Receipt,
    pub initial_value: U256,
    pub store_receipt: Receipt,
    pub final_value: U256,
    pub transactions: Vec<TransactionRecord>,
}

/// Compiles, connects, and runs [`deploy_and_store`] with `config.store_value`.
pub async fn run(config: &DeployConfig) -> Result<StorageRun> {
    let (_, artifact) = build_contract(config)?;
    let setup = setup_script(config).await?;
    deploy_and_store(setup, config, &artifact, U256::from(config.store_value)).await
}

/// Deploys the contract with no constructor arguments, reads `retrieve()`,
/// sends `store(value)`, waits for it to be mined and reads `retrieve()` again.
pub async fn deploy_and_store(
    setup: ScriptSetup,
    config: &DeployConfig,
    artifact: &ContractArtifact,
    value: U256,
) -> Result<StorageRun> {
    let ScriptSetup { client, signer } = setup;
    let mut sequencer =
        TransactionSequencer::new(client, signer, config.network.chain_id, config.nonce_policy)
            .with_receipt_polling(
                config.network.poll_interval(),
                Some(config.network.receipt_timeout()),
            );

    let (contract, deploy_receipt) = sequencer
        .deploy(&ContractHandle::from_artifact(artifact), &[])
        .await?;

    let initial_value = read_uint(&sequencer, &contract, "retrieve").await?;
    info!(value = %initial_value, "Stored value before store()");

    let store_receipt = sequencer
        .invoke(&contract, "store", &[DynSolValue::Uint(value, 256)])
        .await?;

    let final_value = read_uint(&sequencer, &contract, "retrieve").await?;
    info!(value = %final_value, "Stored value after store()");

    Ok(StorageRun {
        contract,
        deploy_receipt,
        initial_value,
        store_receipt,
        final_value,
        transactions: sequencer.submitted().to_vec(),
    })
}

async fn read_uint(
    sequencer: &TransactionSequencer,
    contract: &ContractHandle,
    function: &str,
) -> Result<U256> {
    let values = sequencer.read(contract, function, &[]).await?;
    match values.as_slice() {
        [DynSolValue::Uint(value, _)] => Ok(*value),
        other => Err(Error::Abi(format!(
            "Expected a single uint from {}, got {:?}",
            function, other
        ))),
    }
}

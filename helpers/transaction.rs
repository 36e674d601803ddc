//! Transaction sequencing: build, sign locally, submit, and block on the receipt
//!
//! Every state change goes through [`TransactionSequencer::submit`], one at a
//! time. The sequencer owns the nonce tracker, so nonces are handed out in
//! submission order.

use crate::{
    chain::{wait_for_receipt, ChainClient, Receipt},
    config::NoncePolicy,
    contract::ContractHandle,
    error::{Error, Result},
};
use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_dyn_abi::DynSolValue;
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSigner;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_rpc_types::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use std::{sync::Arc, time::Duration};
use tracing::info;

/// Everything that goes into one signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub chain_id: u64,
    pub from: Address,
    pub nonce: u64,
    pub kind: TxKind,
    pub input: Bytes,
    pub gas_limit: u64,
    pub gas_price: u128,
}

impl TransactionRecord {
    fn to_legacy(&self) -> TxLegacy {
        TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: self.kind,
            value: U256::ZERO,
            input: self.input.clone(),
        }
    }
}

/// Hands out nonces according to a [`NoncePolicy`].
#[derive(Debug, Clone)]
pub struct NonceTracker {
    policy: NoncePolicy,
    next: Option<u64>,
}

impl NonceTracker {
    pub fn new(policy: NoncePolicy) -> Self {
        Self { policy, next: None }
    }

    pub fn policy(&self) -> NoncePolicy {
        self.policy
    }

    /// Nonce for the next transaction from `address`.
    pub async fn reserve(&mut self, client: &dyn ChainClient, address: Address) -> Result<u64> {
        let nonce = match (self.policy, self.next) {
            (NoncePolicy::Sequential, Some(next)) => next,
            _ => client.transaction_count(address).await?,
        };
        self.next = Some(nonce + 1);
        Ok(nonce)
    }
}

pub struct TransactionSequencer {
    client: Arc<dyn ChainClient>,
    signer: PrivateKeySigner,
    chain_id: u64,
    nonces: NonceTracker,
    poll_interval: Duration,
    receipt_timeout: Option<Duration>,
    submitted: Vec<TransactionRecord>,
}

impl TransactionSequencer {
    pub fn new(
        client: Arc<dyn ChainClient>,
        signer: PrivateKeySigner,
        chain_id: u64,
        policy: NoncePolicy,
    ) -> Self {
        Self {
            client,
            signer,
            chain_id,
            nonces: NonceTracker::new(policy),
            poll_interval: Duration::from_millis(500),
            receipt_timeout: None,
            submitted: Vec::new(),
        }
    }

    pub fn with_receipt_polling(mut self, interval: Duration, timeout: Option<Duration>) -> Self {
        self.poll_interval = interval;
        self.receipt_timeout = timeout;
        self
    }

    pub fn sender(&self) -> Address {
        self.signer.address()
    }

    /// Records of every transaction submitted so far, in order.
    pub fn submitted(&self) -> &[TransactionRecord] {
        &self.submitted
    }

    /// Fills nonce, gas price and gas limit for an unsigned transaction.
    pub async fn build(&mut self, kind: TxKind, input: Bytes) -> Result<TransactionRecord> {
        let from = self.sender();
        let nonce = self.nonces.reserve(self.client.as_ref(), from).await?;
        let gas_price = self.client.gas_price().await?;

        let mut request = TransactionRequest::default()
            .from(from)
            .nonce(nonce)
            .input(input.clone().into());
        request.to = Some(kind);
        let gas_limit = self.client.estimate_gas(request).await?;

        Ok(TransactionRecord {
            chain_id: self.chain_id,
            from,
            nonce,
            kind,
            input,
            gas_limit,
            gas_price,
        })
    }

    /// Signs `record` with the local key and returns the raw EIP-2718 payload.
    pub async fn sign(&self, record: &TransactionRecord) -> Result<Bytes> {
        let mut tx = record.to_legacy();
        let signature = self
            .signer
            .sign_transaction(&mut tx)
            .await
            .map_err(|e| Error::SigningFailed(format!("Failed to sign transaction: {}", e)))?;

        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        Ok(Bytes::from(envelope.encoded_2718()))
    }

    /// Build → sign → send → wait. Fails if the receipt reports a revert.
    pub async fn submit(&mut self, kind: TxKind, input: Bytes) -> Result<Receipt> {
        let record = self.build(kind, input).await?;
        let raw = self.sign(&record).await?;
        let hash = self.client.send_raw_transaction(raw).await?;
        info!(
            tx_hash = %hash,
            nonce = record.nonce,
            gas_limit = record.gas_limit,
            "Transaction submitted"
        );
        self.submitted.push(record);

        let receipt = wait_for_receipt(
            self.client.as_ref(),
            hash,
            self.poll_interval,
            self.receipt_timeout,
        )
        .await?;
        if !receipt.status {
            return Err(Error::Reverted(hash));
        }

        info!(
            tx_hash = %hash,
            block = ?receipt.block_number,
            gas_used = receipt.gas_used,
            "Transaction mined"
        );
        Ok(receipt)
    }

    /// Deploys `handle`'s bytecode and returns the handle bound to the new address.
    pub async fn deploy(
        &mut self,
        handle: &ContractHandle,
        constructor_args: &[DynSolValue],
    ) -> Result<(ContractHandle, Receipt)> {
        let data = handle.deploy_data(constructor_args)?;
        let receipt = self.submit(TxKind::Create, data).await?;
        let address = receipt
            .contract_address
            .ok_or(Error::MissingContractAddress(receipt.transaction_hash))?;

        info!(address = %address, "Contract deployed");
        Ok((handle.clone().with_address(address), receipt))
    }

    /// Sends a state-changing call to `function` on a deployed contract.
    pub async fn invoke(
        &mut self,
        handle: &ContractHandle,
        function: &str,
        args: &[DynSolValue],
    ) -> Result<Receipt> {
        let to = handle.require_address()?;
        let data = handle.encode_call(function, args)?;
        info!(function = function, to = %to, "Invoking contract");
        self.submit(TxKind::Call(to), data).await
    }

    /// Read-only `eth_call`; never consumes a nonce.
    pub async fn read(
        &self,
        handle: &ContractHandle,
        function: &str,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>> {
        let to = handle.require_address()?;
        let data = handle.encode_call(function, args)?;
        let request = TransactionRequest::default()
            .from(self.sender())
            .to(to)
            .input(data.into());

        let output = self.client.call(request).await?;
        handle.decode_output(function, args.len(), &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artifact::{tests::SIMPLE_STORAGE_OUTPUT, CompilationResult},
        chain::MockChainClient,
    };
    use alloy_consensus::transaction::SignerRecoverable;
    use alloy_eips::eip2718::Decodable2718;
    use alloy_primitives::B256;
    use std::{
        str::FromStr,
        sync::{Arc, Mutex},
    };

    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const CHAIN_ID: u64 = 1337;

    fn signer() -> PrivateKeySigner {
        PrivateKeySigner::from_str(ANVIL_KEY).unwrap()
    }

    fn simple_storage() -> ContractHandle {
        let artifact = CompilationResult::from_slice(SIMPLE_STORAGE_OUTPUT.as_bytes())
            .unwrap()
            .contract("SimpleStorage.sol", "SimpleStorage")
            .unwrap();
        ContractHandle::from_artifact(&artifact)
    }

    /// Mock node that mines every transaction immediately and records raw payloads.
    fn mining_client(
        starting_nonce: u64,
        nonce_queries: usize,
        sent: Arc<Mutex<Vec<Bytes>>>,
    ) -> MockChainClient {
        let deployed = Address::repeat_byte(0x5e);
        let mut client = MockChainClient::new();
        client
            .expect_transaction_count()
            .times(nonce_queries)
            .returning(move |_| Box::pin(async move { Ok(starting_nonce) }));
        client
            .expect_gas_price()
            .returning(|| Box::pin(async move { Ok(20_000_000_000u128) }));
        client
            .expect_estimate_gas()
            .returning(|_| Box::pin(async move { Ok(150_000u64) }));
        client.expect_send_raw_transaction().returning(move |raw| {
            let mut sent = sent.lock().unwrap();
            sent.push(raw);
            let hash = B256::with_last_byte(sent.len() as u8);
            Box::pin(async move { Ok(hash) })
        });
        client.expect_transaction_receipt().returning(move |hash| {
            Box::pin(async move {
                Ok(Some(Receipt {
                    transaction_hash: hash,
                    block_number: Some(1),
                    contract_address: (hash == B256::with_last_byte(1)).then_some(deployed),
                    gas_used: 100_000,
                    status: true,
                }))
            })
        });
        client
    }

    fn sequencer(client: MockChainClient, policy: NoncePolicy) -> TransactionSequencer {
        TransactionSequencer::new(Arc::new(client), signer(), CHAIN_ID, policy)
            .with_receipt_polling(Duration::from_millis(1), Some(Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_sequential_policy_queries_nonce_once() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut sequencer = sequencer(mining_client(7, 1, sent.clone()), NoncePolicy::Sequential);

        let (deployed, _) = sequencer.deploy(&simple_storage(), &[]).await.unwrap();
        sequencer
            .invoke(&deployed, "store", &[DynSolValue::Uint(U256::from(15), 256)])
            .await
            .unwrap();

        let nonces: Vec<u64> = sequencer.submitted().iter().map(|r| r.nonce).collect();
        assert_eq!(nonces, vec![7, 8]);
        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_live_policy_requeries_nonce() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut sequencer = sequencer(mining_client(3, 2, sent), NoncePolicy::Live);

        let (deployed, _) = sequencer.deploy(&simple_storage(), &[]).await.unwrap();
        sequencer
            .invoke(&deployed, "store", &[DynSolValue::Uint(U256::from(15), 256)])
            .await
            .unwrap();

        // The mock node never advances, so a live query repeats the nonce.
        let nonces: Vec<u64> = sequencer.submitted().iter().map(|r| r.nonce).collect();
        assert_eq!(nonces, vec![3, 3]);
    }

    #[tokio::test]
    async fn test_signed_payload_carries_record_fields() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut sequencer = sequencer(mining_client(0, 1, sent.clone()), NoncePolicy::Sequential);

        let (deployed, receipt) = sequencer.deploy(&simple_storage(), &[]).await.unwrap();
        assert_eq!(deployed.address(), Some(Address::repeat_byte(0x5e)));
        assert_eq!(receipt.contract_address, deployed.address());

        let raw = sent.lock().unwrap()[0].clone();
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
        let TxEnvelope::Legacy(signed) = &envelope else {
            panic!("expected a legacy transaction");
        };
        assert_eq!(signed.tx().chain_id, Some(CHAIN_ID));
        assert_eq!(signed.tx().nonce, 0);
        assert_eq!(signed.tx().to, TxKind::Create);
        assert_eq!(signed.tx().gas_limit, 150_000);
        assert_eq!(envelope.recover_signer().unwrap(), signer().address());

        let record = &sequencer.submitted()[0];
        assert_eq!(record.from, signer().address());
        assert_eq!(record.input, simple_storage().deploy_data(&[]).unwrap());
    }

    #[tokio::test]
    async fn test_reverted_receipt_is_an_error() {
        let mut client = MockChainClient::new();
        client
            .expect_transaction_count()
            .returning(|_| Box::pin(async move { Ok(0u64) }));
        client
            .expect_gas_price()
            .returning(|| Box::pin(async move { Ok(1u128) }));
        client
            .expect_estimate_gas()
            .returning(|_| Box::pin(async move { Ok(21_000u64) }));
        client
            .expect_send_raw_transaction()
            .returning(|_| Box::pin(async move { Ok(B256::repeat_byte(0xee)) }));
        client.expect_transaction_receipt().returning(|hash| {
            Box::pin(async move {
                Ok(Some(Receipt {
                    transaction_hash: hash,
                    block_number: Some(2),
                    contract_address: None,
                    gas_used: 21_000,
                    status: false,
                }))
            })
        });

        let mut sequencer = sequencer(client, NoncePolicy::Sequential);
        let err = sequencer.deploy(&simple_storage(), &[]).await.unwrap_err();
        assert!(matches!(err, Error::Reverted(h) if h == B256::repeat_byte(0xee)));
    }

    #[tokio::test]
    async fn test_deploy_without_contract_address() {
        let mut client = MockChainClient::new();
        client
            .expect_transaction_count()
            .returning(|_| Box::pin(async move { Ok(0u64) }));
        client
            .expect_gas_price()
            .returning(|| Box::pin(async move { Ok(1u128) }));
        client
            .expect_estimate_gas()
            .returning(|_| Box::pin(async move { Ok(21_000u64) }));
        client
            .expect_send_raw_transaction()
            .returning(|_| Box::pin(async move { Ok(B256::repeat_byte(0x01)) }));
        client.expect_transaction_receipt().returning(|hash| {
            Box::pin(async move {
                Ok(Some(Receipt {
                    transaction_hash: hash,
                    block_number: Some(1),
                    contract_address: None,
                    gas_used: 21_000,
                    status: true,
                }))
            })
        });

        let mut sequencer = sequencer(client, NoncePolicy::Sequential);
        let err = sequencer.deploy(&simple_storage(), &[]).await.unwrap_err();
        assert!(matches!(err, Error::MissingContractAddress(_)));
    }

    #[tokio::test]
    async fn test_read_decodes_call_output() {
        let mut client = MockChainClient::new();
        client.expect_call().times(1).returning(|request| {
            let selector = request.input.input().map(|data| data[..4].to_vec());
            Box::pin(async move {
                assert_eq!(selector, Some(vec![0x2e, 0x64, 0xce, 0xc1]));
                Ok(Bytes::from(U256::ZERO.to_be_bytes::<32>().to_vec()))
            })
        });

        let sequencer = sequencer(client, NoncePolicy::Sequential);
        let deployed = simple_storage().with_address(Address::repeat_byte(0x5e));
        let values = sequencer.read(&deployed, "retrieve", &[]).await.unwrap();
        assert_eq!(values, vec![DynSolValue::Uint(U256::ZERO, 256)]);
    }

    #[tokio::test]
    async fn test_invoke_requires_deployed_handle() {
        let mut sequencer = sequencer(MockChainClient::new(), NoncePolicy::Sequential);
        let err = sequencer
            .invoke(&simple_storage(), "store", &[DynSolValue::Uint(U256::from(1), 256)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Abi(_)));
        assert!(sequencer.submitted().is_empty());
    }
}

//! In-process stand-in for a dev node running SimpleStorage.
//!
//! It decodes every raw transaction, recovers the sender, and enforces chain
//! id and nonce the way a real node would. Contract execution is simulated
//! for the two SimpleStorage entry points the pipeline touches.

use alloy_consensus::{transaction::SignerRecoverable, TxEnvelope};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{keccak256, Address, Bytes, TxKind, B256, U256};
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use helpers::{ChainClient, Error, Receipt, Result};
use std::{collections::HashMap, sync::Mutex};

pub struct FakeNode {
    chain_id: u64,
    state: Mutex<NodeState>,
}

#[derive(Default)]
struct NodeState {
    nonces: HashMap<Address, u64>,
    storage: HashMap<Address, U256>,
    receipts: HashMap<B256, Receipt>,
    block: u64,
    nonce_queries: usize,
    mined: usize,
    /// After this many mined transactions, a foreign transaction from the
    /// same sender lands and bumps its nonce.
    interference_after: Option<usize>,
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

impl FakeNode {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(NodeState::default()),
        }
    }

    /// Starts `address` at `nonce`, as if it had already sent transactions.
    pub fn with_nonce(self, address: Address, nonce: u64) -> Self {
        self.lock().nonces.insert(address, nonce);
        self
    }

    /// Simulates another transaction from the sender being mined right after
    /// the `count`-th transaction submitted through this node.
    pub fn with_interference_after(self, count: usize) -> Self {
        self.lock().interference_after = Some(count);
        self
    }

    pub fn nonce_queries(&self) -> usize {
        self.lock().nonce_queries
    }

    pub fn nonce_of(&self, address: Address) -> u64 {
        self.lock().nonces.get(&address).copied().unwrap_or_default()
    }

    pub fn stored_value(&self, contract: Address) -> Option<U256> {
        self.lock().storage.get(&contract).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn execute(&self, raw: &[u8]) -> Result<B256> {
        let envelope = TxEnvelope::decode_2718(&mut &raw[..])
            .map_err(|e| Error::RpcError(format!("invalid transaction encoding: {e}")))?;
        let TxEnvelope::Legacy(signed) = &envelope else {
            return Err(Error::RpcError("only legacy transactions are accepted".into()));
        };
        let tx = signed.tx();

        if tx.chain_id != Some(self.chain_id) {
            return Err(Error::RpcError(format!(
                "invalid chain id {:?}, node is {}",
                tx.chain_id, self.chain_id
            )));
        }

        let sender = envelope
            .recover_signer()
            .map_err(|e| Error::RpcError(format!("invalid signature: {e}")))?;

        let mut state = self.lock();
        let expected = state.nonces.get(&sender).copied().unwrap_or_default();
        if tx.nonce != expected {
            return Err(Error::RpcError(format!(
                "nonce mismatch for {sender}: expected {expected}, got {}",
                tx.nonce
            )));
        }
        state.nonces.insert(sender, expected + 1);
        state.block += 1;

        let hash = *envelope.tx_hash();
        let (status, contract_address) = match tx.to {
            TxKind::Create => {
                let address = sender.create(tx.nonce);
                state.storage.insert(address, U256::ZERO);
                (true, Some(address))
            }
            TxKind::Call(to) => {
                let input = &tx.input;
                let is_store = input.len() == 36 && input[..4] == selector("store(uint256)");
                match state.storage.get_mut(&to) {
                    Some(slot) if is_store => {
                        *slot = U256::from_be_slice(&input[4..36]);
                        (true, None)
                    }
                    _ => (false, None),
                }
            }
        };

        let block_number = state.block;
        state.receipts.insert(
            hash,
            Receipt {
                transaction_hash: hash,
                block_number: Some(block_number),
                contract_address,
                gas_used: 21_000 + tx.input.len() as u64 * 16,
                status,
            },
        );

        state.mined += 1;
        if state.interference_after == Some(state.mined) {
            *state.nonces.entry(sender).or_default() += 1;
            state.block += 1;
        }

        Ok(hash)
    }
}

#[async_trait]
impl ChainClient for FakeNode {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        let mut state = self.lock();
        state.nonce_queries += 1;
        Ok(state.nonces.get(&address).copied().unwrap_or_default())
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(1_000_000_000)
    }

    async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64> {
        let input_len = request.input.input().map(|data| data.len()).unwrap_or_default();
        Ok(53_000 + input_len as u64 * 16)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        self.execute(&raw)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        Ok(self.lock().receipts.get(&hash).cloned())
    }

    async fn call(&self, request: TransactionRequest) -> Result<Bytes> {
        let Some(TxKind::Call(to)) = request.to else {
            return Err(Error::RpcError("eth_call needs a target address".into()));
        };
        let input = request.input.input().cloned().unwrap_or_default();

        let state = self.lock();
        let value = state
            .storage
            .get(&to)
            .ok_or_else(|| Error::RpcError(format!("no contract at {to}")))?;

        if input.len() == 4 && input[..4] == selector("retrieve()") {
            Ok(Bytes::from(value.to_be_bytes::<32>().to_vec()))
        } else {
            Err(Error::RpcError("execution reverted".into()))
        }
    }
}

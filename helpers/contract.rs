//! Contract handles: an ABI paired with bytecode before deployment and with
//! an address after it.

use crate::{
    artifact::ContractArtifact,
    error::{Error, Result},
};
use alloy_dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives::{Address, Bytes};

#[derive(Debug, Clone)]
pub struct ContractHandle {
    abi: JsonAbi,
    bytecode: Option<Bytes>,
    address: Option<Address>,
}

impl ContractHandle {
    /// Pre-deployment handle: address unknown, bytecode known.
    pub fn from_artifact(artifact: &ContractArtifact) -> Self {
        Self {
            abi: artifact.abi.clone(),
            bytecode: Some(artifact.bytecode.clone()),
            address: None,
        }
    }

    /// Handle for a contract that already lives at `address`.
    pub fn at(abi: JsonAbi, address: Address) -> Self {
        Self {
            abi,
            bytecode: None,
            address: Some(address),
        }
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    pub fn require_address(&self) -> Result<Address> {
        self.address
            .ok_or_else(|| Error::Abi("Contract handle has no address; deploy it first".into()))
    }

    /// Creation payload: bytecode followed by the ABI-encoded constructor arguments.
    pub fn deploy_data(&self, args: &[DynSolValue]) -> Result<Bytes> {
        let bytecode = self
            .bytecode
            .as_ref()
            .ok_or_else(|| Error::Abi("Contract handle has no bytecode to deploy".into()))?;

        let encoded_args = match self.abi.constructor() {
            Some(constructor) => constructor
                .abi_encode_input(args)
                .map_err(|e| Error::Abi(format!("Failed to encode constructor arguments: {}", e)))?,
            None if args.is_empty() => Vec::new(),
            None => {
                return Err(Error::Abi(format!(
                    "Contract has no constructor but {} arguments were given",
                    args.len()
                )))
            }
        };

        let mut data = bytecode.to_vec();
        data.extend_from_slice(&encoded_args);
        Ok(Bytes::from(data))
    }

    /// Selector plus ABI-encoded arguments for `function`.
    pub fn encode_call(&self, function: &str, args: &[DynSolValue]) -> Result<Bytes> {
        let func = self.function(function, args.len())?;
        let data = func
            .abi_encode_input(args)
            .map_err(|e| Error::Abi(format!("Failed to encode call to {}: {}", function, e)))?;
        Ok(Bytes::from(data))
    }

    pub fn decode_output(
        &self,
        function: &str,
        arg_count: usize,
        data: &[u8],
    ) -> Result<Vec<DynSolValue>> {
        self.function(function, arg_count)?
            .abi_decode_output(data)
            .map_err(|e| Error::Abi(format!("Failed to decode output of {}: {}", function, e)))
    }

    /// Picks the overload of `name` taking `arg_count` inputs.
    fn function(&self, name: &str, arg_count: usize) -> Result<&Function> {
        let overloads = self
            .abi
            .function(name)
            .ok_or_else(|| Error::Abi(format!("Function '{}' not found in ABI", name)))?;

        overloads
            .iter()
            .find(|f| f.inputs.len() == arg_count)
            .ok_or_else(|| {
                Error::Abi(format!(
                    "No overload of '{}' takes {} arguments",
                    name, arg_count
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{tests::SIMPLE_STORAGE_OUTPUT, CompilationResult};
    use alloy_primitives::{hex, U256};

    fn handle() -> ContractHandle {
        let artifact = CompilationResult::from_slice(SIMPLE_STORAGE_OUTPUT.as_bytes())
            .unwrap()
            .contract("SimpleStorage.sol", "SimpleStorage")
            .unwrap();
        ContractHandle::from_artifact(&artifact)
    }

    #[test]
    fn test_deploy_data_without_constructor() {
        let handle = handle();
        let data = handle.deploy_data(&[]).unwrap();
        assert!(data.starts_with(&hex!("6080604052")));
        assert!(handle.address().is_none());
        assert!(handle.deploy_data(&[DynSolValue::Bool(true)]).is_err());
    }

    #[test]
    fn test_encode_store_call() {
        let data = handle()
            .encode_call("store", &[DynSolValue::Uint(U256::from(15), 256)])
            .unwrap();
        assert_eq!(&data[..4], &hex!("6057361d"));
        assert_eq!(data.len(), 36);
        assert_eq!(U256::from_be_slice(&data[4..]), U256::from(15));
    }

    #[test]
    fn test_encode_retrieve_call() {
        let data = handle().encode_call("retrieve", &[]).unwrap();
        assert_eq!(&data[..], &hex!("2e64cec1"));
    }

    #[test]
    fn test_decode_retrieve_output() {
        let output = U256::from(15).to_be_bytes::<32>();
        let values = handle().decode_output("retrieve", 0, &output).unwrap();
        assert_eq!(values, vec![DynSolValue::Uint(U256::from(15), 256)]);
    }

    #[test]
    fn test_unknown_function() {
        let err = handle().encode_call("increment", &[]).unwrap_err();
        assert!(err.to_string().contains("increment"));
    }

    #[test]
    fn test_wrong_arity() {
        assert!(handle().encode_call("store", &[]).is_err());
    }

    #[test]
    fn test_deployed_handle() {
        let address = Address::repeat_byte(0x42);
        let deployed = handle().with_address(address);
        assert_eq!(deployed.require_address().unwrap(), address);

        let at = ContractHandle::at(deployed.abi().clone(), address);
        assert!(at.deploy_data(&[]).is_err());
        assert!(handle().require_address().is_err());
    }
}

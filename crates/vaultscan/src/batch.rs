//! Dispatches a batch of [`EncodedCall`]s through Multicall3's `aggregate3`, using only the
//! `EvmClient` capability from §6 — every caller (discovery, the historical reader, the
//! token cache) stays fakeable in tests without a concrete `alloy` provider, per the
//! testing scenarios in §8.
//!
//! This is deliberately a thinner path than `vaultscan_multicall::Multicall`, which binds
//! directly to an `alloy_provider::Provider` generic for callers that already hold a
//! concrete provider; here the calldata is built and decoded by hand against the same
//! `IMulticall3` ABI so the only capability required is `EvmClient::call`.
//!
//! Per §4.2, a batch that keeps failing isn't given up on outright: it's retried with
//! exponential backoff, and a batch that still fails after every attempt is bisected once,
//! with each half retried in isolation so a single bad call doesn't take its whole batch's
//! siblings down with it. A half that still can't be dispatched is marked `TRANSPORT` rather
//! than aborting the caller's whole read.

use std::collections::BTreeMap;
use std::time::Duration;

use alloy_primitives::{Address as AlloyAddress, Bytes, U256};
use alloy_sol_types::SolCall;
use vaultscan_multicall::{IMulticall3, MULTICALL3_ADDRESS};

use crate::{
    error::ScanError,
    evm::EvmClient,
    models::{CallResult, EncodedCall},
};

/// Splits `calls` into batches of at most `MAX_BATCH` entries. Mirrors the soft
/// size budget in §4.2; a fixed call count is used in place of a byte-size estimate since
/// every probe and reader call in this registry is a small fixed-size ABI payload.
const MAX_BATCH: usize = 100;

/// Attempts per batch (or per call, on the fallback path) before giving up and either
/// bisecting or marking the call `TRANSPORT`, per §4.2's retry policy.
const RETRY_ATTEMPTS: u32 = 5;

/// Base delay for the exponential backoff between attempts.
const BACKOFF_BASE_MS: u64 = 200;

/// Backoff never waits longer than this between attempts.
const BACKOFF_CAP_MS: u64 = 10_000;

/// The reason recorded on a [`CallResult`] whose underlying transport never produced an
/// answer after every retry and bisection attempt was exhausted.
const TRANSPORT_REVERT_REASON: &str = "TRANSPORT";

/// The standard Solidity `Error(string)` revert selector, used to pull a human-readable
/// revert reason out of a failed `aggregate3` sub-call's return data. A sub-call that
/// reverts with no data (or with a custom error / `Panic(uint256)`) decodes to `None` here —
/// that reason-less shape is also the practical signal the historical reader's gas-pathology
/// promotion watches for, since `aggregate3` carries no gas-used metric of its own.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Builds an [`EncodedCall`] from a typed `SolCall`, tagging it with `label` for later
/// demultiplexing. Shared by the token cache, the classification probes and every reader
/// strategy so each only has to name the contract call, not hand-roll its encoding.
pub fn call_from<C: SolCall>(target: AlloyAddress, label: &str, call: C) -> EncodedCall {
    let full = call.abi_encode();
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&full[..4]);
    EncodedCall::build_raw(target.into(), selector, full[4..].to_vec().into(), label)
}

/// Decodes a function's ABI return type from a successful [`CallResult`], or `None` if the
/// call is missing from the results map or didn't succeed.
pub fn decode_returns<C: SolCall>(results: &BTreeMap<String, CallResult>, label: &str) -> Option<C::Return> {
    let result = results.get(label)?;
    if !result.success {
        return None;
    }
    C::abi_decode_returns(&result.return_data, false).ok()
}

/// Dispatches every call in `calls` against `block`, choosing backend (a) or (b) from §4.2
/// per `block`: `aggregate3` when a Multicall3 deployment is available, otherwise a
/// per-call `eth_call` fallback loop.
pub async fn dispatch(
    client: &dyn EvmClient,
    calls: &[EncodedCall],
    block: u64,
) -> Result<Vec<CallResult>, ScanError> {
    if calls.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = Vec::with_capacity(calls.len());
    if client.multicall_available(block).await? {
        for chunk in calls.chunks(MAX_BATCH) {
            out.extend(dispatch_chunk(client, chunk, block).await?);
        }
    } else {
        for call in calls {
            out.push(dispatch_single_with_retry(client, call, block).await);
        }
    }
    Ok(out)
}

/// One soft-budget-sized chunk through `aggregate3`, retried with backoff and bisected on
/// exhaustion (§4.2, scenario S6).
async fn dispatch_chunk(
    client: &dyn EvmClient,
    calls: &[EncodedCall],
    block: u64,
) -> Result<Vec<CallResult>, ScanError> {
    match aggregate3_with_retry(client, calls, block).await {
        Ok(results) => Ok(results),
        Err(_) if calls.len() > 1 => Ok(bisect_and_mark(client, calls, block).await),
        Err(_) => Ok(vec![CallResult::reverted(block, Some(TRANSPORT_REVERT_REASON.to_string()))]),
    }
}

/// Retries a single `aggregate3` call up to `RETRY_ATTEMPTS` times with exponential backoff,
/// returning the last transport error if every attempt fails.
async fn aggregate3_with_retry(
    client: &dyn EvmClient,
    calls: &[EncodedCall],
    block: u64,
) -> Result<Vec<CallResult>, ScanError> {
    let mut attempt = 0u32;
    loop {
        match aggregate3_once(client, calls, block).await {
            Ok(results) => return Ok(results),
            Err(e) => {
                attempt += 1;
                if attempt >= RETRY_ATTEMPTS {
                    return Err(e);
                }
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }
    }
}

/// Splits a chunk that failed every retry in half and dispatches each half once more in
/// isolation. A half that fails that single attempt too is marked `TRANSPORT` wholesale
/// rather than retried further — per §4.2, bisection happens once.
async fn bisect_and_mark(client: &dyn EvmClient, calls: &[EncodedCall], block: u64) -> Vec<CallResult> {
    if calls.len() == 1 {
        return vec![CallResult::reverted(block, Some(TRANSPORT_REVERT_REASON.to_string()))];
    }

    let mid = calls.len() / 2;
    let (left, right) = calls.split_at(mid);

    let mut out = Vec::with_capacity(calls.len());
    out.extend(dispatch_half_once(client, left, block).await);
    out.extend(dispatch_half_once(client, right, block).await);
    out
}

async fn dispatch_half_once(client: &dyn EvmClient, half: &[EncodedCall], block: u64) -> Vec<CallResult> {
    match aggregate3_once(client, half, block).await {
        Ok(results) => results,
        Err(_) => half
            .iter()
            .map(|_| CallResult::reverted(block, Some(TRANSPORT_REVERT_REASON.to_string())))
            .collect(),
    }
}

/// A single, unretried `aggregate3` round trip: encode, call, decode.
async fn aggregate3_once(
    client: &dyn EvmClient,
    calls: &[EncodedCall],
    block: u64,
) -> Result<Vec<CallResult>, ScanError> {
    let batch: Vec<IMulticall3::Call3> = calls
        .iter()
        .map(|c| IMulticall3::Call3 {
            target: c.target.into_inner(),
            allowFailure: true,
            callData: c.calldata(),
        })
        .collect();

    let calldata = IMulticall3::aggregate3Call { calls: batch }.abi_encode();
    let raw = client.call(MULTICALL3_ADDRESS, Bytes::from(calldata), block).await?;

    let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&raw, false)
        .map_err(|e| ScanError::Decode { label: "aggregate3".to_string(), reason: e.to_string() })?;

    if decoded.returnData.len() != calls.len() {
        return Err(ScanError::Decode {
            label: "aggregate3".to_string(),
            reason: format!("expected {} results, got {}", calls.len(), decoded.returnData.len()),
        });
    }

    Ok(decoded
        .returnData
        .into_iter()
        .map(|r| {
            if r.success {
                CallResult::ok(r.returnData, block)
            } else {
                CallResult::reverted(block, decode_error_string(&r.returnData))
            }
        })
        .collect())
}

/// Backend (b) from §4.2: issued when no Multicall3 deployment answers at `block`. Each
/// call is retried independently with the same backoff policy; there's nothing to bisect
/// since a fallback call is already a batch of one.
async fn dispatch_single_with_retry(client: &dyn EvmClient, call: &EncodedCall, block: u64) -> CallResult {
    let mut attempt = 0u32;
    loop {
        match client.call(call.target.into_inner(), call.calldata(), block).await {
            Ok(data) => return CallResult::ok(data, block),
            Err(_) => {
                attempt += 1;
                if attempt >= RETRY_ATTEMPTS {
                    return CallResult::reverted(block, Some(TRANSPORT_REVERT_REASON.to_string()));
                }
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    let ms = BACKOFF_BASE_MS.saturating_mul(factor).min(BACKOFF_CAP_MS);
    Duration::from_millis(ms)
}

/// Decodes a standard `Error(string)` revert payload, or `None` for reason-less reverts
/// (no data, a custom error, or a `Panic(uint256)`).
fn decode_error_string(data: &Bytes) -> Option<String> {
    if !data.starts_with(&ERROR_STRING_SELECTOR) {
        return None;
    }
    let payload = &data[4..];
    if payload.len() < 64 {
        return None;
    }
    let len_u256 = U256::try_from_be_slice(&payload[32..64])?;
    if len_u256 > U256::from(u32::MAX) {
        return None;
    }
    let len = len_u256.to::<usize>();
    let start = 64usize;
    let end = start.checked_add(len)?;
    let bytes = payload.get(start..end)?;
    std::str::from_utf8(bytes).ok().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::{EventSource, Log, LogFilter};
    use alloy_primitives::Address as AlloyAddress;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vaultscan_primitives::Address;

    fn spec_call(n: u8) -> EncodedCall {
        let target = Address::from(AlloyAddress::repeat_byte(n));
        EncodedCall::build_raw(target, [0u8; 4], Bytes::new(), "probe")
    }

    #[test]
    fn batches_of_over_one_hundred_calls_split_at_the_soft_budget() {
        let calls: Vec<EncodedCall> = (0..250u16).map(|i| spec_call((i % 255) as u8)).collect();
        let chunk_sizes: Vec<usize> = calls.chunks(MAX_BATCH).map(|c| c.len()).collect();
        assert_eq!(chunk_sizes, vec![100, 100, 50]);
    }

    /// S6: a 100-call batch whose `aggregate3` transport fails every attempt is bisected
    /// into two 50-call halves; the half the fake keeps rejecting comes back marked
    /// `TRANSPORT`, the other half dispatches cleanly on its single retry.
    struct FlakyChain {
        full_batch_attempts: Mutex<u32>,
    }

    #[async_trait]
    impl EvmClient for FlakyChain {
        fn chain_id(&self) -> u32 {
            1
        }

        async fn call(&self, _target: AlloyAddress, data: Bytes, _block: u64) -> Result<Bytes, ScanError> {
            let decoded = IMulticall3::aggregate3Call::abi_decode(&data, false)
                .map_err(|e| ScanError::Decode { label: "aggregate3".to_string(), reason: e.to_string() })?;

            if decoded.calls.len() == 100 {
                *self.full_batch_attempts.lock().unwrap() += 1;
                return Err(ScanError::transport("full batch never answers"));
            }

            // The lower half (targets 0..50) always answers; the upper half never does.
            if decoded.calls[0].target == AlloyAddress::repeat_byte(0) {
                let results = decoded
                    .calls
                    .iter()
                    .map(|_| IMulticall3::Result { success: true, returnData: Bytes::new() })
                    .collect();
                Ok(Bytes::from(IMulticall3::aggregate3Call::abi_encode_returns(&IMulticall3::aggregate3Return {
                    returnData: results,
                })))
            } else {
                Err(ScanError::transport("upper half never answers"))
            }
        }

        async fn multicall_available(&self, _block: u64) -> Result<bool, ScanError> {
            Ok(true)
        }

        async fn get_block_timestamp(&self, _block: u64) -> Result<u64, ScanError> {
            Ok(0)
        }

        async fn latest_block(&self) -> Result<u64, ScanError> {
            Ok(0)
        }
    }

    #[async_trait]
    impl EventSource for FlakyChain {
        async fn get_logs(&self, _filter: &LogFilter, _from: u64, _to: u64) -> Result<Vec<Log>, ScanError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn a_batch_that_keeps_failing_bisects_and_marks_the_dead_half_transport() {
        let calls: Vec<EncodedCall> = (0..100u16).map(|i| spec_call(i as u8)).collect();
        let chain = FlakyChain { full_batch_attempts: Mutex::new(0) };

        let results = dispatch(&chain, &calls, 1).await.unwrap();

        assert_eq!(*chain.full_batch_attempts.lock().unwrap(), RETRY_ATTEMPTS);
        assert_eq!(results.len(), 100);
        for result in &results[..50] {
            assert!(result.success);
        }
        for result in &results[50..] {
            assert!(!result.success);
            assert_eq!(result.revert_reason.as_deref(), Some(TRANSPORT_REVERT_REASON));
        }
    }
}

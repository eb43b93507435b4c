//! # Test Utilities
//!
//! Fixture builders for traces and logs, and an in-memory RPC provider.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::arithmetic_side_effects)]
#![allow(dead_code)]

#[cfg(test)]
pub mod test_data {
    use crate::rpc::{Log, Receipt, Trace, TraceAction, TraceResult};

    pub const ALICE: &str = "0x742d35cc6634c0532925a3b844bc454e4438f44e";
    pub const BOB: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
    pub const CAROL: &str = "0xe6a7a1d47ff21b6321162aea7c6cb457d5476bca";
    pub const ZERO: &str = "0x0000000000000000000000000000000000000000";
    pub const TX_HASH: &str =
        "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";

    /// Left-pads an address into a 32-byte hex word without `0x`
    pub fn word(address: &str) -> String {
        format!("{:0>64}", address.trim_start_matches("0x"))
    }

    fn base_trace(block: u64, trace_type: &str, action: TraceAction) -> Trace {
        Trace {
            action,
            block_hash: None,
            block_number: block,
            error: None,
            result: Some(TraceResult::default()),
            subtraces: 0,
            trace_address: vec![],
            transaction_hash: Some(TX_HASH.to_string()),
            transaction_position: Some(0),
            trace_type: trace_type.to_string(),
        }
    }

    pub fn call_trace(block: u64, position: u64, from: &str, to: &str) -> Trace {
        Trace {
            transaction_position: Some(position),
            ..base_trace(
                block,
                "call",
                TraceAction {
                    call_type: Some("call".to_string()),
                    from: Some(from.to_string()),
                    to: Some(to.to_string()),
                    input: Some("0x".to_string()),
                    ..TraceAction::default()
                },
            )
        }
    }

    pub fn call_trace_with_input(block: u64, from: &str, to: &str, input: String) -> Trace {
        let mut trace = call_trace(block, 0, from, to);
        trace.action.input = Some(input);
        trace
    }

    pub fn reward_trace(block: u64, author: &str, reward_type: &str) -> Trace {
        Trace {
            result: None,
            transaction_hash: None,
            transaction_position: None,
            ..base_trace(
                block,
                "reward",
                TraceAction {
                    author: Some(author.to_string()),
                    reward_type: Some(reward_type.to_string()),
                    value: Some("0x4563918244f40000".to_string()),
                    ..TraceAction::default()
                },
            )
        }
    }

    pub fn suicide_trace(block: u64, address: &str, refund_address: &str) -> Trace {
        base_trace(
            block,
            "suicide",
            TraceAction {
                address: Some(address.to_string()),
                refund_address: Some(refund_address.to_string()),
                ..TraceAction::default()
            },
        )
    }

    pub fn create_trace(block: u64, from: &str, created: &str, init: String) -> Trace {
        Trace {
            result: Some(TraceResult {
                address: Some(created.to_string()),
                ..TraceResult::default()
            }),
            ..base_trace(
                block,
                "create",
                TraceAction {
                    from: Some(from.to_string()),
                    init: Some(init),
                    ..TraceAction::default()
                },
            )
        }
    }

    /// A top-level create that ran out of gas, so neither `to` nor the result address is known
    pub fn failed_create_trace(block: u64, from: &str) -> Trace {
        Trace {
            error: Some("out of gas".to_string()),
            result: None,
            ..base_trace(
                block,
                "create",
                TraceAction {
                    from: Some(from.to_string()),
                    init: Some("0x6080".to_string()),
                    ..TraceAction::default()
                },
            )
        }
    }

    pub fn log(emitter: &str, topics: Vec<String>, data: String, tx_index: u64) -> Log {
        Log {
            address: emitter.to_string(),
            topics,
            data,
            block_number: None,
            transaction_hash: Some(TX_HASH.to_string()),
            transaction_index: format!("0x{tx_index:x}"),
            log_index: Some("0x0".to_string()),
            removed: false,
        }
    }

    pub fn receipt(contract_address: Option<&str>) -> Receipt {
        Receipt {
            transaction_hash: Some(TX_HASH.to_string()),
            transaction_index: Some("0x0".to_string()),
            contract_address: contract_address.map(str::to_string),
            status: Some("0x0".to_string()),
        }
    }
}

#[cfg(test)]
pub mod mock_rpc {
    use std::{
        collections::{HashMap, HashSet, VecDeque},
        sync::atomic::{AtomicUsize, Ordering},
    };

    use tokio::sync::Mutex;

    use crate::{
        errors::{IndexError, Result},
        rpc::{Log, Receipt, RpcProvider, Trace},
        types::{BlockNumber, TransactionHash},
    };

    #[derive(Default, Clone)]
    pub struct MockBlock {
        pub traces: Vec<Trace>,
        pub logs: Vec<Log>,
        pub timestamp: u64,
    }

    /// In-memory RPC provider. Heads are served from a queue, everything else by key.
    #[derive(Default)]
    pub struct MockRpcProvider {
        pub latest_block_numbers: Mutex<VecDeque<BlockNumber>>,
        pub blocks: HashMap<u64, MockBlock>,
        pub receipts: HashMap<String, Receipt>,
        pub failing_blocks: HashSet<u64>,
        pub receipt_calls: AtomicUsize,
        pub trace_calls: AtomicUsize,
    }

    impl MockRpcProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_head(mut self, head: u64) -> Self {
            self.latest_block_numbers
                .get_mut()
                .push_back(BlockNumber::from_trusted(head));
            self
        }

        pub fn with_block(mut self, block: u64, traces: Vec<Trace>, logs: Vec<Log>) -> Self {
            self.blocks.insert(
                block,
                MockBlock {
                    traces,
                    logs,
                    timestamp: 1_438_269_973 + block * 12,
                },
            );
            self
        }

        pub fn with_receipt(mut self, tx_hash: &str, receipt: Receipt) -> Self {
            self.receipts.insert(tx_hash.to_string(), receipt);
            self
        }

        pub fn failing_on(mut self, block: u64) -> Self {
            self.failing_blocks.insert(block);
            self
        }

        fn block(&self, block: BlockNumber) -> Result<&MockBlock> {
            if self.failing_blocks.contains(&block.value()) {
                return Err(IndexError::rpc_connection(format!(
                    "connection reset while fetching block {block}"
                )));
            }
            self.blocks
                .get(&block.value())
                .ok_or_else(|| IndexError::block_not_found(block.to_string()))
        }
    }

    impl RpcProvider for MockRpcProvider {
        async fn get_latest_block_number(&self) -> Result<BlockNumber> {
            self.latest_block_numbers
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| IndexError::block_not_found("latest"))
        }

        async fn trace_block(&self, block: BlockNumber) -> Result<Vec<Trace>> {
            self.trace_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.block(block)?.traces.clone())
        }

        async fn get_logs(&self, block: BlockNumber) -> Result<Vec<Log>> {
            Ok(self.block(block)?.logs.clone())
        }

        async fn get_transaction_receipt(&self, tx_hash: &TransactionHash) -> Result<Receipt> {
            self.receipt_calls.fetch_add(1, Ordering::SeqCst);
            self.receipts
                .get(tx_hash.value())
                .cloned()
                .ok_or_else(|| IndexError::transaction_not_found(tx_hash.value()))
        }

        async fn get_block_timestamp(&self, block: BlockNumber) -> Result<u64> {
            Ok(self.block(block)?.timestamp)
        }
    }
}

#[cfg(test)]
pub mod assertions {
    use crate::types::AppearanceRecord;

    /// Asserts that records are strictly ascending
    pub fn assert_records_ascending(records: &[AppearanceRecord]) {
        for window in records.windows(2) {
            assert!(
                window[0] < window[1],
                "Records not in ascending order: {} >= {}",
                window[0],
                window[1]
            );
        }
    }
}

#[cfg(test)]
pub mod test_scenarios {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Creates a termination signal for testing
    pub fn create_immediate_termination() -> Arc<AtomicBool> {
        let signal = Arc::new(AtomicBool::new(false));
        signal.store(true, Ordering::Relaxed);
        signal
    }

    /// Creates a termination signal that won't terminate
    pub fn create_no_termination() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }
}

//! # Address Extraction
//!
//! Turns one block's traces and logs into the set of [`AppearanceRecord`]s for that
//! block. Participants named by a trace are taken directly; everything else comes from
//! scanning call data, return data, log topics and log data in 32-byte words and asking
//! the [`AddressPolicy`] whether a word looks like a padded address.
//!
//! The emitting contract of a log is not recorded from the log itself. It is normally
//! found through the traces of the same block.

use std::collections::BTreeSet;

use tracing::warn;

use crate::{
    errors::{IndexError, Result},
    rpc::{Log, RewardType, RpcProvider, Trace, TraceEntry},
    types::{Address, AppearanceRecord, BlockNumber, TransactionHash, TxIndex},
    utils::hex_words,
};

pub mod policy;

pub use policy::{AddressPolicy, ChainAgnosticPolicy};

/// Characters to skip in call data: `0x` plus the 4-byte selector
const CALL_DATA_SKIP: usize = 10;

/// Characters to skip in return data and log data: `0x`
const HEX_PREFIX_SKIP: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct AddressExtractor<P = ChainAgnosticPolicy> {
    policy: P,
}

impl<P: AddressPolicy> AddressExtractor<P> {
    pub const fn new(policy: P) -> Self {
        Self { policy }
    }

    pub const fn policy(&self) -> &P {
        &self.policy
    }

    /// Extracts every appearance in `block`. The receipt lookup for failed contract
    /// creations is the only call made against `rpc`.
    pub async fn extract<R>(
        &self,
        rpc: &R,
        block: BlockNumber,
        traces: &[Trace],
        logs: &[Log],
    ) -> Result<BTreeSet<AppearanceRecord>>
    where
        R: RpcProvider + Sync,
    {
        let mut records = BTreeSet::new();
        for trace in traces {
            self.extract_from_trace(rpc, block, trace, &mut records)
                .await?;
        }
        self.extract_from_logs(block, logs, &mut records)?;
        Ok(records)
    }

    async fn extract_from_trace<R>(
        &self,
        rpc: &R,
        block: BlockNumber,
        trace: &Trace,
        records: &mut BTreeSet<AppearanceRecord>,
    ) -> Result<()>
    where
        R: RpcProvider + Sync,
    {
        let entry = trace.entry()?;

        if let TraceEntry::Reward {
            author,
            reward_type,
            raw_reward_type,
        } = entry
        {
            self.extract_reward(block, author, reward_type, raw_reward_type, records);
            return Ok(());
        }

        let position = trace.transaction_position.ok_or_else(|| {
            IndexError::block_validation(
                block.value(),
                format!("{} trace without transactionPosition", trace.trace_type),
            )
        })?;
        let index = TxIndex::transaction(position)?;
        let mut sink = Sink {
            policy: &self.policy,
            block,
            index,
            records,
        };

        match entry {
            TraceEntry::Call { from, to } => {
                sink.add(from);
                sink.add(to);
            }
            TraceEntry::Suicide {
                address,
                refund_address,
            } => {
                sink.add(address);
                sink.add(refund_address);
            }
            TraceEntry::Create {
                from,
                to,
                created,
                init,
            } => {
                sink.add(from);
                sink.add(created);

                if trace.is_top_level() {
                    if let Some(init) = init {
                        sink.scan(init, CALL_DATA_SKIP);
                    }
                }

                let failed = is_blank(to)
                    && is_blank(created)
                    && trace.error.as_deref().is_some_and(|e| !e.is_empty());
                if failed {
                    let hash = trace.transaction_hash.clone().ok_or_else(|| {
                        IndexError::block_validation(
                            block.value(),
                            "failed creation without transactionHash",
                        )
                    })?;
                    let receipt = rpc
                        .get_transaction_receipt(&TransactionHash::new(hash)?)
                        .await?;
                    sink.add(receipt.contract_address.as_deref());
                }
            }
            TraceEntry::Reward { .. } => {}
        }

        if let Some(input) = trace.action.input.as_deref() {
            sink.scan(input, CALL_DATA_SKIP);
        }
        if let Some(output) = trace.output() {
            sink.scan(output, HEX_PREFIX_SKIP);
        }
        Ok(())
    }

    fn extract_reward(
        &self,
        block: BlockNumber,
        author: Option<&str>,
        reward_type: Option<RewardType>,
        raw_reward_type: Option<&str>,
        records: &mut BTreeSet<AppearanceRecord>,
    ) {
        let index = match reward_type {
            Some(RewardType::Block) => TxIndex::BLOCK_REWARD,
            Some(RewardType::Uncle) => TxIndex::UNCLE_REWARD,
            Some(RewardType::External) => TxIndex::EXTERNAL_REWARD,
            None => {
                warn!(
                    "[extract] Unknown reward type {:?} in block {}, skipping",
                    raw_reward_type, block
                );
                return;
            }
        };

        let burned = matches!(reward_type, Some(RewardType::Block | RewardType::Uncle))
            && author.is_some_and(|a| Address::new(a).is_ok_and(|a| a.is_zero()));
        if burned {
            records.insert(AppearanceRecord::new(Address::burn(), block, index));
            return;
        }

        Sink {
            policy: &self.policy,
            block,
            index,
            records,
        }
        .add(author);
    }

    /// Scans topics and data of every log. The transaction index of each log anchors
    /// what is found in it.
    pub fn extract_from_logs(
        &self,
        block: BlockNumber,
        logs: &[Log],
        records: &mut BTreeSet<AppearanceRecord>,
    ) -> Result<()> {
        for log in logs {
            let mut sink = Sink {
                policy: &self.policy,
                block,
                index: log.tx_index()?,
                records: &mut *records,
            };
            for topic in &log.topics {
                sink.scan(topic, HEX_PREFIX_SKIP);
            }
            sink.scan(&log.data, HEX_PREFIX_SKIP);
        }
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, str::is_empty)
}

/// Collects addresses for one (block, index) position, filtered through the policy
struct Sink<'a, P> {
    policy: &'a P,
    block: BlockNumber,
    index: TxIndex,
    records: &'a mut BTreeSet<AppearanceRecord>,
}

impl<P: AddressPolicy> Sink<'_, P> {
    fn add(&mut self, address: Option<&str>) {
        let Some(address) = address else {
            return;
        };
        let lowered = address.to_ascii_lowercase();
        if self.policy.is_good_address(&lowered) {
            self.records.insert(AppearanceRecord::new(
                Address::from_trusted(lowered),
                self.block,
                self.index,
            ));
        }
    }

    fn scan(&mut self, data: &str, skip: usize) {
        for word in hex_words(data, skip) {
            let word = word.to_ascii_lowercase();
            if self.policy.is_potential_address(&word) {
                self.add(Some(&format!("0x{}", &word[24..])));
            }
        }
    }
}

//! # Per-block Appearance Listing
//!
//! Lists the appearances of a set of blocks without touching the index folder. Blocks
//! are processed concurrently; a failing block is logged and skipped while the others
//! continue, and every task shares the caller's cancellation flag.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures::future::join_all;
use tokio::{sync::Semaphore, task};
use tracing::{debug, info, warn};

use crate::{
    errors::{IndexError, Result},
    extract::{AddressExtractor, AddressPolicy, ChainAgnosticPolicy},
    rpc::RpcProvider,
    types::{AppearanceRecord, BlockNumber},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqOptions {
    pub max_concurrent_requests: usize,
    /// Report only the first failure
    pub test_mode: bool,
}

impl Default for UniqOptions {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            test_mode: false,
        }
    }
}

#[derive(Debug)]
pub struct BlockFailure {
    pub block_number: BlockNumber,
    pub error: IndexError,
}

#[derive(Debug, Default)]
pub struct UniqReport {
    /// Ordered by block, then transaction index, then address
    pub appearances: Vec<AppearanceRecord>,
    pub failures: Vec<BlockFailure>,
    pub blocks_listed: usize,
}

pub struct UniqLister<R, P = ChainAgnosticPolicy> {
    rpc: Arc<R>,
    extractor: Arc<AddressExtractor<P>>,
    options: UniqOptions,
    should_terminate: Arc<AtomicBool>,
}

impl<R> UniqLister<R>
where
    R: RpcProvider + Send + Sync + 'static,
{
    pub fn new(rpc: Arc<R>, options: UniqOptions, should_terminate: Arc<AtomicBool>) -> Self {
        Self {
            rpc,
            extractor: Arc::new(AddressExtractor::default()),
            options,
            should_terminate,
        }
    }
}

impl<R, P> UniqLister<R, P>
where
    R: RpcProvider + Send + Sync + 'static,
    P: AddressPolicy + 'static,
{
    pub fn with_policy<Q: AddressPolicy>(self, policy: Q) -> UniqLister<R, Q> {
        UniqLister {
            rpc: self.rpc,
            extractor: Arc::new(AddressExtractor::new(policy)),
            options: self.options,
            should_terminate: self.should_terminate,
        }
    }

    /// Lists the appearances of every block in `blocks`. Failed blocks are dropped from
    /// the listing and returned in [`UniqReport::failures`].
    pub async fn list(&self, blocks: &[BlockNumber]) -> Result<UniqReport> {
        if blocks.is_empty() {
            return Err(IndexError::configuration(
                "blocks",
                "no blocks found for the query",
            ));
        }
        if self.options.max_concurrent_requests == 0 {
            return Err(IndexError::configuration(
                "max_concurrent_requests",
                "Max concurrent requests must be greater than 0",
            ));
        }

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_requests));
        let tasks = self.create_block_tasks(blocks, &semaphore);
        let responses = join_all(tasks).await;

        if self.should_terminate.load(Ordering::Relaxed) {
            info!("[uniq] Termination requested. Listing stopped.");
            return Err(IndexError::cancelled("termination requested during uniq"));
        }

        let report = self.process_responses(blocks, responses);
        info!(
            "[uniq] Listed {} appearances in {} of {} blocks",
            report.appearances.len(),
            report.blocks_listed,
            blocks.len()
        );
        Ok(report)
    }

    fn create_block_tasks(
        &self,
        blocks: &[BlockNumber],
        semaphore: &Arc<Semaphore>,
    ) -> Vec<task::JoinHandle<Option<Result<Vec<AppearanceRecord>>>>> {
        blocks
            .iter()
            .map(|&block| {
                let rpc = self.rpc.clone();
                let extractor = self.extractor.clone();
                let permit = semaphore.clone();
                let should_terminate = self.should_terminate.clone();

                task::spawn(async move {
                    let Ok(_permit) = permit.acquire().await else {
                        return Some(Err(IndexError::internal("Semaphore closed")));
                    };
                    if should_terminate.load(Ordering::Relaxed) {
                        return None;
                    }
                    Some(list_block(&*rpc, &extractor, block).await)
                })
            })
            .collect()
    }

    fn process_responses(
        &self,
        blocks: &[BlockNumber],
        responses: Vec<std::result::Result<Option<Result<Vec<AppearanceRecord>>>, task::JoinError>>,
    ) -> UniqReport {
        let mut report = UniqReport::default();

        for (&block, response) in blocks.iter().zip(responses) {
            let error = match response {
                Ok(Some(Ok(records))) => {
                    report.blocks_listed += 1;
                    report.appearances.extend(records);
                    continue;
                }
                Ok(None) => continue,
                Ok(Some(Err(e))) => e,
                Err(e) => IndexError::internal(format!("block task failed: {e}")),
            };

            warn!("[uniq] Error listing block {}: {}", block, error);
            if self.options.test_mode && !report.failures.is_empty() {
                debug!("[uniq] Suppressing further errors in test mode");
                continue;
            }
            report.failures.push(BlockFailure {
                block_number: block,
                error,
            });
        }

        report.appearances.sort_by(|a, b| {
            (a.block_number, a.tx_index, &a.address).cmp(&(b.block_number, b.tx_index, &b.address))
        });
        report.appearances.dedup();
        report
    }
}

async fn list_block<R, P>(
    rpc: &R,
    extractor: &AddressExtractor<P>,
    block: BlockNumber,
) -> Result<Vec<AppearanceRecord>>
where
    R: RpcProvider + Sync,
    P: AddressPolicy,
{
    let traces = rpc.trace_block(block).await?;
    let logs = rpc.get_logs(block).await?;
    let records = extractor.extract(rpc, block, &traces, &logs).await?;
    Ok(records.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        mock_rpc::MockRpcProvider,
        test_data::{call_trace, reward_trace, ALICE, BOB, CAROL},
        test_scenarios::{create_immediate_termination, create_no_termination},
    };

    fn blocks(numbers: &[u64]) -> Vec<BlockNumber> {
        numbers.iter().map(|&n| BlockNumber::from_trusted(n)).collect()
    }

    fn lister(rpc: MockRpcProvider, test_mode: bool) -> UniqLister<MockRpcProvider> {
        let options = UniqOptions {
            max_concurrent_requests: 2,
            test_mode,
        };
        UniqLister::new(Arc::new(rpc), options, create_no_termination())
    }

    #[tokio::test]
    async fn test_listing_is_ordered_by_block_then_position() {
        let rpc = MockRpcProvider::new()
            .with_block(11, vec![call_trace(11, 0, CAROL, ALICE)], vec![])
            .with_block(
                10,
                vec![call_trace(10, 1, BOB, CAROL), call_trace(10, 0, CAROL, ALICE)],
                vec![],
            );

        let report = lister(rpc, false).list(&blocks(&[11, 10])).await.unwrap();

        let listed: Vec<(u64, u32, &str)> = report
            .appearances
            .iter()
            .map(|r| (r.block_number.value(), r.tx_index.value(), r.address.value()))
            .collect();
        assert_eq!(
            listed,
            vec![
                (10, 0, ALICE),
                (10, 0, CAROL),
                (10, 1, BOB),
                (10, 1, CAROL),
                (11, 0, ALICE),
                (11, 0, CAROL),
            ]
        );
        assert_eq!(report.blocks_listed, 2);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_failing_block_does_not_stop_the_others() {
        let rpc = MockRpcProvider::new()
            .with_block(1, vec![reward_trace(1, ALICE, "block")], vec![])
            .with_block(3, vec![reward_trace(3, BOB, "block")], vec![])
            .failing_on(2);

        let report = lister(rpc, false).list(&blocks(&[1, 2, 3])).await.unwrap();

        assert_eq!(report.blocks_listed, 2);
        assert_eq!(report.appearances.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].block_number.value(), 2);
        assert!(report.failures[0].error.is_transport());
    }

    #[tokio::test]
    async fn test_test_mode_reports_only_the_first_error() {
        let rpc = MockRpcProvider::new()
            .with_block(1, vec![reward_trace(1, ALICE, "block")], vec![])
            .failing_on(2)
            .failing_on(3)
            .failing_on(4);

        let report = lister(rpc, true).list(&blocks(&[1, 2, 3, 4])).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].block_number.value(), 2);

        let rpc = MockRpcProvider::new().failing_on(2).failing_on(3);
        let report = lister(rpc, false).list(&blocks(&[2, 3])).await.unwrap();
        assert_eq!(report.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_termination_skips_every_block() {
        let rpc = Arc::new(
            MockRpcProvider::new().with_block(1, vec![reward_trace(1, ALICE, "block")], vec![]),
        );
        let lister = UniqLister::new(
            rpc.clone(),
            UniqOptions::default(),
            create_immediate_termination(),
        );

        let err = lister.list(&blocks(&[1])).await.unwrap_err();
        assert!(matches!(err, IndexError::Cancelled { .. }));
        assert_eq!(rpc.trace_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let err = lister(MockRpcProvider::new(), false).list(&[]).await.unwrap_err();
        assert!(matches!(err, IndexError::ConfigurationError { .. }));
    }
}

//! # Blaze Scraper
//!
//! Scrapes a block range into per-block appearance files. Three stages run
//! concurrently and talk through bounded channels:
//!
//! - **block workers** pull block numbers, fetch traces, logs and the block timestamp;
//! - **address workers** run the [`AddressExtractor`] and write one appearance file per
//!   block into `ripe/` or `unripe/`;
//! - **timestamp collector** appends every timestamp to `ts.txt`.
//!
//! A full channel blocks its producer. The first worker error raises the run's abort
//! flag: siblings finish what they hold and stop pulling, and the error is returned
//! once every stage has been joined. Files already written stay valid.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use tokio::{
    sync::{
        mpsc::{self, Receiver, Sender},
        Mutex,
    },
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    errors::{IndexError, Result},
    extract::{AddressExtractor, AddressPolicy, ChainAgnosticPolicy},
    index::paths::IndexPaths,
    notify::{
        Notification, NotificationMessage, NotificationMeta, Notifier, NotifyError, StagePayload,
    },
    rpc::{Log, RpcProvider, Trace},
    types::{BlockNumber, BlockRange, Partition, Timestamp},
};

pub mod partition;
pub mod timestamps;
pub mod writer;

pub use partition::{partition, promote_ripened};
pub use timestamps::{read_timestamps, TimestampCollector};
pub use writer::{read_appearance_file, write_appearance_file};

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub block_workers: usize,
    pub address_workers: usize,
    pub unripe_distance: u64,
    pub queue_depth: usize,
}

impl ScrapeConfig {
    #[must_use]
    pub const fn builder() -> ScrapeConfigBuilder {
        ScrapeConfigBuilder::new()
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            block_workers: 20,
            address_workers: 20,
            unripe_distance: 28,
            queue_depth: 100,
        }
    }
}

pub struct ScrapeConfigBuilder {
    block_workers: usize,
    address_workers: usize,
    unripe_distance: u64,
    queue_depth: usize,
}

impl ScrapeConfigBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            block_workers: 20,
            address_workers: 20,
            unripe_distance: 28,
            queue_depth: 100,
        }
    }

    #[must_use]
    pub const fn testing() -> Self {
        Self::new()
            .block_workers(2)
            .address_workers(2)
            .unripe_distance(2)
            .queue_depth(4)
    }

    #[must_use]
    pub const fn block_workers(mut self, block_workers: usize) -> Self {
        self.block_workers = block_workers;
        self
    }

    #[must_use]
    pub const fn address_workers(mut self, address_workers: usize) -> Self {
        self.address_workers = address_workers;
        self
    }

    #[must_use]
    pub const fn unripe_distance(mut self, unripe_distance: u64) -> Self {
        self.unripe_distance = unripe_distance;
        self
    }

    #[must_use]
    pub const fn queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    pub fn build(self) -> Result<ScrapeConfig> {
        if self.block_workers == 0 {
            return Err(IndexError::configuration(
                "block_workers",
                "Block workers must be greater than 0",
            ));
        }

        if self.address_workers == 0 {
            return Err(IndexError::configuration(
                "address_workers",
                "Address workers must be greater than 0",
            ));
        }

        if self.queue_depth == 0 {
            return Err(IndexError::configuration(
                "queue_depth",
                "Queue depth must be greater than 0",
            ));
        }

        Ok(ScrapeConfig {
            block_workers: self.block_workers,
            address_workers: self.address_workers,
            unripe_distance: self.unripe_distance,
            queue_depth: self.queue_depth,
        })
    }
}

impl Default for ScrapeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw data of one block, handed from a block worker to an address worker
#[derive(Debug, Clone)]
pub struct ScrapedBlockData {
    pub block_number: BlockNumber,
    pub traces: Vec<Trace>,
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub head: Option<BlockNumber>,
    pub promoted: Vec<BlockNumber>,
    pub ripe: Vec<BlockNumber>,
    pub unripe: Vec<BlockNumber>,
    /// Blocks without a single appearance; no file is written for them
    pub empty: Vec<BlockNumber>,
    pub timestamps: usize,
}

impl ScrapeSummary {
    #[must_use]
    pub fn blocks_scraped(&self) -> usize {
        self.ripe.len() + self.unripe.len() + self.empty.len()
    }
}

/// Outcome of one address worker item
enum Written {
    File(BlockNumber, Partition),
    Empty(BlockNumber),
}

pub struct BlazeScraper<R, P = ChainAgnosticPolicy> {
    config: ScrapeConfig,
    paths: IndexPaths,
    rpc: Arc<R>,
    extractor: Arc<AddressExtractor<P>>,
    notifier: Arc<Notifier>,
    chain: String,
    should_terminate: Arc<AtomicBool>,
}

impl<R> BlazeScraper<R, ChainAgnosticPolicy>
where
    R: RpcProvider + Send + Sync + 'static,
{
    pub fn new(
        config: ScrapeConfig,
        paths: IndexPaths,
        rpc: Arc<R>,
        should_terminate: Arc<AtomicBool>,
    ) -> Self {
        Self::with_policy(config, paths, rpc, ChainAgnosticPolicy, should_terminate)
    }
}

impl<R, P> BlazeScraper<R, P>
where
    R: RpcProvider + Send + Sync + 'static,
    P: AddressPolicy + 'static,
{
    pub fn with_policy(
        config: ScrapeConfig,
        paths: IndexPaths,
        rpc: Arc<R>,
        policy: P,
        should_terminate: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            paths,
            rpc,
            extractor: Arc::new(AddressExtractor::new(policy)),
            notifier: Arc::new(Notifier::disabled()),
            chain: String::new(),
            should_terminate,
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Notifier, chain: impl Into<String>) -> Self {
        self.notifier = Arc::new(notifier);
        self.chain = chain.into();
        self
    }

    #[must_use]
    pub const fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    /// Scrapes every block of `range`. Unripe files of earlier runs that ripened under
    /// the current head are promoted first.
    pub async fn scrape(&self, range: BlockRange) -> Result<ScrapeSummary> {
        let started = Instant::now();
        self.paths.ensure_dirs().await?;

        let head = self.rpc.get_latest_block_number().await?;
        info!(
            "[blaze] Scraping blocks {} to {} at head {} ({} block workers, {} address workers)",
            range.first,
            range.last,
            head,
            self.config.block_workers,
            self.config.address_workers
        );

        let promoted = promote_ripened(&self.paths, head, self.config.unripe_distance).await?;
        let collector = Arc::new(TimestampCollector::open(self.paths.timestamps_file()).await?);
        let abort = Arc::new(AtomicBool::new(false));

        let (block_tx, block_rx) = mpsc::channel::<BlockNumber>(self.config.queue_depth);
        let (data_tx, data_rx) = mpsc::channel::<ScrapedBlockData>(self.config.queue_depth);
        let (ts_tx, ts_rx) = mpsc::channel::<Timestamp>(self.config.queue_depth);

        let block_rx = Arc::new(Mutex::new(block_rx));
        let block_workers: Vec<JoinHandle<Result<()>>> = (0..self.config.block_workers)
            .map(|_| {
                tokio::spawn(Self::block_worker(
                    self.rpc.clone(),
                    block_rx.clone(),
                    data_tx.clone(),
                    ts_tx.clone(),
                    abort.clone(),
                    self.should_terminate.clone(),
                ))
            })
            .collect();
        drop(block_rx);
        drop(data_tx);
        drop(ts_tx);

        let data_rx = Arc::new(Mutex::new(data_rx));
        let address_workers: Vec<JoinHandle<Result<Vec<Written>>>> = (0..self
            .config
            .address_workers)
            .map(|_| {
                tokio::spawn(Self::address_worker(
                    self.rpc.clone(),
                    self.extractor.clone(),
                    self.paths.clone(),
                    head,
                    self.config.unripe_distance,
                    data_rx.clone(),
                    abort.clone(),
                ))
            })
            .collect();
        drop(data_rx);

        let ts_task = tokio::spawn(Self::collect_timestamps(collector.clone(), ts_rx));

        self.produce(range, block_tx, &abort).await;

        let mut first_error: Option<IndexError> = None;
        for handle in block_workers {
            Self::keep_first_error(&mut first_error, flatten(handle.await));
        }

        let mut summary = ScrapeSummary {
            head: Some(head),
            promoted,
            ..ScrapeSummary::default()
        };
        for handle in address_workers {
            match flatten(handle.await) {
                Ok(written) => {
                    for item in written {
                        match item {
                            Written::File(block, Partition::Ripe) => summary.ripe.push(block),
                            Written::File(block, Partition::Unripe) => summary.unripe.push(block),
                            Written::Empty(block) => summary.empty.push(block),
                        }
                    }
                }
                Err(e) => Self::keep_first_error(&mut first_error, Err(e)),
            }
        }

        match flatten(ts_task.await) {
            Ok(count) => summary.timestamps = count,
            Err(e) => Self::keep_first_error(&mut first_error, Err(e)),
        }
        collector.flush().await?;

        summary.ripe.sort();
        summary.unripe.sort();
        summary.empty.sort();

        if let Some(e) = first_error {
            error!("[blaze] Scrape of {} aborted: {}", range, e);
            return Err(e);
        }
        if self.should_terminate.load(Ordering::Relaxed) {
            info!("[blaze] Termination requested, stopped after {} blocks", summary.blocks_scraped());
            return Err(IndexError::cancelled("termination requested"));
        }

        info!(
            "[blaze] Scraped {} blocks ({} ripe, {} unripe, {} empty) in {:?}",
            summary.blocks_scraped(),
            summary.ripe.len(),
            summary.unripe.len(),
            summary.empty.len(),
            started.elapsed()
        );

        self.notify_stage(range, head, &summary).await;
        Ok(summary)
    }

    async fn produce(&self, range: BlockRange, block_tx: Sender<BlockNumber>, abort: &AtomicBool) {
        for block in range.first.value()..=range.last.value() {
            if abort.load(Ordering::Relaxed) || self.should_terminate.load(Ordering::Relaxed) {
                debug!("[blaze] Producer stopped before block {}", block);
                break;
            }
            if block_tx
                .send(BlockNumber::from_trusted(block))
                .await
                .is_err()
            {
                break;
            }
        }
    }

    async fn block_worker(
        rpc: Arc<R>,
        blocks: Arc<Mutex<Receiver<BlockNumber>>>,
        data_tx: Sender<ScrapedBlockData>,
        ts_tx: Sender<Timestamp>,
        abort: Arc<AtomicBool>,
        should_terminate: Arc<AtomicBool>,
    ) -> Result<()> {
        loop {
            if abort.load(Ordering::Relaxed) || should_terminate.load(Ordering::Relaxed) {
                return Ok(());
            }
            let next = blocks.lock().await.recv().await;
            let Some(block) = next else {
                return Ok(());
            };

            let fetched = async {
                let traces = rpc.trace_block(block).await?;
                let logs = rpc.get_logs(block).await?;
                let unix_seconds = rpc.get_block_timestamp(block).await?;
                Ok::<_, IndexError>((traces, logs, unix_seconds))
            }
            .await;

            let (traces, logs, unix_seconds) = match fetched {
                Ok(fetched) => fetched,
                Err(e) => {
                    abort.store(true, Ordering::Relaxed);
                    warn!("[blaze] Error fetching block {}: {}", block, e);
                    return Err(e);
                }
            };

            let data = ScrapedBlockData {
                block_number: block,
                traces,
                logs,
            };
            if data_tx.send(data).await.is_err() {
                return Ok(());
            }
            let timestamp = Timestamp {
                block_number: block,
                unix_seconds,
            };
            if ts_tx.send(timestamp).await.is_err() {
                return Ok(());
            }
        }
    }

    async fn address_worker(
        rpc: Arc<R>,
        extractor: Arc<AddressExtractor<P>>,
        paths: IndexPaths,
        head: BlockNumber,
        unripe_distance: u64,
        data: Arc<Mutex<Receiver<ScrapedBlockData>>>,
        abort: Arc<AtomicBool>,
    ) -> Result<Vec<Written>> {
        let mut written = Vec::new();
        loop {
            if abort.load(Ordering::Relaxed) {
                return Ok(written);
            }
            let next = data.lock().await.recv().await;
            let Some(item) = next else {
                return Ok(written);
            };

            match Self::write_block(&*rpc, &extractor, &paths, head, unripe_distance, item).await {
                Ok(outcome) => written.push(outcome),
                Err(e) => {
                    abort.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }
    }

    async fn write_block(
        rpc: &R,
        extractor: &AddressExtractor<P>,
        paths: &IndexPaths,
        head: BlockNumber,
        unripe_distance: u64,
        item: ScrapedBlockData,
    ) -> Result<Written> {
        let block = item.block_number;
        let records = extractor
            .extract(rpc, block, &item.traces, &item.logs)
            .await
            .inspect_err(|e| warn!("[blaze] Error extracting block {}: {}", block, e))?;

        let target = partition(block, head, unripe_distance);
        let path = paths.appearance_file(target, block);
        if !write_appearance_file(&path, &records).await? {
            return Ok(Written::Empty(block));
        }

        let other = match target {
            Partition::Ripe => Partition::Unripe,
            Partition::Unripe => Partition::Ripe,
        };
        remove_if_exists(&paths.appearance_file(other, block)).await?;

        debug!(
            "[blaze] Wrote {} appearances of block {} to {}",
            records.len(),
            block,
            target
        );
        Ok(Written::File(block, target))
    }

    async fn collect_timestamps(
        collector: Arc<TimestampCollector>,
        mut timestamps: Receiver<Timestamp>,
    ) -> Result<usize> {
        let mut count = 0;
        while let Some(timestamp) = timestamps.recv().await {
            collector.append(timestamp).await?;
            count += 1;
        }
        Ok(count)
    }

    fn keep_first_error(first: &mut Option<IndexError>, result: Result<()>) {
        if let Err(e) = result {
            if first.is_none() {
                *first = Some(e);
            }
        }
    }

    async fn notify_stage(&self, range: BlockRange, head: BlockNumber, summary: &ScrapeSummary) {
        let notification = Notification {
            msg: NotificationMessage::StageUpdated,
            meta: NotificationMeta {
                chain: self.chain.clone(),
                head: head.value(),
                unripe_distance: self.config.unripe_distance,
            },
            payload: StagePayload {
                first_block: range.first.value(),
                last_block: range.last.value(),
                ripe_files: summary.ripe.len(),
                unripe_files: summary.unripe.len(),
            },
        };

        match self.notifier.notify(&notification).await {
            Ok(()) => {}
            Err(NotifyError::ConfiguredButNotRunning) => {
                info!("[notify] Listener is configured but not running");
            }
            Err(e) => warn!("[notify] Error notifying listener: {}", e),
        }
    }
}

fn flatten<T>(joined: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    joined.map_err(|e| IndexError::internal(format!("Worker task failed: {e}")))?
}

async fn remove_if_exists(path: &std::path::Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(IndexError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::{
        test_utils::{
            mock_rpc::MockRpcProvider,
            test_data::{call_trace, reward_trace, ALICE, BOB, CAROL},
            test_scenarios::{create_immediate_termination, create_no_termination},
        },
        types::Address,
    };

    fn range(first: u64, last: u64) -> BlockRange {
        BlockRange::new(
            BlockNumber::from_trusted(first),
            BlockNumber::from_trusted(last),
        )
        .unwrap()
    }

    fn mock_chain(head: u64, blocks: std::ops::RangeInclusive<u64>) -> MockRpcProvider {
        let mut rpc = MockRpcProvider::new().with_head(head);
        for block in blocks {
            rpc = rpc.with_block(
                block,
                vec![
                    call_trace(block, 0, ALICE, BOB),
                    reward_trace(block, CAROL, "block"),
                ],
                vec![],
            );
        }
        rpc
    }

    #[test]
    fn test_config_builder_validation() {
        assert!(ScrapeConfig::builder().block_workers(0).build().is_err());
        assert!(ScrapeConfig::builder().address_workers(0).build().is_err());
        assert!(ScrapeConfig::builder().queue_depth(0).build().is_err());
        let config = ScrapeConfigBuilder::testing().unripe_distance(0).build().unwrap();
        assert_eq!(config.unripe_distance, 0);
        assert_eq!(config.block_workers, 2);
    }

    #[tokio::test]
    async fn test_scrape_partitions_by_head() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let rpc = Arc::new(mock_chain(12, 1..=10));
        let config = ScrapeConfigBuilder::testing().unripe_distance(4).build().unwrap();

        let scraper = BlazeScraper::new(config, paths.clone(), rpc, create_no_termination());
        let summary = scraper.scrape(range(1, 10)).await.unwrap();

        let ripe: Vec<u64> = summary.ripe.iter().map(BlockNumber::value).collect();
        let unripe: Vec<u64> = summary.unripe.iter().map(BlockNumber::value).collect();
        assert_eq!(ripe, (1..=7).collect::<Vec<_>>());
        assert_eq!(unripe, vec![8, 9, 10]);
        assert_eq!(summary.timestamps, 10);

        let records = read_appearance_file(&paths.appearance_file(
            Partition::Ripe,
            BlockNumber::from_trusted(3),
        ))
        .await
        .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].address, Address::new(ALICE).unwrap());

        let timestamps = read_timestamps(&paths.timestamps_file()).await.unwrap();
        assert_eq!(timestamps.len(), 10);
    }

    #[tokio::test]
    async fn test_listener_receives_stage_update() {
        use axum::{http::StatusCode, routing::post, Json, Router};

        let seen = Arc::new(tokio::sync::Mutex::new(Vec::<serde_json::Value>::new()));
        let sink = seen.clone();
        let app = Router::new().route(
            "/",
            post(move |Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    sink.lock().await.push(body);
                    StatusCode::OK
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let config = ScrapeConfigBuilder::testing().unripe_distance(4).build().unwrap();
        BlazeScraper::new(
            config,
            IndexPaths::new(dir.path()),
            Arc::new(mock_chain(12, 1..=10)),
            create_no_termination(),
        )
        .with_notifier(Notifier::new(Some(url)), "gnosis")
        .scrape(range(1, 10))
        .await
        .unwrap();

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["msg"], "stageUpdated");
        assert_eq!(seen[0]["meta"]["chain"], "gnosis");
        assert_eq!(seen[0]["meta"]["head"], 12);
        assert_eq!(seen[0]["payload"]["ripeFiles"], 7);
        assert_eq!(seen[0]["payload"]["unripeFiles"], 3);
    }

    #[tokio::test]
    async fn test_empty_blocks_write_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let rpc = Arc::new(MockRpcProvider::new().with_head(100).with_block(5, vec![], vec![]));
        let config = ScrapeConfigBuilder::testing().build().unwrap();

        let summary = BlazeScraper::new(config, paths.clone(), rpc, create_no_termination())
            .scrape(range(5, 5))
            .await
            .unwrap();

        assert_eq!(summary.empty, vec![BlockNumber::from_trusted(5)]);
        assert!(!paths
            .appearance_file(Partition::Ripe, BlockNumber::from_trusted(5))
            .exists());
    }

    #[tokio::test]
    async fn test_fetch_error_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let rpc = Arc::new(mock_chain(1_000, 1..=200).failing_on(50));
        let config = ScrapeConfigBuilder::testing().build().unwrap();

        let err = BlazeScraper::new(config, paths, rpc.clone(), create_no_termination())
            .scrape(range(1, 200))
            .await
            .unwrap_err();

        assert!(err.is_transport(), "unexpected error: {err}");
        assert!(rpc.trace_calls.load(Ordering::SeqCst) < 200);
    }

    #[tokio::test]
    async fn test_termination_stops_before_any_block() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let rpc = Arc::new(mock_chain(100, 1..=10));
        let config = ScrapeConfigBuilder::testing().build().unwrap();

        let err = BlazeScraper::new(config, paths, rpc.clone(), create_immediate_termination())
            .scrape(range(1, 10))
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::Cancelled { .. }));
        assert_eq!(rpc.trace_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rescrape_after_head_advance_promotes() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let config = ScrapeConfigBuilder::testing().unripe_distance(4).build().unwrap();

        let first = mock_chain(10, 1..=10);
        BlazeScraper::new(config.clone(), paths.clone(), Arc::new(first), create_no_termination())
            .scrape(range(1, 10))
            .await
            .unwrap();

        let second = mock_chain(20, 11..=12);
        let summary = BlazeScraper::new(config, paths.clone(), Arc::new(second), create_no_termination())
            .scrape(range(11, 12))
            .await
            .unwrap();

        let promoted: Vec<u64> = summary.promoted.iter().map(BlockNumber::value).collect();
        assert_eq!(promoted, vec![6, 7, 8, 9, 10]);
        assert!(paths
            .list_appearance_files(Partition::Ripe)
            .await
            .unwrap()
            .iter()
            .any(|(b, _)| b.value() == 10));
    }
}

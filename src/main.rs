use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use appearance_index::{
    config::IndexConfig,
    index::{consolidate, AppearanceSearch, ConsolidateOptions, IndexWalker},
    pinning::{pin_manifest, PinManifestOptions},
    rpc::RpcProvider,
    scrape::{promote_ripened, BlazeScraper},
    types::{Address, BlockNumber, BlockRange},
    uniq::{UniqLister, UniqOptions},
};
use clap::{Parser, Subcommand};
use eyre::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape a block range into per-block appearance files
    Scrape {
        /// First block to scrape
        #[arg(short, long)]
        first: u64,

        /// Last block to scrape, defaults to the chain head
        #[arg(short, long)]
        last: Option<u64>,
    },
    /// Move unripe appearance files that are now far enough behind the head
    Promote,
    /// Consolidate ripe appearance files into chunks and bloom filters
    Consolidate {
        /// Appearances per chunk
        #[arg(short, long, default_value_t = 2_000_000)]
        appearances_per_chunk: usize,

        /// Also write the trailing chunk below the threshold
        #[arg(long)]
        allow_partial: bool,
    },
    /// Pin the timestamps and chunks and print the manifest
    Pin {
        /// Only pin chunks intersecting these ranges (`000000100-000000200`)
        #[arg(short, long)]
        range: Vec<BlockRange>,

        /// Also pin to the remote service
        #[arg(long)]
        remote: bool,

        /// Seconds to pause between chunks
        #[arg(long, default_value_t = 0)]
        sleep: u64,

        #[arg(long, env = "TEST_MODE")]
        test_mode: bool,
    },
    /// List the appearances of individual blocks without writing the index
    Uniq {
        #[arg(required = true, num_args = 1..)]
        blocks: Vec<u64>,

        /// Concurrent block requests
        #[arg(short, long, default_value_t = 10)]
        concurrency: usize,

        #[arg(long, env = "TEST_MODE")]
        test_mode: bool,
    },
    /// Find every appearance of an address in the consolidated index
    Search {
        address: String,

        #[arg(short, long)]
        range: Vec<BlockRange>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = IndexConfig::from_env().context("Failed to load configuration")?;
    let should_terminate = Arc::new(AtomicBool::new(false));

    setup_ctrlc_handler(Arc::clone(&should_terminate))?;

    info!("Starting appearance index for {}", config.chain);

    match cli.command {
        Command::Scrape { first, last } => scrape(&config, first, last, should_terminate).await,
        Command::Promote => promote(&config).await,
        Command::Consolidate {
            appearances_per_chunk,
            allow_partial,
        } => {
            let options = ConsolidateOptions {
                appearances_per_chunk,
                allow_partial,
            };
            let written = consolidate(&config.index_paths(), options).await?;
            info!("Wrote {} chunks", written.len());
            Ok(())
        }
        Command::Pin {
            range,
            remote,
            sleep,
            test_mode,
        } => pin(&config, &range, remote, sleep, test_mode).await,
        Command::Uniq {
            blocks,
            concurrency,
            test_mode,
        } => uniq(&config, &blocks, concurrency, test_mode, should_terminate).await,
        Command::Search { address, range } => search(&config, &address, &range).await,
    }
}

async fn scrape(
    config: &IndexConfig,
    first: u64,
    last: Option<u64>,
    should_terminate: Arc<AtomicBool>,
) -> Result<()> {
    let rpc = Arc::new(config.rpc_client());
    let last = match last {
        Some(last) => BlockNumber::new(last)?,
        None => rpc
            .get_latest_block_number()
            .await
            .context("Failed to fetch the chain head")?,
    };
    let range = BlockRange::new(BlockNumber::new(first)?, last)?;

    let scraper = BlazeScraper::new(
        config.scrape_config()?,
        config.index_paths(),
        rpc,
        should_terminate,
    )
    .with_notifier(config.notifier(), config.chain.clone());

    let summary = scraper.scrape(range).await?;
    info!(
        "Scraped {} blocks ({} ripe, {} unripe, {} empty)",
        summary.blocks_scraped(),
        summary.ripe.len(),
        summary.unripe.len(),
        summary.empty.len()
    );
    Ok(())
}

async fn promote(config: &IndexConfig) -> Result<()> {
    let head = config
        .rpc_client()
        .get_latest_block_number()
        .await
        .context("Failed to fetch the chain head")?;
    let promoted = promote_ripened(&config.index_paths(), head, config.unripe_distance).await?;
    info!("Promoted {} blocks at head {}", promoted.len(), head);
    Ok(())
}

async fn pin(
    config: &IndexConfig,
    ranges: &[BlockRange],
    remote: bool,
    sleep: u64,
    test_mode: bool,
) -> Result<()> {
    if remote && !config.has_remote_pinning() {
        bail!("--remote requires REMOTE_PIN_URL and REMOTE_PIN_JWT");
    }

    let options = PinManifestOptions {
        remote,
        sleep: Some(Duration::from_secs(sleep)),
        test_mode,
        ..PinManifestOptions::new(config.chain.clone())
    };
    let manifest = pin_manifest(
        &config.pinning_service(),
        &config.index_paths(),
        &options,
        ranges,
    )
    .await?;

    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

async fn uniq(
    config: &IndexConfig,
    blocks: &[u64],
    concurrency: usize,
    test_mode: bool,
    should_terminate: Arc<AtomicBool>,
) -> Result<()> {
    let blocks = blocks
        .iter()
        .map(|&b| BlockNumber::new(b))
        .collect::<appearance_index::Result<Vec<_>>>()?;
    let options = UniqOptions {
        max_concurrent_requests: concurrency,
        test_mode,
    };

    let report = UniqLister::new(Arc::new(config.rpc_client()), options, should_terminate)
        .list(&blocks)
        .await?;

    for record in &report.appearances {
        println!("{record}");
    }
    for failure in &report.failures {
        warn!("Block {} failed: {}", failure.block_number, failure.error);
    }
    Ok(())
}

async fn search(config: &IndexConfig, address: &str, ranges: &[BlockRange]) -> Result<()> {
    let address = Address::new(address)?;
    let walker = IndexWalker::new(config.index_paths(), false, 0);
    let mut visitor = AppearanceSearch::new(address);

    walker.walk_bloom_filters(&mut visitor, ranges).await?;

    for record in &visitor.found {
        println!("{record}");
    }
    info!(
        "{} appearances, {} bloom hits, {} false positives",
        visitor.found.len(),
        visitor.bloom_hits,
        visitor.false_positives
    );
    Ok(())
}

fn setup_ctrlc_handler(should_terminate: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C");
        info!("Waiting for current processes to finish...");
        should_terminate.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")
}

//! # Appearance Index
//!
//! Builds and publishes an index of address appearances for EVM chains. Every block is
//! traced, every address that touches it is recorded, and the records are consolidated
//! into immutable chunks with bloom filters that can be pinned to IPFS and shared.
//!
//! ## Architecture Overview
//!
//! ### Public API Modules
//! - [`scrape`] - Concurrent block scraper writing per-block appearance files
//! - [`extract`] - Address extraction from traces and logs
//! - [`index`] - Chunk consolidation, bloom filters and the index walker
//! - [`pinning`] - IPFS pinning and manifest assembly
//! - [`uniq`] - Per-block appearance listing without touching the index
//! - [`config`] - Runtime configuration and environment loading
//! - [`errors`] - Error types for every stage
//! - [`types`] - Type-safe domain models (`BlockNumber`, `Address`, etc.)
//!
//! ### Implementation Modules
//! - [`rpc`] - JSON-RPC client for traces, logs, receipts and headers
//! - [`notify`] - Optional progress webhook
//! - `utils` - Hex helpers
//!
//! ## Data Flow
//!
//! ```text
//! block numbers -> block workers -> address workers -> ripe/unripe files
//!                                                          |
//!               manifest <- pinning <- walker <- chunks + blooms
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::{atomic::AtomicBool, Arc};
//!
//! use appearance_index::{
//!     config::IndexConfigBuilder, scrape::BlazeScraper, types::BlockRange,
//! };
//!
//! # async fn example() -> eyre::Result<()> {
//! let config = IndexConfigBuilder::development()
//!     .node_conn_string("http://localhost:8545")
//!     .index_path("/var/lib/appearance-index")
//!     .build()?;
//!
//! let scraper = BlazeScraper::new(
//!     config.scrape_config()?,
//!     config.index_paths(),
//!     Arc::new(config.rpc_client()),
//!     Arc::new(AtomicBool::new(false)),
//! );
//! let summary = scraper.scrape("000000000-000001000".parse::<BlockRange>()?).await?;
//! println!("scraped {} blocks", summary.blocks_scraped());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod errors;
pub mod extract;
pub mod index;
pub mod notify;
pub mod pinning;
pub mod rpc;
pub mod scrape;
pub mod types;
pub mod uniq;
mod utils;

#[cfg(test)]
mod mocks;
#[cfg(test)]
mod test_utils;

pub use config::{IndexConfig, IndexConfigBuilder};
pub use errors::{IndexError, Result};
pub use types::{Address, AppearanceRecord, BlockNumber, BlockRange, TxIndex};

//! # Consolidated Index
//!
//! Layout of the index folder ([`paths`]), the binary chunk format and consolidation
//! ([`chunk`]), per-chunk bloom filters ([`bloom`]) and the read-only walker over them
//! ([`walker`]).

pub mod bloom;
pub mod chunk;
pub mod paths;
pub mod walker;

pub use bloom::BloomFilter;
pub use chunk::{consolidate, Chunk, ConsolidateOptions};
pub use paths::IndexPaths;
pub use walker::{AppearanceSearch, ChunkVisitor, IndexWalker};

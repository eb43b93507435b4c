//! Read-only traversal of the bloom filters of one chain's index.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    errors::{IndexError, Result},
    index::{bloom::BloomFilter, chunk::Chunk, paths::is_bloom_path, paths::IndexPaths},
    types::{Address, AppearanceRecord, BlockRange},
};

/// Called once per visited bloom filter. `first` is set on the first visit of a walk.
/// Returning `Ok(false)` ends the walk early.
#[async_trait]
pub trait ChunkVisitor: Send {
    async fn visit(&mut self, walker: &IndexWalker, path: &Path, first: bool) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct IndexWalker {
    paths: IndexPaths,
    test_mode: bool,
    max_items_in_test_mode: usize,
}

impl IndexWalker {
    #[must_use]
    pub const fn new(paths: IndexPaths, test_mode: bool, max_items_in_test_mode: usize) -> Self {
        Self {
            paths,
            test_mode,
            max_items_in_test_mode,
        }
    }

    #[must_use]
    pub const fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    #[must_use]
    pub const fn test_mode(&self) -> bool {
        self.test_mode
    }

    /// Visits, in ascending range order, every bloom filter whose range intersects one of
    /// `ranges`. An empty `ranges` visits everything. Returns the number of visits.
    pub async fn walk_bloom_filters<V>(&self, visitor: &mut V, ranges: &[BlockRange]) -> Result<usize>
    where
        V: ChunkVisitor + ?Sized,
    {
        let mut visited = 0;
        for (range, path) in self.paths.list_bloom_files().await? {
            if !ranges.is_empty() && !ranges.iter().any(|r| r.intersects(&range)) {
                continue;
            }
            if self.test_mode && visited >= self.max_items_in_test_mode {
                debug!("[walker] Test mode limit of {} reached", self.max_items_in_test_mode);
                break;
            }

            let first = visited == 0;
            visited += 1;
            if !visitor.visit(self, &path, first).await? {
                debug!("[walker] Visitor stopped the walk at {}", range);
                break;
            }
        }
        Ok(visited)
    }
}

/// Finds every appearance of one address, opening a chunk only when its bloom filter
/// reports a possible hit.
#[derive(Debug)]
pub struct AppearanceSearch {
    address: Address,
    pub found: Vec<AppearanceRecord>,
    pub bloom_hits: usize,
    pub false_positives: usize,
}

impl AppearanceSearch {
    #[must_use]
    pub const fn new(address: Address) -> Self {
        Self {
            address,
            found: Vec::new(),
            bloom_hits: 0,
            false_positives: 0,
        }
    }
}

#[async_trait]
impl ChunkVisitor for AppearanceSearch {
    async fn visit(&mut self, walker: &IndexWalker, path: &Path, _first: bool) -> Result<bool> {
        if !is_bloom_path(path) {
            return Err(IndexError::not_bloom_path(path));
        }
        let bloom = BloomFilter::read(path).await?;
        if !bloom.may_contain(&self.address) {
            return Ok(true);
        }
        self.bloom_hits += 1;

        let chunk = Chunk::read(&walker.paths().to_index_path(path)?).await?;
        let appearances = chunk.appearances_of(&self.address);
        if appearances.is_empty() {
            self.false_positives += 1;
        }
        self.found.extend(appearances.iter().map(|app| {
            AppearanceRecord::new(self.address.clone(), app.block_number, app.tx_index)
        }));
        if !walker.test_mode() {
            info!(
                "[walker] {} appearances of {} in {}",
                appearances.len(),
                self.address,
                chunk.range()
            );
        }
        Ok(true)
    }
}

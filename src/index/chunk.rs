//! # Chunks
//!
//! A chunk holds every appearance of a contiguous block range in a compact binary
//! form. Consolidation turns ripe per-block appearance files into chunks, writes a
//! bloom filter next to each chunk and only then removes the source files.
//!
//! Binary layout, little-endian:
//!
//! ```text
//! header       magic u32 | address count u32 | appearance count u32
//! addresses    address [u8; 20] | first appearance u32 | appearance count u32   (sorted)
//! appearances  block u32 | tx index u32                                         (sorted)
//! ```

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    errors::{IndexError, Result},
    index::{bloom::read_u32, bloom::BloomFilter, paths::IndexPaths},
    scrape::read_appearance_file,
    types::{Address, AppearanceRecord, BlockNumber, BlockRange, Partition, TxIndex},
};

pub const CHUNK_MAGIC: u32 = 0xdead_beef;
const HEADER_LEN: usize = 12;
const ADDRESS_ENTRY_LEN: usize = 28;
const APPEARANCE_ENTRY_LEN: usize = 8;

/// One appearance of a known address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Appearance {
    pub block_number: BlockNumber,
    pub tx_index: TxIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    range: BlockRange,
    appearances: BTreeMap<Address, Vec<Appearance>>,
}

impl Chunk {
    /// Groups `records` by address. Records outside `range` are rejected.
    pub fn from_records(
        range: BlockRange,
        records: impl IntoIterator<Item = AppearanceRecord>,
    ) -> Result<Self> {
        let mut appearances: BTreeMap<Address, Vec<Appearance>> = BTreeMap::new();
        for record in records {
            if !range.contains(record.block_number) {
                return Err(IndexError::block_validation(
                    record.block_number.value(),
                    format!("appearance outside of chunk range {range}"),
                ));
            }
            appearances
                .entry(record.address)
                .or_default()
                .push(Appearance {
                    block_number: record.block_number,
                    tx_index: record.tx_index,
                });
        }
        for list in appearances.values_mut() {
            list.sort();
            list.dedup();
        }
        Ok(Self { range, appearances })
    }

    #[must_use]
    pub const fn range(&self) -> BlockRange {
        self.range
    }

    #[must_use]
    pub fn address_count(&self) -> usize {
        self.appearances.len()
    }

    #[must_use]
    pub fn appearance_count(&self) -> usize {
        self.appearances.values().map(Vec::len).sum()
    }

    /// Appearances of `address`, ascending. Empty when the address is not in the chunk.
    #[must_use]
    pub fn appearances_of(&self, address: &Address) -> &[Appearance] {
        self.appearances.get(address).map_or(&[], Vec::as_slice)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.appearances.keys()
    }

    pub fn records(&self) -> impl Iterator<Item = AppearanceRecord> + '_ {
        self.appearances.iter().flat_map(|(address, list)| {
            list.iter().map(move |app| {
                AppearanceRecord::new(address.clone(), app.block_number, app.tx_index)
            })
        })
    }

    pub fn bloom(&self) -> Result<BloomFilter> {
        BloomFilter::from_addresses(self.addresses())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let n_apps = self.appearance_count();
        let mut out = Vec::with_capacity(
            HEADER_LEN + self.address_count() * ADDRESS_ENTRY_LEN + n_apps * APPEARANCE_ENTRY_LEN,
        );
        out.extend_from_slice(&CHUNK_MAGIC.to_le_bytes());
        out.extend_from_slice(&to_u32(self.address_count())?.to_le_bytes());
        out.extend_from_slice(&to_u32(n_apps)?.to_le_bytes());

        let mut offset = 0usize;
        for (address, list) in &self.appearances {
            out.extend_from_slice(&address.to_bytes()?);
            out.extend_from_slice(&to_u32(offset)?.to_le_bytes());
            out.extend_from_slice(&to_u32(list.len())?.to_le_bytes());
            offset += list.len();
        }
        for list in self.appearances.values() {
            for app in list {
                out.extend_from_slice(&to_u32(app.block_number.value() as usize)?.to_le_bytes());
                out.extend_from_slice(&app.tx_index.value().to_le_bytes());
            }
        }
        Ok(out)
    }

    pub fn from_bytes(path: &Path, range: BlockRange, bytes: &[u8]) -> Result<Self> {
        let corrupt = |reason: String| IndexError::corrupt_file(path, reason);
        let header = |at| read_u32(bytes, at).ok_or_else(|| corrupt("truncated header".into()));

        if header(0)? != CHUNK_MAGIC {
            return Err(corrupt("bad magic number".into()));
        }
        let n_addrs = header(4)? as usize;
        let n_apps = header(8)? as usize;
        let apps_start = HEADER_LEN + n_addrs * ADDRESS_ENTRY_LEN;
        let expected = apps_start + n_apps * APPEARANCE_ENTRY_LEN;
        if bytes.len() != expected {
            return Err(corrupt(format!(
                "expected {expected} bytes, found {}",
                bytes.len()
            )));
        }

        let mut appearances = BTreeMap::new();
        let mut next_offset = 0usize;
        for i in 0..n_addrs {
            let at = HEADER_LEN + i * ADDRESS_ENTRY_LEN;
            let mut raw = [0u8; 20];
            raw.copy_from_slice(&bytes[at..at + 20]);
            let offset = read_u32(bytes, at + 20).unwrap_or(0) as usize;
            let count = read_u32(bytes, at + 24).unwrap_or(0) as usize;
            if offset != next_offset || offset + count > n_apps {
                return Err(corrupt(format!("bad appearance offsets for entry {i}")));
            }
            next_offset += count;

            let list = (offset..offset + count)
                .map(|j| {
                    let at = apps_start + j * APPEARANCE_ENTRY_LEN;
                    let block = read_u32(bytes, at).unwrap_or(0);
                    let index = read_u32(bytes, at + 4).unwrap_or(0);
                    Appearance {
                        block_number: BlockNumber::from_trusted(u64::from(block)),
                        tx_index: TxIndex::from_raw(index),
                    }
                })
                .collect();
            appearances.insert(Address::from_bytes(&raw), list);
        }
        if next_offset != n_apps {
            return Err(corrupt("appearance table has unreferenced entries".into()));
        }

        Ok(Self { range, appearances })
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("bin.tmp");
        tokio::fs::write(&tmp, self.to_bytes()?)
            .await
            .map_err(|e| IndexError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| IndexError::io(path, e))
    }

    /// Reads a chunk; the range comes from the file name
    pub async fn read(path: &Path) -> Result<Self> {
        let range = crate::index::paths::range_from_path(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IndexError::io(path, e))?;
        Self::from_bytes(path, range, &bytes)
    }
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| IndexError::internal(format!("{value} does not fit a chunk field")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidateOptions {
    /// A chunk is cut once it holds at least this many appearances
    pub appearances_per_chunk: usize,
    /// Write the trailing group even when it is below the threshold
    pub allow_partial: bool,
}

impl Default for ConsolidateOptions {
    fn default() -> Self {
        Self {
            appearances_per_chunk: 2_000_000,
            allow_partial: false,
        }
    }
}

/// Consolidates ripe appearance files into chunks and blooms. Returns the ranges of the
/// chunks written by this call, ascending.
///
/// Chunks are immutable: a ripe file for a block that an existing chunk already covers
/// is removed with a warning. Every other file belongs to the gap below, between or
/// above the existing chunks, and each gap is cut on its own. A gap's first chunk starts
/// right after the chunk below it, or at the earliest ripe block when there is none.
/// Above the last chunk the trailing group waits for a full chunk unless
/// `allow_partial` is set. Below or between chunks the trailing group is always written
/// and ends right before the chunk above, so chunks never overlap and leave no gap.
pub async fn consolidate(
    paths: &IndexPaths,
    options: ConsolidateOptions,
) -> Result<Vec<BlockRange>> {
    if options.appearances_per_chunk == 0 {
        return Err(IndexError::configuration(
            "appearances_per_chunk",
            "Appearances per chunk must be greater than 0",
        ));
    }
    paths.ensure_dirs().await?;

    let chunks: Vec<BlockRange> = paths
        .list_bloom_files()
        .await?
        .into_iter()
        .map(|(range, _)| range)
        .collect();

    // keyed by the index of the first chunk above the files
    let mut gaps: BTreeMap<usize, Vec<(BlockNumber, PathBuf)>> = BTreeMap::new();
    for (block, path) in paths.list_appearance_files(Partition::Ripe).await? {
        let above = chunks.partition_point(|range| range.last < block);
        if let Some(covering) = chunks.get(above).filter(|range| range.contains(block)) {
            warn!(
                "[consolidate] Removing ripe file for block {} already covered by chunk {}: {}",
                block,
                covering,
                path.display()
            );
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| IndexError::io(&path, e))?;
            continue;
        }
        gaps.entry(above).or_default().push((block, path));
    }

    if gaps.is_empty() {
        debug!("[consolidate] Nothing to consolidate");
        return Ok(Vec::new());
    }

    let mut written = Vec::new();
    for (above, files) in gaps {
        let Some((first_block, _)) = files.first() else {
            continue;
        };
        let start = above
            .checked_sub(1)
            .and_then(|below| chunks.get(below))
            .map_or(*first_block, |below| below.last + 1);
        let end = chunks.get(above).map(|next| next.first - 1);
        written.extend(consolidate_gap(paths, options, start, end, files).await?);
    }
    Ok(written)
}

/// Cuts the files of one gap into chunks starting at `start`. `end` is set when a chunk
/// lies above the gap; the last chunk then always gets written and stretches to `end`.
async fn consolidate_gap(
    paths: &IndexPaths,
    options: ConsolidateOptions,
    mut start: BlockNumber,
    end: Option<BlockNumber>,
    files: Vec<(BlockNumber, PathBuf)>,
) -> Result<Vec<BlockRange>> {
    let mut written = Vec::new();
    let mut pending = Vec::new();
    let mut sources = Vec::new();
    let total_files = files.len();

    for (i, (block, path)) in files.into_iter().enumerate() {
        pending.extend(read_appearance_file(&path).await?);
        sources.push(path);

        let is_last = i + 1 == total_files;
        let full = pending.len() >= options.appearances_per_chunk;
        if full || (is_last && (options.allow_partial || end.is_some())) {
            let last = match end {
                Some(end) if is_last => end,
                _ => block,
            };
            let range = BlockRange::new(start, last)?;
            let chunk = Chunk::from_records(range, std::mem::take(&mut pending))?;
            write_chunk(paths, &chunk).await?;
            for source in sources.drain(..) {
                tokio::fs::remove_file(&source)
                    .await
                    .map_err(|e| IndexError::io(&source, e))?;
            }
            written.push(range);
            start = last + 1;
        }
    }

    if !pending.is_empty() {
        debug!(
            "[consolidate] {} appearances in {} files wait for a full chunk",
            pending.len(),
            sources.len()
        );
    }
    Ok(written)
}

async fn write_chunk(paths: &IndexPaths, chunk: &Chunk) -> Result<()> {
    let range = chunk.range();
    chunk.write(&paths.chunk_file(&range)).await?;
    chunk.bloom()?.write(&paths.bloom_file(&range)).await?;
    info!(
        "[consolidate] Wrote chunk {} ({} addresses, {} appearances)",
        range,
        chunk.address_count(),
        chunk.appearance_count()
    );
    Ok(())
}

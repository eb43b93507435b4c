//! On-disk layout of one chain's index folder.
//!
//! ```text
//! <root>/
//!     ripe/<block>.txt          appearance files old enough to survive a reorg
//!     unripe/<block>.txt        appearance files near the head
//!     finalized/<range>.bin     consolidated chunks
//!     blooms/<range>.bloom      one bloom filter per chunk
//!     ts.txt                    block timestamps
//! ```

use std::path::{Path, PathBuf};

use crate::{
    errors::{IndexError, Result},
    types::{BlockNumber, BlockRange, Partition},
};

pub const APPEARANCE_EXT: &str = "txt";
pub const CHUNK_EXT: &str = "bin";
pub const BLOOM_EXT: &str = "bloom";

const FINALIZED_DIR: &str = "finalized";
const BLOOMS_DIR: &str = "blooms";
const TIMESTAMPS_FILE: &str = "ts.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    root: PathBuf,
}

impl IndexPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Index folder of `chain` below a shared base folder
    pub fn for_chain(base: impl AsRef<Path>, chain: &str) -> Self {
        Self::new(base.as_ref().join(chain))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn partition_dir(&self, partition: Partition) -> PathBuf {
        self.root.join(partition.dir_name())
    }

    #[must_use]
    pub fn finalized_dir(&self) -> PathBuf {
        self.root.join(FINALIZED_DIR)
    }

    #[must_use]
    pub fn blooms_dir(&self) -> PathBuf {
        self.root.join(BLOOMS_DIR)
    }

    #[must_use]
    pub fn timestamps_file(&self) -> PathBuf {
        self.root.join(TIMESTAMPS_FILE)
    }

    #[must_use]
    pub fn appearance_file(&self, partition: Partition, block: BlockNumber) -> PathBuf {
        self.partition_dir(partition)
            .join(format!("{}.{APPEARANCE_EXT}", block.to_padded()))
    }

    #[must_use]
    pub fn chunk_file(&self, range: &BlockRange) -> PathBuf {
        self.finalized_dir().join(format!("{range}.{CHUNK_EXT}"))
    }

    #[must_use]
    pub fn bloom_file(&self, range: &BlockRange) -> PathBuf {
        self.blooms_dir().join(format!("{range}.{BLOOM_EXT}"))
    }

    /// The bloom filter belonging to a chunk file
    pub fn to_bloom_path(&self, chunk_path: &Path) -> Result<PathBuf> {
        Ok(self.bloom_file(&range_from_path(chunk_path)?))
    }

    /// The chunk file belonging to a bloom filter
    pub fn to_index_path(&self, bloom_path: &Path) -> Result<PathBuf> {
        if !is_bloom_path(bloom_path) {
            return Err(IndexError::not_bloom_path(bloom_path));
        }
        Ok(self.chunk_file(&range_from_path(bloom_path)?))
    }

    /// Creates every folder of the layout
    pub async fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.partition_dir(Partition::Ripe),
            self.partition_dir(Partition::Unripe),
            self.finalized_dir(),
            self.blooms_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| IndexError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Appearance files of a partition, ascending by block
    pub async fn list_appearance_files(
        &self,
        partition: Partition,
    ) -> Result<Vec<(BlockNumber, PathBuf)>> {
        let dir = self.partition_dir(partition);
        let mut files = Vec::new();
        for path in list_with_extension(&dir, APPEARANCE_EXT).await? {
            files.push((block_from_path(&path)?, path));
        }
        files.sort();
        Ok(files)
    }

    /// Bloom files, ascending by range
    pub async fn list_bloom_files(&self) -> Result<Vec<(BlockRange, PathBuf)>> {
        let mut files = Vec::new();
        for path in list_with_extension(&self.blooms_dir(), BLOOM_EXT).await? {
            files.push((range_from_path(&path)?, path));
        }
        files.sort();
        Ok(files)
    }
}

#[must_use]
pub fn is_bloom_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == BLOOM_EXT)
}

/// Block range encoded in a chunk or bloom file name
pub fn range_from_path(path: &Path) -> Result<BlockRange> {
    let stem = file_stem(path)?;
    let (first, last) = stem
        .split_once('-')
        .ok_or_else(|| IndexError::corrupt_file(path, "file name is not a block range"))?;
    BlockRange::new(first.parse()?, last.parse()?)
}

/// Block encoded in an appearance file name
pub fn block_from_path(path: &Path) -> Result<BlockNumber> {
    file_stem(path)?.parse()
}

fn file_stem(path: &Path) -> Result<&str> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| IndexError::corrupt_file(path, "file name is not valid UTF-8"))
}

async fn list_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(IndexError::io(dir, e)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| IndexError::io(dir, e))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == extension) {
            paths.push(path);
        }
    }
    Ok(paths)
}

//! Reorg-safety classification of scraped blocks.

use tracing::{debug, info};

use crate::{
    errors::{IndexError, Result},
    index::paths::IndexPaths,
    types::{BlockNumber, Partition},
};

/// A block is unripe when it is past the head or within `unripe_distance` blocks of it.
#[must_use]
pub const fn partition(block: BlockNumber, head: BlockNumber, unripe_distance: u64) -> Partition {
    let block = block.value();
    let head = head.value();
    if block > head || head - block <= unripe_distance {
        Partition::Unripe
    } else {
        Partition::Ripe
    }
}

/// Moves every unripe appearance file whose block has ripened under the new `head`
/// into the ripe folder. Files are renamed, never re-extracted. Returns the promoted
/// blocks, ascending.
pub async fn promote_ripened(
    paths: &IndexPaths,
    head: BlockNumber,
    unripe_distance: u64,
) -> Result<Vec<BlockNumber>> {
    let mut promoted = Vec::new();
    for (block, from) in paths.list_appearance_files(Partition::Unripe).await? {
        if partition(block, head, unripe_distance) != Partition::Ripe {
            continue;
        }
        let to = paths.appearance_file(Partition::Ripe, block);
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| IndexError::io(&from, e))?;
        debug!("[blaze] Promoted block {} to ripe", block);
        promoted.push(block);
    }

    if !promoted.is_empty() {
        info!(
            "[blaze] Promoted {} unripe blocks at head {}",
            promoted.len(),
            head
        );
    }
    Ok(promoted)
}

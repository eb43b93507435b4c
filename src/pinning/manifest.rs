//! Manifest assembly: pins the timestamps, then every chunk in walk order.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    errors::{IndexError, Result},
    index::{paths::IndexPaths, walker::ChunkVisitor, walker::IndexWalker},
    pinning::{pin_chunk, pin_timestamps, PinnedChunk, PinningService},
    types::BlockRange,
};

pub const MANIFEST_VERSION: &str = "appearance-index@v1.0.0";

/// Content id of the published description of the chunk and bloom formats
pub const SCHEMAS: &str = "QmUou7zX2g2tY58LP1A2GyP5RF9nbJsoxKTp299ah3svgb";

/// Upper bound of chunks visited in test mode
const MAX_CHUNKS_IN_TEST_MODE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub chain: String,
    pub schemas: String,
    pub chunks: Vec<PinnedChunk>,
}

#[derive(Debug, Clone)]
pub struct PinManifestOptions {
    pub chain: String,
    /// Also pin to the remote service
    pub remote: bool,
    /// Pause between chunks
    pub sleep: Option<Duration>,
    pub test_mode: bool,
}

impl PinManifestOptions {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            remote: false,
            sleep: None,
            test_mode: false,
        }
    }
}

struct PinVisitor<'a, S: ?Sized> {
    service: &'a S,
    remote: bool,
    sleep: Option<Duration>,
    chunks: Vec<PinnedChunk>,
}

#[async_trait]
impl<S> ChunkVisitor for PinVisitor<'_, S>
where
    S: PinningService + ?Sized,
{
    async fn visit(&mut self, walker: &IndexWalker, path: &Path, _first: bool) -> Result<bool> {
        let result = pin_chunk(self.service, walker.paths(), path, self.remote).await?;
        let pinned = result
            .preferred()
            .ok_or_else(|| IndexError::pinning(path, "no pin record was produced"))?;
        info!("[pin] Pinning: {} {}", pinned.path, pinned.content_id);
        self.chunks.push(pinned);

        if let Some(sleep) = self.sleep.filter(|s| !s.is_zero()) {
            if !walker.test_mode() {
                info!("[pin] Sleeping for {:?}", sleep);
            }
            tokio::time::sleep(sleep).await;
        }
        Ok(true)
    }
}

/// Pins the timestamp file and every chunk intersecting `ranges` (all chunks when
/// empty) and returns the manifest listing them in ascending range order. Any pinning
/// failure fails the whole call.
pub async fn pin_manifest<S>(
    service: &S,
    paths: &IndexPaths,
    options: &PinManifestOptions,
    ranges: &[BlockRange],
) -> Result<Manifest>
where
    S: PinningService + ?Sized,
{
    pin_timestamps(service, paths, options.remote).await?;

    let walker = IndexWalker::new(paths.clone(), options.test_mode, MAX_CHUNKS_IN_TEST_MODE);
    let mut visitor = PinVisitor {
        service,
        remote: options.remote,
        sleep: options.sleep,
        chunks: Vec::new(),
    };
    walker.walk_bloom_filters(&mut visitor, ranges).await?;

    info!("[pin] Pinned {} chunks for {}", visitor.chunks.len(), options.chain);
    Ok(Manifest {
        version: MANIFEST_VERSION.to_string(),
        chain: options.chain.clone(),
        schemas: SCHEMAS.to_string(),
        chunks: visitor.chunks,
    })
}

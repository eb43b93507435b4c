//! # Pinning
//!
//! Publishes index files to a content-addressed network. [`PinningService`] is the
//! seam; [`IpfsPinningService`] talks to a local IPFS daemon over its HTTP API and,
//! optionally, to a remote pinning endpoint authenticated with a bearer token.

use std::{fmt, path::Path};

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    errors::{IndexError, Result},
    index::paths::{is_bloom_path, range_from_path, IndexPaths},
};

pub mod manifest;

pub use manifest::{pin_manifest, Manifest, PinManifestOptions};

/// Content identifier returned by the pinning network
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chunk as listed in the manifest: its range, the bloom filter's content id and the
/// chunk file's content id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedChunk {
    pub path: String,
    pub content_id: ContentId,
    pub index_content_id: ContentId,
}

/// Where a file ended up. A side is `None` when it was not pinned there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinResult<T> {
    pub local: Option<T>,
    pub remote: Option<T>,
}

impl<T> PinResult<T> {
    /// The local record when the local daemon pinned the file, the remote one otherwise
    pub fn preferred(self) -> Option<T> {
        self.local.or(self.remote)
    }
}

#[async_trait]
pub trait PinningService: Send + Sync {
    async fn local_daemon_running(&self) -> bool;

    async fn pin_local(&self, path: &Path) -> Result<ContentId>;

    async fn pin_remote(&self, path: &Path) -> Result<ContentId>;
}

/// Pins one file locally and/or remotely. Fails when neither side is available.
async fn pin_file<S>(service: &S, path: &Path, remote: bool) -> Result<PinResult<ContentId>>
where
    S: PinningService + ?Sized,
{
    let local_running = service.local_daemon_running().await;
    if !local_running && !remote {
        return Err(IndexError::pinning(
            path,
            "local daemon is not running and remote pinning is not enabled",
        ));
    }

    let local = if local_running {
        Some(service.pin_local(path).await?)
    } else {
        None
    };
    let remote = if remote {
        Some(service.pin_remote(path).await?)
    } else {
        None
    };
    Ok(PinResult { local, remote })
}

/// Pins the timestamp side-file
pub async fn pin_timestamps<S>(
    service: &S,
    paths: &IndexPaths,
    remote: bool,
) -> Result<PinResult<ContentId>>
where
    S: PinningService + ?Sized,
{
    let path = paths.timestamps_file();
    let result = pin_file(service, &path, remote).await?;
    if let Some(cid) = result.local.as_ref().or(result.remote.as_ref()) {
        info!("[pin] Pinned timestamps as {}", cid);
    }
    Ok(result)
}

/// Pins a bloom filter and the chunk it belongs to
pub async fn pin_chunk<S>(
    service: &S,
    paths: &IndexPaths,
    bloom_path: &Path,
    remote: bool,
) -> Result<PinResult<PinnedChunk>>
where
    S: PinningService + ?Sized,
{
    if !is_bloom_path(bloom_path) {
        return Err(IndexError::not_bloom_path(bloom_path));
    }
    let range = range_from_path(bloom_path)?.to_string();
    let chunk_path = paths.to_index_path(bloom_path)?;

    let blooms = pin_file(service, bloom_path, remote).await?;
    let chunks = pin_file(service, &chunk_path, remote).await?;

    let pair = |bloom: Option<ContentId>, chunk: Option<ContentId>| {
        bloom.zip(chunk).map(|(content_id, index_content_id)| PinnedChunk {
            path: range.clone(),
            content_id,
            index_content_id,
        })
    };
    let result = PinResult {
        local: pair(blooms.local, chunks.local),
        remote: pair(blooms.remote, chunks.remote),
    };
    debug!("[pin] Pinned chunk {}: {:?}", range, result);
    Ok(result)
}

#[derive(Deserialize)]
struct IpfsAddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Deserialize)]
struct RemotePinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

pub struct IpfsPinningService {
    client: Client,
    api_url: String,
    remote_url: Option<String>,
    remote_jwt: Option<String>,
}

impl IpfsPinningService {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            remote_url: None,
            remote_jwt: None,
        }
    }

    /// Enables remote pinning against a `pinFileToIPFS` style endpoint
    #[must_use]
    pub fn with_remote(mut self, url: impl Into<String>, jwt: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self.remote_jwt = Some(jwt.into());
        self
    }

    async fn file_part(path: &Path) -> Result<multipart::Form> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IndexError::io(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(multipart::Form::new().part("file", multipart::Part::bytes(bytes).file_name(name)))
    }
}

#[async_trait]
impl PinningService for IpfsPinningService {
    async fn local_daemon_running(&self) -> bool {
        self.client
            .post(format!("{}/api/v0/version", self.api_url))
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }

    async fn pin_local(&self, path: &Path) -> Result<ContentId> {
        let form = Self::file_part(path).await?;
        let response = self
            .client
            .post(format!("{}/api/v0/add?pin=true", self.api_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| IndexError::pinning(path, e.to_string()))?;

        if !response.status().is_success() {
            return Err(IndexError::pinning(
                path,
                format!("local daemon responded with {}", response.status()),
            ));
        }
        let added: IpfsAddResponse = response
            .json()
            .await
            .map_err(|e| IndexError::pinning(path, e.to_string()))?;
        Ok(ContentId::new(added.hash))
    }

    async fn pin_remote(&self, path: &Path) -> Result<ContentId> {
        let (Some(url), Some(jwt)) = (self.remote_url.as_deref(), self.remote_jwt.as_deref()) else {
            return Err(IndexError::configuration(
                "remote_pin_url",
                "Remote pinning requires both an endpoint and a token",
            ));
        };

        let form = Self::file_part(path).await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(jwt)
            .multipart(form)
            .send()
            .await
            .map_err(|e| IndexError::pinning(path, e.to_string()))?;

        if !response.status().is_success() {
            return Err(IndexError::pinning(
                path,
                format!("remote pinning service responded with {}", response.status()),
            ));
        }
        let pinned: RemotePinResponse = response
            .json()
            .await
            .map_err(|e| IndexError::pinning(path, e.to_string()))?;
        Ok(ContentId::new(pinned.ipfs_hash))
    }
}

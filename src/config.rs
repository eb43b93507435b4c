//! Runtime configuration shared by every subcommand of the binary.

use std::{path::PathBuf, str::FromStr};

use crate::{
    errors::{IndexError, Result},
    index::IndexPaths,
    notify::Notifier,
    pinning::IpfsPinningService,
    rpc::EthereumJsonRpcClient,
    scrape::{ScrapeConfig, ScrapeConfigBuilder},
};

pub const DEFAULT_CHAIN: &str = "mainnet";
pub const DEFAULT_IPFS_API_URL: &str = "http://localhost:5001";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub node_conn_string: String,
    /// Base folder; each chain keeps its index in a sub-folder
    pub index_path: PathBuf,
    pub chain: String,
    pub block_workers: usize,
    pub address_workers: usize,
    pub unripe_distance: u64,
    pub rpc_timeout: u64,
    pub rpc_max_retries: u32,
    pub notify_url: Option<String>,
    pub ipfs_api_url: String,
    pub remote_pin_url: Option<String>,
    pub remote_pin_jwt: Option<String>,
}

impl IndexConfig {
    #[must_use]
    pub const fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::new()
    }

    /// Reads the configuration from the process environment. Call `dotenvy::dotenv()`
    /// first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`IndexConfig::from_env`] with an arbitrary variable source. Unset and
    /// empty variables fall back to the production defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut builder = IndexConfigBuilder::production();

        if let Some(node) = var("NODE_CONNECTION_STRING") {
            builder = builder.node_conn_string(node);
        }
        if let Some(path) = var("INDEX_PATH") {
            builder = builder.index_path(path);
        }
        if let Some(chain) = var("CHAIN") {
            builder = builder.chain(chain);
        }
        if let Some(v) = var("BLOCK_WORKERS") {
            builder = builder.block_workers(parse_var("BLOCK_WORKERS", &v)?);
        }
        if let Some(v) = var("ADDRESS_WORKERS") {
            builder = builder.address_workers(parse_var("ADDRESS_WORKERS", &v)?);
        }
        if let Some(v) = var("UNRIPE_DISTANCE") {
            builder = builder.unripe_distance(parse_var("UNRIPE_DISTANCE", &v)?);
        }
        if let Some(v) = var("RPC_TIMEOUT") {
            builder = builder.rpc_timeout(parse_var("RPC_TIMEOUT", &v)?);
        }
        if let Some(v) = var("RPC_MAX_RETRIES") {
            builder = builder.rpc_max_retries(parse_var("RPC_MAX_RETRIES", &v)?);
        }
        if let Some(url) = var("NOTIFY_URL") {
            builder = builder.notify_url(url);
        }
        if let Some(url) = var("IPFS_API_URL") {
            builder = builder.ipfs_api_url(url);
        }
        if let (Some(url), Some(jwt)) = (var("REMOTE_PIN_URL"), var("REMOTE_PIN_JWT")) {
            builder = builder.remote_pin(url, jwt);
        }

        builder.build()
    }

    pub fn scrape_config(&self) -> Result<ScrapeConfig> {
        ScrapeConfigBuilder::new()
            .block_workers(self.block_workers)
            .address_workers(self.address_workers)
            .unripe_distance(self.unripe_distance)
            .build()
    }

    #[must_use]
    pub fn index_paths(&self) -> IndexPaths {
        IndexPaths::for_chain(&self.index_path, &self.chain)
    }

    #[must_use]
    pub fn rpc_client(&self) -> EthereumJsonRpcClient {
        EthereumJsonRpcClient::new(self.node_conn_string.clone(), self.rpc_max_retries)
            .with_timeout(self.rpc_timeout)
    }

    #[must_use]
    pub fn notifier(&self) -> Notifier {
        Notifier::new(self.notify_url.clone())
    }

    #[must_use]
    pub fn pinning_service(&self) -> IpfsPinningService {
        let service = IpfsPinningService::new(self.ipfs_api_url.clone());
        match (&self.remote_pin_url, &self.remote_pin_jwt) {
            (Some(url), Some(jwt)) => service.with_remote(url.clone(), jwt.clone()),
            _ => service,
        }
    }

    /// Whether a remote pinning endpoint is configured
    #[must_use]
    pub const fn has_remote_pinning(&self) -> bool {
        self.remote_pin_url.is_some() && self.remote_pin_jwt.is_some()
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        IndexError::configuration(key, format!("'{value}' is not a valid value for {key}"))
    })
}

pub struct IndexConfigBuilder {
    node_conn_string: Option<String>,
    index_path: Option<PathBuf>,
    chain: Option<String>,
    block_workers: usize,
    address_workers: usize,
    unripe_distance: u64,
    rpc_timeout: u64,
    rpc_max_retries: u32,
    notify_url: Option<String>,
    ipfs_api_url: Option<String>,
    remote_pin_url: Option<String>,
    remote_pin_jwt: Option<String>,
}

impl IndexConfigBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            node_conn_string: None,
            index_path: None,
            chain: None,
            block_workers: 20,
            address_workers: 20,
            unripe_distance: 28,
            rpc_timeout: 60,
            rpc_max_retries: 0,
            notify_url: None,
            ipfs_api_url: None,
            remote_pin_url: None,
            remote_pin_jwt: None,
        }
    }

    #[must_use]
    pub const fn development() -> Self {
        Self::new()
            .block_workers(4)
            .address_workers(4)
            .unripe_distance(6)
            .rpc_timeout(30)
            .rpc_max_retries(3)
    }

    #[must_use]
    pub const fn testing() -> Self {
        Self::new()
            .block_workers(2)
            .address_workers(2)
            .unripe_distance(2)
            .rpc_timeout(5)
            .rpc_max_retries(0)
    }

    #[must_use]
    pub const fn production() -> Self {
        Self::new()
            .block_workers(20)
            .address_workers(20)
            .unripe_distance(28)
            .rpc_timeout(60)
            .rpc_max_retries(0)
    }

    #[must_use]
    pub fn node_conn_string<S: Into<String>>(mut self, node_conn_string: S) -> Self {
        self.node_conn_string = Some(node_conn_string.into());
        self
    }

    #[must_use]
    pub fn index_path<P: Into<PathBuf>>(mut self, index_path: P) -> Self {
        self.index_path = Some(index_path.into());
        self
    }

    #[must_use]
    pub fn chain<S: Into<String>>(mut self, chain: S) -> Self {
        self.chain = Some(chain.into());
        self
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
    pub const fn rpc_timeout(mut self, rpc_timeout: u64) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    #[must_use]
    pub const fn rpc_max_retries(mut self, rpc_max_retries: u32) -> Self {
        self.rpc_max_retries = rpc_max_retries;
        self
    }

    #[must_use]
    pub fn notify_url<S: Into<String>>(mut self, notify_url: S) -> Self {
        self.notify_url = Some(notify_url.into());
        self
    }

    #[must_use]
    pub fn ipfs_api_url<S: Into<String>>(mut self, ipfs_api_url: S) -> Self {
        self.ipfs_api_url = Some(ipfs_api_url.into());
        self
    }

    #[must_use]
    pub fn remote_pin<S: Into<String>, J: Into<String>>(mut self, url: S, jwt: J) -> Self {
        self.remote_pin_url = Some(url.into());
        self.remote_pin_jwt = Some(jwt.into());
        self
    }

    pub fn build(self) -> Result<IndexConfig> {
        let node_conn_string = self.node_conn_string.ok_or_else(|| {
            IndexError::configuration("node_conn_string", "Node connection string is required")
        })?;

        let index_path = self.index_path.ok_or_else(|| {
            IndexError::configuration("index_path", "Index path is required")
        })?;

        let chain = self.chain.unwrap_or_else(|| DEFAULT_CHAIN.to_string());
        if chain.is_empty() || chain.contains(['/', '\\']) {
            return Err(IndexError::configuration(
                "chain",
                "Chain must be a non-empty name without path separators",
            ));
        }

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

        if self.rpc_timeout == 0 {
            return Err(IndexError::configuration(
                "rpc_timeout",
                "RPC timeout must be greater than 0",
            ));
        }

        Ok(IndexConfig {
            node_conn_string,
            index_path,
            chain,
            block_workers: self.block_workers,
            address_workers: self.address_workers,
            unripe_distance: self.unripe_distance,
            rpc_timeout: self.rpc_timeout,
            rpc_max_retries: self.rpc_max_retries,
            notify_url: self.notify_url,
            ipfs_api_url: self
                .ipfs_api_url
                .unwrap_or_else(|| DEFAULT_IPFS_API_URL.to_string()),
            remote_pin_url: self.remote_pin_url,
            remote_pin_jwt: self.remote_pin_jwt,
        })
    }
}

impl Default for IndexConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_builder_requires_node_and_index_path() {
        let err = IndexConfigBuilder::testing()
            .index_path("/tmp/index")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::ConfigurationError { ref parameter, .. } if parameter == "node_conn_string"
        ));

        let err = IndexConfigBuilder::testing()
            .node_conn_string("http://localhost:8545")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::ConfigurationError { ref parameter, .. } if parameter == "index_path"
        ));
    }

    #[test]
    fn test_builder_defaults() {
        let config = IndexConfigBuilder::production()
            .node_conn_string("http://localhost:8545")
            .index_path("/data/index")
            .build()
            .unwrap();

        assert_eq!(config.chain, "mainnet");
        assert_eq!(config.unripe_distance, 28);
        assert_eq!(config.rpc_max_retries, 0);
        assert_eq!(config.ipfs_api_url, DEFAULT_IPFS_API_URL);
        assert!(!config.has_remote_pinning());
        assert!(!config.notifier().is_enabled());
        assert_eq!(
            config.index_paths().root(),
            std::path::Path::new("/data/index/mainnet")
        );
    }

    #[test]
    fn test_builder_rejects_zero_workers() {
        let err = IndexConfigBuilder::new()
            .node_conn_string("http://localhost:8545")
            .index_path("/tmp/index")
            .address_workers(0)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::ConfigurationError { ref parameter, .. } if parameter == "address_workers"
        ));
    }

    #[test]
    fn test_builder_rejects_chain_with_separator() {
        let err = IndexConfigBuilder::new()
            .node_conn_string("http://localhost:8545")
            .index_path("/tmp/index")
            .chain("../mainnet")
            .build()
            .unwrap_err();
        assert!(matches!(err, IndexError::ConfigurationError { .. }));
    }

    #[test]
    fn test_from_lookup_reads_every_variable() {
        let config = IndexConfig::from_lookup(lookup(&[
            ("NODE_CONNECTION_STRING", "http://node:8545"),
            ("INDEX_PATH", "/var/index"),
            ("CHAIN", "gnosis"),
            ("BLOCK_WORKERS", "8"),
            ("ADDRESS_WORKERS", "6"),
            ("UNRIPE_DISTANCE", "12"),
            ("RPC_TIMEOUT", "15"),
            ("RPC_MAX_RETRIES", "2"),
            ("NOTIFY_URL", "http://localhost:2020/notify"),
            ("IPFS_API_URL", "http://ipfs:5001"),
            ("REMOTE_PIN_URL", "https://pin.example/pinFileToIPFS"),
            ("REMOTE_PIN_JWT", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.node_conn_string, "http://node:8545");
        assert_eq!(config.chain, "gnosis");
        assert_eq!(config.block_workers, 8);
        assert_eq!(config.address_workers, 6);
        assert_eq!(config.unripe_distance, 12);
        assert_eq!(config.rpc_timeout, 15);
        assert_eq!(config.rpc_max_retries, 2);
        assert_eq!(config.ipfs_api_url, "http://ipfs:5001");
        assert!(config.has_remote_pinning());
        assert!(config.notifier().is_enabled());

        let scrape = config.scrape_config().unwrap();
        assert_eq!(scrape.block_workers, 8);
        assert_eq!(scrape.unripe_distance, 12);
    }

    #[test]
    fn test_rpc_timeout_reaches_the_client() {
        let config = IndexConfigBuilder::development()
            .node_conn_string("http://node:8545")
            .index_path("/var/index")
            .rpc_timeout(15)
            .build()
            .unwrap();

        let client = config.rpc_client();
        assert_eq!(client.url(), "http://node:8545");
        assert_eq!(client.timeout(), Some(std::time::Duration::from_secs(15)));
    }

    #[test]
    fn test_from_lookup_treats_empty_values_as_unset() {
        let config = IndexConfig::from_lookup(lookup(&[
            ("NODE_CONNECTION_STRING", "http://node:8545"),
            ("INDEX_PATH", "/var/index"),
            ("NOTIFY_URL", ""),
            ("REMOTE_PIN_URL", "https://pin.example"),
        ]))
        .unwrap();

        assert!(config.notify_url.is_none());
        assert!(!config.has_remote_pinning());
    }

    #[test]
    fn test_from_lookup_rejects_unparsable_numbers() {
        let err = IndexConfig::from_lookup(lookup(&[
            ("NODE_CONNECTION_STRING", "http://node:8545"),
            ("INDEX_PATH", "/var/index"),
            ("UNRIPE_DISTANCE", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            IndexError::ConfigurationError { ref parameter, .. } if parameter == "UNRIPE_DISTANCE"
        ));
    }
}

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::notify::NotifyError;

/// Domain-specific error types for the appearance index
#[derive(Error, Debug)]
pub enum IndexError {
    /// Errors related to invalid hex or text formats
    #[error("Invalid hex format: {message}")]
    InvalidHexFormat { message: String },

    /// Errors related to RPC connections and requests
    #[error("RPC connection failed: {message}")]
    RpcConnectionFailed { message: String },

    /// Errors when RPC requests timeout
    #[error("RPC request timed out after {timeout_seconds} seconds")]
    RpcTimeout { timeout_seconds: u64 },

    /// The node answered with a JSON-RPC error object
    #[error("RPC method {method} failed with code {code}: {message}")]
    RpcError {
        method: String,
        code: i64,
        message: String,
    },

    /// Errors when a block is not found
    #[error("Block not found: {block_identifier}")]
    BlockNotFound { block_identifier: String },

    /// Errors when a transaction receipt is not found
    #[error("Transaction not found: {transaction_hash}")]
    TransactionNotFound { transaction_hash: String },

    /// A trace type the extractor does not understand
    #[error("Unknown trace type '{trace_type}' in block {block_number}")]
    UnknownTraceType {
        block_number: u64,
        trace_type: String,
    },

    /// Block data validation errors
    #[error("Block validation failed for block {block_number}: {reason}")]
    BlockValidationFailed { block_number: u64, reason: String },

    /// Filesystem errors, always carrying the offending path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A chunk, bloom or appearance file that cannot be decoded
    #[error("Corrupt index file {}: {reason}", path.display())]
    CorruptFile { path: PathBuf, reason: String },

    /// The index walker handed a path that is not a bloom filter
    #[error("Not a bloom filter path: {}", path.display())]
    NotBloomPath { path: PathBuf },

    /// Configuration errors
    #[error("Configuration error: {parameter} - {message}")]
    ConfigurationError { parameter: String, message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    NetworkError { message: String },

    /// Range errors for block operations
    #[error("Invalid block range: first={first}, last={last}")]
    InvalidBlockRange { first: u64, last: u64 },

    /// Pinning a file to the content-addressed network failed
    #[error("Pinning failed for {}: {message}", path.display())]
    PinningFailed { path: PathBuf, message: String },

    /// Notification webhook errors
    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// The run was cancelled before it finished
    #[error("Run cancelled: {reason}")]
    Cancelled { reason: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl IndexError {
    /// Create an invalid hex format error
    #[must_use]
    pub fn invalid_hex(value: &str) -> Self {
        Self::InvalidHexFormat {
            message: format!("Cannot parse hex value: '{value}'"),
        }
    }

    /// Create an invalid format error
    #[must_use]
    pub fn invalid_format(field_name: &str, message: &str) -> Self {
        Self::InvalidHexFormat {
            message: format!("Invalid {field_name}: {message}"),
        }
    }

    /// Create an RPC connection error
    pub fn rpc_connection(message: impl Into<String>) -> Self {
        Self::RpcConnectionFailed {
            message: message.into(),
        }
    }

    /// Create an RPC timeout error
    #[must_use]
    pub const fn rpc_timeout(timeout_seconds: u64) -> Self {
        Self::RpcTimeout { timeout_seconds }
    }

    /// Create an error from a JSON-RPC error object
    pub fn rpc_error(method: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::RpcError {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a block not found error
    pub fn block_not_found(block_identifier: impl Into<String>) -> Self {
        Self::BlockNotFound {
            block_identifier: block_identifier.into(),
        }
    }

    /// Create a transaction not found error
    pub fn transaction_not_found(transaction_hash: impl Into<String>) -> Self {
        Self::TransactionNotFound {
            transaction_hash: transaction_hash.into(),
        }
    }

    /// Create an unknown trace type error
    pub fn unknown_trace_type(block_number: u64, trace_type: impl Into<String>) -> Self {
        Self::UnknownTraceType {
            block_number,
            trace_type: trace_type.into(),
        }
    }

    /// Create a block validation error
    pub fn block_validation(block_number: u64, reason: impl Into<String>) -> Self {
        Self::BlockValidationFailed {
            block_number,
            reason: reason.into(),
        }
    }

    /// Create an I/O error bound to a path
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a corrupt file error
    pub fn corrupt_file(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::CorruptFile {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a not-a-bloom-path error
    pub fn not_bloom_path(path: impl AsRef<Path>) -> Self {
        Self::NotBloomPath {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a configuration error
    pub fn configuration(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Create an invalid block range error
    #[must_use]
    pub const fn invalid_range(first: u64, last: u64) -> Self {
        Self::InvalidBlockRange { first, last }
    }

    /// Create a pinning error
    pub fn pinning(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::PinningFailed {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Whether the error is a transport problem that a caller may retry
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::RpcConnectionFailed { .. } | Self::RpcTimeout { .. } | Self::NetworkError { .. }
        )
    }
}

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Convert from reqwest errors
impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::rpc_timeout(30) // Default timeout assumption
        } else if err.is_connect() {
            Self::rpc_connection(format!("Connection error: {err}"))
        } else {
            Self::network(format!("Request error: {err}"))
        }
    }
}

/// Convert from serde JSON errors
impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON parsing error: {err}"))
    }
}

/// Convert from integer parsing errors
impl From<std::num::ParseIntError> for IndexError {
    fn from(err: std::num::ParseIntError) -> Self {
        Self::invalid_hex(&format!("Parse error: {err}"))
    }
}

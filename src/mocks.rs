//! # Mock Implementations for Testing
//!
//! Mocks of the collaborator traits so pinning and manifest assembly can be tested
//! without a running IPFS daemon.
//!
//! ## Available Mocks
//!
//! - [`MockPinningService`] - Mock implementation of [`crate::pinning::PinningService`]
//!
//! The RPC seam is mocked by hand in [`crate::test_utils::mock_rpc`], because its
//! tests want canned per-block data rather than call expectations.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(dead_code)]

#[cfg(test)]
use std::path::Path;

#[cfg(test)]
use mockall::mock;

#[cfg(test)]
use crate::errors::Result;
#[cfg(test)]
use crate::pinning::{ContentId, PinningService};

#[cfg(test)]
mock! {
    /// Mock implementation of the pinning service trait.
    ///
    /// ```rust,ignore
    /// let mut service = MockPinningService::new();
    /// service.expect_local_daemon_running().returning(|| true);
    /// service
    ///     .expect_pin_local()
    ///     .returning(|_| Ok(ContentId::new("QmHash")));
    /// ```
    pub PinningService {}

    #[async_trait::async_trait]
    impl PinningService for PinningService {
        async fn local_daemon_running(&self) -> bool;
        async fn pin_local(&self, path: &Path) -> Result<ContentId>;
        async fn pin_remote(&self, path: &Path) -> Result<ContentId>;
    }
}

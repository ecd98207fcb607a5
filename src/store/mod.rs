//! The content store: immutable blobs addressed by CID, plus a mutable
//! naming primitive and a peer readiness signal

mod kubo;
mod memory;

pub use kubo::{KuboStore, KuboStoreBuilder};
pub use memory::MemoryStore;

use crate::errors::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use std::sync::Arc;

/// Options for writing a blob
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddOptions {
    /// Keep the blob from being garbage collected
    pub pin: bool,
    /// Content identifier version to assign
    pub cid_version: u8,
}

impl Default for AddOptions {
    fn default() -> Self {
        AddOptions {
            pin: true,
            cid_version: 1,
        }
    }
}

/// Capabilities this crate needs from a content store
///
/// Implementations must tolerate concurrent calls. Dropping a returned
/// future abandons the call.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Write a blob, returning its CID
    async fn add(&self, data: Bytes, options: &AddOptions) -> Result<String, StoreError>;

    /// Read a whole blob back
    async fn get(&self, cid: &str) -> Result<Bytes, StoreError>;

    /// Current CID published under a naming key
    async fn resolve(&self, name_key: &str) -> Result<String, StoreError>;

    /// Point our naming key at `cid`, returning the key
    async fn publish(&self, cid: &str, allow_offline: bool) -> Result<String, StoreError>;

    /// Currently connected peers
    async fn peers(&self) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    async fn add(&self, data: Bytes, options: &AddOptions) -> Result<String, StoreError> {
        (**self).add(data, options).await
    }

    async fn get(&self, cid: &str) -> Result<Bytes, StoreError> {
        (**self).get(cid).await
    }

    async fn resolve(&self, name_key: &str) -> Result<String, StoreError> {
        (**self).resolve(name_key).await
    }

    async fn publish(&self, cid: &str, allow_offline: bool) -> Result<String, StoreError> {
        (**self).publish(cid, allow_offline).await
    }

    async fn peers(&self) -> Result<Vec<String>, StoreError> {
        (**self).peers().await
    }
}

/// Parse a content identifier string
pub fn parse_cid(s: &str) -> Result<Cid, StoreError> {
    Cid::try_from(s).map_err(|_| StoreError::InvalidCid(s.to_owned()))
}

/// Accept both `/ipfs/<cid>` paths and bare identifiers
pub(crate) fn strip_ipfs_path(path: &str) -> &str {
    path.strip_prefix("/ipfs/").unwrap_or(path)
}

//! Cluster-wide map from image references to stored image roots
//!
//! The whole map is one JSON blob in the content store, published under a
//! single naming key. The key itself is kept in a cluster secret so every
//! replica finds the same map.
//!
//! Updates are read-modify-write-publish with no locking. Two concurrent
//! updates both succeed in the store, but the later publish replaces the
//! earlier map and its new entry is lost.

mod bootstrap;
mod fetcher;
mod map;
mod mapper;

pub use bootstrap::{wait_for_peers, Bootstrap};
pub use fetcher::{MemoryKeys, SecretFetcher, StaticFetcher};
pub use map::NameMap;
pub use mapper::NameMapper;

use crate::errors::NameError;
use async_trait::async_trait;
use std::sync::Arc;

/// Resolves image references to root handles
#[async_trait]
pub trait CidMapper: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<String, NameError>;
}

/// Records a new root handle for a reference
#[async_trait]
pub trait Updater: Send + Sync {
    async fn update(&self, reference: &str, cid: &str) -> Result<(), NameError>;
}

/// Provides the naming key the map is published under
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self) -> Result<String, NameError>;
}

/// Remembers the naming key for later fetches
#[async_trait]
pub trait KeyPersister: Send + Sync {
    async fn persist(&self, key: &str) -> Result<(), NameError>;
}

#[async_trait]
impl<T: CidMapper + ?Sized> CidMapper for Arc<T> {
    async fn resolve(&self, reference: &str) -> Result<String, NameError> {
        (**self).resolve(reference).await
    }
}

#[async_trait]
impl<T: Updater + ?Sized> Updater for Arc<T> {
    async fn update(&self, reference: &str, cid: &str) -> Result<(), NameError> {
        (**self).update(reference, cid).await
    }
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn fetch(&self) -> Result<String, NameError> {
        (**self).fetch().await
    }
}

#[async_trait]
impl<T: KeyPersister + ?Sized> KeyPersister for Arc<T> {
    async fn persist(&self, key: &str) -> Result<(), NameError> {
        (**self).persist(key).await
    }
}

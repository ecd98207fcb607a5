use crate::{
    errors::{ErrorKind, NameError},
    image::{DefaultRegistry, ImageName},
    naming::{CidMapper, Fetcher, NameMap, Updater},
    store::{AddOptions, ContentStore},
};
use async_trait::async_trait;

/// Name map kept in a content store under a published naming key
pub struct NameMapper<S, F> {
    store: S,
    fetcher: F,
    defaults: DefaultRegistry,
}

impl<S: ContentStore, F: Fetcher> NameMapper<S, F> {
    pub fn new(store: S, fetcher: F) -> Self {
        NameMapper {
            store,
            fetcher,
            defaults: DefaultRegistry::new(),
        }
    }

    /// The map key for a reference
    pub fn canonicalize(&self, reference: &str) -> Result<String, NameError> {
        Ok(ImageName::parse(reference)?.canonical(&self.defaults))
    }

    /// Naming records can't be trusted until the store has peers
    async fn peered(&self) -> bool {
        match self.store.peers().await {
            Ok(peers) => !peers.is_empty(),
            Err(err) => {
                log::debug!("can't list peers: {}", err);
                false
            }
        }
    }

    /// The map currently published under `key`
    pub async fn current(&self, key: &str) -> Result<NameMap, NameError> {
        let cid = self.store.resolve(key).await?;
        let data = self.store.get(&cid).await?;
        NameMap::decode(&data)
    }
}

#[async_trait]
impl<S: ContentStore, F: Fetcher> CidMapper for NameMapper<S, F> {
    async fn resolve(&self, reference: &str) -> Result<String, NameError> {
        if !self.peered().await {
            return Err(NameError::NotPeered);
        }
        let key = self.fetcher.fetch().await?;
        let map = self.current(&key).await?;
        let canonical = self.canonicalize(reference)?;
        match map.get(&canonical) {
            Some(cid) => Ok(cid.to_owned()),
            None => Err(NameError::NotFound(canonical)),
        }
    }
}

#[async_trait]
impl<S: ContentStore, F: Fetcher> Updater for NameMapper<S, F> {
    async fn update(&self, reference: &str, cid: &str) -> Result<(), NameError> {
        let canonical = self.canonicalize(reference)?;
        let key = self.fetcher.fetch().await?;
        let mut map = match self.current(&key).await {
            Ok(map) => map,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::info!("no name map published under {} yet, starting empty", key);
                NameMap::new()
            }
            Err(err) => return Err(err),
        };
        if let Some(previous) = map.insert(canonical.clone(), cid.to_owned()) {
            log::debug!("{} moves from {} to {}", canonical, previous, cid);
        }
        let map_cid = self.store.add(map.encode()?, &AddOptions::default()).await?;
        let published = self.store.publish(&map_cid, true).await?;
        if published != key {
            log::warn!(
                "name map published under {} but readers look under {}",
                published,
                key
            );
        }
        log::info!(
            "{} -> {} ({} entries, map {})",
            canonical,
            cid,
            map.len(),
            map_cid
        );
        Ok(())
    }
}

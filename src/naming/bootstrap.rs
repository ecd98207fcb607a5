use crate::{
    errors::NameError,
    naming::{Fetcher, KeyPersister, NameMap},
    store::{AddOptions, ContentStore},
};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Poll the store until it reports at least one peer
///
/// Gives up with [NameError::Timeout] once `deadline` has passed, or keeps
/// polling forever without one.
pub async fn wait_for_peers<S: ContentStore + ?Sized>(
    store: &S,
    interval: Duration,
    deadline: Option<Duration>,
) -> Result<Vec<String>, NameError> {
    let started = Instant::now();
    loop {
        match store.peers().await {
            Ok(peers) if !peers.is_empty() => {
                log::info!("connected to {} peers", peers.len());
                return Ok(peers);
            }
            Ok(_) => log::debug!("no peers yet"),
            Err(err) => log::debug!("listing peers failed: {}", err),
        }
        if let Some(deadline) = deadline {
            if started.elapsed() >= deadline {
                return Err(NameError::Timeout);
            }
        }
        sleep(interval).await;
    }
}

/// One-time creation of the cluster's name map
pub struct Bootstrap<S, K> {
    store: S,
    keys: K,
    interval: Duration,
    deadline: Option<Duration>,
}

impl<S: ContentStore, K: Fetcher + KeyPersister> Bootstrap<S, K> {
    pub fn new(store: S, keys: K) -> Self {
        Bootstrap {
            store,
            keys,
            interval: Duration::from_secs(5),
            deadline: None,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Publish an empty map and persist its key, unless a key already exists
    ///
    /// Returns the naming key either way.
    pub async fn run(&self) -> Result<String, NameError> {
        wait_for_peers(&self.store, self.interval, self.deadline).await?;
        match self.keys.fetch().await {
            Ok(key) => {
                log::info!("name map already published under {}", key);
                return Ok(key);
            }
            Err(NameError::MissingKey(what)) => log::info!("{} is missing, creating it", what),
            Err(err) => return Err(err),
        }
        let cid = self
            .store
            .add(NameMap::new().encode()?, &AddOptions::default())
            .await?;
        let key = self.store.publish(&cid, true).await?;
        self.keys.persist(&key).await?;
        log::info!("published empty name map {} under {}", cid, key);
        Ok(key)
    }
}

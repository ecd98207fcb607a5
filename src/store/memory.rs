use crate::{
    errors::StoreError,
    store::{strip_ipfs_path, AddOptions, ContentStore},
};
use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use multihash::Multihash;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::Barrier;

const RAW_CODEC: u64 = 0x55;
const SHA2_256: u64 = 0x12;

#[derive(Default)]
struct State {
    blobs: HashMap<String, Bytes>,
    pinned: HashSet<String>,
    names: HashMap<String, String>,
    peers: Vec<String>,
    adds: usize,
    resolve_gate: Option<Arc<Barrier>>,
}

/// Content store held in process memory
///
/// Blobs get real CIDv1 identifiers (raw codec, sha2-256), so identical
/// bytes always land under the same CID. There is a single naming key, and
/// publishing to it is last-write-wins exactly like the real thing.
#[derive(Clone)]
pub struct MemoryStore {
    key: String,
    state: Arc<Mutex<State>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl MemoryStore {
    /// An empty store with no peers
    pub fn new() -> Self {
        let key = Self::cid_for(b"memory-store-naming-key").to_string();
        MemoryStore {
            key,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// An empty store that already reports one peer
    pub fn peered() -> Self {
        let store = MemoryStore::new();
        store.set_peers(vec!["12D3KooWmemorypeer".to_owned()]);
        store
    }

    pub fn set_peers(&self, peers: Vec<String>) {
        self.state.lock().peers = peers;
    }

    /// The naming key this store publishes under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// CID the store assigns to `data`
    pub fn cid_for(data: &[u8]) -> Cid {
        let digest = Sha256::digest(data);
        match Multihash::<64>::wrap(SHA2_256, &digest) {
            Ok(hash) => Cid::new_v1(RAW_CODEC, hash),
            Err(_) => unreachable!("sha2-256 digests fit in a multihash"),
        }
    }

    pub fn contains(&self, cid: &str) -> bool {
        self.state.lock().blobs.contains_key(cid)
    }

    pub fn is_pinned(&self, cid: &str) -> bool {
        self.state.lock().pinned.contains(cid)
    }

    /// Total number of add calls so far
    pub fn add_count(&self) -> usize {
        self.state.lock().adds
    }

    /// Hold every resolve at `barrier` after it has read the current value
    ///
    /// Lets a test line up concurrent readers on the same published value.
    pub fn gate_resolves(&self, barrier: Arc<Barrier>) {
        self.state.lock().resolve_gate = Some(barrier);
    }

    pub fn ungate_resolves(&self) {
        self.state.lock().resolve_gate = None;
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn add(&self, data: Bytes, options: &AddOptions) -> Result<String, StoreError> {
        let cid = Self::cid_for(&data).to_string();
        let mut state = self.state.lock();
        state.adds += 1;
        if options.pin {
            state.pinned.insert(cid.clone());
        }
        state.blobs.insert(cid.clone(), data);
        Ok(cid)
    }

    async fn get(&self, cid: &str) -> Result<Bytes, StoreError> {
        let cid = strip_ipfs_path(cid);
        self.state
            .lock()
            .blobs
            .get(cid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(cid.to_owned()))
    }

    async fn resolve(&self, name_key: &str) -> Result<String, StoreError> {
        let name_key = name_key.strip_prefix("/ipns/").unwrap_or(name_key);
        let (value, gate) = {
            let state = self.state.lock();
            (state.names.get(name_key).cloned(), state.resolve_gate.clone())
        };
        if let Some(gate) = gate {
            gate.wait().await;
        }
        value.ok_or_else(|| StoreError::NotFound(format!("could not resolve name {}", name_key)))
    }

    async fn publish(&self, cid: &str, _allow_offline: bool) -> Result<String, StoreError> {
        let cid = strip_ipfs_path(cid);
        let mut state = self.state.lock();
        if !state.blobs.contains_key(cid) {
            return Err(StoreError::NotFound(cid.to_owned()));
        }
        state.names.insert(self.key.clone(), cid.to_owned());
        Ok(self.key.clone())
    }

    async fn peers(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.state.lock().peers.clone())
    }
}

use crate::errors::NameError;
use bytes::Bytes;
use std::collections::BTreeMap;

/// Serialized as a flat JSON object, reference to root handle
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameMap {
    entries: BTreeMap<String, String>,
}

impl NameMap {
    pub fn new() -> Self {
        NameMap::default()
    }

    pub fn decode(data: &[u8]) -> Result<Self, NameError> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn encode(&self) -> Result<Bytes, NameError> {
        Ok(Bytes::from(serde_json::to_vec(&self.entries)?))
    }

    pub fn get(&self, reference: &str) -> Option<&str> {
        self.entries.get(reference).map(String::as_str)
    }

    /// Returns the handle this replaced, if any
    pub fn insert(&mut self, reference: String, cid: String) -> Option<String> {
        self.entries.insert(reference, cid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

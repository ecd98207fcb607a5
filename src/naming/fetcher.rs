use crate::{
    consts::{CID_MAPPER_SECRET_KEY, CID_MAPPER_SECRET_NAME},
    errors::NameError,
    naming::{Fetcher, KeyPersister},
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{ObjectMeta, Patch, PatchParams, PostParams},
    Api, Client,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Naming key stored in a cluster secret
#[derive(Clone)]
pub struct SecretFetcher {
    api: Api<Secret>,
    namespace: String,
    name: String,
    field: String,
}

impl SecretFetcher {
    /// The well-known secret in `namespace`
    pub fn new(client: Client, namespace: &str) -> Self {
        SecretFetcher {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_owned(),
            name: CID_MAPPER_SECRET_NAME.to_owned(),
            field: CID_MAPPER_SECRET_KEY.to_owned(),
        }
    }

    /// Connect with the ambient kubeconfig or in-cluster service account
    pub async fn try_default(namespace: &str) -> Result<Self, NameError> {
        Ok(SecretFetcher::new(Client::try_default().await?, namespace))
    }

    fn describe(&self) -> String {
        format!("{}/{} field {}", self.namespace, self.name, self.field)
    }
}

#[async_trait]
impl Fetcher for SecretFetcher {
    async fn fetch(&self) -> Result<String, NameError> {
        let secret = self
            .api
            .get_opt(&self.name)
            .await?
            .ok_or_else(|| NameError::MissingKey(self.describe()))?;
        let value = secret
            .data
            .as_ref()
            .and_then(|data| data.get(&self.field))
            .ok_or_else(|| NameError::MissingKey(self.describe()))?;
        String::from_utf8(value.0.clone())
            .map_err(|_| NameError::Fetch(format!("{} is not utf-8", self.describe())))
    }
}

#[async_trait]
impl KeyPersister for SecretFetcher {
    async fn persist(&self, key: &str) -> Result<(), NameError> {
        let mut string_data = BTreeMap::new();
        string_data.insert(self.field.clone(), key.to_owned());
        if self.api.get_opt(&self.name).await?.is_some() {
            let patch = serde_json::json!({ "stringData": string_data });
            self.api
                .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
        } else {
            let secret = Secret {
                metadata: ObjectMeta {
                    name: Some(self.name.clone()),
                    namespace: Some(self.namespace.clone()),
                    ..ObjectMeta::default()
                },
                string_data: Some(string_data),
                ..Secret::default()
            };
            self.api.create(&PostParams::default(), &secret).await?;
        }
        log::info!("stored naming key {} in {}", key, self.describe());
        Ok(())
    }
}

/// A naming key known up front
#[derive(Clone, Debug)]
pub struct StaticFetcher(pub String);

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self) -> Result<String, NameError> {
        Ok(self.0.clone())
    }
}

/// Naming key slot held in memory
#[derive(Debug, Default)]
pub struct MemoryKeys {
    key: Mutex<Option<String>>,
}

impl MemoryKeys {
    pub fn new() -> Self {
        MemoryKeys::default()
    }

    pub fn with_key(key: &str) -> Self {
        MemoryKeys {
            key: Mutex::new(Some(key.to_owned())),
        }
    }
}

#[async_trait]
impl Fetcher for MemoryKeys {
    async fn fetch(&self) -> Result<String, NameError> {
        self.key
            .lock()
            .clone()
            .ok_or_else(|| NameError::MissingKey("no key persisted".to_owned()))
    }
}

#[async_trait]
impl KeyPersister for MemoryKeys {
    async fn persist(&self, key: &str) -> Result<(), NameError> {
        *self.key.lock() = Some(key.to_owned());
        Ok(())
    }
}

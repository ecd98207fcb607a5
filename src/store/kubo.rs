use crate::{
    consts::DEFAULT_IPFS_API,
    errors::StoreError,
    store::{strip_ipfs_path, AddOptions, ContentStore},
};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::HeaderValue;
use reqwest::multipart;
use url::Url;

/// Builder for configuring custom [KuboStore] instances
#[derive(Debug)]
pub struct KuboStoreBuilder {
    req: reqwest::ClientBuilder,
    api_url: String,
}

impl Default for KuboStoreBuilder {
    fn default() -> Self {
        KuboStoreBuilder::new()
    }
}

impl KuboStoreBuilder {
    pub fn new() -> Self {
        KuboStoreBuilder {
            req: reqwest::Client::builder().user_agent(KuboStore::default_user_agent()),
            api_url: DEFAULT_IPFS_API.to_owned(),
        }
    }

    /// Base URL of the node's RPC API, like `http://127.0.0.1:5001`
    pub fn api_url(mut self, url: &str) -> Self {
        self.api_url = url.to_owned();
        self
    }

    pub fn build(self) -> Result<KuboStore, StoreError> {
        let mut base =
            Url::parse(&self.api_url).map_err(|_| StoreError::InvalidApiUrl(self.api_url.clone()))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::InvalidApiUrl(self.api_url));
        }
        base.set_path("/api/v0/");
        log::info!("using content store api at {}", base);
        Ok(KuboStore {
            base,
            req: self.req.build()?,
        })
    }
}

/// Content store reached through a Kubo node's HTTP RPC API
#[derive(Clone, Debug)]
pub struct KuboStore {
    base: Url,
    req: reqwest::Client,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Deserialize)]
struct ResolveResponse {
    #[serde(rename = "Path")]
    path: String,
}

#[derive(Deserialize)]
struct PublishResponse {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Deserialize)]
struct PeersResponse {
    #[serde(rename = "Peers", default)]
    peers: Option<Vec<PeerInfo>>,
}

#[derive(Deserialize)]
struct PeerInfo {
    #[serde(rename = "Peer")]
    peer: String,
}

impl KuboStore {
    /// Connect to the default local API address
    pub fn new() -> Result<KuboStore, StoreError> {
        KuboStore::builder().build()
    }

    pub fn builder() -> KuboStoreBuilder {
        KuboStoreBuilder::new()
    }

    pub fn default_user_agent() -> HeaderValue {
        static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        HeaderValue::from_static(USER_AGENT)
    }

    fn endpoint(&self, endpoint: &str) -> Result<Url, StoreError> {
        self.base
            .join(endpoint)
            .map_err(|_| StoreError::InvalidApiUrl(endpoint.to_owned()))
    }

    /// Every RPC call is a POST; failures carry a JSON `Message`
    async fn call(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        form: Option<multipart::Form>,
    ) -> Result<Bytes, StoreError> {
        let mut request = self.req.post(self.endpoint(endpoint)?).query(query);
        if let Some(form) = form {
            request = request.multipart(form);
        }
        log::debug!("store rpc {} {:?}", endpoint, query);
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if status.is_success() {
            return Ok(body);
        }
        let message = match serde_json::from_slice::<RpcError>(&body) {
            Ok(err) => err.message,
            Err(_) => String::from_utf8_lossy(&body).into_owned(),
        };
        let lowered = message.to_lowercase();
        if lowered.contains("not found") || lowered.contains("could not resolve") {
            Err(StoreError::NotFound(message))
        } else {
            Err(StoreError::Rpc {
                endpoint: endpoint.to_owned(),
                status: status.as_u16(),
                message,
            })
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(endpoint: &str, body: &[u8]) -> Result<T, StoreError> {
        serde_json::from_slice(body).map_err(|err| StoreError::UnexpectedResponse {
            endpoint: endpoint.to_owned(),
            detail: err.to_string(),
        })
    }
}

#[async_trait]
impl ContentStore for KuboStore {
    async fn add(&self, data: Bytes, options: &AddOptions) -> Result<String, StoreError> {
        let size = data.len();
        let part = multipart::Part::stream(data).file_name("blob");
        let form = multipart::Form::new().part("file", part);
        let pin = options.pin.to_string();
        let cid_version = options.cid_version.to_string();
        let body = self
            .call(
                "add",
                &[
                    ("pin", pin.as_str()),
                    ("cid-version", cid_version.as_str()),
                    ("quieter", "true"),
                ],
                Some(form),
            )
            .await?;
        // Progress and results arrive as one JSON object per line
        let last = body
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .last()
            .ok_or_else(|| StoreError::UnexpectedResponse {
                endpoint: "add".to_owned(),
                detail: "empty response".to_owned(),
            })?;
        let added: AddResponse = KuboStore::decode("add", last)?;
        log::debug!("added {} bytes as {}", size, added.hash);
        Ok(added.hash)
    }

    async fn get(&self, cid: &str) -> Result<Bytes, StoreError> {
        self.call("cat", &[("arg", cid)], None).await
    }

    async fn resolve(&self, name_key: &str) -> Result<String, StoreError> {
        let body = self.call("name/resolve", &[("arg", name_key)], None).await?;
        let resolved: ResolveResponse = KuboStore::decode("name/resolve", &body)?;
        Ok(strip_ipfs_path(&resolved.path).to_owned())
    }

    async fn publish(&self, cid: &str, allow_offline: bool) -> Result<String, StoreError> {
        let path = format!("/ipfs/{}", strip_ipfs_path(cid));
        let allow_offline = allow_offline.to_string();
        let body = self
            .call(
                "name/publish",
                &[("arg", path.as_str()), ("allow-offline", allow_offline.as_str())],
                None,
            )
            .await?;
        let published: PublishResponse = KuboStore::decode("name/publish", &body)?;
        log::info!("published {} under {}", path, published.name);
        Ok(published.name)
    }

    async fn peers(&self) -> Result<Vec<String>, StoreError> {
        let body = self.call("swarm/peers", &[], None).await?;
        let peers: PeersResponse = KuboStore::decode("swarm/peers", &body)?;
        Ok(peers
            .peers
            .unwrap_or_default()
            .into_iter()
            .map(|info| info.peer)
            .collect())
    }
}

use crate::{
    errors::ImageError,
    image::Registry,
    remote::{auth::Auth, PlatformSelector, RegistryClient},
};
use reqwest::{Client, ClientBuilder};
use std::{collections::HashSet, sync::Arc};

/// Builder for configuring custom [RegistryClient] instances
pub struct RegistryClientBuilder {
    auth: Auth,
    network: ClientBuilder,
    allowed_registries: Option<HashSet<Registry>>,
    allow_http_registries: bool,
    platform: PlatformSelector,
}

impl Default for RegistryClientBuilder {
    fn default() -> Self {
        RegistryClientBuilder::new()
    }
}

impl RegistryClientBuilder {
    /// Start constructing a custom registry client
    pub fn new() -> Self {
        RegistryClientBuilder {
            network: Client::builder().user_agent(RegistryClient::default_user_agent()),
            auth: Auth::new(),
            allowed_registries: None,
            allow_http_registries: true,
            platform: PlatformSelector::default(),
        }
    }

    /// Disallow connecting to registries via HTTP
    ///
    /// The way Docker parses image names, values like `localhost/blah` or
    /// `dev:5000/foo` will be interpreted as hosts to contact over unencrypted
    /// HTTP. This setting disallows such registries.
    pub fn disallow_http(mut self) -> Self {
        self.allow_http_registries = false;
        self
    }

    /// Set a list of allowed registry servers
    ///
    /// All connections will be checked against this list. The default registry
    /// is not automatically added to the list. If no allowed registry list is
    /// set, any server will be allowed.
    pub fn allow_only_connections_to(mut self, allowed: HashSet<Registry>) -> Self {
        self.allowed_registries = Some(allowed);
        self
    }

    /// Which manifest to take when a reference names a multi-platform index
    ///
    /// Defaults to linux on amd64.
    pub fn platform(mut self, os: &str, architecture: &str, variant: Option<&str>) -> Self {
        self.platform = PlatformSelector {
            os: os.to_owned(),
            architecture: architecture.to_owned(),
            variant: variant.map(str::to_owned),
        };
        self
    }

    /// Construct a RegistryClient using the parameters from this Builder
    pub fn build(self) -> Result<RegistryClient, ImageError> {
        Ok(RegistryClient {
            auth: Arc::new(self.auth),
            req: self.network.build()?,
            default_registry: RegistryClient::default_registry(),
            allowed_registries: self.allowed_registries,
            allow_http_registries: self.allow_http_registries,
            platform: self.platform,
        })
    }
}

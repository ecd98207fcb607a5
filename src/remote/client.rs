use crate::{
    errors::ImageError,
    image::{ContentDigest, DefaultRegistry, ImageName, Layer, MemoryImage, Registry, Repository},
    manifest::{media_types, Descriptor, ImageIndex, Manifest},
    remote::{auth::Auth, RegistryClientBuilder},
};
use bytes::Bytes;
use futures_util::future::try_join_all;
use http::header::HeaderValue;
use reqwest::{header, StatusCode};
use std::{collections::HashSet, fmt, sync::Arc};

/// Every manifest flavor we know how to ingest or select from
const MANIFEST_ACCEPT: &str = concat!(
    "application/vnd.oci.image.manifest.v1+json, ",
    "application/vnd.oci.image.index.v1+json, ",
    "application/vnd.docker.distribution.manifest.v2+json, ",
    "application/vnd.docker.distribution.manifest.list.v2+json"
);

/// Platform used to pick one manifest out of an index
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlatformSelector {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
}

impl Default for PlatformSelector {
    fn default() -> Self {
        PlatformSelector {
            os: "linux".to_owned(),
            architecture: "amd64".to_owned(),
            variant: None,
        }
    }
}

impl fmt::Display for PlatformSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

/// Registry clients download whole images into memory, ready for ingestion
///
/// Each client includes settings like authentication, default server, and
/// platform. One client can be used to download multiple images from
/// multiple registries, and clones share login tokens.
#[derive(Clone)]
pub struct RegistryClient {
    pub(crate) auth: Arc<Auth>,
    pub(crate) req: reqwest::Client,
    pub(crate) default_registry: DefaultRegistry,
    pub(crate) allowed_registries: Option<HashSet<Registry>>,
    pub(crate) allow_http_registries: bool,
    pub(crate) platform: PlatformSelector,
}

struct Location<'a> {
    image: &'a ImageName,
    registry: Registry,
    repository: Repository,
}

impl<'a> Location<'a> {
    fn url(&self, kind: &str, reference: &str) -> String {
        format!(
            "{}://{}/v2/{}/{}/{}",
            self.registry.protocol_str(),
            self.registry,
            self.repository,
            kind,
            reference
        )
    }
}

impl RegistryClient {
    /// Construct a new registry client with default options
    pub fn new() -> Result<RegistryClient, ImageError> {
        RegistryClient::builder().build()
    }

    /// Construct a registry client with custom options, via RegistryClientBuilder
    pub fn builder() -> RegistryClientBuilder {
        RegistryClientBuilder::new()
    }

    /// Return the default `User-Agent` that we use if no other is set
    pub fn default_user_agent() -> HeaderValue {
        static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        HeaderValue::from_static(USER_AGENT)
    }

    /// Return the default registry server
    ///
    /// This is the server used when nothing else has been specified either in
    /// [ImageName] or [RegistryClientBuilder].
    pub fn default_registry() -> DefaultRegistry {
        DefaultRegistry::new()
    }

    fn is_registry_allowed(&self, registry: &Registry) -> bool {
        (self.allow_http_registries || registry.is_https())
            && match &self.allowed_registries {
                None => true,
                Some(allow_list) => allow_list.contains(registry),
            }
    }

    /// GET with our token, answering at most one auth challenge
    async fn get(
        &self,
        registry: &Registry,
        url: &str,
        accept: Option<&str>,
    ) -> Result<reqwest::Response, ImageError> {
        let mut challenged = false;
        loop {
            let req = self.req.get(url);
            let req = match accept {
                Some(accept) => req.header(header::ACCEPT, accept),
                None => req,
            };
            let response = self.auth.include_token(registry, req).send().await?;
            if response.status() == StatusCode::UNAUTHORIZED && !challenged {
                if let Some(challenge) = response.headers().get(header::WWW_AUTHENTICATE) {
                    let challenge = challenge.to_str().map_err(|_| {
                        ImageError::UnsupportedAuthentication(format!("{:?}", challenge))
                    })?;
                    self.auth
                        .authenticate_for(registry, &self.req, challenge)
                        .await?;
                    challenged = true;
                    continue;
                }
            }
            return Ok(response.error_for_status()?);
        }
    }

    async fn pull_manifest_bytes(
        &self,
        location: &Location<'_>,
        reference: &str,
        expected: Option<&ContentDigest>,
    ) -> Result<(Bytes, String), ImageError> {
        let url = location.url("manifests", reference);
        log::info!("{} <{}> downloading manifest...", location.image, url);
        let response = self
            .get(&location.registry, &url, Some(MANIFEST_ACCEPT))
            .await?;
        let header_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_owned());
        let data = response.bytes().await?;
        if let Some(expected) = expected {
            expected.verify(&data)?;
        }
        let media_type = match header_type {
            Some(media_type)
                if media_types::is_manifest(&media_type) || media_types::is_index(&media_type) =>
            {
                media_type
            }
            _ => sniff_media_type(&data)?,
        };
        log::trace!("raw json manifest, {}", String::from_utf8_lossy(&data));
        Ok((data, media_type))
    }

    /// An index resolves to the one manifest matching our platform
    async fn pull_manifest(&self, location: &Location<'_>) -> Result<Manifest, ImageError> {
        let version = location.image.version();
        let (data, media_type) = self
            .pull_manifest_bytes(location, version.as_str(), version.content_digest())
            .await?;
        if media_types::is_manifest(&media_type) {
            return Ok(serde_json::from_slice(&data)?);
        }
        if !media_types::is_index(&media_type) {
            return Err(ImageError::UnsupportedManifestType(media_type));
        }
        let index: ImageIndex = serde_json::from_slice(&data)?;
        let platform = &self.platform;
        let chosen = index
            .manifests
            .iter()
            .find(|descriptor| match &descriptor.platform {
                Some(p) => {
                    p.matches(&platform.os, &platform.architecture, platform.variant.as_deref())
                }
                None => false,
            })
            .ok_or_else(|| ImageError::NoMatchingPlatform(platform.to_string()))?;
        log::debug!("{} selected {} for {}", location.image, chosen.digest, platform);
        let (data, media_type) = self
            .pull_manifest_bytes(location, chosen.digest.as_str(), Some(&chosen.digest))
            .await?;
        if media_types::is_manifest(&media_type) {
            Ok(serde_json::from_slice(&data)?)
        } else {
            Err(ImageError::UnsupportedManifestType(media_type))
        }
    }

    async fn pull_blob(
        &self,
        location: &Location<'_>,
        descriptor: &Descriptor,
    ) -> Result<Bytes, ImageError> {
        let url = location.url("blobs", descriptor.digest.as_str());
        log::info!("{} downloading {} bytes ...", location.image, descriptor.size);
        let data = self.get(&location.registry, &url, None).await?.bytes().await?;
        if data.len() as u64 != descriptor.size {
            return Err(ImageError::UnexpectedContentSize(descriptor.digest.clone()));
        }
        descriptor.digest.verify(&data)?;
        log::debug!("{} downloaded, {} bytes", descriptor.digest, data.len());
        Ok(data)
    }

    /// Download an image into memory
    ///
    /// If the name carries a content digest, the manifest must match it.
    /// Every blob is checked against its descriptor's size and digest.
    pub async fn pull(&self, image: &ImageName) -> Result<MemoryImage, ImageError> {
        let (registry, repository) = self.default_registry.resolve_image_name(image);
        if !self.is_registry_allowed(&registry) {
            log::warn!("registry {} not allowed by configuration", registry);
            return Err(ImageError::RegistryNotAllowed(registry));
        }
        let location = Location {
            image,
            registry,
            repository,
        };
        let manifest = self.pull_manifest(&location).await?;
        let config = self.pull_blob(&location, &manifest.config).await?;
        let layers = try_join_all(manifest.layers.iter().map(|descriptor| {
            let location = &location;
            async move {
                let data = self.pull_blob(location, descriptor).await?;
                Ok::<_, ImageError>(Layer {
                    descriptor: descriptor.clone(),
                    data,
                })
            }
        }))
        .await?;
        log::info!("{} pulled with {} layers", image, layers.len());
        Ok(MemoryImage::new(manifest, config, layers))
    }
}

#[derive(Deserialize)]
struct MediaTypeOnly {
    #[serde(rename = "mediaType", default)]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Option<serde_json::Value>,
}

/// Registries don't always label manifests, so fall back to the body
fn sniff_media_type(data: &[u8]) -> Result<String, ImageError> {
    let sniffed: MediaTypeOnly = serde_json::from_slice(data)?;
    Ok(match (sniffed.media_type, sniffed.manifests) {
        (Some(media_type), _) => media_type,
        (None, Some(_)) => media_types::OCI_INDEX.to_owned(),
        (None, None) => media_types::OCI_MANIFEST.to_owned(),
    })
}

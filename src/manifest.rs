//! OCI records: descriptors, manifests, indexes, and the pointer records
//! that tie a stored image graph together

use crate::{errors::GraphError, image::ContentDigest};
use serde_json::Value;
use std::collections::BTreeMap;

pub mod media_types {
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
    pub const OCI_LAYER_TAR_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";
    pub const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
    pub const DOCKER_LAYER_TAR: &str = "application/vnd.docker.image.rootfs.diff.tar";
    pub const DOCKER_LAYER_TAR_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
    pub const OCTET_STREAM: &str = "application/octet-stream";

    pub fn is_manifest(media_type: &str) -> bool {
        media_type == OCI_MANIFEST || media_type == DOCKER_MANIFEST
    }

    pub fn is_index(media_type: &str) -> bool {
        media_type == OCI_INDEX || media_type == DOCKER_MANIFEST_LIST
    }
}

/// Annotation naming one image within an OCI layout
pub const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

/// Scheme of every content locator this crate writes
pub const LOCATOR_SCHEME: &str = "ipfs";

/// Reference to one piece of content by type, digest, and size
///
/// Fields we don't interpret (annotations, for example) survive a
/// deserialize and serialize cycle unchanged.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: ContentDigest,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Descriptor {
    pub fn new(media_type: &str, content: &[u8]) -> Self {
        Descriptor {
            media_type: media_type.to_owned(),
            digest: ContentDigest::from_content(content),
            size: content.len() as u64,
            urls: Vec::new(),
            platform: None,
            extra: BTreeMap::new(),
        }
    }

    /// Point this descriptor at a single stored copy of its content
    pub fn locate(&mut self, cid: &str) {
        self.urls = vec![locator(cid)];
    }

    /// The content identifier behind this descriptor's only locator
    pub fn cid(&self) -> Result<String, GraphError> {
        parse_locators(&self.urls)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.extra
            .get("annotations")
            .and_then(|annotations| annotations.get(key))
            .and_then(Value::as_str)
    }
}

/// Target platform of one manifest in an index
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Platform {
    /// A requested variant must match; an absent one matches anything
    pub fn matches(&self, os: &str, architecture: &str, variant: Option<&str>) -> bool {
        self.os == os
            && self.architecture == architecture
            && (variant.is_none() || self.variant.as_deref() == variant)
    }
}

/// Image manifest, in either the OCI or the Docker schema2 flavor
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Manifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Manifest {
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Manifest {
            schema_version: 2,
            media_type: Some(media_types::OCI_MANIFEST.to_owned()),
            config,
            layers,
            extra: BTreeMap::new(),
        }
    }

    /// OCI manifests may omit their media type
    pub fn media_type(&self) -> &str {
        self.media_type
            .as_deref()
            .unwrap_or(media_types::OCI_MANIFEST)
    }
}

/// Image index, or a Docker manifest list
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ImageIndex {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ImageIndex {
    /// Index holding a single manifest
    pub fn single(manifest: Descriptor) -> Self {
        ImageIndex {
            schema_version: 2,
            media_type: Some(media_types::OCI_INDEX.to_owned()),
            manifests: vec![manifest],
            extra: BTreeMap::new(),
        }
    }
}

/// The outermost record of a stored image, pointing at its index
///
/// Its content identifier is the root handle for the whole image.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PointerRecord {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: ContentDigest,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

impl From<&Descriptor> for PointerRecord {
    fn from(descriptor: &Descriptor) -> Self {
        PointerRecord {
            media_type: descriptor.media_type.clone(),
            digest: descriptor.digest.clone(),
            size: descriptor.size,
            urls: descriptor.urls.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StepEntry {
    #[serde(rename = "mediaType", default)]
    media_type: Option<String>,
    #[serde(default)]
    digest: Option<ContentDigest>,
    #[serde(default)]
    urls: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct StepRecord {
    #[serde(flatten)]
    direct: StepEntry,
    #[serde(default)]
    manifests: Vec<StepEntry>,
}

/// Where one step down the graph leads
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub cid: String,
    pub digest: ContentDigest,
    pub media_type: String,
}

impl Step {
    /// Decode a record that points one level further down
    ///
    /// Pointer records carry `digest` and `urls` directly. Indexes carry a
    /// single entry under `manifests`, and that entry's own media type names
    /// the content it points at.
    pub fn decode(record: &[u8]) -> Result<Step, GraphError> {
        let record: StepRecord = serde_json::from_slice(record)?;
        let record_type = record.direct.media_type;
        let (entry_type, digest, urls) = match (record.direct.urls, record.manifests.len()) {
            (Some(urls), _) => (None, record.direct.digest, urls),
            (None, 1) => {
                let entry = record
                    .manifests
                    .into_iter()
                    .next()
                    .ok_or(GraphError::UnrecognizedRecord)?;
                (entry.media_type, entry.digest, entry.urls.unwrap_or_default())
            }
            _ => return Err(GraphError::UnrecognizedRecord),
        };
        let digest = digest.ok_or(GraphError::UnrecognizedRecord)?;
        let media_type = entry_type
            .or(record_type)
            .unwrap_or_else(|| media_types::OCTET_STREAM.to_owned());
        Ok(Step {
            cid: parse_locators(&urls)?,
            digest,
            media_type,
        })
    }
}

/// Locator for a stored content identifier
pub fn locator(cid: &str) -> String {
    format!("{}://{}", LOCATOR_SCHEME, cid)
}

/// The content identifier named by a descriptor's single locator
pub fn parse_locators(urls: &[String]) -> Result<String, GraphError> {
    match urls {
        [only] => {
            let url = url::Url::parse(only)
                .map_err(|_| GraphError::UnsupportedLocator(only.clone()))?;
            if url.scheme() != LOCATOR_SCHEME {
                return Err(GraphError::UnsupportedLocator(only.clone()));
            }
            match url.host_str() {
                Some(host) if !host.is_empty() => Ok(host.to_owned()),
                _ => Err(GraphError::UnsupportedLocator(only.clone())),
            }
        }
        _ => Err(GraphError::LocatorCount(urls.len())),
    }
}

//! Error types you might see while ingesting, serving, or naming images

use crate::image::{ContentDigest, Registry};
use thiserror::Error;

/// Broad failure classes, used to choose how a failure is reported
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Talking to the content store or another service failed
    Io,
    /// Stored records don't have the shape we wrote
    Integrity,
    /// A reference or digest has no content behind it
    NotFound,
    /// The store isn't connected to any peers yet
    Readiness,
    /// The caller gave us something unparseable
    Invalid,
}

/// Errors while parsing image references or loading image content
#[derive(Error, Debug)]
pub enum ImageError {
    /// invalid image reference format
    #[error("invalid image reference format: {0:?}")]
    InvalidReferenceFormat(String),

    /// storage io error
    #[error("storage io error: {0}")]
    Storage(#[from] std::io::Error),

    /// json error
    #[error("json error: {0}")]
    JSON(#[from] serde_json::Error),

    /// network request error
    #[error("network request error: {0}")]
    NetworkRequest(#[from] reqwest::Error),

    /// registry server is not allowed by the current configuration
    #[error("registry server is not allowed by the current configuration: {0}")]
    RegistryNotAllowed(Registry),

    /// registry server requested an unsupported type of authentication
    #[error("registry server requested an unsupported type of authentication: {0:?}")]
    UnsupportedAuthentication(String),

    /// unsupported manifest type
    #[error("unsupported manifest type, {0:?}")]
    UnsupportedManifestType(String),

    /// no manifest in the index matches the requested platform
    #[error("no manifest matches platform {0}")]
    NoMatchingPlatform(String),

    /// only sha256 content digests can be verified
    #[error("unsupported digest format, {0:?}")]
    UnsupportedDigestFormat(String),

    /// unexpected content size
    #[error("unexpected content size for {0}")]
    UnexpectedContentSize(ContentDigest),

    /// a tarball that isn't a docker save or OCI archive
    #[error("invalid image archive {path:?}: {reason}")]
    InvalidArchive { path: String, reason: String },

    /// the layout has no images in its index
    #[error("image layout at {0:?} contains no images")]
    EmptyLayout(String),

    /// calculated digest of downloaded content is not what we asked for
    #[error("calculated digest of content is not what we asked for, expected {expected}, found {found}")]
    ContentDigestMismatch {
        expected: ContentDigest,
        found: ContentDigest,
    },
}

/// Errors from the content store client
#[derive(Error, Debug)]
pub enum StoreError {
    /// network request error
    #[error("network request error: {0}")]
    NetworkRequest(#[from] reqwest::Error),

    /// the store rejected an RPC call
    #[error("store rpc {endpoint} failed with status {status}: {message}")]
    Rpc {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// content or name doesn't exist in the store
    #[error("not found in store: {0}")]
    NotFound(String),

    /// invalid content identifier
    #[error("invalid content identifier: {0:?}")]
    InvalidCid(String),

    /// invalid store api url
    #[error("invalid store api url: {0:?}")]
    InvalidApiUrl(String),

    /// the store answered with something we can't interpret
    #[error("unexpected store response from {endpoint}: {detail}")]
    UnexpectedResponse { endpoint: String, detail: String },

    /// json error
    #[error("json error: {0}")]
    JSON(#[from] serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::InvalidCid(_) => ErrorKind::Invalid,
            _ => ErrorKind::Io,
        }
    }
}

/// Errors while writing or walking the stored image graph
#[derive(Error, Debug)]
pub enum GraphError {
    /// content store error
    #[error("content store error: {0}")]
    Store(#[from] StoreError),

    /// a stored record failed to decode
    #[error("json error: {0}")]
    JSON(#[from] serde_json::Error),

    /// error in the image being ingested
    #[error("image error: {0}")]
    Image(#[from] ImageError),

    /// a manifest descriptor has no matching written content
    #[error("descriptor {0} not found in the content table")]
    MissingContent(ContentDigest),

    /// descriptors must carry exactly one locator
    #[error("expected a single content locator, got {0}")]
    LocatorCount(usize),

    /// locator that isn't an ipfs url
    #[error("unsupported content locator {0:?}")]
    UnsupportedLocator(String),

    /// pointer record with neither direct urls nor a single manifest
    #[error("unrecognized pointer record shape")]
    UnrecognizedRecord,

    /// root handle that isn't a content identifier
    #[error("invalid root handle {0:?}")]
    InvalidRoot(String),

    /// reference that is neither `latest` nor a digest
    #[error("reference must either be 'latest' or a valid digest: {0:?}")]
    InvalidReference(String),

    /// the walk ended without meeting the digest
    #[error("didn't find desired digest {0}")]
    NotFound(ContentDigest),
}

impl GraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::Store(err) => err.kind(),
            GraphError::Image(_) => ErrorKind::Io,
            GraphError::JSON(_)
            | GraphError::MissingContent(_)
            | GraphError::LocatorCount(_)
            | GraphError::UnsupportedLocator(_)
            | GraphError::UnrecognizedRecord => ErrorKind::Integrity,
            GraphError::InvalidRoot(_) | GraphError::InvalidReference(_) => ErrorKind::Invalid,
            GraphError::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

/// Errors from the reference naming service
#[derive(Error, Debug)]
pub enum NameError {
    /// naming records are unreliable until the store has peers
    #[error("swarm not initialized yet, naming records cannot be resolved")]
    NotPeered,

    /// gave up waiting for the store to find peers
    #[error("timed out waiting to join a swarm")]
    Timeout,

    /// no naming key has been persisted yet
    #[error("naming key is missing: {0}")]
    MissingKey(String),

    /// naming key couldn't be read
    #[error("fetching naming key: {0}")]
    Fetch(String),

    /// content store error
    #[error("content store error: {0}")]
    Store(#[from] StoreError),

    /// the name map failed to decode
    #[error("json error: {0}")]
    JSON(#[from] serde_json::Error),

    /// the reference isn't a valid image name
    #[error("invalid image reference: {0}")]
    Reference(#[from] ImageError),

    /// no entry for this reference
    #[error("cid does not exist for reference {0}")]
    NotFound(String),

    /// kubernetes api error
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
}

impl NameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NameError::NotPeered | NameError::Timeout => ErrorKind::Readiness,
            NameError::NotFound(_) | NameError::MissingKey(_) => ErrorKind::NotFound,
            NameError::Store(err) => err.kind(),
            NameError::JSON(_) => ErrorKind::Integrity,
            NameError::Reference(_) => ErrorKind::Invalid,
            NameError::Fetch(_) | NameError::Kube(_) => ErrorKind::Io,
        }
    }
}

/// Errors while handling a single admission request
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// admission review without a request
    #[error("admission review has no request")]
    MissingRequest,

    /// admission request without an object
    #[error("admission request has no object")]
    MissingObject,

    /// the object isn't a pod
    #[error("decoding pod: {0}")]
    Decode(#[source] serde_json::Error),

    /// the patch couldn't be encoded
    #[error("encoding patch: {0}")]
    Encode(#[source] serde_json::Error),
}

impl AdmissionError {
    /// HTTP-style status code reported inside an errored admission response
    pub fn code(&self) -> u16 {
        match self {
            AdmissionError::Encode(_) => 500,
            _ => 400,
        }
    }
}

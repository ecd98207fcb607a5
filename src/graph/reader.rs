use crate::{
    errors::GraphError,
    image::ContentDigest,
    manifest::{Manifest, Step},
    store::{parse_cid, ContentStore},
};
use async_trait::async_trait;
use bytes::Bytes;

static LATEST: &str = "latest";

/// Bytes found in a stored graph, with what they claim to be
#[derive(Clone, Debug)]
pub struct Content {
    pub data: Bytes,
    pub media_type: String,
    /// Known for everything except `latest` lookups
    pub digest: Option<ContentDigest>,
}

/// Everything a registry needs to read from stored images
#[async_trait]
pub trait Reader: Send + Sync {
    /// `reference` is either `latest` or a content digest
    async fn read_manifest(&self, root: &str, reference: &str) -> Result<Content, GraphError>;

    async fn read_blob(&self, root: &str, digest: &ContentDigest) -> Result<Content, GraphError>;
}

/// One record reached during a walk
struct Node {
    cid: String,
    digest: ContentDigest,
    media_type: String,
}

/// Walks stored image graphs in a content store
///
/// Content is served as stored, without re-hashing it against its digest.
pub struct GraphReader<S> {
    store: S,
}

impl<S: ContentStore> GraphReader<S> {
    pub fn new(store: S) -> Self {
        GraphReader { store }
    }

    fn check_root(root: &str) -> Result<(), GraphError> {
        parse_cid(root)
            .map(|_| ())
            .map_err(|_| GraphError::InvalidRoot(root.to_owned()))
    }

    async fn step(&self, cid: &str) -> Result<Step, GraphError> {
        let record = self.store.get(cid).await?;
        Step::decode(&record)
    }

    /// Visit index, manifest, config, and then each layer, stopping at the
    /// first node whose digest is `wanted`
    async fn find(&self, root: &str, wanted: &ContentDigest) -> Result<Node, GraphError> {
        let index = self.step(root).await?;
        if &index.digest == wanted {
            return Ok(node(index));
        }

        let manifest = self.step(&index.cid).await?;
        if &manifest.digest == wanted {
            return Ok(node(manifest));
        }

        let record = self.store.get(&manifest.cid).await?;
        let decoded: Manifest = serde_json::from_slice(&record)?;
        for descriptor in std::iter::once(&decoded.config).chain(decoded.layers.iter()) {
            let cid = descriptor.cid()?;
            if &descriptor.digest == wanted {
                return Ok(Node {
                    cid,
                    digest: descriptor.digest.clone(),
                    media_type: descriptor.media_type.clone(),
                });
            }
        }
        Err(GraphError::NotFound(wanted.clone()))
    }
}

fn node(step: Step) -> Node {
    Node {
        cid: step.cid,
        digest: step.digest,
        media_type: step.media_type,
    }
}

#[async_trait]
impl<S: ContentStore> Reader for GraphReader<S> {
    async fn read_manifest(&self, root: &str, reference: &str) -> Result<Content, GraphError> {
        Self::check_root(root)?;
        if reference == LATEST {
            // Exactly one hop, from the pointer record to the index
            let index = self.step(root).await?;
            return Ok(Content {
                data: self.store.get(&index.cid).await?,
                media_type: index.media_type,
                digest: None,
            });
        }
        let digest = ContentDigest::parse(reference)
            .map_err(|_| GraphError::InvalidReference(reference.to_owned()))?;
        self.read_blob(root, &digest).await
    }

    async fn read_blob(&self, root: &str, digest: &ContentDigest) -> Result<Content, GraphError> {
        Self::check_root(root)?;
        let found = self.find(root, digest).await?;
        log::debug!("{} in {} is stored as {}", digest, root, found.cid);
        Ok(Content {
            data: self.store.get(&found.cid).await?,
            media_type: found.media_type,
            digest: Some(found.digest),
        })
    }
}

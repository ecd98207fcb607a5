use crate::{
    errors::ImageError,
    image::{source::Layer, ContentDigest, MemoryImage},
    manifest::{media_types, Descriptor, ImageIndex, Manifest, REF_NAME_ANNOTATION},
};
use bytes::Bytes;
use std::path::{Path, PathBuf};

const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

/// An OCI image layout directory
///
/// `index.json` lists one manifest per image, and every blob lives at
/// `blobs/<algorithm>/<hex>`.
#[derive(Clone, Debug)]
pub struct OciLayout {
    root: PathBuf,
}

impl OciLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        OciLayout {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn blob_path(&self, digest: &ContentDigest) -> PathBuf {
        self.root
            .join("blobs")
            .join(digest.format_str())
            .join(digest.hex_str())
    }

    async fn blob(&self, descriptor: &Descriptor) -> Result<Bytes, ImageError> {
        let data = Bytes::from(tokio::fs::read(self.blob_path(&descriptor.digest)).await?);
        verified(descriptor, data)
    }

    /// Load every image in the layout, along with its reference name
    pub async fn images(&self) -> Result<Vec<(Option<String>, MemoryImage)>, ImageError> {
        let index_bytes = tokio::fs::read(self.root.join("index.json")).await?;
        let index: ImageIndex = serde_json::from_slice(&index_bytes)?;
        if index.manifests.is_empty() {
            return Err(ImageError::EmptyLayout(self.root.display().to_string()));
        }
        let mut images = Vec::with_capacity(index.manifests.len());
        for entry in &index.manifests {
            let name = entry_name(entry)?;
            log::debug!("loading {} from {}", entry.digest, self.root.display());
            images.push((name, self.image(entry).await?));
        }
        Ok(images)
    }

    async fn image(&self, entry: &Descriptor) -> Result<MemoryImage, ImageError> {
        let manifest: Manifest = serde_json::from_slice(&self.blob(entry).await?)?;
        let config = self.blob(&manifest.config).await?;
        let mut layers = Vec::with_capacity(manifest.layers.len());
        for descriptor in &manifest.layers {
            layers.push(Layer {
                data: self.blob(descriptor).await?,
                descriptor: descriptor.clone(),
            });
        }
        Ok(MemoryImage::new(manifest, config, layers))
    }
}

/// Blob bytes, checked against the descriptor that named them
pub(super) fn verified(descriptor: &Descriptor, data: Bytes) -> Result<Bytes, ImageError> {
    if data.len() as u64 != descriptor.size {
        return Err(ImageError::UnexpectedContentSize(descriptor.digest.clone()));
    }
    descriptor.digest.verify(&data)?;
    Ok(data)
}

/// Reference name of one index entry, which must be an image manifest
pub(super) fn entry_name(entry: &Descriptor) -> Result<Option<String>, ImageError> {
    if !media_types::is_manifest(&entry.media_type) {
        return Err(ImageError::UnsupportedManifestType(entry.media_type.clone()));
    }
    Ok(entry
        .annotation(REF_NAME_ANNOTATION)
        .or_else(|| entry.annotation(TITLE_ANNOTATION))
        .map(str::to_owned))
}

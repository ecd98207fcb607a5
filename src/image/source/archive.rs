use crate::{
    errors::ImageError,
    image::{
        source::{
            layout::{entry_name, verified},
            Layer,
        },
        MemoryImage,
    },
    manifest::{media_types, Descriptor, ImageIndex, Manifest},
};
use bytes::Bytes;
use std::{
    collections::HashMap,
    io::Read,
    path::{Path, PathBuf},
};
use tar::Archive;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One image listed in the `manifest.json` that `docker save` writes
#[derive(Debug, Deserialize)]
struct SavedImage {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "RepoTags", default)]
    repo_tags: Option<Vec<String>>,
    #[serde(rename = "Layers", default)]
    layers: Vec<String>,
}

/// An image tarball on disk
///
/// Either the output of `docker save`, listing its images in
/// `manifest.json`, or an OCI image layout packed into a tar file. When an
/// archive has both, `manifest.json` wins because it carries full
/// repository tags.
#[derive(Clone, Debug)]
pub struct ImageArchive {
    path: PathBuf,
}

impl ImageArchive {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        ImageArchive {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load every image in the archive, along with its reference name
    pub async fn images(&self) -> Result<Vec<(Option<String>, MemoryImage)>, ImageError> {
        let data = tokio::fs::read(&self.path).await?;
        let files = unpack(&data)?;
        log::debug!("{} files in {}", files.len(), self.path.display());
        if let Some(listing) = files.get("manifest.json") {
            self.saved_images(&files, listing)
        } else if let Some(index) = files.get("index.json") {
            self.layout_images(&files, index)
        } else {
            Err(self.invalid("no manifest.json or index.json"))
        }
    }

    fn invalid(&self, reason: &str) -> ImageError {
        ImageError::InvalidArchive {
            path: self.path.display().to_string(),
            reason: reason.to_owned(),
        }
    }

    fn file(&self, files: &HashMap<String, Bytes>, name: &str) -> Result<Bytes, ImageError> {
        files
            .get(normalize(name))
            .cloned()
            .ok_or_else(|| self.invalid(&format!("missing {}", name)))
    }

    fn saved_images(
        &self,
        files: &HashMap<String, Bytes>,
        listing: &[u8],
    ) -> Result<Vec<(Option<String>, MemoryImage)>, ImageError> {
        let saved: Vec<SavedImage> = serde_json::from_slice(listing)?;
        if saved.is_empty() {
            return Err(ImageError::EmptyLayout(self.path.display().to_string()));
        }
        let mut images = Vec::with_capacity(saved.len());
        for entry in saved {
            let config = self.file(files, &entry.config)?;
            let mut layers = Vec::with_capacity(entry.layers.len());
            for name in &entry.layers {
                let data = self.file(files, name)?;
                let media_type = if data.starts_with(&GZIP_MAGIC) {
                    media_types::DOCKER_LAYER_TAR_GZIP
                } else {
                    media_types::DOCKER_LAYER_TAR
                };
                layers.push(Layer {
                    descriptor: Descriptor::new(media_type, &data),
                    data,
                });
            }
            let mut manifest = Manifest::new(
                Descriptor::new(media_types::DOCKER_CONFIG, &config),
                layers.iter().map(|layer| layer.descriptor.clone()).collect(),
            );
            manifest.media_type = Some(media_types::DOCKER_MANIFEST.to_owned());
            let name = entry.repo_tags.and_then(|tags| tags.into_iter().next());
            log::debug!(
                "loading {} from {}",
                name.as_deref().unwrap_or(&entry.config),
                self.path.display()
            );
            images.push((name, MemoryImage::new(manifest, config, layers)));
        }
        Ok(images)
    }

    fn layout_images(
        &self,
        files: &HashMap<String, Bytes>,
        index: &[u8],
    ) -> Result<Vec<(Option<String>, MemoryImage)>, ImageError> {
        let index: ImageIndex = serde_json::from_slice(index)?;
        if index.manifests.is_empty() {
            return Err(ImageError::EmptyLayout(self.path.display().to_string()));
        }
        let blob = |descriptor: &Descriptor| {
            let path = format!(
                "blobs/{}/{}",
                descriptor.digest.format_str(),
                descriptor.digest.hex_str()
            );
            verified(descriptor, self.file(files, &path)?)
        };
        let mut images = Vec::with_capacity(index.manifests.len());
        for entry in &index.manifests {
            let name = entry_name(entry)?;
            let manifest: Manifest = serde_json::from_slice(&blob(entry)?)?;
            let config = blob(&manifest.config)?;
            let mut layers = Vec::with_capacity(manifest.layers.len());
            for descriptor in &manifest.layers {
                layers.push(Layer {
                    data: blob(descriptor)?,
                    descriptor: descriptor.clone(),
                });
            }
            images.push((name, MemoryImage::new(manifest, config, layers)));
        }
        Ok(images)
    }
}

/// Regular files in a tar stream, keyed by their normalized path
fn unpack(data: &[u8]) -> Result<HashMap<String, Bytes>, ImageError> {
    let mut files = HashMap::new();
    for entry in Archive::new(data).entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = normalize(&entry.path()?.to_string_lossy()).to_owned();
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents)?;
        files.insert(name, Bytes::from(contents));
    }
    Ok(files)
}

fn normalize(name: &str) -> &str {
    name.trim_start_matches("./").trim_start_matches('/')
}

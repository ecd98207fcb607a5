//! Images ready to be ingested

mod archive;
mod layout;

pub use archive::ImageArchive;
pub use layout::OciLayout;

use crate::{
    image::ContentDigest,
    manifest::{media_types, Descriptor, Manifest},
};
use bytes::Bytes;
use rand::RngCore;

/// One layer: its descriptor and its compressed bytes
#[derive(Clone, Debug)]
pub struct Layer {
    pub descriptor: Descriptor,
    pub data: Bytes,
}

/// Anything that can hand over a manifest, its raw config, and its layers
pub trait ImageSource: Send + Sync {
    fn manifest(&self) -> &Manifest;

    /// The config blob exactly as its digest was computed
    fn raw_config(&self) -> &Bytes;

    fn layers(&self) -> Vec<Layer>;
}

/// An image held entirely in memory
#[derive(Clone, Debug)]
pub struct MemoryImage {
    manifest: Manifest,
    config: Bytes,
    layers: Vec<Layer>,
}

impl MemoryImage {
    pub fn new(manifest: Manifest, config: Bytes, layers: Vec<Layer>) -> Self {
        MemoryImage {
            manifest,
            config,
            layers,
        }
    }

    /// Build an OCI manifest around a config blob and gzipped layer blobs
    pub fn from_blobs(config: Bytes, layers: Vec<Bytes>) -> Self {
        let layers: Vec<Layer> = layers
            .into_iter()
            .map(|data| Layer {
                descriptor: Descriptor::new(media_types::OCI_LAYER_TAR_GZIP, &data),
                data,
            })
            .collect();
        let manifest = Manifest::new(
            Descriptor::new(media_types::OCI_CONFIG, &config),
            layers.iter().map(|layer| layer.descriptor.clone()).collect(),
        );
        MemoryImage::new(manifest, config, layers)
    }

    /// An image with `count` layers of `layer_size` random bytes each
    ///
    /// The layers aren't real archives, which is fine for anything that
    /// only moves bytes around.
    pub fn random(layer_size: usize, count: usize) -> Self {
        let mut rng = rand::thread_rng();
        let layers: Vec<Bytes> = (0..count)
            .map(|_| {
                let mut data = vec![0u8; layer_size];
                rng.fill_bytes(&mut data);
                Bytes::from(data)
            })
            .collect();
        let diff_ids: Vec<String> = layers
            .iter()
            .map(|data| ContentDigest::from_content(data).to_string())
            .collect();
        let config = serde_json::json!({
            "architecture": "amd64",
            "os": "linux",
            "rootfs": { "type": "layers", "diff_ids": diff_ids },
            "config": {},
        });
        MemoryImage::from_blobs(Bytes::from(config.to_string()), layers)
    }

    pub fn manifest_mut(&mut self) -> &mut Manifest {
        &mut self.manifest
    }
}

impl ImageSource for MemoryImage {
    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn raw_config(&self) -> &Bytes {
        &self.config
    }

    fn layers(&self) -> Vec<Layer> {
        self.layers.clone()
    }
}

use crate::{
    errors::GraphError,
    image::{ContentDigest, ImageSource},
    manifest::{media_types, Descriptor, ImageIndex, PointerRecord},
    store::{AddOptions, ContentStore},
};
use bytes::Bytes;
use futures_util::{stream::FuturesUnordered, TryStreamExt};
use serde::Serialize;
use std::collections::HashMap;

/// Writes images into a content store as a linked graph of records
pub struct ImageWriter<S> {
    store: S,
    options: AddOptions,
}

impl<S: ContentStore> ImageWriter<S> {
    pub fn new(store: S) -> Self {
        ImageWriter {
            store,
            options: AddOptions::default(),
        }
    }

    /// Ingest an image, returning the root handle of the new graph
    ///
    /// Layers are written concurrently and the first failure is returned.
    /// Every call writes fresh index and pointer records, even when the
    /// same image was ingested before. An interrupted call can leave
    /// already-written blobs behind in the store.
    pub async fn add_image(&self, image: &dyn ImageSource) -> Result<String, GraphError> {
        let mut table = self.write_layers(image).await?;

        let manifest = image.manifest();
        let config_cid = self
            .store
            .add(image.raw_config().clone(), &self.options)
            .await?;
        log::debug!("config {} stored as {}", manifest.config.digest, config_cid);
        table.insert(manifest.config.digest.clone(), config_cid);

        // Decorate a copy, the caller's manifest stays as it was
        let mut decorated = manifest.clone();
        locate(&mut decorated.config, &table)?;
        for layer in decorated.layers.iter_mut() {
            locate(layer, &table)?;
        }

        let manifest_descriptor = self
            .write_record(decorated.media_type(), &decorated)
            .await?;
        let index_descriptor = self
            .write_record(
                media_types::OCI_INDEX,
                &ImageIndex::single(manifest_descriptor),
            )
            .await?;
        let root = self
            .write_record(media_types::OCI_INDEX, &PointerRecord::from(&index_descriptor))
            .await?;
        let root_cid = root.cid()?;
        log::info!(
            "stored image with {} layers, root {}",
            decorated.layers.len(),
            root_cid
        );
        Ok(root_cid)
    }

    async fn write_layers(
        &self,
        image: &dyn ImageSource,
    ) -> Result<HashMap<ContentDigest, String>, GraphError> {
        let writes: FuturesUnordered<_> = image
            .layers()
            .into_iter()
            .map(|layer| async move {
                let size = layer.data.len();
                let cid = self.store.add(layer.data, &self.options).await?;
                log::debug!(
                    "layer {} ({} bytes) stored as {}",
                    layer.descriptor.digest,
                    size,
                    cid
                );
                Ok::<_, GraphError>((layer.descriptor.digest, cid))
            })
            .collect();
        writes.try_collect().await
    }

    /// Serialize, digest, and store one record, describing where it went
    async fn write_record<T: Serialize>(
        &self,
        media_type: &str,
        record: &T,
    ) -> Result<Descriptor, GraphError> {
        let data = Bytes::from(serde_json::to_vec(record)?);
        let mut descriptor = Descriptor::new(media_type, &data);
        let cid = self.store.add(data, &self.options).await?;
        descriptor.locate(&cid);
        Ok(descriptor)
    }
}

fn locate(
    descriptor: &mut Descriptor,
    table: &HashMap<ContentDigest, String>,
) -> Result<(), GraphError> {
    match table.get(&descriptor.digest) {
        Some(cid) => {
            descriptor.locate(cid);
            Ok(())
        }
        None => Err(GraphError::MissingContent(descriptor.digest.clone())),
    }
}

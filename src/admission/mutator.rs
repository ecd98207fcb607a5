use crate::{
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
    consts::ADMISSION_TIMEOUT_SECS,
    errors::AdmissionError,
    naming::CidMapper,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use k8s_openapi::api::core::v1::{Container, Pod};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::time::{timeout_at, Instant};

const NO_CHANGES: &str = "no image resolutions found";

/// Rewrites pod images that have a stored root to pull from the registry
pub struct PodRelocator {
    mapper: Arc<dyn CidMapper>,
    registry: String,
    timeout: Duration,
}

impl PodRelocator {
    /// Relocated images become `<registry>/<cid>`
    pub fn new(mapper: Arc<dyn CidMapper>, registry: &str) -> Self {
        PodRelocator {
            mapper,
            registry: registry.trim_end_matches('/').to_owned(),
            timeout: Duration::from_secs(ADMISSION_TIMEOUT_SECS),
        }
    }

    /// Budget for all lookups in one request
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn relocate(&self, cid: &str) -> String {
        format!("{}/{}", self.registry, cid.trim_start_matches('/'))
    }

    /// Answer one review; failures become an errored response
    pub async fn handle(&self, review: AdmissionReview) -> AdmissionReview {
        let uid = review
            .request
            .as_ref()
            .map(|request| request.uid.clone())
            .unwrap_or_default();
        let response = match self.mutate(review.request).await {
            Ok(response) => response,
            Err(err) => {
                log::warn!("admission request {} failed: {}", uid, err);
                AdmissionResponse::errored(&uid, err.code(), &err.to_string())
            }
        };
        AdmissionReview::respond(response)
    }

    async fn mutate(
        &self,
        request: Option<AdmissionRequest>,
    ) -> Result<AdmissionResponse, AdmissionError> {
        let request = request.ok_or(AdmissionError::MissingRequest)?;
        let original = request.object.ok_or(AdmissionError::MissingObject)?;
        let pod: Pod = serde_json::from_value(original.clone()).map_err(AdmissionError::Decode)?;
        let pod_name = pod.metadata.name.clone().unwrap_or_default();
        log::info!("relocating images for pod {:?}", pod_name);

        let deadline = Instant::now() + self.timeout;
        let mut mutated = original.clone();
        let mut changed = 0;
        if let Some(spec) = &pod.spec {
            let groups: [(&str, &[Container]); 2] = [
                ("initContainers", spec.init_containers.as_deref().unwrap_or(&[])),
                ("containers", &spec.containers),
            ];
            for (field, containers) in groups.iter() {
                for (index, container) in containers.iter().enumerate() {
                    let image = match &container.image {
                        Some(image) => image,
                        None => continue,
                    };
                    let cid = match timeout_at(deadline, self.mapper.resolve(image)).await {
                        Ok(Ok(cid)) => cid,
                        Ok(Err(err)) => {
                            log::info!("no cid for {} in {}: {}", image, container.name, err);
                            continue;
                        }
                        Err(_) => {
                            log::info!("timed out resolving {} in {}", image, container.name);
                            continue;
                        }
                    };
                    let relocated = self.relocate(&cid);
                    let pointer = format!("/spec/{}/{}/image", field, index);
                    if let Some(slot) = mutated.pointer_mut(&pointer) {
                        log::info!("{} -> {}", image, relocated);
                        *slot = Value::String(relocated);
                        changed += 1;
                    }
                }
            }
        }

        let patch = json_patch::diff(&original, &mutated);
        if changed == 0 || patch.0.is_empty() {
            log::info!("no images relocated for pod {:?}", pod_name);
            return Ok(AdmissionResponse::allowed(&request.uid, NO_CHANGES));
        }
        let encoded = serde_json::to_vec(&patch).map_err(AdmissionError::Encode)?;
        log::info!("relocated {} images for pod {:?}", changed, pod_name);
        Ok(AdmissionResponse::patched(&request.uid, STANDARD.encode(encoded)))
    }
}

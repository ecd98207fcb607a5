//! Mutating admission webhook that points pod images at the registry
//!
//! Every container image with an entry in the name map is rewritten to
//! `<registry>/<root cid>`. Anything that can't be resolved in time is left
//! alone, so pods are never rejected for a missing entry.

mod mutator;
mod review;

pub use mutator::PodRelocator;
pub use review::{AdmissionRequest, AdmissionResponse, AdmissionReview, ResponseStatus};

use crate::consts::MUTATE_PATH;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

/// Webhook routes: the mutator plus a health check
pub fn router(relocator: Arc<PodRelocator>) -> Router {
    Router::new()
        .route(MUTATE_PATH, post(mutate))
        .route("/healthz", get(healthz))
        .with_state(relocator)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn mutate(
    State(relocator): State<Arc<PodRelocator>>,
    body: Bytes,
) -> (StatusCode, Json<AdmissionReview>) {
    match serde_json::from_slice::<AdmissionReview>(&body) {
        Ok(review) => (StatusCode::OK, Json(relocator.handle(review).await)),
        Err(err) => {
            log::warn!("undecodable admission review: {}", err);
            let response = AdmissionResponse::errored("", 400, &err.to_string());
            (StatusCode::BAD_REQUEST, Json(AdmissionReview::respond(response)))
        }
    }
}

#[cfg(test)]
mod tests;

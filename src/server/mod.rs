//! Read-only distribution API over stored image graphs
//!
//! Images are addressed as the repository `ipfs/<root cid>`, so a client
//! pulls `registry.host/ipfs/<cid>:latest` or `...@sha256:...`.

mod content;
mod error;

pub use error::{ErrorBody, ErrorDetail, RegistryError, Target};

use crate::{errors::GraphError, graph::Reader, image::ContentDigest};
use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json, Router,
};
use std::{net::SocketAddr, sync::Arc, time::Instant};

const API_VERSION_HEADER: &str = "docker-distribution-api-version";

/// Build the registry routes around a graph reader
///
/// `get` routes answer HEAD too; the route table never changes after this.
pub fn router(reader: Arc<dyn Reader>) -> Router {
    Router::new()
        .route("/v2/", get(health))
        .route("/v2/ipfs/:cid/manifests/:reference", get(manifest))
        .route("/v2/ipfs/:cid/blobs/:reference", get(blob))
        .layer(middleware::from_fn(log_requests))
        .with_state(reader)
}

/// Serve the registry until the listener fails
pub async fn serve(address: SocketAddr, reader: Arc<dyn Reader>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    log::info!("registry listening on {}", listener.local_addr()?);
    axum::serve(listener, router(reader)).await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({}))
}

async fn manifest(
    State(reader): State<Arc<dyn Reader>>,
    Path((cid, reference)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, RegistryError> {
    let content = reader
        .read_manifest(&cid, &reference)
        .await
        .map_err(|err| RegistryError::from_graph(&err, Target::Manifest))?;
    Ok(content::respond(&method, &headers, content))
}

async fn blob(
    State(reader): State<Arc<dyn Reader>>,
    Path((cid, reference)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, RegistryError> {
    let digest = ContentDigest::parse(&reference).map_err(|_| {
        RegistryError::from_graph(&GraphError::InvalidReference(reference.clone()), Target::Blob)
    })?;
    let content = reader
        .read_blob(&cid, &digest)
        .await
        .map_err(|err| RegistryError::from_graph(&err, Target::Blob))?;
    Ok(content::respond(&method, &headers, content))
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();
    let mut response = next.run(request).await;
    let status = response.status();
    if status.is_server_error() {
        log::warn!("{} {} {} ({:?})", method, uri, status, start.elapsed());
    } else {
        log::info!("{} {} {} ({:?})", method, uri, status, start.elapsed());
    }
    response.headers_mut().insert(
        API_VERSION_HEADER,
        HeaderValue::from_static("registry/2.0"),
    );
    response
}

#[cfg(test)]
mod tests;

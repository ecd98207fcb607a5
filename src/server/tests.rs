use super::*;
use crate::{
    errors::StoreError,
    graph::{Content, GraphReader, ImageWriter},
    image::{ImageSource, MemoryImage},
    manifest::media_types,
    store::MemoryStore,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use tower::ServiceExt;

async fn registry() -> (Router, String, MemoryImage) {
    let image = MemoryImage::from_blobs(
        Bytes::from_static(br#"{"os":"linux"}"#),
        vec![
            Bytes::from_static(b"0123456789"),
            Bytes::from_static(b"abcdefghij"),
        ],
    );
    let store = Arc::new(MemoryStore::new());
    let root = ImageWriter::new(store.clone()).add_image(&image).await.unwrap();
    (router(Arc::new(GraphReader::new(store))), root, image)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_check() {
    let (app, _, _) = registry().await;
    let (status, headers, body) = send(&app, get_request("/v2/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"{}");
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(headers["docker-distribution-api-version"], "registry/2.0");
}

#[tokio::test]
async fn latest_manifest() {
    let (app, root, _) = registry().await;
    let (status, headers, body) =
        send(&app, get_request(&format!("/v2/ipfs/{}/manifests/latest", root))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], media_types::OCI_INDEX);
    assert_eq!(headers[header::CONTENT_LENGTH], body.len().to_string().as_str());
    assert!(headers.get(header::ETAG).is_none());
    let index: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(index["manifests"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn blob_by_digest() {
    let (app, root, image) = registry().await;
    let layers = image.layers();
    let layer = &layers[1];
    let uri = format!("/v2/ipfs/{}/blobs/{}", root, layer.descriptor.digest);
    let (status, headers, body) = send(&app, get_request(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, layer.data);
    assert_eq!(headers[header::CONTENT_TYPE], media_types::OCI_LAYER_TAR_GZIP);
    assert_eq!(
        headers["docker-content-digest"],
        layer.descriptor.digest.as_str()
    );
    assert_eq!(
        headers[header::ETAG],
        format!("\"{}\"", layer.descriptor.digest).as_str()
    );
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
}

#[tokio::test]
async fn head_has_headers_without_body() {
    let (app, root, image) = registry().await;
    let digest = &image.manifest().config.digest;
    let request = Request::builder()
        .method(Method::HEAD)
        .uri(format!("/v2/ipfs/{}/blobs/{}", root, digest))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert_eq!(
        headers[header::CONTENT_LENGTH],
        image.raw_config().len().to_string().as_str()
    );
    assert_eq!(headers[header::CONTENT_TYPE], media_types::OCI_CONFIG);
}

#[tokio::test]
async fn range_requests() {
    let (app, root, image) = registry().await;
    let uri = format!(
        "/v2/ipfs/{}/blobs/{}",
        root,
        image.layers()[0].descriptor.digest
    );
    let request = Request::builder()
        .uri(&uri)
        .header(header::RANGE, "bytes=2-5")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(&body[..], b"2345");
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 2-5/10");

    let request = Request::builder()
        .uri(&uri)
        .header(header::RANGE, "bytes=50-60")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes */10");
}

#[tokio::test]
async fn conditional_requests() {
    let (app, root, image) = registry().await;
    let layers = image.layers();
    let digest = &layers[0].descriptor.digest;
    let uri = format!("/v2/ipfs/{}/blobs/{}", root, digest);
    let request = Request::builder()
        .uri(&uri)
        .header(header::IF_NONE_MATCH, format!("\"{}\"", digest))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert!(body.is_empty());

    let request = Request::builder()
        .uri(&uri)
        .header(header::IF_NONE_MATCH, "\"sha256:other\"")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

async fn error_of(app: &Router, uri: &str) -> (StatusCode, ErrorBody) {
    let (status, _, body) = send(app, get_request(uri)).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn client_errors() {
    let (app, root, _) = registry().await;
    let missing = ContentDigest::from_content(b"missing");

    let (status, body) = error_of(&app, &format!("/v2/ipfs/{}/blobs/{}", root, missing)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.errors[0].code, "BLOB_UNKNOWN");

    let (status, body) =
        error_of(&app, &format!("/v2/ipfs/{}/manifests/{}", root, missing)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.errors[0].code, "MANIFEST_UNKNOWN");

    let (status, body) = error_of(&app, "/v2/ipfs/nonsense/manifests/latest").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.errors[0].code, "NAME_INVALID");

    let (status, body) = error_of(&app, &format!("/v2/ipfs/{}/blobs/latest", root)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.errors[0].code, "DIGEST_INVALID");

    let (status, _) = error_of(&app, &format!("/v2/ipfs/{}/manifests/v1", root)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Reader that fails every call the same way
struct BrokenReader(fn() -> GraphError);

#[async_trait]
impl Reader for BrokenReader {
    async fn read_manifest(&self, _root: &str, _reference: &str) -> Result<Content, GraphError> {
        Err((self.0)())
    }

    async fn read_blob(&self, _root: &str, _digest: &ContentDigest) -> Result<Content, GraphError> {
        Err((self.0)())
    }
}

#[tokio::test]
async fn server_errors() {
    let uri = "/v2/ipfs/x/manifests/latest";
    let app = router(Arc::new(BrokenReader(|| GraphError::UnrecognizedRecord)));
    let (status, _) = error_of(&app, uri).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let app = router(Arc::new(BrokenReader(|| {
        GraphError::Store(StoreError::Rpc {
            endpoint: "cat".to_owned(),
            status: 500,
            message: "connection reset".to_owned(),
        })
    })));
    let (status, body) = error_of(&app, uri).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.errors[0].message.contains("connection reset"));
}

use super::{auth::BearerChallenge, RegistryClient};
use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageName, ImageSource, MemoryImage, Registry},
    manifest::{media_types, Descriptor, ImageIndex, Platform},
};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

#[derive(Default)]
struct FakeRegistry {
    manifests: HashMap<String, (String, Bytes)>,
    blobs: HashMap<String, Bytes>,
}

async fn manifest(
    State(registry): State<Arc<FakeRegistry>>,
    Path((_, reference)): Path<(String, String)>,
) -> Response {
    match registry.manifests.get(&reference) {
        Some((media_type, data)) => {
            ([(header::CONTENT_TYPE, media_type.clone())], data.clone()).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn blob(
    State(registry): State<Arc<FakeRegistry>>,
    Path((_, digest)): Path<(String, String)>,
) -> Response {
    match registry.blobs.get(&digest) {
        Some(data) => data.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serve `registry` on a local port, returning `localhost:<port>`
async fn spawn(registry: FakeRegistry) -> String {
    let app = Router::new()
        .route("/v2/acme/:repo/manifests/:reference", get(manifest))
        .route("/v2/acme/:repo/blobs/:digest", get(blob))
        .with_state(Arc::new(registry));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("localhost:{}", port)
}

fn image(config: &'static [u8], layers: &[&'static [u8]]) -> MemoryImage {
    MemoryImage::from_blobs(
        Bytes::from_static(config),
        layers.iter().map(|layer| Bytes::from_static(layer)).collect(),
    )
}

fn publish(registry: &mut FakeRegistry, image: &MemoryImage) -> Descriptor {
    let data = Bytes::from(serde_json::to_vec(image.manifest()).unwrap());
    let descriptor = Descriptor::new(media_types::OCI_MANIFEST, &data);
    registry.manifests.insert(
        descriptor.digest.to_string(),
        (media_types::OCI_MANIFEST.to_owned(), data),
    );
    registry.blobs.insert(
        image.manifest().config.digest.to_string(),
        image.raw_config().clone(),
    );
    for layer in image.layers() {
        registry
            .blobs
            .insert(layer.descriptor.digest.to_string(), layer.data);
    }
    descriptor
}

fn platform(os: &str, architecture: &str) -> Platform {
    Platform {
        architecture: architecture.to_owned(),
        os: os.to_owned(),
        variant: None,
        extra: BTreeMap::new(),
    }
}

#[tokio::test]
async fn pull_single_manifest_by_tag() {
    let source = image(br#"{"os":"linux"}"#, &[b"layer one", b"layer two"]);
    let mut registry = FakeRegistry::default();
    let descriptor = publish(&mut registry, &source);
    let (_, data) = registry.manifests[descriptor.digest.as_str()].clone();
    registry
        .manifests
        .insert("v1".to_owned(), (media_types::OCI_MANIFEST.to_owned(), data));
    let host = spawn(registry).await;

    let name = ImageName::parse(&format!("{}/acme/app:v1", host)).unwrap();
    let pulled = RegistryClient::new().unwrap().pull(&name).await.unwrap();
    assert_eq!(pulled.manifest(), source.manifest());
    assert_eq!(pulled.raw_config(), source.raw_config());
    let layers: Vec<Bytes> = pulled.layers().into_iter().map(|layer| layer.data).collect();
    assert_eq!(layers, vec![Bytes::from_static(b"layer one"), Bytes::from_static(b"layer two")]);
}

#[tokio::test]
async fn pull_selects_platform_from_index() {
    let amd64 = image(br#"{"architecture":"amd64"}"#, &[b"amd64 layer"]);
    let arm64 = image(br#"{"architecture":"arm64"}"#, &[b"arm64 layer"]);
    let mut registry = FakeRegistry::default();
    let mut manifests = vec![];
    for (source, arch) in [(&amd64, "amd64"), (&arm64, "arm64")] {
        let mut descriptor = publish(&mut registry, source);
        descriptor.platform = Some(platform("linux", arch));
        manifests.push(descriptor);
    }
    let mut index = ImageIndex::single(manifests[0].clone());
    index.manifests = manifests;
    let data = Bytes::from(serde_json::to_vec(&index).unwrap());
    registry
        .manifests
        .insert("multi".to_owned(), (media_types::OCI_INDEX.to_owned(), data));
    let host = spawn(registry).await;

    let name = ImageName::parse(&format!("{}/acme/app:multi", host)).unwrap();
    let client = RegistryClient::builder()
        .platform("linux", "arm64", None)
        .build()
        .unwrap();
    let pulled = client.pull(&name).await.unwrap();
    assert_eq!(pulled.manifest(), arm64.manifest());

    let client = RegistryClient::builder()
        .platform("windows", "amd64", None)
        .build()
        .unwrap();
    match client.pull(&name).await {
        Err(ImageError::NoMatchingPlatform(platform)) => assert_eq!(platform, "windows/amd64"),
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn pull_by_digest_verifies_the_manifest() {
    let source = image(b"{}", &[b"only layer"]);
    let mut registry = FakeRegistry::default();
    let descriptor = publish(&mut registry, &source);
    let host = spawn(registry).await;

    let name = ImageName::parse(&format!("{}/acme/app@{}", host, descriptor.digest)).unwrap();
    let pulled = RegistryClient::new().unwrap().pull(&name).await.unwrap();
    assert_eq!(pulled.manifest(), source.manifest());
}

#[tokio::test]
async fn corrupt_blobs_are_rejected() {
    let source = image(b"{}", &[b"expected bytes"]);
    let mut registry = FakeRegistry::default();
    let descriptor = publish(&mut registry, &source);
    let layer_digest = source.manifest().layers[0].digest.to_string();
    registry
        .blobs
        .insert(layer_digest, Bytes::from_static(b"tampered bytes"));
    let host = spawn(registry).await;

    let name = ImageName::parse(&format!("{}/acme/app@{}", host, descriptor.digest)).unwrap();
    match RegistryClient::new().unwrap().pull(&name).await {
        Err(ImageError::ContentDigestMismatch { expected, found }) => {
            assert_eq!(expected, source.manifest().layers[0].digest);
            assert_eq!(found, ContentDigest::from_content(b"tampered bytes"));
        }
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn missing_manifest_is_a_network_error() {
    let host = spawn(FakeRegistry::default()).await;
    let name = ImageName::parse(&format!("{}/acme/app:nope", host)).unwrap();
    let err = RegistryClient::new().unwrap().pull(&name).await.unwrap_err();
    assert!(matches!(err, ImageError::NetworkRequest(_)));
}

#[tokio::test]
async fn registry_allow_list() {
    let name = ImageName::parse("localhost:5000/acme/app:v1").unwrap();
    let mut allowed = HashSet::new();
    allowed.insert(Registry::parse("ghcr.io").unwrap());
    let client = RegistryClient::builder()
        .allow_only_connections_to(allowed)
        .build()
        .unwrap();
    assert!(matches!(
        client.pull(&name).await,
        Err(ImageError::RegistryNotAllowed(_))
    ));

    let client = RegistryClient::builder().disallow_http().build().unwrap();
    assert!(matches!(
        client.pull(&name).await,
        Err(ImageError::RegistryNotAllowed(_))
    ));
}

#[test]
fn bearer_challenges() {
    let challenge = BearerChallenge::parse(
        r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/busybox:pull""#,
    )
    .unwrap();
    assert_eq!(challenge.realm.as_str(), "https://auth.docker.io/token");
    assert_eq!(challenge.service, "registry.docker.io");
    assert_eq!(challenge.scope, "repository:library/busybox:pull");

    let reordered = BearerChallenge::parse(
        r#"bearer scope="repository:acme/app:pull" service="ghcr.io" realm="https://ghcr.io/token""#,
    )
    .unwrap();
    assert_eq!(reordered.service, "ghcr.io");

    for header in &[
        r#"Basic realm="registry""#,
        r#"Bearer realm="http://insecure.example/token",service="x",scope="y""#,
        r#"Bearer realm="https://auth.example/token",service="x""#,
    ] {
        assert!(matches!(
            BearerChallenge::parse(header),
            Err(ImageError::UnsupportedAuthentication(_))
        ));
    }
}

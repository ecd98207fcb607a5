use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use http_body_util::BodyExt;
use ripfs::{
    admission::{AdmissionReview, PodRelocator},
    graph::GraphReader,
    consts::DEFAULT_REGISTRY_HOST,
    image::{ImageName, ImageSource, MemoryImage},
    manifest::{media_types, ImageIndex, Manifest},
    naming::{CidMapper, NameMapper, StaticFetcher, Updater},
    server, ImageWriter, MemoryStore,
};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tower::ServiceExt;

const REFERENCE: &str = "ghcr.io/acme/service:1.2.3";

struct Cluster {
    store: MemoryStore,
    app: Router,
    relocator: PodRelocator,
}

fn cluster() -> Cluster {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = MemoryStore::peered();
    let mapper = Arc::new(NameMapper::new(
        store.clone(),
        StaticFetcher(store.key().to_owned()),
    ));
    let mapper: Arc<dyn CidMapper> = mapper;
    Cluster {
        app: server::router(Arc::new(GraphReader::new(store.clone()))),
        relocator: PodRelocator::new(mapper, DEFAULT_REGISTRY_HOST),
        store,
    }
}

async fn fetch(app: &Router, uri: &str) -> (StatusCode, String, Bytes) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let media_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|value| value.to_str().unwrap().to_owned())
        .unwrap_or_default();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, media_type, body)
}

/// Admit a one-container pod and return the image it was rewritten to
async fn admitted_image(relocator: &PodRelocator, image: &str) -> Option<String> {
    let pod = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": "service" },
        "spec": { "containers": [ { "name": "service", "image": image } ] }
    });
    let response = relocator
        .handle(AdmissionReview::request("roundtrip", pod.clone()))
        .await
        .response
        .unwrap();
    assert!(response.allowed);
    let patch: json_patch::Patch =
        serde_json::from_slice(&STANDARD.decode(response.patch?).unwrap()).unwrap();
    let mut patched = pod;
    json_patch::patch(&mut patched, &patch).unwrap();
    patched["spec"]["containers"][0]["image"]
        .as_str()
        .map(str::to_owned)
}

#[test]
fn ingest_name_admit_and_pull() {
    Runtime::new().unwrap().block_on(async {
        let cluster = cluster();
        let image = MemoryImage::random(4096, 3);
        let root = ImageWriter::new(cluster.store.clone())
            .add_image(&image)
            .await
            .unwrap();
        NameMapper::new(
            cluster.store.clone(),
            StaticFetcher(cluster.store.key().to_owned()),
        )
        .update(REFERENCE, &root)
        .await
        .unwrap();

        let relocated = admitted_image(&cluster.relocator, REFERENCE).await.unwrap();
        assert_eq!(relocated, format!("{}/{}", DEFAULT_REGISTRY_HOST, root));
        // Pull the way a container runtime would, from the rewritten reference alone
        let relocated = ImageName::parse(&relocated).unwrap();
        assert_eq!(relocated.registry_str(), Some("localhost:31609"));
        let repository = relocated.repository();

        let (status, media_type, body) = fetch(
            &cluster.app,
            &format!("/v2/{}/manifests/{}", repository, relocated.version()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(media_type, media_types::OCI_INDEX);
        let index: ImageIndex = serde_json::from_slice(&body).unwrap();
        assert_eq!(index.manifests.len(), 1);

        let manifest_digest = &index.manifests[0].digest;
        let (status, media_type, body) = fetch(
            &cluster.app,
            &format!("/v2/{}/manifests/{}", repository, manifest_digest),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(media_type, media_types::OCI_MANIFEST);
        manifest_digest.verify(&body).unwrap();
        let manifest: Manifest = serde_json::from_slice(&body).unwrap();

        let (status, _, config) = fetch(
            &cluster.app,
            &format!("/v2/{}/blobs/{}", repository, manifest.config.digest),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&config, image.raw_config());

        for (stored, original) in manifest.layers.iter().zip(image.layers()) {
            let (status, media_type, data) = fetch(
                &cluster.app,
                &format!("/v2/{}/blobs/{}", repository, stored.digest),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(media_type, original.descriptor.media_type);
            assert_eq!(data, original.data);
        }
    })
}

#[test]
fn unnamed_images_are_not_relocated() {
    Runtime::new().unwrap().block_on(async {
        let cluster = cluster();
        let root = ImageWriter::new(cluster.store.clone())
            .add_image(&MemoryImage::random(128, 1))
            .await
            .unwrap();
        assert!(admitted_image(&cluster.relocator, REFERENCE).await.is_none());

        // The content is still servable by handle even without a name
        let (status, _, _) =
            fetch(&cluster.app, &format!("/v2/ipfs/{}/manifests/latest", root)).await;
        assert_eq!(status, StatusCode::OK);
    })
}

#[test]
fn short_names_resolve_through_the_webhook() {
    Runtime::new().unwrap().block_on(async {
        let cluster = cluster();
        let root = ImageWriter::new(cluster.store.clone())
            .add_image(&MemoryImage::random(256, 2))
            .await
            .unwrap();
        NameMapper::new(
            cluster.store.clone(),
            StaticFetcher(cluster.store.key().to_owned()),
        )
        .update("docker.io/library/alpine:latest", &root)
        .await
        .unwrap();

        for reference in &["alpine", "alpine:latest", "library/alpine", "docker.io/alpine"] {
            assert_eq!(
                admitted_image(&cluster.relocator, reference).await,
                Some(format!("{}/{}", DEFAULT_REGISTRY_HOST, root)),
                "{}",
                reference
            );
        }
        assert!(admitted_image(&cluster.relocator, "alpine:3.19").await.is_none());
    })
}

use super::*;
use crate::{errors::NameError, naming::CidMapper};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::{collections::HashMap, time::Duration};
use tower::ServiceExt;

const REGISTRY: &str = "localhost:31609";
const APP_CID: &str = "bafkreia6ne2ygmoz5jqrmqeqxm4bkbqh7shfstx26vt3gu4cqsf3w2otza";
const INIT_CID: &str = "bafkreibm6jg3ux5qumhcn2b3flc3tyu6dmlb4xa7u5bf44yegnrjhc4yeq";

struct StubMapper(HashMap<&'static str, &'static str>);

#[async_trait]
impl CidMapper for StubMapper {
    async fn resolve(&self, reference: &str) -> Result<String, NameError> {
        match self.0.get(reference) {
            Some(cid) => Ok((*cid).to_owned()),
            None => Err(NameError::NotFound(reference.to_owned())),
        }
    }
}

struct SlowMapper;

#[async_trait]
impl CidMapper for SlowMapper {
    async fn resolve(&self, _: &str) -> Result<String, NameError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(APP_CID.to_owned())
    }
}

fn relocator() -> PodRelocator {
    let mut entries = HashMap::new();
    entries.insert("ghcr.io/acme/app:v1", APP_CID);
    entries.insert("busybox", INIT_CID);
    PodRelocator::new(Arc::new(StubMapper(entries)), REGISTRY)
}

fn pod() -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": "web", "namespace": "default" },
        "spec": {
            "initContainers": [
                { "name": "setup", "image": "busybox" }
            ],
            "containers": [
                { "name": "app", "image": "ghcr.io/acme/app:v1" },
                { "name": "sidecar", "image": "ghcr.io/acme/proxy:v3" }
            ]
        }
    })
}

fn apply(original: &Value, response: &AdmissionResponse) -> Value {
    assert_eq!(response.patch_type.as_deref(), Some("JSONPatch"));
    let encoded = response.patch.as_ref().unwrap();
    let patch: json_patch::Patch =
        serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();
    let mut patched = original.clone();
    json_patch::patch(&mut patched, &patch).unwrap();
    patched
}

#[tokio::test]
async fn resolvable_images_are_relocated() {
    let review = relocator()
        .handle(AdmissionReview::request("uid-1", pod()))
        .await;
    assert_eq!(review.kind, "AdmissionReview");
    assert_eq!(review.api_version, "admission.k8s.io/v1");
    let response = review.response.unwrap();
    assert_eq!(response.uid, "uid-1");
    assert!(response.allowed);

    let patched = apply(&pod(), &response);
    assert_eq!(
        patched["spec"]["initContainers"][0]["image"],
        format!("{}/{}", REGISTRY, INIT_CID)
    );
    assert_eq!(
        patched["spec"]["containers"][0]["image"],
        format!("{}/{}", REGISTRY, APP_CID)
    );
    assert_eq!(patched["spec"]["containers"][1]["image"], "ghcr.io/acme/proxy:v3");
    assert_eq!(patched["metadata"], pod()["metadata"]);
}

#[tokio::test]
async fn single_container_patch_replaces_only_its_image() {
    let pod = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": "app", "labels": { "tier": "web" } },
        "spec": { "containers": [ { "name": "app", "image": "ghcr.io/acme/app:v1" } ] }
    });
    let response = relocator()
        .handle(AdmissionReview::request("uid-single", pod))
        .await
        .response
        .unwrap();
    assert!(response.allowed);
    assert_eq!(response.patch_type.as_deref(), Some("JSONPatch"));
    let patch: Value =
        serde_json::from_slice(&STANDARD.decode(response.patch.unwrap()).unwrap()).unwrap();
    assert_eq!(
        patch,
        json!([{
            "op": "replace",
            "path": "/spec/containers/0/image",
            "value": format!("{}/{}", REGISTRY, APP_CID)
        }])
    );
}

#[tokio::test]
async fn nothing_resolvable_is_allowed_unchanged() {
    let relocator = PodRelocator::new(Arc::new(StubMapper(HashMap::new())), REGISTRY);
    let response = relocator
        .handle(AdmissionReview::request("uid-2", pod()))
        .await
        .response
        .unwrap();
    assert!(response.allowed);
    assert_eq!(response.patch, None);
    assert_eq!(response.patch_type, None);
    assert_eq!(
        response.status.unwrap().message.as_deref(),
        Some("no image resolutions found")
    );
}

#[tokio::test]
async fn trailing_slash_on_registry_is_ignored() {
    let mut entries = HashMap::new();
    entries.insert("ghcr.io/acme/app:v1", APP_CID);
    let relocator = PodRelocator::new(Arc::new(StubMapper(entries)), "localhost:31609/");
    let response = relocator
        .handle(AdmissionReview::request("uid-3", pod()))
        .await
        .response
        .unwrap();
    let patched = apply(&pod(), &response);
    assert_eq!(
        patched["spec"]["containers"][0]["image"],
        format!("{}/{}", REGISTRY, APP_CID)
    );
}

#[tokio::test]
async fn slow_lookups_are_misses() {
    let relocator = PodRelocator::new(Arc::new(SlowMapper), REGISTRY)
        .timeout(Duration::from_millis(20));
    let response = relocator
        .handle(AdmissionReview::request("uid-4", pod()))
        .await
        .response
        .unwrap();
    assert!(response.allowed);
    assert_eq!(response.patch, None);
}

#[tokio::test]
async fn undecodable_pods_are_errored() {
    let object = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "spec": { "containers": "not a list" }
    });
    let response = relocator()
        .handle(AdmissionReview::request("uid-5", object))
        .await
        .response
        .unwrap();
    assert!(!response.allowed);
    assert_eq!(response.uid, "uid-5");
    assert_eq!(response.status.unwrap().code, Some(400));
}

#[tokio::test]
async fn reviews_without_a_request_are_errored() {
    let review = AdmissionReview {
        request: None,
        ..AdmissionReview::respond(AdmissionResponse::default())
    };
    let response = relocator().handle(review).await.response.unwrap();
    assert!(!response.allowed);
    assert_eq!(response.status.unwrap().code, Some(400));
}

#[tokio::test]
async fn pods_without_a_spec_pass_through() {
    let object = json!({ "apiVersion": "v1", "kind": "Pod", "metadata": { "name": "bare" } });
    let response = relocator()
        .handle(AdmissionReview::request("uid-6", object))
        .await
        .response
        .unwrap();
    assert!(response.allowed);
    assert_eq!(response.patch, None);
}

async fn post_mutate(body: Body) -> (StatusCode, Value) {
    let app = router(Arc::new(relocator()));
    let request = Request::builder()
        .method("POST")
        .uri("/mutate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn webhook_route_round_trip() {
    let review = serde_json::to_vec(&AdmissionReview::request("uid-7", pod())).unwrap();
    let (status, body) = post_mutate(Body::from(review)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["uid"], "uid-7");
    assert_eq!(body["response"]["allowed"], true);
    assert_eq!(body["response"]["patchType"], "JSONPatch");
    assert!(body.get("request").is_none());
}

#[tokio::test]
async fn webhook_route_rejects_garbage() {
    let (status, body) = post_mutate(Body::from("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["response"]["allowed"], false);
    assert_eq!(body["response"]["status"]["code"], 400);
}

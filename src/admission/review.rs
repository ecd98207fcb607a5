use serde_json::Value;

const API_VERSION: &str = "admission.k8s.io/v1";
const KIND: &str = "AdmissionReview";
const PATCH_TYPE: &str = "JSONPatch";

/// The `admission.k8s.io/v1` envelope, both directions
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    #[serde(default = "api_version")]
    pub api_version: String,
    #[serde(default = "kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

fn api_version() -> String {
    API_VERSION.to_owned()
}

fn kind() -> String {
    KIND.to_owned()
}

/// Only the fields the relocator looks at; the rest are ignored
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
    /// base64 of a serialized JSON patch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResponseStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AdmissionResponse {
    pub fn allowed(uid: &str, message: &str) -> Self {
        AdmissionResponse {
            uid: uid.to_owned(),
            allowed: true,
            status: Some(ResponseStatus {
                code: Some(200),
                message: Some(message.to_owned()),
            }),
            ..AdmissionResponse::default()
        }
    }

    /// Not allowed, with an HTTP-style code explaining why
    pub fn errored(uid: &str, code: u16, message: &str) -> Self {
        AdmissionResponse {
            uid: uid.to_owned(),
            allowed: false,
            status: Some(ResponseStatus {
                code: Some(code),
                message: Some(message.to_owned()),
            }),
            ..AdmissionResponse::default()
        }
    }

    /// Allowed, carrying an already base64-encoded JSON patch
    pub fn patched(uid: &str, patch: String) -> Self {
        AdmissionResponse {
            uid: uid.to_owned(),
            allowed: true,
            patch: Some(patch),
            patch_type: Some(PATCH_TYPE.to_owned()),
            ..AdmissionResponse::default()
        }
    }
}

impl AdmissionReview {
    /// A reply envelope around `response`
    pub fn respond(response: AdmissionResponse) -> Self {
        AdmissionReview {
            api_version: api_version(),
            kind: kind(),
            request: None,
            response: Some(response),
        }
    }

    /// A request envelope, mostly useful for tests and tools
    pub fn request(uid: &str, object: Value) -> Self {
        AdmissionReview {
            api_version: api_version(),
            kind: kind(),
            request: Some(AdmissionRequest {
                uid: uid.to_owned(),
                name: None,
                namespace: None,
                operation: Some("CREATE".to_owned()),
                object: Some(object),
            }),
            response: None,
        }
    }
}

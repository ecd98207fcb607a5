use crate::errors::{ErrorKind, GraphError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Which kind of object a request was after
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Target {
    Manifest,
    Blob,
}

/// Distribution API error body: `{"errors":[{"code":..,"message":..}]}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// A failed registry request, ready to be turned into a response
#[derive(Debug)]
pub struct RegistryError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl RegistryError {
    pub fn from_graph(err: &GraphError, target: Target) -> Self {
        let (status, code) = match (err.kind(), err) {
            (ErrorKind::NotFound, _) => (
                StatusCode::NOT_FOUND,
                match target {
                    Target::Manifest => "MANIFEST_UNKNOWN",
                    Target::Blob => "BLOB_UNKNOWN",
                },
            ),
            (ErrorKind::Invalid, GraphError::InvalidRoot(_)) => {
                (StatusCode::BAD_REQUEST, "NAME_INVALID")
            }
            (ErrorKind::Invalid, _) => (StatusCode::BAD_REQUEST, "DIGEST_INVALID"),
            (ErrorKind::Readiness, _) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            (ErrorKind::Integrity, _) => (StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN"),
            (ErrorKind::Io, _) => (StatusCode::BAD_GATEWAY, "UNKNOWN"),
        };
        RegistryError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("{}: {}", self.status, self.message);
        } else {
            log::debug!("{}: {}", self.status, self.message);
        }
        let body = ErrorBody {
            errors: vec![ErrorDetail {
                code: self.code.to_owned(),
                message: self.message,
            }],
        };
        (self.status, Json(body)).into_response()
    }
}

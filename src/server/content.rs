use crate::{graph::Content, manifest::media_types};
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::Response,
};

const DIGEST_HEADER: &str = "docker-content-digest";

/// Respond with stored content, honoring `If-None-Match` and single `Range`
/// requests
///
/// HEAD gets the same status and headers without a body.
pub fn respond(method: &Method, request: &HeaderMap, content: Content) -> Response {
    let len = content.data.len() as u64;
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content.media_type)
            .unwrap_or_else(|_| HeaderValue::from_static(media_types::OCTET_STREAM)),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let etag = content.digest.as_ref().and_then(|digest| {
        let digest_value = HeaderValue::from_str(digest.as_str()).ok()?;
        headers.insert(DIGEST_HEADER, digest_value);
        HeaderValue::from_str(&format!("\"{}\"", digest)).ok()
    });
    if let Some(etag) = &etag {
        headers.insert(header::ETAG, etag.clone());
        if matches_etag(request, etag) {
            return build(StatusCode::NOT_MODIFIED, headers, Body::empty());
        }
    }

    let range = request
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| http_range_header::parse_range_header(value).ok());
    let (status, data) = match range.map(|ranges| ranges.validate(len)) {
        None => (StatusCode::OK, content.data),
        Some(Err(_)) => {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", len)) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            return build(StatusCode::RANGE_NOT_SATISFIABLE, headers, Body::empty());
        }
        Some(Ok(ranges)) => match ranges.as_slice() {
            [range] => {
                let (start, end) = (*range.start(), *range.end());
                if let Ok(value) =
                    HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, len))
                {
                    headers.insert(header::CONTENT_RANGE, value);
                }
                (
                    StatusCode::PARTIAL_CONTENT,
                    content.data.slice(start as usize..(end + 1) as usize),
                )
            }
            // Multipart range responses aren't supported, send everything
            _ => (StatusCode::OK, content.data),
        },
    };

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(data.len() as u64));
    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(data)
    };
    build(status, headers, body)
}

fn matches_etag(request: &HeaderMap, etag: &HeaderValue) -> bool {
    let etag = match etag.to_str() {
        Ok(etag) => etag,
        Err(_) => return false,
    };
    request
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|candidate| candidate.trim().trim_start_matches("W/"))
        .any(|candidate| candidate == "*" || candidate == etag)
}

fn build(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

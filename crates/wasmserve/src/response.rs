//! Response helpers: HTTP dates, conditional GET, redirects.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};

/// Format a timestamp as an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Whether `If-Modified-Since` shows the client already has this version.
///
/// Compared at whole-second precision, the resolution of HTTP dates.
pub fn is_not_modified(headers: &HeaderMap, last_modified: DateTime<Utc>) -> bool {
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_http_date)
        .is_some_and(|since| last_modified.timestamp() <= since.timestamp())
}

/// Serve `body` with a `Last-Modified` header, honouring `If-Modified-Since`.
pub fn content(
    headers: &HeaderMap,
    content_type: &'static str,
    last_modified: DateTime<Utc>,
    body: Bytes,
) -> Response {
    let mut response = if is_not_modified(headers, last_modified) {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        let mut response = Response::new(Body::from(body));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type),
        );
        response
    };

    if let Ok(value) = HeaderValue::from_str(&http_date(last_modified)) {
        response.headers_mut().insert(header::LAST_MODIFIED, value);
    }
    response
}

/// Serve `body` unconditionally, stamped as modified now.
pub fn fresh(content_type: &'static str, body: Bytes) -> Response {
    content(&HeaderMap::new(), content_type, Utc::now(), body)
}

/// Empty `200 OK`, the answer of both long-poll endpoints.
pub fn empty_ok() -> Response {
    StatusCode::OK.into_response()
}

/// `303 See Other` to the same path with a trailing slash.
pub fn redirect_to_dir(uri: &Uri) -> Response {
    let mut location = format!("{}/", uri.path());
    if let Some(query) = uri.query() {
        location.push('?');
        location.push_str(query);
    }
    match HeaderValue::from_str(&location) {
        Ok(value) => (StatusCode::SEE_OTHER, [(header::LOCATION, value)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

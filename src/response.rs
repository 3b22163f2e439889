//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Handlers return `Result<impl IntoResponse, Error>`. The success side is
//! turned into a [`Response`] by the chain; the error side is turned into one
//! by the [`Errors`](crate::middleware::Errors) layer and nothing else.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::Serialize;

use crate::error::Error;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// An outgoing HTTP response.
///
/// ```rust
/// use warden::{Response, StatusCode};
///
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::json(StatusCode::CREATED, &serde_json::json!({ "id": 42 })).unwrap();
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// `status` with a JSON body serialised from `value`.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Result<Self, Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::with_content(status, JSON, body))
    }

    /// `200 OK` with `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_content(StatusCode::OK, TEXT, body.into().into_bytes())
    }

    /// Response with no body.
    pub fn status(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Bytes::new() }
    }

    fn with_content(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self { status, headers, body: body.into() }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub(crate) fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut resp = http::Response::new(Full::new(self.body));
        *resp.status_mut() = self.status;
        *resp.headers_mut() = self.headers;
        resp
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `Ok(StatusCode::NO_CONTENT)`.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// Overrides the status of any other response: `Ok((StatusCode::CREATED, Json(user)))`.
impl<R: IntoResponse> IntoResponse for (StatusCode, R) {
    fn into_response(self) -> Response {
        let mut resp = self.1.into_response();
        resp.set_status(self.0);
        resp
    }
}

/// `200 OK` with a JSON body.
///
/// A value that fails to serialise becomes a bare `500`; use
/// [`Response::json`] to handle that failure yourself.
#[derive(Clone, Debug)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match Response::json(StatusCode::OK, &self.0) {
            Ok(resp) => resp,
            Err(_) => Response::status(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

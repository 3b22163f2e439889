//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::Error;

/// An incoming HTTP request with its body fully read.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// A bodiless request. Mostly useful for driving a [`Router`](crate::Router)
    /// in-process; the server builds requests from the wire.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            remote_addr: None,
        }
    }

    pub(crate) fn from_parts(
        parts: http::request::Parts,
        body: Bytes,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            method: parts.method,
            path: parts.uri.path().to_owned(),
            headers: parts.headers,
            body,
            params: HashMap::new(),
            remote_addr: Some(remote_addr),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub(crate) fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Decodes the body as JSON. A body that does not parse is the caller's
    /// fault, so the failure is a trusted `400`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::trusted(StatusCode::BAD_REQUEST, format!("unable to decode payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use http::header::AUTHORIZATION;
    use serde::Deserialize;

    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::new(Method::GET, "/")
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(req.header("authorization"), Some("Bearer abc"));
        assert_eq!(req.header("Authorization"), Some("Bearer abc"));
        assert_eq!(req.header("x-missing"), None);
    }

    #[test]
    fn json_body_errors_are_trusted_bad_requests() {
        #[derive(Debug, Deserialize)]
        struct NewUser {
            #[allow(dead_code)]
            name: String,
        }

        let req = Request::new(Method::POST, "/users").with_body(r#"{"nmae":"x"}"#);
        let err = req.json::<NewUser>().unwrap_err();
        assert!(matches!(err, Error::Trusted { status: StatusCode::BAD_REQUEST, .. }));

        let req = Request::new(Method::POST, "/users").with_body(r#"{"name":"x"}"#);
        assert!(req.json::<NewUser>().is_ok());
    }
}

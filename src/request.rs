//! Incoming HTTP request type.

use std::collections::HashMap;

use http::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

use crate::body::Body;
use crate::method::{Method, Operation};

/// Header carrying a caller-supplied request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// An incoming HTTP request.
///
/// The body is a [`Body`]: usually the original single-use stream, swapped for
/// a replay by any gate that needs to look at it.
pub struct Request {
    pub(crate) id: String,
    pub(crate) method: Method,
    pub(crate) operation: Operation,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Body,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    /// Starts building a request without a socket, for embedding and tests.
    pub fn builder(method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            id: None,
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub(crate) fn from_hyper(req: hyper::Request<hyper::body::Incoming>, method: Method) -> Self {
        let (parts, incoming) = req.into_parts();
        let body = if http_body::Body::is_end_stream(&incoming) {
            Body::Empty
        } else {
            Body::stream(incoming)
        };

        RequestBuilder {
            id: None,
            method,
            path: parts.uri.path().to_owned(),
            headers: parts.headers,
            body,
        }
        .build()
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn method(&self) -> Method { self.method }
    pub fn operation(&self) -> Operation { self.operation }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Body { &self.body }
    pub fn body_mut(&mut self) -> &mut Body { &mut self.body }

    /// Replaces the body source.
    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// Case-insensitive header lookup. Values that are not visible ASCII are
    /// treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/Patient/{id}`, `req.param("id")` on `/Patient/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }
}

/// Builder for [`Request`]. Obtain via [`Request::builder`].
pub struct RequestBuilder {
    id: Option<String>,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Body,
}

impl RequestBuilder {
    /// Fixes the request id. Otherwise taken from `x-request-id`, or generated.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Request {
        let id = self
            .id
            .or_else(|| {
                self.headers
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| !v.is_empty())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Request {
            id,
            operation: Operation::classify(self.method, &self.path),
            method: self.method,
            path: self.path,
            headers: self.headers,
            body: self.body,
            params: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_prefers_header_then_generates() {
        let req = Request::builder(Method::Get, "/Patient")
            .header(HeaderName::from_static(REQUEST_ID_HEADER), HeaderValue::from_static("abc-123"))
            .build();
        assert_eq!(req.id(), "abc-123");

        let req = Request::builder(Method::Get, "/Patient").build();
        assert_eq!(req.id().len(), 36);
    }

    #[test]
    fn builder_classifies_operation() {
        let req = Request::builder(Method::Post, "/Observation").body("{}").build();
        assert_eq!(req.operation(), Operation::Create);
        assert!(req.body().is_present());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = Request::builder(Method::Get, "/")
            .header(http::header::AUTHORIZATION, HeaderValue::from_static("Basic x"))
            .build();
        assert_eq!(req.header("Authorization"), Some("Basic x"));
        assert_eq!(req.header("authorization"), Some("Basic x"));
    }
}

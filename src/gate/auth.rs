//! HTTP Basic authentication against one static credential pair.
//!
//! The header must read `Authorization: Basic <base64(username:password)>`.
//! The decoded text is split on the **first** `:` only; everything after it
//! is the password, colons included.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use http::header::AUTHORIZATION;
use http::{HeaderMap, StatusCode};
use serde::Serialize;

use super::{Gate, GateFuture, Verdict};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

const BASIC_PREFIX: &str = "Basic ";

// ── Credentials ───────────────────────────────────────────────────────────────

/// The configured username/password. Immutable for the life of the process.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    pub fn username(&self) -> &str { &self.username }

    fn matches(&self, username: &[u8], password: &[u8]) -> bool {
        self.username.as_bytes() == username && self.password.as_bytes() == password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ── AuthError ─────────────────────────────────────────────────────────────────

/// Why a request was denied.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing or invalid Authorization header")]
    MissingHeader,
    #[error("Missing or invalid Authorization header")]
    MalformedHeader,
    #[error("Invalid username or password")]
    BadCredentials,
}

impl AuthError {
    /// Machine-stable code, safe to match on in clients.
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingHeader   => "missing_credentials",
            Self::MalformedHeader => "malformed_credentials",
            Self::BadCredentials  => "invalid_credentials",
        }
    }

    /// `401` with a Basic challenge for `realm`.
    pub fn into_response_for(self, realm: &str) -> Response {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            error: &'a str,
            message: String,
        }

        let body = ErrorBody { error: self.code(), message: self.to_string() };
        // Serializing two strings cannot fail; fall back to an empty body anyway.
        let json = serde_json::to_vec(&body).unwrap_or_default();

        Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header("www-authenticate", &format!("Basic realm=\"{realm}\""))
            .json(json)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.into_response_for(BasicAuthGate::DEFAULT_REALM)
    }
}

// ── authenticate ──────────────────────────────────────────────────────────────

/// Checks the `Authorization` header in `headers` against `expected`.
///
/// Stateless and side-effect free; safe to call concurrently.
pub fn authenticate(headers: &HeaderMap, expected: &Credentials) -> Result<(), AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::MissingHeader)?;
    let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;
    let encoded = value.strip_prefix(BASIC_PREFIX).ok_or(AuthError::MalformedHeader)?;

    let decoded = BASE64.decode(encoded).map_err(|_| AuthError::BadCredentials)?;

    let colon = decoded
        .iter()
        .position(|&b| b == b':')
        .ok_or(AuthError::BadCredentials)?;
    let (username, password) = (&decoded[..colon], &decoded[colon + 1..]);

    if expected.matches(username, password) {
        Ok(())
    } else {
        Err(AuthError::BadCredentials)
    }
}

// ── BasicAuthGate ─────────────────────────────────────────────────────────────

/// Rejects every request that does not carry the configured credentials.
#[derive(Clone, Debug)]
pub struct BasicAuthGate {
    credentials: Arc<Credentials>,
    realm: Arc<str>,
}

impl BasicAuthGate {
    pub const DEFAULT_REALM: &'static str = "gatehouse";

    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
            realm: Arc::from(Self::DEFAULT_REALM),
        }
    }

    /// Realm advertised in the `www-authenticate` challenge.
    pub fn realm(mut self, realm: impl AsRef<str>) -> Self {
        self.realm = Arc::from(realm.as_ref());
        self
    }

    pub fn check(&self, req: &Request) -> Result<(), AuthError> {
        authenticate(req.headers(), &self.credentials)
    }
}

impl Gate for BasicAuthGate {
    fn evaluate<'a>(&'a self, req: &'a mut Request) -> GateFuture<'a> {
        let verdict = match self.check(req) {
            Ok(()) => Verdict::Continue,
            Err(e) => Verdict::Reject(e.into_response_for(&self.realm)),
        };
        Box::pin(std::future::ready(verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    use crate::gate::tests::Events;
    use crate::method::Method;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn basic(userpass: &str) -> HeaderMap {
        headers_with(&format!("Basic {}", BASE64.encode(userpass)))
    }

    fn admin() -> Credentials {
        Credentials::new("admin", "secret")
    }

    #[test]
    fn allows_matching_credentials() {
        let headers = headers_with("Basic YWRtaW46c2VjcmV0");
        assert_eq!(authenticate(&headers, &admin()), Ok(()));
    }

    #[test]
    fn missing_header_is_denied() {
        let err = authenticate(&HeaderMap::new(), &admin()).unwrap_err();
        assert_eq!(err, AuthError::MissingHeader);
        assert_eq!(err.to_string(), "Missing or invalid Authorization header");
    }

    #[test]
    fn wrong_scheme_is_denied_like_missing() {
        let err = authenticate(&headers_with("Bearer xyz"), &admin()).unwrap_err();
        assert_eq!(err, AuthError::MalformedHeader);
        assert_eq!(err.to_string(), AuthError::MissingHeader.to_string());
    }

    #[test]
    fn prefix_is_case_sensitive() {
        let header = format!("basic {}", BASE64.encode("admin:secret"));
        let err = authenticate(&headers_with(&header), &admin()).unwrap_err();
        assert_eq!(err, AuthError::MalformedHeader);
    }

    #[test]
    fn wrong_password_is_denied() {
        let err = authenticate(&basic("admin:wrong"), &admin()).unwrap_err();
        assert_eq!(err, AuthError::BadCredentials);
        assert_eq!(err.to_string(), "Invalid username or password");
    }

    #[test]
    fn username_comparison_is_case_sensitive() {
        let err = authenticate(&basic("Admin:secret"), &admin()).unwrap_err();
        assert_eq!(err, AuthError::BadCredentials);
    }

    #[test]
    fn password_may_contain_colons() {
        let expected = Credentials::new("admin", "sec:ret");
        assert_eq!(authenticate(&basic("admin:sec:ret"), &expected), Ok(()));
        // Truncating at the second colon must not pass.
        assert_eq!(
            authenticate(&basic("admin:sec"), &expected),
            Err(AuthError::BadCredentials)
        );
    }

    #[test]
    fn undecodable_or_colonless_payload_is_bad_credentials() {
        assert_eq!(
            authenticate(&headers_with("Basic !!!not-base64"), &admin()),
            Err(AuthError::BadCredentials)
        );
        assert_eq!(
            authenticate(&basic("adminsecret"), &admin()),
            Err(AuthError::BadCredentials)
        );
    }

    #[test]
    fn empty_password_only_matches_empty() {
        let expected = Credentials::new("admin", "");
        assert_eq!(authenticate(&basic("admin:"), &expected), Ok(()));
        assert!(authenticate(&basic("admin:x"), &expected).is_err());
    }

    #[test]
    fn rejection_is_401_with_challenge_and_code() {
        let res = AuthError::BadCredentials.into_response_for("fhir");
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.header("www-authenticate"), Some("Basic realm=\"fhir\""));

        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "invalid_credentials");
        assert_eq!(body["message"], "Invalid username or password");
    }

    #[test]
    fn debug_redacts_password() {
        let rendered = format!("{:?}", admin());
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("secret"));
    }

    #[tokio::test]
    async fn gate_rejects_without_touching_the_body() {
        let gate = BasicAuthGate::new(admin()).realm("fhir");
        let mut req = Request::builder(Method::Post, "/Patient").body("{}").build();

        match gate.evaluate(&mut req).await {
            Verdict::Reject(res) => assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED),
            Verdict::Continue => panic!("request without credentials was allowed"),
        }
        assert!(matches!(req.body(), crate::Body::Replay(r) if r.remaining() == b"{}"));
    }

    #[tokio::test]
    async fn decisions_emit_no_log_events() {
        let events = Events::default();
        let gate = BasicAuthGate::new(admin());
        let mut denied = Request::builder(Method::Get, "/Patient").build();
        let mut allowed = Request::builder(Method::Get, "/Patient")
            .header(AUTHORIZATION, HeaderValue::from_static("Basic YWRtaW46c2VjcmV0"))
            .build();

        let _guard = events.install();
        assert!(matches!(gate.evaluate(&mut denied).await, Verdict::Reject(_)));
        assert!(matches!(gate.evaluate(&mut allowed).await, Verdict::Continue));

        assert!(events.take().is_empty());
    }
}

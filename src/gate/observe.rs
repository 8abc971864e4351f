//! Request observation: log every request, validate written resources.
//!
//! For create and update requests with a body (`POST /{type}`,
//! `PUT /{type}/{id}`), the gate captures the body once, parses and validates
//! it, and puts a [`ReplayBody`] back on the request so the handler reads the
//! same bytes from offset 0. Every other request, including searches,
//! transactions and `$operation` calls sent as `POST`, is logged with its
//! metadata only.
//!
//! Observation is fail-open. Parse failures become validation messages and
//! read errors are logged; neither changes what happens to the request. The
//! one exception is a body over the capture limit: the stream is already
//! partly consumed at that point and cannot be handed on, so the gate answers
//! `413`.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use tracing::{error, info, warn};

use super::{Gate, GateFuture, Verdict};
use crate::body::{capture_stream, Body, BodyError, ReplayBody, DEFAULT_BODY_LIMIT};
use crate::method::{Method, Operation};
use crate::request::Request;
use crate::response::Response;
use crate::validate::{ResourceParser, SchemaValidator, Severity, ValidationMessage};

/// Logged in place of the body when none was captured.
pub const NO_BODY: &str = "no body";
/// Logged in place of validation messages when the body was not validated.
pub const NO_VALIDATION: &str = "no validation";

// ── Observation ───────────────────────────────────────────────────────────────

/// The one record emitted per observed request.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub request_id: String,
    pub method: Method,
    pub operation: Operation,
    pub path: String,
    /// Captured body as (lossy) UTF-8; `None` if nothing was captured.
    pub body: Option<String>,
    /// Parser/validator output; `None` if the body was not validated.
    pub validation: Option<Vec<ValidationMessage>>,
}

impl Observation {
    fn new(req: &Request) -> Self {
        Self {
            request_id: req.id().to_owned(),
            method: req.method(),
            operation: req.operation(),
            path: req.path().to_owned(),
            body: None,
            validation: None,
        }
    }

    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or(NO_BODY)
    }

    pub fn validation_text(&self) -> String {
        match &self.validation {
            None => NO_VALIDATION.to_owned(),
            Some(messages) => {
                let joined: Vec<String> = messages.iter().map(ToString::to_string).collect();
                format!("[{}]", joined.join(", "))
            }
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Incoming request [{id}]: {method} {path} ({operation}) body={body} validation={validation}",
            id = self.request_id,
            method = self.method,
            path = self.path,
            operation = self.operation,
            body = self.body_text(),
            validation = self.validation_text(),
        )
    }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Where observations go. Fire-and-forget.
pub trait RecordSink: Send + Sync {
    fn record(&self, observation: &Observation);
}

/// Emits each observation as one structured `tracing` event at `INFO`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl RecordSink for TracingSink {
    fn record(&self, o: &Observation) {
        info!(
            request_id = %o.request_id,
            method = %o.method,
            operation = %o.operation,
            path = %o.path,
            body = %o.body_text(),
            validation = %o.validation_text(),
            "incoming request"
        );
    }
}

// ── ObservabilityGate ─────────────────────────────────────────────────────────

/// Captures, validates and logs request bodies. Never rejects a request
/// except for an over-limit body.
#[derive(Clone)]
pub struct ObservabilityGate {
    parser: Arc<dyn ResourceParser>,
    validator: Arc<dyn SchemaValidator>,
    sink: Arc<dyn RecordSink>,
    limit: usize,
}

impl ObservabilityGate {
    /// Logs through [`TracingSink`] with a [`DEFAULT_BODY_LIMIT`] capture limit.
    pub fn new(
        parser: impl ResourceParser + 'static,
        validator: impl SchemaValidator + 'static,
    ) -> Self {
        Self {
            parser: Arc::new(parser),
            validator: Arc::new(validator),
            sink: Arc::new(TracingSink),
            limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn sink(mut self, sink: impl RecordSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Maximum body size captured, in bytes.
    pub fn limit(mut self, bytes: usize) -> Self {
        self.limit = bytes;
        self
    }

    /// Observes one request and emits exactly one record.
    ///
    /// When this returns, the request body is either untouched, a replay of
    /// the captured bytes positioned at offset 0, or [`Body::Spent`] if the
    /// stream failed. Only an over-limit body is returned as an error.
    pub async fn observe(&self, req: &mut Request) -> Result<(), BodyError> {
        let mut observation = Observation::new(req);
        let mut outcome = Ok(());

        if matches!(req.operation(), Operation::Create | Operation::Update) {
            match self.capture_body(req).await {
                None => {}
                Some(Ok(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    observation.validation = Some(self.check(&text));
                    observation.body = Some(text);
                }
                Some(Err(e @ BodyError::TooLarge { .. })) => {
                    warn!(request_id = %observation.request_id, error = %e, "request body not captured");
                    outcome = Err(e);
                }
                Some(Err(e)) => {
                    error!(request_id = %observation.request_id, error = %e, "error reading request body");
                }
            }
        }

        self.sink.record(&observation);
        outcome
    }

    /// Buffers the body and swaps in its replay. `None` if there is no body.
    async fn capture_body(&self, req: &mut Request) -> Option<Result<Bytes, BodyError>> {
        let captured = match req.body_mut().take() {
            Body::Stream(stream) => capture_stream(stream, self.limit).await,
            Body::Replay(mut replay) => {
                replay.rewind();
                Ok((replay.as_bytes().clone(), replay))
            }
            absent => {
                req.set_body(absent);
                return None;
            }
        };

        Some(captured.map(|(bytes, replay): (Bytes, ReplayBody)| {
            req.set_body(Body::Replay(replay));
            bytes
        }))
    }

    fn check(&self, text: &str) -> Vec<ValidationMessage> {
        match self.parser.parse(text) {
            Ok(resource) => self.validator.validate(&resource),
            Err(e) => vec![ValidationMessage::new(
                Severity::Error,
                format!("failed to parse resource: {e}"),
            )],
        }
    }
}

impl Gate for ObservabilityGate {
    fn evaluate<'a>(&'a self, req: &'a mut Request) -> GateFuture<'a> {
        Box::pin(async move {
            match self.observe(req).await {
                Ok(()) => Verdict::Continue,
                Err(e) => Verdict::Reject(
                    Response::builder()
                        .status(StatusCode::PAYLOAD_TOO_LARGE)
                        .text(e.to_string()),
                ),
            }
        })
    }
}

impl fmt::Debug for ObservabilityGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservabilityGate").field("limit", &self.limit).finish_non_exhaustive()
    }
}

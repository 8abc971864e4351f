//! Request gates.
//!
//! A gate is per-request logic that runs after the request is parsed and
//! before it is routed to a handler. Gates are registered on a [`Pipeline`]
//! in an explicit order and evaluated one after another on the connection
//! task:
//!
//! ```text
//! request ─▶ BasicAuthGate ─▶ ObservabilityGate ─▶ router ─▶ handler
//!                 │                   │
//!            Reject(401)        Reject(413) on over-limit body only
//! ```
//!
//! The first [`Verdict::Reject`] stops the pipeline; its response goes
//! straight back to the client and no later gate or handler runs.

pub mod auth;
pub mod observe;

use std::sync::Arc;

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

pub use auth::{AuthError, BasicAuthGate, Credentials};
pub use observe::{Observation, ObservabilityGate, RecordSink, TracingSink};

/// The future a gate returns.
pub type GateFuture<'a> = BoxFuture<'a, Verdict>;

/// Outcome of evaluating one gate.
#[derive(Debug)]
pub enum Verdict {
    /// Hand the request to the next gate (or the router).
    Continue,
    /// Stop here and answer with this response.
    Reject(Response),
}

/// Per-request logic run before routing.
///
/// Gates may mutate the request (e.g. swap its body for a replay). They must
/// hold no per-request state of their own: one instance serves every
/// connection concurrently.
pub trait Gate: Send + Sync + 'static {
    fn evaluate<'a>(&'a self, req: &'a mut Request) -> GateFuture<'a>;
}

/// An ordered list of gates.
#[derive(Clone, Default)]
pub struct Pipeline {
    gates: Vec<Arc<dyn Gate>>,
}

impl Pipeline {
    /// An empty pipeline: every request goes straight to the router.
    pub fn new() -> Self {
        Self { gates: Vec::new() }
    }

    /// Authentication first, then observability.
    pub fn standard(auth: BasicAuthGate, observe: ObservabilityGate) -> Self {
        Self::new().gate(auth).gate(observe)
    }

    /// Appends a gate. Gates run in the order they were added.
    pub fn gate(mut self, gate: impl Gate) -> Self {
        self.gates.push(Arc::new(gate));
        self
    }

    pub fn len(&self) -> usize { self.gates.len() }
    pub fn is_empty(&self) -> bool { self.gates.is_empty() }

    /// Evaluates every gate in order, stopping at the first rejection.
    pub async fn run(&self, req: &mut Request) -> Verdict {
        for gate in &self.gates {
            if let Verdict::Reject(response) = gate.evaluate(req).await {
                return Verdict::Reject(response);
            }
        }
        Verdict::Continue
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fmt;
    use std::sync::Mutex;

    use http::StatusCode;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, SubscriberExt};

    use crate::method::Method;

    /// Fields of one captured `tracing` event, plus its `level`.
    pub(crate) type Fields = HashMap<&'static str, String>;

    /// Collects every `tracing` event emitted on this thread while installed.
    #[derive(Clone, Default)]
    pub(crate) struct Events(Arc<Mutex<Vec<Fields>>>);

    impl Events {
        pub(crate) fn install(&self) -> tracing::subscriber::DefaultGuard {
            tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
        }

        pub(crate) fn take(&self) -> Vec<Fields> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Events {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = Fields::new();
            fields.insert("level", event.metadata().level().to_string());
            event.record(&mut FieldMap(&mut fields));
            self.0.lock().unwrap().push(fields);
        }
    }

    struct FieldMap<'a>(&'a mut Fields);

    impl Visit for FieldMap<'_> {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name(), value.to_owned());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name(), format!("{value:?}"));
        }
    }

    /// Records its name into a shared log, then returns a fixed verdict.
    struct Named {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        reject: bool,
    }

    impl Gate for Named {
        fn evaluate<'a>(&'a self, _req: &'a mut Request) -> GateFuture<'a> {
            Box::pin(async move {
                self.log.lock().unwrap().push(self.name);
                if self.reject {
                    Verdict::Reject(Response::status(StatusCode::FORBIDDEN))
                } else {
                    Verdict::Continue
                }
            })
        }
    }

    #[tokio::test]
    async fn runs_in_order_and_stops_at_first_reject() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let gate = |name, reject| Named { name, log: log.clone(), reject };
        let pipeline = Pipeline::new()
            .gate(gate("first", false))
            .gate(gate("second", true))
            .gate(gate("third", false));

        let mut req = Request::builder(Method::Get, "/Patient").build();
        let verdict = pipeline.run(&mut req).await;

        assert!(matches!(verdict, Verdict::Reject(ref r) if r.status_code() == StatusCode::FORBIDDEN));
        assert_eq!(*log.lock().unwrap(), ["first", "second"]);
    }

    #[tokio::test]
    async fn empty_pipeline_continues() {
        let mut req = Request::builder(Method::Get, "/").build();
        assert!(matches!(Pipeline::new().run(&mut req).await, Verdict::Continue));
    }
}

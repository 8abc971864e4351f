//! HTTP server, request dispatch and graceful shutdown.
//!
//! Each connection runs on its own tokio task. For every request on it:
//!
//! 1. Unknown methods are answered with `405`.
//! 2. The gate [`Pipeline`] runs in order; a rejection is sent as-is.
//! 3. The router picks a handler (`404` if none) and the handler runs.
//!
//! Gates are awaited in-line on the connection task; nothing is spawned per
//! request. Timeouts on slow or stalled bodies are left to hyper and the
//! reverse proxy in front.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server stops accepting, lets every in-flight
//! connection finish, then returns from [`Server::serve`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::gate::{Pipeline, Verdict};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    pipeline: Pipeline,
}

impl Server {
    /// A server that will listen on `addr` with an empty gate pipeline.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, pipeline: Pipeline::new() }
    }

    /// Sets the gates every request passes before routing.
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Starts accepting connections and dispatching them through the
    /// pipeline and `router`.
    ///
    /// Returns only after a full graceful shutdown.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;

        let router = Arc::new(router);
        let pipeline = Arc::new(self.pipeline);

        info!(addr = %self.addr, gates = pipeline.len(), "gatehouse listening");

        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let pipeline = Arc::clone(&pipeline);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            let pipeline = Arc::clone(&pipeline);
                            async move { dispatch(&router, &pipeline, req).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("gatehouse stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one hyper request and produces one response. Never fails.
async fn dispatch(
    router: &Router,
    pipeline: &Pipeline,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let Ok(method) = req.method().as_str().parse::<Method>() else {
        debug!(method = %req.method(), "unsupported method");
        return Ok(Response::status(StatusCode::METHOD_NOT_ALLOWED).into_inner());
    };

    let request = Request::from_hyper(req, method);
    Ok(handle(router, pipeline, request).await.into_inner())
}

/// Runs the gates, then the routed handler.
pub(crate) async fn handle(router: &Router, pipeline: &Pipeline, mut request: Request) -> Response {
    if let Verdict::Reject(response) = pipeline.run(&mut request).await {
        return response;
    }

    match router.lookup(request.method(), request.path()) {
        Some((handler, params)) => {
            request.set_params(params);
            handler.call(request).await
        }
        None => Response::status(StatusCode::NOT_FOUND),
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM (Unix) or Ctrl-C.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use http::header::AUTHORIZATION;
    use http::HeaderValue;

    use crate::gate::{BasicAuthGate, Credentials, ObservabilityGate};
    use crate::validate::{JsonResourceParser, StructuralValidator};

    async fn echo(mut req: Request) -> Response {
        match req.body_mut().to_bytes(1024).await {
            Ok(bytes) => Response::json(bytes),
            Err(_) => Response::status(StatusCode::BAD_REQUEST),
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::standard(
            BasicAuthGate::new(Credentials::new("admin", "secret")),
            ObservabilityGate::new(JsonResourceParser, StructuralValidator),
        )
    }

    fn authorized(method: Method, path: &str) -> crate::request::RequestBuilder {
        let header = format!("Basic {}", BASE64.encode("admin:secret"));
        Request::builder(method, path).header(AUTHORIZATION, HeaderValue::from_str(&header).unwrap())
    }

    #[tokio::test]
    async fn handler_reads_body_after_gates() {
        let router = Router::new().post("/{type}", echo);
        let req = authorized(Method::Post, "/Patient").body(r#"{"resourceType":"Patient"}"#).build();

        let res = handle(&router, &pipeline(), req).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(&res.body()[..], br#"{"resourceType":"Patient"}"#);
    }

    #[tokio::test]
    async fn unauthenticated_request_never_reaches_router() {
        let router = Router::new().post("/{type}", echo);
        let req = Request::builder(Method::Post, "/Patient").body("{}").build();

        let res = handle(&router, &pipeline(), req).await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unrouted_path_is_404_after_auth() {
        let router = Router::new();
        let res = handle(&router, &pipeline(), authorized(Method::Get, "/nowhere").build()).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }
}

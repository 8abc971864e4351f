//! # gatehouse
//!
//! A minimal HTTP framework for resource servers, with an explicit gate
//! pipeline in front of the router.
//!
//! ## The pipeline
//!
//! Every request passes the gates of a [`gate::Pipeline`] in registration
//! order before it is routed. Two gates ship with the crate:
//!
//! - [`gate::BasicAuthGate`]: HTTP Basic authentication against one
//!   configured credential pair. Fail-closed: anything but an exact match is
//!   answered with `401` and nothing else runs.
//! - [`gate::ObservabilityGate`]: logs every request, and for `POST`/`PUT`
//!   captures the body, validates it as a resource and puts a
//!   [`ReplayBody`] back so the handler still reads every byte. Fail-open:
//!   parse and read errors are logged, never returned.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use gatehouse::gate::{ObservabilityGate, Pipeline};
//! use gatehouse::validate::{JsonResourceParser, StructuralValidator};
//! use gatehouse::{Config, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gatehouse::Error> {
//!     let config = Config::from_env()?;
//!
//!     let pipeline = Pipeline::standard(
//!         config.auth_gate(),
//!         ObservabilityGate::new(JsonResourceParser, StructuralValidator)
//!             .limit(config.max_body_bytes),
//!     );
//!
//!     let app = Router::new().post("/{type}", create);
//!
//!     Server::new(config.bind_addr).pipeline(pipeline).serve(app).await
//! }
//!
//! async fn create(mut req: Request) -> Response {
//!     // The observability gate already buffered this; reading is free.
//!     let body = req.body_mut().to_bytes(usize::MAX).await.unwrap_or_default();
//!     Response::json(body)
//! }
//! ```

mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;

pub mod body;
pub mod config;
pub mod gate;
pub mod validate;

pub use body::{Body, BodyError, ReplayBody};
pub use config::Config;
pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use method::{Method, Operation};
pub use request::{Request, RequestBuilder, REQUEST_ID_HEADER};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;

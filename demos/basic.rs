//! Minimal gatehouse example: an in-memory resource store behind Basic auth
//! and request observation.
//!
//! Run with:
//!   GATEHOUSE_BASIC_AUTH_USERNAME=admin GATEHOUSE_BASIC_AUTH_PASSWORD=secret \
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -u admin:secret -X POST http://localhost:8080/Patient \
//!        -H 'content-type: application/fhir+json' \
//!        -d '{"resourceType":"Patient","id":"p1"}'
//!   curl -u admin:secret http://localhost:8080/Patient/p1
//!   curl http://localhost:8080/Patient/p1          # 401

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use bytes::Bytes;
use gatehouse::gate::{ObservabilityGate, Pipeline};
use gatehouse::validate::{JsonResourceParser, StructuralValidator};
use gatehouse::{Config, ContentType, Request, Response, Router, Server};
use http::StatusCode;
use tracing_subscriber::EnvFilter;

type Store = Arc<Mutex<HashMap<String, Bytes>>>;

fn store() -> &'static Store {
    static STORE: OnceLock<Store> = OnceLock::new();
    STORE.get_or_init(Store::default)
}

#[tokio::main]
async fn main() -> Result<(), gatehouse::Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let pipeline = Pipeline::standard(
        config.auth_gate(),
        ObservabilityGate::new(JsonResourceParser, StructuralValidator).limit(config.max_body_bytes),
    );

    let app = Router::new()
        .post("/{type}",      create)
        .put("/{type}/{id}",  update)
        .get("/{type}/{id}",  read)
        .delete("/{type}/{id}", delete);

    Server::new(config.bind_addr).pipeline(pipeline).serve(app).await
}

fn key(req: &Request, id: &str) -> String {
    format!("{}/{id}", req.param("type").unwrap_or_default())
}

// POST /{type}: stores under a generated id.
async fn create(mut req: Request) -> Response {
    let Ok(body) = req.body_mut().to_bytes(usize::MAX).await else {
        return Response::status(StatusCode::BAD_REQUEST);
    };
    let id = uuid::Uuid::new_v4().to_string();
    let location = format!("/{}", key(&req, &id));
    if let Ok(mut store) = store().lock() {
        store.insert(key(&req, &id), body);
    }
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", &location)
        .no_body()
}

// PUT /{type}/{id}
async fn update(mut req: Request) -> Response {
    let Ok(body) = req.body_mut().to_bytes(usize::MAX).await else {
        return Response::status(StatusCode::BAD_REQUEST);
    };
    let id = req.param("id").unwrap_or_default().to_owned();
    if let Ok(mut store) = store().lock() {
        store.insert(key(&req, &id), body);
    }
    Response::status(StatusCode::OK)
}

// GET /{type}/{id}
async fn read(req: Request) -> Response {
    let id = req.param("id").unwrap_or_default();
    let found = store().lock().ok().and_then(|s| s.get(&key(&req, id)).cloned());
    match found {
        Some(body) => Response::builder().bytes(ContentType::FhirJson, body),
        None => Response::status(StatusCode::NOT_FOUND),
    }
}

// DELETE /{type}/{id} → 204
async fn delete(req: Request) -> Response {
    let id = req.param("id").unwrap_or_default();
    if let Ok(mut store) = store().lock() {
        store.remove(&key(&req, id));
    }
    Response::status(StatusCode::NO_CONTENT)
}

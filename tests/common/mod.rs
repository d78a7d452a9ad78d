#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use crudflow::{
    CrudConfig, CrudController, CrudError, EventContext, Fields, Listener, MemoryRepository,
    Subscription, ValidationRule, routing::crud_router,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// In-memory blogs table with three rows and two validation rules
pub fn blogs_repository() -> Arc<MemoryRepository> {
    let repo = MemoryRepository::new("Blogs", "blog", "blogs")
        .with_rule("name", ValidationRule::required())
        .with_rule("body", ValidationRule::length(Some(3), None));

    for (name, body) in [
        ("First post", "Lorem ipsum"),
        ("Second post", "Dolor sit amet"),
        ("Third post", "Consectetur"),
    ] {
        let mut fields = Fields::new();
        fields.insert("name".into(), json!(name));
        fields.insert("body".into(), json!(body));
        repo.seed(fields);
    }
    Arc::new(repo)
}

/// Route crate logs to the test output; `RUST_LOG` isn't consulted
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn setup_controller(config: CrudConfig) -> (Arc<MemoryRepository>, CrudController) {
    init_tracing();
    let repo = blogs_repository();
    let controller = CrudController::new(config, repo.clone()).expect("Failed to build controller");
    (repo, controller)
}

/// Router for `/blogs` with the given built-in listeners enabled
pub fn setup_test_app(listeners: &[&str]) -> (Arc<MemoryRepository>, Router) {
    let config = listeners
        .iter()
        .fold(CrudConfig::rest("/blogs"), |config, name| config.with_listener(name, json!({})));
    let (repo, controller) = setup_controller(config);
    (repo, crud_router(Arc::new(controller)))
}

/// Records `<name>:<event>` for every event it is subscribed to
pub struct RecordingListener {
    name: String,
    subscriptions: Vec<Subscription>,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingListener {
    pub fn new(name: &str, subscriptions: Vec<Subscription>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            subscriptions,
            log,
        }
    }
}

impl Listener for RecordingListener {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn implemented_events(&self) -> Vec<Subscription> {
        self.subscriptions.clone()
    }

    fn handle(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, ctx.event()));
        Ok(())
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Send one request; JSON bodies are decoded, empty bodies come back as `null`
pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    TestResponse { status, headers, body }
}

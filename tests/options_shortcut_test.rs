use axum::http::{Method, StatusCode, header};
use crudflow::{CrudConfig, Event, Subscription, routing::crud_router};
use std::sync::{Arc, Mutex};

mod common;
use common::{RecordingListener, send, setup_controller, setup_test_app};

#[tokio::test]
async fn test_options_lists_routable_verbs() {
    let (_, app) = setup_test_app(&[]);

    let response = send(&app, Method::OPTIONS, "/blogs", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST");
    assert_eq!(response.body, serde_json::Value::Null);

    let response = send(&app, Method::OPTIONS, "/blogs/1", None).await;
    assert_eq!(
        response.headers[header::ACCESS_CONTROL_ALLOW_METHODS],
        "GET, PUT, DELETE"
    );
}

#[tokio::test]
async fn test_options_verbs_are_configurable() {
    let config = CrudConfig {
        options_verbs: vec!["get".into(), "PATCH".into(), "POST".into()],
        ..CrudConfig::rest("/blogs")
    };
    let (_, controller) = setup_controller(config);
    let app = crud_router(Arc::new(controller));

    let response = send(&app, Method::OPTIONS, "/blogs/1", None).await;
    assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, PATCH");
}

#[tokio::test]
async fn test_options_never_runs_an_action() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (_, mut controller) = setup_controller(CrudConfig::rest("/blogs"));
    let subscriptions = Event::ALL.iter().map(|event| Subscription::new(*event)).collect();
    let spy = RecordingListener::new("spy", subscriptions, Arc::clone(&log));
    controller.add_listener(Arc::new(spy));
    let app = crud_router(Arc::new(controller));

    send(&app, Method::OPTIONS, "/blogs", None).await;
    assert!(log.lock().unwrap().is_empty());

    send(&app, Method::GET, "/blogs", None).await;
    assert!(!log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_disabled_action_drops_out_of_options() {
    let (_, mut controller) = setup_controller(CrudConfig::rest("/blogs"));
    controller.disable("add").unwrap();
    let app = crud_router(Arc::new(controller));

    let response = send(&app, Method::OPTIONS, "/blogs", None).await;
    assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET");
}

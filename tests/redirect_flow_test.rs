use axum::http::{Method, StatusCode, header};
use crudflow::{CrudConfig, Event, routing::crud_router};
use serde_json::json;
use std::sync::Arc;

mod common;
use common::{send, setup_controller, setup_test_app};

#[tokio::test]
async fn test_create_redirects_to_index() {
    let (repo, app) = setup_test_app(&[]);

    let response = send(
        &app,
        Method::POST,
        "/blogs",
        Some(json!({"name": "Fourth post", "body": "Hello there"})),
    )
    .await;
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.headers[header::LOCATION], "/blogs");
    assert_eq!(repo.len(), 4);
}

#[tokio::test]
async fn test_redirect_rules() {
    let (_, app) = setup_test_app(&["redirect"]);

    let response = send(
        &app,
        Method::POST,
        "/blogs",
        Some(json!({"name": "Fourth post", "body": "Hello there", "_edit": "1"})),
    )
    .await;
    assert_eq!(response.headers[header::LOCATION], "/blogs/4");

    let response = send(
        &app,
        Method::PUT,
        "/blogs/2",
        Some(json!({"name": "Renamed", "_edit": true})),
    )
    .await;
    assert_eq!(response.headers[header::LOCATION], "/blogs/2");

    let response = send(
        &app,
        Method::PUT,
        "/blogs/2",
        Some(json!({"name": "Renamed again", "_add": 1})),
    )
    .await;
    assert_eq!(response.headers[header::LOCATION], "/blogs");
}

#[tokio::test]
async fn test_redirect_url_override() {
    let (_, app) = setup_test_app(&[]);

    let body = Some(json!({"name": "x"}));
    let response = send(&app, Method::PUT, "/blogs/2?redirect_url=/home", body).await;
    assert_eq!(response.headers[header::LOCATION], "/home");

    let response = send(
        &app,
        Method::PUT,
        "/blogs/2?redirect_url=/home",
        Some(json!({"name": "y", "_redirect_url": "/dashboard"})),
    )
    .await;
    assert_eq!(response.headers[header::LOCATION], "/dashboard");
}

#[tokio::test]
async fn test_api_listener_renders_instead_of_redirecting() {
    let (_, app) = setup_test_app(&["api", "redirect"]);

    let response = send(
        &app,
        Method::POST,
        "/blogs",
        Some(json!({"name": "Fourth post", "body": "Hello there", "_edit": "1"})),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert!(response.headers.get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_delete_redirects_to_index() {
    let (repo, app) = setup_test_app(&[]);

    let response = send(&app, Method::DELETE, "/blogs/1", None).await;
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.headers[header::LOCATION], "/blogs");
    assert_eq!(repo.len(), 2);
}

#[tokio::test]
async fn test_stopped_before_delete_keeps_record() {
    let (repo, mut controller) = setup_controller(CrudConfig::rest("/blogs"));
    controller.on(Event::BeforeDelete, 10, |ctx| {
        ctx.stop_propagation();
        Ok(())
    });
    let app = crud_router(Arc::new(controller));

    let response = send(&app, Method::DELETE, "/blogs/1", None).await;
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.headers[header::LOCATION], "/blogs");
    assert_eq!(repo.len(), 3);
}

#[tokio::test]
async fn test_stopped_before_save_may_declare_success() {
    let (repo, mut controller) = setup_controller(CrudConfig::rest("/blogs"));
    controller.on(Event::BeforeSave, 10, |ctx| {
        ctx.subject.insert("success", true);
        ctx.stop_propagation();
        Ok(())
    });
    controller.on(Event::AfterSave, 10, |ctx| {
        assert!(ctx.subject.created());
        Ok(())
    });
    let app = crud_router(Arc::new(controller));

    let response = send(&app, Method::POST, "/blogs", Some(json!({"name": "Ghost"}))).await;
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(repo.len(), 3);
}

#[tokio::test]
async fn test_listener_can_rewrite_redirect() {
    let (_, mut controller) = setup_controller(CrudConfig::rest("/blogs"));
    controller.on(Event::BeforeRedirect, 10, |ctx| {
        ctx.subject.insert("url", "/thanks").insert("status", 303_i64);
        Ok(())
    });
    let app = crud_router(Arc::new(controller));

    let response = send(&app, Method::DELETE, "/blogs/3", None).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.headers[header::LOCATION], "/thanks");
}

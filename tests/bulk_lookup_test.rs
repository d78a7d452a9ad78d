use axum::http::{Method, StatusCode, header};
use crudflow::{
    CrudConfig, CrudController, CrudRequest, Event, Fields, MemoryRepository, Outcome, Repository,
    Subject, routing::crud_router,
};
use serde_json::json;
use std::sync::Arc;

mod common;
use common::{init_tracing, send, setup_controller};

fn bulk_config() -> CrudConfig {
    CrudConfig::rest("/blogs")
        .with_action("lookup", json!({"kind": "lookup"}))
        .with_action("bulkDelete", json!({"kind": "bulkDelete"}))
        .with_action("publishAll", json!({"kind": "bulkToggle", "field": "published"}))
        .with_action(
            "archive",
            json!({"kind": "bulkSetValue", "field": "status", "value": "archived"}),
        )
}

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_bulk_delete_removes_listed_records() {
    let (repo, controller) = setup_controller(bulk_config());
    let app = crud_router(Arc::new(controller));

    let response = send(&app, Method::POST, "/blogs/bulkDelete", Some(json!({"id": [1, 3]}))).await;
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.headers[header::LOCATION], "/blogs");
    assert_eq!(repo.len(), 1);
    assert!(repo.get("2").await.unwrap().is_some());
}

#[tokio::test]
async fn test_stopped_before_bulk_changes_nothing() {
    let (repo, mut controller) = setup_controller(bulk_config());
    controller.on(Event::BeforeBulk, 10, |ctx| {
        ctx.stop_propagation();
        Ok(())
    });

    let request = CrudRequest::new(Method::POST, "/blogs/bulkDelete")
        .with_data(fields(json!({"id": [1, 2]})));
    let mut subject = Subject::new();
    let outcome = controller.run_with(&request, "bulkDelete", &mut subject).await;

    let Ok(Outcome::Redirect(redirect)) = outcome else {
        panic!("expected redirect");
    };
    assert_eq!(redirect.url, "/blogs");
    assert_eq!(redirect.flash[0].kind, "error");
    assert_eq!(redirect.flash[0].text, "Could not complete deletion");
    assert!(!subject.success());
    assert!(subject.has_event("Crud.beforeBulk"));
    assert!(!subject.has_event("Crud.afterBulk"));
    assert_eq!(repo.len(), 3);
}

#[tokio::test]
async fn test_bulk_without_id_list_is_a_bad_request() {
    let (repo, controller) = setup_controller(bulk_config().with_listener("api", json!({})));
    let app = crud_router(Arc::new(controller));

    for body in [json!({"ids": [1]}), json!({"id": "1"})] {
        let response = send(&app, Method::POST, "/blogs/bulkDelete", Some(body)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["success"], false);
        assert_eq!(response.body["data"]["message"], "Bad request data");
    }
    assert_eq!(repo.len(), 3);
}

#[tokio::test]
async fn test_bulk_toggle_flips_the_field() {
    let (repo, controller) = setup_controller(bulk_config());
    let controller = Arc::new(controller);

    let request = CrudRequest::new(Method::POST, "/blogs/publishAll")
        .with_data(fields(json!({"id": [2]})));
    let outcome = controller.run(&request, "publishAll").await.unwrap();
    let Outcome::Redirect(redirect) = outcome else {
        panic!("expected redirect");
    };
    assert_eq!(redirect.flash[0].text, "Value toggled successfully");
    let stored = repo.get("2").await.unwrap().unwrap();
    assert_eq!(stored.get("published"), Some(&json!(true)));

    controller.run(&request, "publishAll").await.unwrap();
    let stored = repo.get("2").await.unwrap().unwrap();
    assert_eq!(stored.get("published"), Some(&json!(false)));
    assert_eq!(repo.get("1").await.unwrap().unwrap().get("published"), None);
}

#[tokio::test]
async fn test_bulk_set_value_with_all_selector() {
    let (repo, controller) = setup_controller(bulk_config());
    let app = crud_router(Arc::new(controller));

    let body = json!({"id": {"1": 0, "3": 0, "_all": 1}});
    let response = send(&app, Method::PUT, "/blogs/archive", Some(body)).await;
    assert_eq!(response.status, StatusCode::FOUND);

    let archived = Some(json!("archived"));
    for (id, status) in [("1", archived.clone()), ("2", None), ("3", archived)] {
        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.get("status").cloned(), status);
    }
}

#[tokio::test]
async fn test_bulk_with_no_matching_ids_flashes_error() {
    let (repo, controller) = setup_controller(bulk_config());

    let request = CrudRequest::new(Method::POST, "/blogs/bulkDelete")
        .with_data(fields(json!({"id": [99]})));
    let mut subject = Subject::new();
    let outcome = controller.run_with(&request, "bulkDelete", &mut subject).await;

    let Ok(Outcome::Redirect(redirect)) = outcome else {
        panic!("expected redirect");
    };
    assert_eq!(redirect.flash[0].kind, "error");
    assert!(!subject.success());
    assert!(subject.has_event("Crud.afterBulk"));
    assert_eq!(repo.len(), 3);
}

#[tokio::test]
async fn test_lookup_lists_display_field_by_id() {
    let (_, controller) = setup_controller(bulk_config());
    let app = crud_router(Arc::new(controller));

    let response = send(&app, Method::GET, "/blogs/lookup", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    assert_eq!(
        response.body["blogs"],
        json!({"1": "First post", "2": "Second post", "3": "Third post"})
    );
}

#[tokio::test]
async fn test_lookup_fields_from_query_when_known() {
    let (_, controller) = setup_controller(bulk_config().with_listener("api", json!({})));
    let app = crud_router(Arc::new(controller));

    let response = send(&app, Method::GET, "/blogs/lookup?value=body&limit=2", None).await;
    assert_eq!(response.body["data"], json!({"1": "Lorem ipsum", "2": "Dolor sit amet"}));

    let response = send(&app, Method::GET, "/blogs/lookup?value_field=nope&limit=1", None).await;
    assert_eq!(response.body["data"], json!({"1": "First post"}));
}

fn blogs_with_authors() -> Arc<MemoryRepository> {
    let authors = MemoryRepository::new("Authors", "author", "authors");
    for name in ["Ann", "Bo"] {
        authors.seed(fields(json!({"name": name})));
    }
    let blogs = MemoryRepository::new("Blogs", "blog", "blogs")
        .with_association("authors", Arc::new(authors))
        .with_query_log();
    blogs.seed(fields(json!({"name": "First post", "body": "Lorem ipsum"})));
    Arc::new(blogs)
}

#[tokio::test]
async fn test_add_form_publishes_related_lists() {
    init_tracing();
    let controller =
        CrudController::new(CrudConfig::rest("/blogs"), blogs_with_authors()).unwrap();

    let request = CrudRequest::new(Method::GET, "/blogs");
    let Outcome::Render(render) = controller.run(&request, "add").await.unwrap() else {
        panic!("expected render");
    };
    let body = render.data.body();
    assert_eq!(body["authors"], json!({"1": "Ann", "2": "Bo"}));
    assert_eq!(body["success"], true);
    assert!(body["blog"].is_object());
}

#[tokio::test]
async fn test_related_model_listener_renames_variable() {
    init_tracing();
    let mut controller =
        CrudController::new(CrudConfig::rest("/blogs"), blogs_with_authors()).unwrap();
    controller.on(Event::RelatedModel, 10, |ctx| {
        ctx.subject.insert("view_var", "writers");
        Ok(())
    });

    let request = CrudRequest::new(Method::GET, "/blogs/1").with_param("id", "1");
    let mut subject = Subject::new();
    let outcome = controller.run_with(&request, "edit", &mut subject).await;

    let Ok(Outcome::Render(render)) = outcome else {
        panic!("expected render");
    };
    assert_eq!(render.data.get("writers"), Some(&json!({"1": "Ann", "2": "Bo"})));
    assert!(render.data.get("authors").is_none());
    assert!(subject.has_event("Crud.relatedModel"));
    assert!(!subject.contains("association"));
}

#[tokio::test]
async fn test_query_log_in_debug_mode() {
    init_tracing();
    let repository = blogs_with_authors();
    let config = CrudConfig::rest("/blogs")
        .with_debug(true)
        .with_listener("api", json!({}))
        .with_listener("apiQueryLog", json!({}));
    let controller = CrudController::new(config, repository.clone()).unwrap();
    let app = crud_router(Arc::new(controller));

    let response = send(&app, Method::GET, "/blogs/1", None).await;
    assert_eq!(response.status, StatusCode::OK);
    let log = response.body["queryLog"]["Blogs"].as_array().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0]["operation"], "find");
    assert_eq!(log[0]["rows"], 1);
    assert!(!repository.query_log().is_empty());
}

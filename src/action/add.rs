use axum::http::Method;

use super::Run;
use crate::errors::CrudError;
use crate::render::Outcome;
use crate::subject::Value;

/// `GET` renders a new entity pre-filled from the query string; every other
/// verb builds one from the body and saves it.
pub(super) async fn handle(run: &mut Run<'_>) -> Result<Outcome, CrudError> {
    let request = run.env.request;
    let repository = run.env.repository;

    if request.method == Method::GET {
        let entity = repository.new_entity(request.query_fields());
        run.subject
            .set([("success", Value::Bool(true)), ("entity", entity.into())]);
        return run.render().await;
    }

    let entity = repository.new_entity(request.entity_data());
    run.subject.insert("entity", entity);
    run.save(true).await
}

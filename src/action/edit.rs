use axum::http::Method;

use super::Run;
use crate::errors::CrudError;
use crate::render::Outcome;

/// `GET` renders the record; every other verb patches it with the body and saves.
pub(super) async fn handle(run: &mut Run<'_>) -> Result<Outcome, CrudError> {
    let id = run.id()?;
    let entity = run.find_record(&id).await?;

    let request = run.env.request;
    if request.method == Method::GET {
        return run.render().await;
    }

    let entity = run.env.repository.patch_entity(entity, request.entity_data());
    run.subject.insert("entity", entity);
    run.save(false).await
}

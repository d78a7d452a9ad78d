use serde_json::Value as Json;

use super::Run;
use crate::errors::CrudError;
use crate::event::Event;
use crate::pagination::page_params;
use crate::render::Outcome;
use crate::subject::Value;

/// Render a `key → label` list of the finder's records. The `key_field` (or
/// `id`) and `value_field` (or `value`) query parameters pick other fields
/// when the records have them.
pub(super) async fn handle(run: &mut Run<'_>) -> Result<Outcome, CrudError> {
    let repository = run.env.repository;
    let request = run.env.request;
    let requested = |keys: [&str; 2]| {
        keys.into_iter()
            .find_map(|key| request.query_value(key).filter(|value| !value.is_empty()))
            .filter(|field| repository.has_field(field))
    };

    let find = &run.config.find_method;
    let mut options = find.options.clone();
    if let Some(field) = requested(["key_field", "id"]) {
        options.insert("keyField".into(), Json::from(field));
    }
    if let Some(field) = requested(["value_field", "value"]) {
        options.insert("valueField".into(), Json::from(field));
    }
    let query = repository.query(&find.name, &options);
    run.subject
        .set([("success", Value::Bool(true)), ("query", query.into())]);
    run.fire(Event::BeforeLookup)?;

    let query = run.subject.query().cloned().unwrap_or_default();
    let (page, limit) = page_params(
        request.query_value("page"),
        request.query_value("limit"),
        run.config.limit,
        run.config.max_limit,
    );
    let page = repository.paginate(&query, page, limit).await?;
    run.subject.insert("entities", page.items);
    run.fire(Event::AfterLookup)?;
    run.render().await
}

use serde_json::Value as Json;

use super::{ActionConfig, ActionKind, Run};
use crate::data::{BulkOperation, id_value};
use crate::errors::CrudError;
use crate::event::Event;
use crate::listener::scalar_text;
use crate::render::Outcome;
use crate::subject::{Value, json_truthy};

/// Apply one write to every record the request lists by id, then redirect to
/// the index whatever the result.
pub(super) async fn handle(run: &mut Run<'_>) -> Result<Outcome, CrudError> {
    let operation = operation(run.config)?;
    let ids = requested_ids(run.env.request.data.get("id"))?;

    let repository = run.env.repository;
    let find = &run.config.find_method;
    let query = repository.query(&find.name, &find.options).where_in(
        repository.primary_key(),
        ids.iter().map(|id| id_value(id)).collect(),
    );
    run.subject
        .set([("ids", Value::Json(Json::from(ids))), ("query", query.into())]);

    if run.fire(Event::BeforeBulk)?.stopped {
        run.subject.insert("success", false);
        run.set_flash("error")?;
        let url = run.index_url();
        return run.redirect(url);
    }

    let query = run.subject.query().cloned().unwrap_or_default();
    let touched = repository.bulk(&query, &operation).await?;
    let success = touched > 0;
    tracing::debug!(operation = operation.name(), touched, "Bulk operation applied");

    run.subject.insert("success", success);
    run.fire(Event::AfterBulk)?;
    run.set_flash(if success { "success" } else { "error" })?;

    let url = run.index_url();
    run.redirect(url)
}

fn operation(config: &ActionConfig) -> Result<BulkOperation, CrudError> {
    let field = || {
        config
            .field
            .clone()
            .filter(|field| !field.is_empty())
            .ok_or_else(|| {
                CrudError::invalid_config(format!("{}: no field value specified", config.name))
            })
    };
    Ok(match config.kind {
        ActionKind::BulkToggle => BulkOperation::Toggle { field: field()? },
        ActionKind::BulkSetValue => BulkOperation::SetValue {
            field: field()?,
            value: config.value.clone().unwrap_or(Json::Null),
        },
        _ => BulkOperation::Delete,
    })
}

/// Ids from the `id` body field: a list, or an object whose values are ids.
/// An object with a truthy `_all` selects all of its keys instead. Falsy
/// entries are dropped.
fn requested_ids(data: Option<&Json>) -> Result<Vec<String>, CrudError> {
    let ids: Vec<String> = match data {
        Some(Json::Array(items)) => items
            .iter()
            .filter(|item| json_truthy(item))
            .filter_map(scalar_text)
            .collect(),
        Some(Json::Object(map)) => {
            let entries = map.iter().filter(|(key, _)| *key != "_all");
            if map.get("_all").is_some_and(json_truthy) {
                entries.map(|(key, _)| key.clone()).collect()
            } else {
                entries
                    .map(|(_, value)| value)
                    .filter(|value| json_truthy(value))
                    .filter_map(scalar_text)
                    .collect()
            }
        }
        _ => return Err(CrudError::bad_request("Bad request data")),
    };
    Ok(ids)
}

//! Shapes every response as an API document: `{ "success": ..., "data": ... }`.
//!
//! Redirects are turned into renders, flash messages are suppressed, and the
//! status code comes from the action's `api` configuration.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{ActionFilter, Listener, Subscription, fill_placeholders, options_from, scalar_text};
use crate::action::ApiResponse;
use crate::data::Fields;
use crate::errors::CrudError;
use crate::event::{Event, EventContext};
use crate::render::ViewData;
use crate::subject::{Subject, Value as SubjectValue};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiOptions {
    /// Let flash messages through
    pub set_flash: bool,
    #[serde(flatten)]
    pub filter: ActionFilter,
}

#[derive(Debug, Clone, Default)]
pub struct ApiListener {
    options: ApiOptions,
}

impl ApiListener {
    #[must_use]
    pub fn new(options: ApiOptions) -> Self {
        Self { options }
    }

    /// # Errors
    ///
    /// Returns `CrudError::InvalidConfig` when an override has the wrong type.
    pub fn with_options(overrides: &Value) -> Result<Self, CrudError> {
        Ok(Self::new(options_from(overrides)?))
    }

    #[must_use]
    pub fn options(&self) -> &ApiOptions {
        &self.options
    }

    fn respond(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
        let Some(action) = ctx.action() else {
            return Ok(());
        };
        if !self.options.filter.applies(ctx.subject) {
            return Ok(());
        }

        let success = ctx.subject.success();
        let api = action.api_response(success);
        let data_var = action.data_var();

        ctx.view.set_default("success", || json!(success));
        if ctx.view.get(data_var).is_none() {
            let data = response_data(api, ctx.subject)?;
            ctx.view.set(data_var, data);
        }

        if !serializes(ctx.view, "success") {
            ctx.view.serialize("success");
        }
        if !serializes(ctx.view, "data") {
            ctx.view.serialize_as("data", data_var);
        }
        for key in &action.serialize {
            if !serializes(ctx.view, key) {
                ctx.view.serialize(key);
            }
        }

        if let Some(code) = api.code {
            ctx.view.status = StatusCode::from_u16(code).ok();
        }
        Ok(())
    }
}

/// Data built from the action's `api.<success|error>.data` settings
fn response_data(api: &ApiResponse, subject: &Subject) -> Result<Value, CrudError> {
    let mut data = Fields::new();

    for key in &api.data.subject {
        if let Some(value) = subject.get(key) {
            data.insert(key.clone(), value.to_json());
        }
    }

    if let Some(entity) = subject.entity() {
        for field in &api.data.entity {
            if let Some(value) = entity.get(field) {
                data.insert(field.clone(), value.clone());
            }
        }
    }

    for (path, value) in &api.data.raw {
        let key = fill_placeholders(path, |name| Ok(subject_scalar(subject, name)))?;
        data.insert(key, value.clone());
    }

    Ok(Value::Object(data))
}

fn serializes(view: &ViewData, key: &str) -> bool {
    view.serialize_keys().iter().any(|(existing, _)| existing == key)
}

fn subject_scalar(subject: &Subject, key: &str) -> Option<String> {
    match subject.get(key)? {
        value @ (SubjectValue::Bool(_)
        | SubjectValue::Int(_)
        | SubjectValue::Str(_)
        | SubjectValue::Id(_)) => scalar_text(&value.to_json()),
        SubjectValue::Json(value) => scalar_text(value),
        _ => None,
    }
}

impl Listener for ApiListener {
    fn implemented_events(&self) -> Vec<Subscription> {
        vec![
            Subscription::with_priority(Event::BeforeHandle, 10),
            Subscription::with_priority(Event::SetFlash, 5),
            Subscription::with_priority(Event::BeforeRender, 100),
            Subscription::with_priority(Event::BeforeRedirect, 100),
        ]
    }

    /// Reject verbs outside the action's `api.methods`
    fn before_handle(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
        let Some(action) = ctx.action() else {
            return Ok(());
        };
        let method = ctx.request().method.as_str();
        if action.api.methods.is_empty() || action.api.methods.iter().any(|m| m == method) {
            return Ok(());
        }
        Err(CrudError::unmapped(
            action.name.clone(),
            method,
            action.api.methods.clone(),
        ))
    }

    fn set_flash(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
        if !self.options.set_flash {
            ctx.stop_propagation();
        }
        Ok(())
    }

    fn before_render(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
        self.respond(ctx)
    }

    /// API clients get the document instead of a redirect
    fn before_redirect(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
        self.respond(ctx)?;
        ctx.stop_propagation();
        Ok(())
    }
}

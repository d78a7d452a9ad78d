//! Request context in, render or redirect instructions out.
//!
//! Actions never build HTTP responses themselves. They finish with an
//! [`Outcome`], and a [`Renderer`] turns it into a `Response`.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::data::Fields;
use crate::errors::CrudError;

/// The parts of an HTTP request the pipeline reads
#[derive(Debug, Clone, PartialEq)]
pub struct CrudRequest {
    pub method: Method,
    /// Path without the query string
    pub path: String,
    /// Query pairs in request order. Repeated keys are kept.
    pub query: Vec<(String, String)>,
    /// Route parameters, e.g. `id`
    pub params: BTreeMap<String, String>,
    /// Parsed request body
    pub data: Fields,
}

impl CrudRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            params: BTreeMap::new(),
            data: Fields::new(),
        }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Fields) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// First value given for `key`
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Encoded query string, without the leading `?`
    #[must_use]
    pub fn query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish()
    }

    /// Full request URL: path plus the encoded query string
    #[must_use]
    pub fn url(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        format!("{}?{}", self.path, self.query_string())
    }

    /// Body fields meant for the record. Keys starting with `_` are control
    /// fields (`_redirect_url`, `_add`, ...) and are left out.
    #[must_use]
    pub fn entity_data(&self) -> Fields {
        self.data
            .iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Query parameters as record fields, for pre-filling new entities. The
    /// first value of a repeated key wins.
    #[must_use]
    pub fn query_fields(&self) -> Fields {
        self.query
            .iter()
            .rev()
            .filter(|(key, _)| !key.starts_with('_'))
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect()
    }

    /// Redirect target supplied by the client, checked in order: `_redirect_url`
    /// in the body, then the query, then `redirect_url` in the body, then the query
    #[must_use]
    pub fn redirect_override(&self) -> Option<String> {
        ["_redirect_url", "redirect_url"].into_iter().find_map(|key| {
            let from_data = match self.data.get(key) {
                Some(Value::String(url)) if !url.is_empty() => Some(url.clone()),
                _ => None,
            };
            from_data.or_else(|| {
                self.query_value(key)
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
            })
        })
    }
}

/// Variables, serialize keys and response metadata collected for rendering
#[derive(Debug, Clone, Default)]
pub struct ViewData {
    pub(crate) vars: Fields,
    /// Output key to view variable
    pub(crate) serialize: Vec<(String, String)>,
    pub status: Option<StatusCode>,
    pub view: Option<String>,
    pub headers: HeaderMap,
}

impl ViewData {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Set only when the variable isn't already set
    pub fn set_default(&mut self, key: &str, value: impl FnOnce() -> Value) {
        if !self.vars.contains_key(key) {
            self.vars.insert(key.to_string(), value());
        }
    }

    #[must_use]
    pub fn vars(&self) -> &Fields {
        &self.vars
    }

    /// Output variable `var` under its own name
    pub fn serialize(&mut self, var: &str) -> &mut Self {
        self.serialize_as(var, var)
    }

    /// Output variable `var` under `key`. A key can only appear once.
    pub fn serialize_as(&mut self, key: &str, var: &str) -> &mut Self {
        self.serialize.retain(|(existing, _)| existing != key);
        self.serialize.push((key.to_string(), var.to_string()));
        self
    }

    #[must_use]
    pub fn serialize_keys(&self) -> &[(String, String)] {
        &self.serialize
    }

    /// Body the JSON renderer emits. Only serialized variables are output, so
    /// a view with no serialize keys renders `{}`.
    #[must_use]
    pub fn body(&self) -> Value {
        let mut body = Fields::new();
        for (key, var) in &self.serialize {
            if let Some(value) = self.vars.get(var) {
                body.insert(key.clone(), value.clone());
            }
        }
        Value::Object(body)
    }
}

/// A flash message an action queued for the next page the user sees
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashMessage {
    /// `"success"` or `"error"`
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct RenderInstruction {
    /// Template name, when the action configured one
    pub view: Option<String>,
    pub data: ViewData,
    pub flash: Vec<FlashMessage>,
}

impl RenderInstruction {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.data.status.unwrap_or(StatusCode::OK)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub url: String,
    pub status: u16,
    pub flash: Vec<FlashMessage>,
}

/// How an action finished
#[derive(Debug, Clone)]
pub enum Outcome {
    Render(RenderInstruction),
    Redirect(Redirect),
}

/// Turns outcomes into HTTP responses
pub trait Renderer: Send + Sync {
    fn render(&self, instruction: RenderInstruction) -> Response;

    fn redirect(&self, redirect: Redirect) -> Response {
        let status = StatusCode::from_u16(redirect.status)
            .ok()
            .filter(StatusCode::is_redirection)
            .unwrap_or(StatusCode::FOUND);
        match HeaderValue::from_str(&redirect.url) {
            Ok(location) => (status, [(header::LOCATION, location)]).into_response(),
            Err(_) => {
                tracing::error!(url = %redirect.url, "Redirect URL is not a valid header value");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    fn respond(&self, outcome: Outcome) -> Response {
        match outcome {
            Outcome::Render(instruction) => self.render(instruction),
            Outcome::Redirect(redirect) => self.redirect(redirect),
        }
    }
}

/// Renders view data as a JSON document. Flash messages are dropped: they only
/// make sense for session-backed HTML front ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, instruction: RenderInstruction) -> Response {
        let status = instruction.status();
        let body = instruction.data.body();
        let mut response = (status, Json(body)).into_response();
        response.headers_mut().extend(instruction.data.headers);
        response
    }
}

#[serde_with::skip_serializing_none]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorData<'a> {
    code: u16,
    url: &'a str,
    message: String,
    error_count: Option<usize>,
    errors: Option<Value>,
    exception: Option<ExceptionInfo>,
}

#[derive(Serialize)]
struct ExceptionInfo {
    class: &'static str,
    code: u16,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    data: ErrorData<'a>,
}

/// Error response body `{ success: false, data: { code, url, message, ... } }`.
///
/// Internal details only appear in the `exception` block, and only with `debug` on.
#[must_use]
pub fn render_error(err: &CrudError, url: &str, debug: bool) -> Response {
    err.log_internal();

    let status = err.status_code();
    let (error_count, errors) = match err {
        CrudError::Validation(validation) => (
            Some(validation.validation_error_count()),
            Some(validation.to_json()),
        ),
        _ => (None, None),
    };
    let exception = debug.then(|| ExceptionInfo {
        class: err.kind(),
        code: status.as_u16(),
        message: err.to_string(),
    });

    let body = ErrorBody {
        success: false,
        data: ErrorData {
            code: status.as_u16(),
            url,
            message: err.user_message(),
            error_count,
            errors,
            exception,
        },
    };

    let mut response = (status, Json(body)).into_response();
    if let CrudError::UnmappedAction { allowed, .. } = err {
        if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
            if !allowed.is_empty() {
                response.headers_mut().insert(header::ALLOW, value);
            }
        }
    }
    response
}

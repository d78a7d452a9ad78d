//! Resource routes for a [`CrudController`].
//!
//! Actions named after their kind get the usual resource routes:
//!
//! | Verb         | Path              | Action |
//! |--------------|-------------------|--------|
//! | GET          | `{base}`          | index  |
//! | POST         | `{base}`          | add    |
//! | GET          | `{base}/{id}`     | view   |
//! | PUT, PATCH   | `{base}/{id}`     | edit   |
//! | DELETE       | `{base}/{id}`     | delete |
//!
//! Any other action is mounted at `{base}/{name}` (index and add kinds) or
//! `{base}/{name}/{id}` (the rest), for each verb it allows.
//!
//! `OPTIONS` requests never reach an action: a middleware answers them with the
//! verbs that would route for the path.

use axum::{
    Router,
    body::Bytes,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
};
use serde_json::Value;
use std::sync::Arc;
use url::form_urlencoded;

use crate::action::{ActionConfig, ActionKind};
use crate::controller::CrudController;
use crate::data::Fields;
use crate::errors::CrudError;
use crate::render::{CrudRequest, JsonRenderer, Renderer, render_error};

/// Answers whether a verb/path pair would reach an action
pub trait RouteResolver: Send + Sync {
    fn resolve(&self, method: &Method, path: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    /// Path pattern; `{id}` matches one segment
    pub pattern: String,
    pub action: String,
}

/// A matched route plus the `id` it captured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub action: &'a str,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. The first route registered for a verb and pattern wins.
    #[must_use]
    pub fn route(mut self, method: Method, pattern: &str, action: &str) -> Self {
        let taken = self
            .routes
            .iter()
            .any(|route| route.method == method && route.pattern == pattern);
        if !taken {
            self.routes.push(Route {
                method,
                pattern: pattern.to_string(),
                action: action.to_string(),
            });
        }
        self
    }

    /// Routes for every enabled action of `controller`
    #[must_use]
    pub fn for_controller(controller: &CrudController) -> Self {
        let base = controller.config().base_path.trim_end_matches('/');
        let mut actions: Vec<&ActionConfig> = controller.mapped_actions().collect();
        // actions named after their kind claim the standard routes first
        actions.sort_by_key(|action| !is_standard(action));

        let mut table = Self::new();
        for action in actions {
            let (pattern, verbs) = if is_standard(action) {
                let verbs = match action.kind {
                    ActionKind::Index | ActionKind::View => vec![Method::GET],
                    ActionKind::Add => vec![Method::POST],
                    ActionKind::Edit => vec![Method::PUT, Method::PATCH],
                    ActionKind::Delete => vec![Method::DELETE],
                    ActionKind::Lookup
                    | ActionKind::BulkDelete
                    | ActionKind::BulkToggle
                    | ActionKind::BulkSetValue => Vec::new(),
                };
                (standard_pattern(base, action.kind), verbs)
            } else {
                let pattern = if action.kind.needs_id() {
                    format!("{base}/{}/{{id}}", action.name)
                } else {
                    format!("{base}/{}", action.name)
                };
                let verbs = action
                    .methods
                    .iter()
                    .filter_map(|verb| Method::from_bytes(verb.as_bytes()).ok())
                    .collect();
                (pattern, verbs)
            };

            for verb in verbs.into_iter().filter(|verb| action.allows(verb)) {
                table = table.route(verb, &pattern, &action.name);
            }
        }
        table
    }

    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Distinct path patterns, in registration order
    #[must_use]
    pub fn patterns(&self) -> Vec<&str> {
        let mut patterns: Vec<&str> = Vec::new();
        for route in &self.routes {
            if !patterns.contains(&route.pattern.as_str()) {
                patterns.push(&route.pattern);
            }
        }
        patterns
    }

    /// Find the route for a verb and concrete path. Literal segments beat `{id}`.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .filter_map(|route| {
                match_pattern(&route.pattern, path).map(|(literals, id)| (literals, route, id))
            })
            .max_by_key(|(literals, _, _)| *literals)
            .map(|(_, route, id)| RouteMatch {
                action: &route.action,
                id,
            })
    }

    /// Verbs that route for `path`
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<String> {
        let mut methods: Vec<String> = Vec::new();
        for route in &self.routes {
            let verb = route.method.as_str();
            if match_pattern(&route.pattern, path).is_some() && !methods.iter().any(|m| m == verb) {
                methods.push(verb.to_string());
            }
        }
        methods
    }
}

impl RouteResolver for RouteTable {
    fn resolve(&self, method: &Method, path: &str) -> bool {
        self.lookup(method, path).is_some()
    }
}

/// Resource actions named after their kind own the standard routes. Lookup
/// and bulk actions always mount under their own name.
fn is_standard(action: &ActionConfig) -> bool {
    action.kind.is_resource()
        && action
            .name
            .parse::<ActionKind>()
            .is_ok_and(|kind| kind == action.kind)
}

fn standard_pattern(base: &str, kind: ActionKind) -> String {
    if kind.needs_id() {
        format!("{base}/{{id}}")
    } else if base.is_empty() {
        "/".to_string()
    } else {
        base.to_string()
    }
}

/// Number of literal segments matched, plus the captured id
fn match_pattern(pattern: &str, path: &str) -> Option<(usize, Option<String>)> {
    let mut expected = pattern.split('/').filter(|s| !s.is_empty());
    let mut actual = path.split('/').filter(|s| !s.is_empty());
    let mut literals = 0;
    let mut id = None;

    loop {
        match (expected.next(), actual.next()) {
            (None, None) => return Some((literals, id)),
            (Some("{id}"), Some(segment)) => id = Some(segment.to_string()),
            (Some(literal), Some(segment)) if literal == segment => literals += 1,
            _ => return None,
        }
    }
}

#[derive(Clone)]
struct CrudState {
    controller: Arc<CrudController>,
    renderer: Arc<dyn Renderer>,
    routes: Arc<RouteTable>,
}

/// Resource router rendering outcomes as JSON
pub fn crud_router(controller: Arc<CrudController>) -> Router {
    crud_router_with_renderer(controller, Arc::new(JsonRenderer))
}

pub fn crud_router_with_renderer(
    controller: Arc<CrudController>,
    renderer: Arc<dyn Renderer>,
) -> Router {
    let routes = Arc::new(RouteTable::for_controller(&controller));
    let state = CrudState {
        controller,
        renderer,
        routes: Arc::clone(&routes),
    };

    let mut router = Router::new();
    for pattern in routes.patterns() {
        router = router.route(pattern, any(dispatch_request));
    }
    router
        .layer(middleware::from_fn_with_state(state.clone(), options_shortcut))
        .with_state(state)
}

/// Answer `OPTIONS` with the configured verbs that route for the path
async fn options_shortcut(
    State(state): State<CrudState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    let path = request.uri().path();
    let allowed: Vec<String> = state
        .controller
        .config()
        .options_verbs
        .iter()
        .map(|verb| verb.to_ascii_uppercase())
        .filter(|verb| {
            Method::from_bytes(verb.as_bytes())
                .is_ok_and(|method| state.routes.resolve(&method, path))
        })
        .collect();
    tracing::debug!(path = %path, allowed = ?allowed, "Answering OPTIONS");

    let mut response = StatusCode::OK.into_response();
    if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_METHODS, value);
    }
    response
}

async fn dispatch_request(
    State(state): State<CrudState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let url = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);

    match handle(&state, method, &uri, &headers, &body).await {
        Ok(response) => response,
        Err(err) => render_error(&err, &url, state.controller.config().debug),
    }
}

async fn handle(
    state: &CrudState,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, CrudError> {
    let path = uri.path();
    let Some(found) = state.routes.lookup(&method, path) else {
        let allowed = state.routes.allowed_methods(path);
        return Err(CrudError::unmapped(path, method.as_str(), allowed));
    };

    let mut request = CrudRequest::new(method, path).with_data(parse_body(headers, body)?);
    if let Some(query) = uri.query() {
        request.query = form_urlencoded::parse(query.as_bytes()).into_owned().collect();
    }
    if let Some(id) = found.id {
        request = request.with_param("id", id);
    }

    let outcome = state.controller.run(&request, found.action).await?;
    Ok(state.renderer.respond(outcome))
}

/// Request body as record fields: form-encoded or a JSON object
fn parse_body(headers: &HeaderMap, body: &[u8]) -> Result<Fields, CrudError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Fields::new());
    }

    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        let mut fields = Fields::new();
        for (key, value) in form_urlencoded::parse(body).into_owned() {
            insert_form_pair(&mut fields, key, Value::String(value));
        }
        return Ok(fields);
    }

    match serde_json::from_slice(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(CrudError::bad_request("Request body must be a JSON object")),
        Err(e) => Err(CrudError::bad_request(format!("Invalid JSON body: {e}"))),
    }
}

/// `name[]=a` appends to a list and `name[key]=a` fills an object. Other keys
/// are plain fields.
fn insert_form_pair(fields: &mut Fields, key: String, value: Value) {
    let Some((name, inner)) = key.strip_suffix(']').and_then(|key| key.split_once('[')) else {
        fields.insert(key, value);
        return;
    };
    let slot = fields.entry(name);
    if inner.is_empty() {
        match slot.or_insert_with(|| Value::Array(Vec::new())) {
            Value::Array(items) => items.push(value),
            other => *other = Value::Array(vec![value]),
        }
    } else {
        let slot = slot.or_insert_with(|| Value::Object(Fields::new()));
        if !slot.is_object() {
            *slot = Value::Object(Fields::new());
        }
        if let Value::Object(map) = slot {
            map.insert(inner.to_string(), value);
        }
    }
}

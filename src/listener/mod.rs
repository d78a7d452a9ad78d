//! # Listeners
//!
//! A listener is a named unit that subscribes to a subset of the lifecycle
//! [`Event`]s and observes or mutates the [`Subject`](crate::Subject) while an
//! action runs. Implement [`Listener::implemented_events`] plus the hooks you
//! need; every hook defaults to doing nothing.
//!
//! ```rust,ignore
//! struct Audit;
//!
//! impl Listener for Audit {
//!     fn implemented_events(&self) -> Vec<Subscription> {
//!         vec![Subscription::new(Event::AfterSave)]
//!     }
//!
//!     fn after_save(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
//!         if ctx.subject.should_process("only", &["add"])? {
//!             tracing::info!(created = ctx.subject.created(), "Audit");
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::any::type_name;
use std::sync::Arc;

use crate::config::merge_json;
use crate::data::Repository;
use crate::errors::CrudError;
use crate::event::{Event, EventContext};
use crate::subject::{ProcessMode, Subject};

pub mod api;
pub mod api_pagination;
pub mod api_query_log;
pub mod redirect;

pub use api::ApiListener;
pub use api_pagination::ApiPaginationListener;
pub use api_query_log::ApiQueryLogListener;
pub use redirect::RedirectListener;

/// One (event, priority) pair a listener subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub event: Event,
    pub priority: i32,
}

impl Subscription {
    pub const DEFAULT_PRIORITY: i32 = 10;

    #[must_use]
    pub fn new(event: Event) -> Self {
        Self::with_priority(event, Self::DEFAULT_PRIORITY)
    }

    #[must_use]
    pub fn with_priority(event: Event, priority: i32) -> Self {
        Self { event, priority }
    }
}

macro_rules! hooks {
    ($($hook:ident => $event:ident),* $(,)?) => {
        $(
            #[allow(unused_variables)]
            fn $hook(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
                Ok(())
            }
        )*

        /// Route the context's event to the matching hook
        ///
        /// # Errors
        ///
        /// Whatever the hook returns.
        fn handle(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
            match ctx.event() {
                $(Event::$event => self.$hook(ctx),)*
            }
        }
    };
}

pub trait Listener: Send + Sync {
    /// Registration id. Defaults to the type name without its `Listener` suffix,
    /// in lower camel case (`ApiPaginationListener` becomes `apiPagination`).
    fn name(&self) -> String {
        listener_name(type_name::<Self>())
    }

    /// Events to subscribe to, queried once at registration
    fn implemented_events(&self) -> Vec<Subscription>;

    hooks! {
        before_handle => BeforeHandle,
        before_find => BeforeFind,
        after_find => AfterFind,
        before_save => BeforeSave,
        after_save => AfterSave,
        before_delete => BeforeDelete,
        after_delete => AfterDelete,
        before_render => BeforeRender,
        before_redirect => BeforeRedirect,
        before_paginate => BeforePaginate,
        after_paginate => AfterPaginate,
        record_not_found => RecordNotFound,
        invalid_id => InvalidId,
        set_flash => SetFlash,
        before_bulk => BeforeBulk,
        after_bulk => AfterBulk,
        before_lookup => BeforeLookup,
        after_lookup => AfterLookup,
        related_model => RelatedModel,
    }
}

fn listener_name(full: &str) -> String {
    let path = full.split('<').next().unwrap_or(full);
    let short = path.rsplit("::").next().unwrap_or(path);
    let short = short.strip_suffix("Listener").unwrap_or(short);

    let mut chars = short.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Build a listener's options from its defaults with `overrides` merged on top.
/// Nested objects merge key by key; unknown keys are ignored.
///
/// # Errors
///
/// Returns `CrudError::InvalidConfig` when an override has the wrong type.
pub fn options_from<T>(overrides: &serde_json::Value) -> Result<T, CrudError>
where
    T: Default + Serialize + DeserializeOwned,
{
    let mut merged = serde_json::to_value(T::default())
        .map_err(|e| CrudError::invalid_config(format!("Unserializable listener defaults: {e}")))?;
    merge_json(&mut merged, overrides);
    serde_json::from_value(merged)
        .map_err(|e| CrudError::invalid_config(format!("Invalid listener options: {e}")))
}

/// `only`/`not` action lists shared by the built-in listeners
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionFilter {
    pub only: Option<Vec<String>>,
    pub not: Option<Vec<String>>,
}

impl ActionFilter {
    /// Whether the listener should act for the subject's current action
    #[must_use]
    pub fn applies(&self, subject: &Subject) -> bool {
        let only = self.only.as_ref().is_none_or(|actions| {
            subject.should_process_mode(ProcessMode::Only, actions.as_slice())
        });
        let not = self.not.as_ref().is_none_or(|actions| {
            subject.should_process_mode(ProcessMode::Not, actions.as_slice())
        });
        only && not
    }
}

/// Replace every `{name}` in `template` with what `lookup` returns for it.
/// Placeholders `lookup` doesn't know (`Ok(None)`) are left as they are.
pub(crate) fn fill_placeholders<F>(template: &str, mut lookup: F) -> Result<String, CrudError>
where
    F: FnMut(&str) -> Result<Option<String>, CrudError>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        out.push_str(&rest[..start]);
        match lookup(name)? {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..=start + len]),
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Scalar JSON as plain text: strings unquoted, null empty
pub(crate) fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => Some(String::new()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}

/// Instantiate a built-in listener by registration name. `debug` and
/// `repository` are handed to the listeners that report on the data layer.
///
/// # Errors
///
/// Returns `CrudError::InvalidConfig` for unknown names or bad options.
pub fn builtin(
    name: &str,
    overrides: &serde_json::Value,
    debug: bool,
    repository: &Arc<dyn Repository>,
) -> Result<Arc<dyn Listener>, CrudError> {
    let listener: Arc<dyn Listener> = match name {
        "api" => Arc::new(ApiListener::with_options(overrides)?),
        "apiPagination" => Arc::new(ApiPaginationListener::with_options(overrides)?),
        "apiQueryLog" => Arc::new(ApiQueryLogListener::with_options(
            overrides,
            Arc::clone(repository),
            debug,
        )?),
        "redirect" => Arc::new(RedirectListener::with_options(overrides)?),
        other => {
            return Err(CrudError::invalid_config(format!("Unknown listener: {other}")));
        }
    };
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Options {
        enabled: bool,
        limits: Limits,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(default)]
    struct Limits {
        soft: u32,
        hard: u32,
    }

    impl Default for Limits {
        fn default() -> Self {
            Self { soft: 10, hard: 100 }
        }
    }

    #[test]
    fn test_listener_names() {
        assert_eq!(listener_name("crudflow::listener::api::ApiListener"), "api");
        assert_eq!(
            listener_name("crudflow::listener::api_pagination::ApiPaginationListener"),
            "apiPagination"
        );
        assert_eq!(listener_name("my_app::Audit"), "audit");
        assert_eq!(ApiListener::default().name(), "api");
    }

    #[test]
    fn test_options_deep_merge_ignores_unknown_keys() {
        let options: Options =
            options_from(&json!({"limits": {"hard": 5}, "bogus": true})).unwrap();
        assert!(!options.enabled);
        assert_eq!(options.limits.soft, 10);
        assert_eq!(options.limits.hard, 5);
    }

    #[test]
    fn test_options_type_mismatch() {
        let result: Result<Options, _> = options_from(&json!({"enabled": "yes"}));
        assert!(matches!(result, Err(CrudError::InvalidConfig { .. })));
    }

    #[test]
    fn test_action_filter() {
        let mut subject = Subject::new();
        subject.insert("action", "view");

        assert!(ActionFilter::default().applies(&subject));
        let only = ActionFilter {
            only: Some(vec!["index".into()]),
            not: None,
        };
        assert!(!only.applies(&subject));
        let not = ActionFilter {
            only: None,
            not: Some(vec!["delete".into()]),
        };
        assert!(not.applies(&subject));
    }

    #[test]
    fn test_fill_placeholders() {
        let filled = fill_placeholders("/blogs/{id}?{keep}&x={", |name| {
            Ok((name == "id").then(|| "7".to_string()))
        })
        .unwrap();
        assert_eq!(filled, "/blogs/7?{keep}&x={");
    }

    #[test]
    fn test_unknown_builtin() {
        let repository: Arc<dyn Repository> =
            Arc::new(crate::data::MemoryRepository::new("Blogs", "blog", "blogs"));
        assert!(builtin("cache", &json!({}), false, &repository).is_err());
        let redirect = builtin("redirect", &json!({}), false, &repository).unwrap();
        assert_eq!(redirect.name(), "redirect");
        let query_log = builtin("apiQueryLog", &json!({}), true, &repository).unwrap();
        assert_eq!(query_log.name(), "apiQueryLog");
    }
}

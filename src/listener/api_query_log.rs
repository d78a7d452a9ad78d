use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{ActionFilter, Listener, Subscription, options_from};
use crate::data::{Fields, Repository};
use crate::errors::CrudError;
use crate::event::{Event, EventContext};
use crate::subject::Value as SubjectValue;

/// Subject key holding the repository's log length when the request started
const OFFSET_KEY: &str = "query_log_offset";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiQueryLogOptions {
    #[serde(flatten)]
    pub filter: ActionFilter,
}

/// Adds the queries run for a request under a `queryLog` key, keyed by
/// repository alias. Only active in debug mode, and only for repositories
/// that keep a query log.
pub struct ApiQueryLogListener {
    options: ApiQueryLogOptions,
    repository: Arc<dyn Repository>,
    debug: bool,
}

impl ApiQueryLogListener {
    #[must_use]
    pub fn new(repository: Arc<dyn Repository>, debug: bool) -> Self {
        Self {
            options: ApiQueryLogOptions::default(),
            repository,
            debug,
        }
    }

    /// # Errors
    ///
    /// Returns `CrudError::InvalidConfig` when an override has the wrong type.
    pub fn with_options(
        overrides: &Value,
        repository: Arc<dyn Repository>,
        debug: bool,
    ) -> Result<Self, CrudError> {
        Ok(Self {
            options: options_from(overrides)?,
            ..Self::new(repository, debug)
        })
    }
}

impl Listener for ApiQueryLogListener {
    fn implemented_events(&self) -> Vec<Subscription> {
        vec![
            Subscription::with_priority(Event::BeforeHandle, 1),
            Subscription::with_priority(Event::BeforeRender, 75),
        ]
    }

    fn before_handle(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
        let offset = self.repository.query_log().len();
        ctx.subject
            .insert(OFFSET_KEY, i64::try_from(offset).unwrap_or(i64::MAX));
        Ok(())
    }

    fn before_render(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
        if !self.debug || !self.options.filter.applies(ctx.subject) {
            return Ok(());
        }
        let offset = match ctx.subject.get(OFFSET_KEY) {
            Some(SubjectValue::Int(offset)) => usize::try_from(*offset).unwrap_or(0),
            _ => 0,
        };

        let entries = self.repository.query_log();
        let entries = entries.get(offset..).unwrap_or_default();
        let entries = serde_json::to_value(entries)
            .map_err(|e| CrudError::invalid_config(format!("Unserializable query log: {e}")))?;

        let mut log = Fields::new();
        log.insert(self.repository.alias().to_string(), entries);
        ctx.view.set("queryLog", Value::Object(log));
        ctx.view.serialize("queryLog");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemoryRepository, Query};
    use crate::event::Scope;
    use crate::render::{CrudRequest, ViewData};
    use crate::subject::Subject;
    use axum::http::Method;
    use serde_json::json;

    fn fire(listener: &ApiQueryLogListener, event: Event, subject: &mut Subject) -> ViewData {
        let request = CrudRequest::new(Method::GET, "/blogs");
        let mut view = ViewData::default();
        let scope = Scope {
            request: &request,
            action: None,
            base_path: "/blogs",
        };
        let mut ctx = EventContext::new(event, subject, &mut view, scope);
        listener.handle(&mut ctx).unwrap();
        view
    }

    #[tokio::test]
    async fn test_logs_only_this_requests_queries() {
        let repo = Arc::new(MemoryRepository::new("Blogs", "blog", "blogs").with_query_log());
        repo.find(&Query::new("all")).await.unwrap();
        let listener = ApiQueryLogListener::new(repo.clone(), true);

        let mut subject = Subject::new();
        fire(&listener, Event::BeforeHandle, &mut subject);
        repo.paginate(&Query::new("all"), 1, 20).await.unwrap();
        let view = fire(&listener, Event::BeforeRender, &mut subject);

        let log = &view.get("queryLog").unwrap()["Blogs"];
        assert_eq!(log.as_array().unwrap().len(), 1);
        assert_eq!(log[0]["operation"], json!("paginate"));
        assert_eq!(view.body()["queryLog"], view.get("queryLog").cloned().unwrap());
    }

    #[tokio::test]
    async fn test_silent_outside_debug() {
        let repo = Arc::new(MemoryRepository::new("Blogs", "blog", "blogs").with_query_log());
        let listener = ApiQueryLogListener::new(repo, false);

        let view = fire(&listener, Event::BeforeRender, &mut Subject::new());
        assert!(view.get("queryLog").is_none());
        assert!(view.serialize_keys().is_empty());
    }
}

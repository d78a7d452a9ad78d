//! The dispatch controller.
//!
//! Set up once from a [`CrudConfig`], then shared behind an `Arc` by the route
//! handlers. Each request resolves one configured action and runs it to a
//! terminal state.

use axum::http::Method;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::action::{Action, ActionConfig, ActionContext};
use crate::config::CrudConfig;
use crate::data::Repository;
use crate::dispatcher::{Dispatcher, Handler};
use crate::errors::CrudError;
use crate::event::{Event, EventContext, Scope};
use crate::listener::{self, Listener};
use crate::render::{CrudRequest, Outcome, ViewData};
use crate::subject::Subject;

pub struct CrudController {
    config: CrudConfig,
    actions: BTreeMap<String, ActionConfig>,
    dispatcher: Dispatcher,
    listeners: BTreeMap<String, Arc<dyn Listener>>,
    repository: Arc<dyn Repository>,
    callbacks: usize,
}

impl CrudController {
    /// Build the action table and register the configured built-in listeners.
    ///
    /// # Errors
    ///
    /// Returns `CrudError::InvalidConfig` for unknown action kinds, unknown
    /// listener names, or mistyped overrides.
    pub fn new(config: CrudConfig, repository: Arc<dyn Repository>) -> Result<Self, CrudError> {
        let dispatcher =
            Dispatcher::new(config.event_prefix.as_str()).with_logging(config.event_logging);
        let mut controller = Self {
            config,
            actions: BTreeMap::new(),
            dispatcher,
            listeners: BTreeMap::new(),
            repository,
            callbacks: 0,
        };

        let actions = controller
            .config
            .actions
            .iter()
            .map(|(name, entry)| ActionConfig::from_entry(name, entry))
            .collect::<Result<Vec<_>, _>>()?;
        for action in actions {
            controller.add_action(action);
        }

        let listeners = controller
            .config
            .listeners
            .iter()
            .map(|(name, overrides)| {
                listener::builtin(
                    name,
                    overrides,
                    controller.config.debug,
                    &controller.repository,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        for listener in listeners {
            controller.add_listener(listener);
        }

        tracing::debug!(
            base_path = %controller.config.base_path,
            actions = controller.actions.len(),
            listeners = controller.listeners.len(),
            "CRUD controller ready"
        );
        Ok(controller)
    }

    /// Add or replace an action. Names that depend on the repository are filled in here.
    pub fn add_action(&mut self, mut action: ActionConfig) {
        action.resolve_names(
            self.repository.resource_name_singular(),
            self.repository.resource_name_plural(),
        );
        self.actions.insert(action.name.clone(), action);
    }

    /// # Errors
    ///
    /// Returns `CrudError::InvalidConfig` if no action has that name.
    pub fn enable(&mut self, name: &str) -> Result<(), CrudError> {
        self.set_enabled(name, true)
    }

    /// # Errors
    ///
    /// Returns `CrudError::InvalidConfig` if no action has that name.
    pub fn disable(&mut self, name: &str) -> Result<(), CrudError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), CrudError> {
        let action = self
            .actions
            .get_mut(name)
            .ok_or_else(|| CrudError::invalid_config(format!("Unknown action: {name}")))?;
        action.enabled = enabled;
        Ok(())
    }

    /// Whether `name` is configured and enabled
    #[must_use]
    pub fn is_action_mapped(&self, name: &str) -> bool {
        self.enabled_action(name).is_some()
    }

    #[must_use]
    pub fn action(&self, name: &str) -> Option<&ActionConfig> {
        self.actions.get(name)
    }

    fn enabled_action(&self, name: &str) -> Option<&ActionConfig> {
        self.actions.get(name).filter(|action| action.enabled)
    }

    /// Enabled actions, by name
    pub fn mapped_actions(&self) -> impl Iterator<Item = &ActionConfig> {
        self.actions.values().filter(|action| action.enabled)
    }

    /// Register a listener under its name. A listener with the same name is replaced.
    pub fn add_listener(&mut self, listener: Arc<dyn Listener>) {
        let id = listener.name();
        self.dispatcher.unsubscribe(&id);
        for subscription in listener.implemented_events() {
            self.dispatcher.subscribe(
                subscription.event,
                &id,
                Handler::Listener(Arc::clone(&listener)),
                subscription.priority,
            );
        }
        tracing::debug!(listener = %id, "Listener registered");
        self.listeners.insert(id, listener);
    }

    /// Unregister a listener and all its subscriptions. Returns whether it was registered.
    pub fn remove_listener(&mut self, name: &str) -> bool {
        self.dispatcher.unsubscribe(name);
        self.listeners.remove(name).is_some()
    }

    #[must_use]
    pub fn listener(&self, name: &str) -> Option<&Arc<dyn Listener>> {
        self.listeners.get(name)
    }

    /// Subscribe a closure to one event. Returns the id it was registered under.
    pub fn on<F>(&mut self, event: Event, priority: i32, callback: F) -> String
    where
        F: Fn(&mut EventContext<'_>) -> Result<(), CrudError> + Send + Sync + 'static,
    {
        self.callbacks += 1;
        let id = format!("callback.{}", self.callbacks);
        self.dispatcher
            .subscribe(event, &id, Handler::Callback(Arc::new(callback)), priority);
        id
    }

    /// Resolve the action for a verb.
    ///
    /// # Errors
    ///
    /// `UnmappedAction` with an empty allowed list (404) when the action is
    /// missing or disabled, and with the action's verbs (405) when `method` isn't
    /// one of them.
    pub fn map_action(&self, method: &Method, name: &str) -> Result<&ActionConfig, CrudError> {
        let Some(action) = self.enabled_action(name) else {
            return Err(CrudError::unmapped(name, method.as_str(), Vec::new()));
        };
        if !action.allows(method) {
            return Err(CrudError::unmapped(name, method.as_str(), action.methods.clone()));
        }
        Ok(action)
    }

    /// Run the named action for `request`.
    ///
    /// # Errors
    ///
    /// Everything the action or a listener fails with, unchanged.
    pub async fn run(&self, request: &CrudRequest, name: &str) -> Result<Outcome, CrudError> {
        let mut subject = Subject::new();
        self.run_with(request, name, &mut subject).await
    }

    /// Like [`run`](Self::run) with a caller-owned subject, which is left holding
    /// the final state and event log.
    ///
    /// `beforeHandle` fires first; a listener may point the subject's `action`
    /// at a different action before it is resolved.
    ///
    /// # Errors
    ///
    /// Everything the action or a listener fails with, unchanged.
    pub async fn run_with(
        &self,
        request: &CrudRequest,
        name: &str,
        subject: &mut Subject,
    ) -> Result<Outcome, CrudError> {
        subject.insert("action", name);
        let scope = Scope {
            request,
            action: self.enabled_action(name),
            base_path: &self.config.base_path,
        };
        let mut view = ViewData::default();
        let mut ctx = EventContext::new(Event::BeforeHandle, &mut *subject, &mut view, scope);
        self.dispatcher.dispatch(&mut ctx)?;

        let name = subject.action().unwrap_or(name).to_string();
        let config = self.map_action(&request.method, &name)?;
        tracing::debug!(
            action = %name,
            method = %request.method,
            path = %request.path,
            "Running action"
        );

        let env = ActionContext {
            request,
            repository: self.repository.as_ref(),
            dispatcher: &self.dispatcher,
            messages: &self.config.messages,
            base_path: &self.config.base_path,
        };
        let mut action = Action::new(config);
        action.execute(&env, subject).await
    }

    #[must_use]
    pub fn config(&self) -> &CrudConfig {
        &self.config
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Fields, MemoryRepository};
    use crate::listener::{ApiListener, Subscription};
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::Mutex;

    fn repository() -> Arc<MemoryRepository> {
        let repo = MemoryRepository::new("Blogs", "blog", "blogs");
        for name in ["First", "Second"] {
            let mut fields = Fields::new();
            fields.insert("name".into(), json!(name));
            repo.seed(fields);
        }
        Arc::new(repo)
    }

    fn controller() -> CrudController {
        CrudController::new(CrudConfig::rest("/blogs"), repository()).unwrap()
    }

    /// Appends its tag to a shared log on `beforeRender`
    struct Tagger {
        tag: &'static str,
        priority: i32,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Listener for Tagger {
        fn name(&self) -> String {
            self.tag.to_string()
        }

        fn implemented_events(&self) -> Vec<Subscription> {
            vec![Subscription::with_priority(Event::BeforeRender, self.priority)]
        }

        fn before_render(&self, _ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
            self.log.lock().unwrap().push(self.tag);
            Ok(())
        }
    }

    #[test]
    fn test_actions_from_config() {
        let controller = controller();
        assert!(controller.is_action_mapped("index"));
        assert_eq!(controller.action("index").unwrap().data_var(), "blogs");
        assert_eq!(controller.action("view").unwrap().data_var(), "blog");
        assert_eq!(controller.mapped_actions().count(), 5);
    }

    #[test]
    fn test_unknown_listener_in_config() {
        let config = CrudConfig::rest("/blogs").with_listener("cache", json!({}));
        assert!(matches!(
            CrudController::new(config, repository()),
            Err(CrudError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_map_action() {
        let mut controller = controller();
        assert!(controller.map_action(&Method::GET, "index").is_ok());

        let err = controller.map_action(&Method::GET, "delete").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);

        let err = controller.map_action(&Method::GET, "publish").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        controller.disable("index").unwrap();
        assert!(!controller.is_action_mapped("index"));
        let err = controller.map_action(&Method::GET, "index").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        controller.enable("index").unwrap();
        assert!(controller.is_action_mapped("index"));
        assert!(controller.disable("publish").is_err());
    }

    #[tokio::test]
    async fn test_listener_priority_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut controller = controller();
        for (tag, priority) in [("A", 10), ("B", 5)] {
            controller.add_listener(Arc::new(Tagger {
                tag,
                priority,
                log: Arc::clone(&log),
            }));
        }

        let request = CrudRequest::new(Method::GET, "/blogs");
        controller.run(&request, "index").await.unwrap();
        assert_eq!(*log.lock().unwrap(), ["B", "A"]);
    }

    #[test]
    fn test_remove_listener() {
        let mut controller = CrudController::new(
            CrudConfig::rest("/blogs").with_listener("api", json!({})),
            repository(),
        )
        .unwrap();
        assert!(controller.listener("api").is_some());
        assert_eq!(controller.dispatcher().listeners_for(Event::BeforeRender), ["api"]);

        assert!(controller.remove_listener("api"));
        assert!(!controller.remove_listener("api"));
        assert!(controller.dispatcher().listeners_for(Event::BeforeRender).is_empty());
    }

    #[tokio::test]
    async fn test_before_handle_can_switch_action() {
        let mut controller = controller();
        controller.on(Event::BeforeHandle, 10, |ctx| {
            ctx.subject.insert("action", "view");
            Ok(())
        });

        let request = CrudRequest::new(Method::GET, "/blogs/2").with_param("id", "2");
        let mut subject = Subject::new();
        let outcome = controller.run_with(&request, "index", &mut subject).await.unwrap();

        let Outcome::Render(render) = outcome else {
            panic!("expected render");
        };
        assert_eq!(render.data.get("blog").unwrap()["name"], json!("Second"));
        assert_eq!(subject.events()[0], "Crud.beforeHandle");
        assert!(subject.has_event("Crud.afterFind"));
    }

    #[tokio::test]
    async fn test_api_methods_checked_before_action() {
        let mut controller = controller();
        controller.add_listener(Arc::new(ApiListener::default()));

        let request = CrudRequest::new(Method::GET, "/blogs/add");
        let err = controller.run(&request, "add").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_custom_event_prefix() {
        let config = CrudConfig {
            event_prefix: "Blog".to_string(),
            ..CrudConfig::rest("/blogs")
        };
        let controller = CrudController::new(config, repository()).unwrap();

        let mut subject = Subject::new();
        let request = CrudRequest::new(Method::GET, "/blogs");
        controller.run_with(&request, "index", &mut subject).await.unwrap();
        assert!(subject.has_event("Blog.beforePaginate"));
    }
}

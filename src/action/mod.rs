//! # CRUD actions
//!
//! Each request runs exactly one [`Action`]. The action walks a fixed lifecycle
//! for its [`ActionKind`], firing events through the controller's dispatcher at
//! every step, and finishes in one of three ways: a render instruction, a
//! redirect, or an error.
//!
//! | Kind   | Events (happy path)                                              |
//! |--------|------------------------------------------------------------------|
//! | index  | beforePaginate, afterPaginate, beforeRender                      |
//! | view   | beforeFind, afterFind, beforeRender                              |
//! | add    | beforeSave, afterSave, setFlash, beforeRedirect                  |
//! | edit   | beforeFind, afterFind, beforeSave, afterSave, setFlash, beforeRedirect |
//! | delete | beforeFind, afterFind, beforeDelete, afterDelete, setFlash, beforeRedirect |
//! | lookup | beforeLookup, afterLookup, beforeRender                          |
//! | bulk*  | beforeBulk, afterBulk, setFlash, beforeRedirect                  |
//!
//! Rendering actions with related models configured also fire `relatedModel`
//! once per published list, just before `beforeRender`.

use serde_json::Value;
use std::mem;

use crate::config::Messages;
use crate::data::{Entity, Repository, id_value, key_value_list};
use crate::dispatcher::{Dispatched, Dispatcher};
use crate::errors::{CrudError, ValidationError};
use crate::event::{Event, EventContext, Scope};
use crate::render::{
    CrudRequest, FlashMessage, Outcome, Redirect, RenderInstruction, ViewData,
};
use crate::subject::{Subject, Value as SubjectValue};

mod add;
mod bulk;
mod config;
mod delete;
mod edit;
mod index;
mod lookup;
mod view;

pub use config::{
    ActionConfig, ActionKind, ActionMessages, ActionScope, ApiConfig, ApiData, ApiResponse,
    FindMethod, IdFormat, RedirectRule, RelatedModels,
};

/// Lifecycle of one action execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionState {
    #[default]
    Idle,
    Running,
    /// Finished with a render instruction
    Succeeded,
    Redirected,
    Failed,
}

/// Everything an action borrows from the controller for one request
pub struct ActionContext<'a> {
    pub request: &'a CrudRequest,
    pub repository: &'a dyn Repository,
    pub dispatcher: &'a Dispatcher,
    pub messages: &'a Messages,
    pub base_path: &'a str,
}

/// One execution of a configured action
#[derive(Debug)]
pub struct Action<'a> {
    config: &'a ActionConfig,
    state: ActionState,
}

impl<'a> Action<'a> {
    #[must_use]
    pub fn new(config: &'a ActionConfig) -> Self {
        Self {
            config,
            state: ActionState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> ActionState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &ActionConfig {
        self.config
    }

    /// Run the action to a terminal state.
    ///
    /// # Errors
    ///
    /// Not found records, invalid ids, validation failures, listener errors and
    /// data layer failures all end the run with `ActionState::Failed`.
    pub async fn execute(
        &mut self,
        env: &ActionContext<'_>,
        subject: &mut Subject,
    ) -> Result<Outcome, CrudError> {
        self.state = ActionState::Running;
        subject.insert("action", self.config.name.as_str());

        let mut run = Run {
            config: self.config,
            env,
            subject,
            view: ViewData {
                view: self.config.view.clone(),
                ..ViewData::default()
            },
            flash: Vec::new(),
        };

        let result = match self.config.kind {
            ActionKind::Index => index::handle(&mut run).await,
            ActionKind::View => view::handle(&mut run).await,
            ActionKind::Add => add::handle(&mut run).await,
            ActionKind::Edit => edit::handle(&mut run).await,
            ActionKind::Delete => delete::handle(&mut run).await,
            ActionKind::Lookup => lookup::handle(&mut run).await,
            ActionKind::BulkDelete | ActionKind::BulkToggle | ActionKind::BulkSetValue => {
                bulk::handle(&mut run).await
            }
        };

        self.state = match &result {
            Ok(Outcome::Render(_)) => ActionState::Succeeded,
            Ok(Outcome::Redirect(_)) => ActionState::Redirected,
            Err(_) => ActionState::Failed,
        };
        tracing::debug!(action = %self.config.name, state = ?self.state, "Action finished");
        result
    }
}

/// Shared steps the individual actions are built from
struct Run<'r> {
    config: &'r ActionConfig,
    env: &'r ActionContext<'r>,
    subject: &'r mut Subject,
    view: ViewData,
    flash: Vec<FlashMessage>,
}

impl Run<'_> {
    fn repository(&self) -> &dyn Repository {
        self.env.repository
    }

    fn request(&self) -> &CrudRequest {
        self.env.request
    }

    fn fire(&mut self, event: Event) -> Result<Dispatched, CrudError> {
        let scope = Scope {
            request: self.env.request,
            action: Some(self.config),
            base_path: self.env.base_path,
        };
        let mut ctx = EventContext::new(event, &mut *self.subject, &mut self.view, scope);
        self.env.dispatcher.dispatch(&mut ctx)
    }

    /// URL of the index action
    fn index_url(&self) -> String {
        if self.env.base_path.is_empty() {
            "/".to_string()
        } else {
            self.env.base_path.to_string()
        }
    }

    /// Route id, validated against the configured format
    fn id(&mut self) -> Result<String, CrudError> {
        let id = self.request().param("id").unwrap_or_default().to_string();
        self.subject.insert("id", SubjectValue::Id(id.clone()));

        if self.config.id_format.accepts(&id) {
            return Ok(id);
        }
        self.fire(Event::InvalidId)?;
        Err(CrudError::bad_request(self.env.messages.invalid_id.clone()))
    }

    /// Load the record for `id` through the configured finder
    async fn find_record(&mut self, id: &str) -> Result<Entity, CrudError> {
        let repository = self.env.repository;
        let find = &self.config.find_method;
        let query = repository
            .query(&find.name, &find.options)
            .where_eq(repository.primary_key(), id_value(id));
        self.subject.insert("query", query);
        self.fire(Event::BeforeFind)?;

        let query = self.subject.query().cloned().unwrap_or_default();
        match repository.first(&query).await? {
            Some(entity) => {
                self.subject.set([
                    ("entity", SubjectValue::from(entity.clone())),
                    ("success", true.into()),
                ]);
                self.fire(Event::AfterFind)?;
                Ok(entity)
            }
            None => Err(self.not_found(id)),
        }
    }

    fn not_found(&mut self, id: &str) -> CrudError {
        self.subject.insert("success", false);
        if let Err(err) = self.fire(Event::RecordNotFound) {
            return err;
        }
        CrudError::not_found(self.env.messages.record_not_found.replace("{id}", id))
    }

    /// Queue the action's success or error message unless a `setFlash`
    /// listener stops it
    fn set_flash(&mut self, kind: &str) -> Result<(), CrudError> {
        let template = match kind {
            "success" => &self.config.messages.success,
            _ => &self.config.messages.error,
        };
        if template.is_empty() {
            return Ok(());
        }
        let text = template.replace("{name}", self.config.resource_name());
        self.subject
            .set([("text", SubjectValue::from(text)), ("flash_type", kind.into())]);

        if self.fire(Event::SetFlash)?.stopped {
            return Ok(());
        }
        let text = self
            .subject
            .get("text")
            .and_then(SubjectValue::as_str)
            .unwrap_or_default()
            .to_string();
        self.flash.push(FlashMessage {
            kind: kind.to_string(),
            text,
        });
        Ok(())
    }

    /// Redirect to `default_url` unless the client asked for another target.
    /// A stopped `beforeRedirect` renders instead.
    fn redirect(&mut self, default_url: String) -> Result<Outcome, CrudError> {
        let url = self.request().redirect_override().unwrap_or(default_url);
        self.subject.set([
            ("url", SubjectValue::from(url)),
            ("status", SubjectValue::Int(302)),
        ]);

        if self.fire(Event::BeforeRedirect)?.stopped {
            return Ok(self.finish_render());
        }

        Ok(Outcome::Redirect(Redirect {
            url: self.subject.url().unwrap_or_default().to_string(),
            status: self.subject.status().unwrap_or(302),
            flash: mem::take(&mut self.flash),
        }))
    }

    /// Publish the view variables and related lists, then fire `beforeRender`
    async fn render(&mut self) -> Result<Outcome, CrudError> {
        if self.config.kind.has_view_var() {
            let data = match (self.config.kind, self.config.kind.scope()) {
                (ActionKind::Lookup, _) => self
                    .subject
                    .entities()
                    .map(|items| Value::Object(self.lookup_list(items))),
                (_, ActionScope::Table) => self
                    .subject
                    .entities()
                    .map(|items| Value::Array(items.iter().map(Entity::to_json).collect())),
                (_, ActionScope::Entity) => self.subject.entity().map(Entity::to_json),
                (_, ActionScope::Bulk) => None,
            };
            self.view.set("success", self.subject.success());
            self.view
                .set(self.config.data_var(), data.unwrap_or(Value::Null));
        }
        self.publish_related().await?;

        self.fire(Event::BeforeRender)?;
        Ok(self.finish_render())
    }

    /// `key → label` pairs for a lookup, using the query's `keyField` and
    /// `valueField` options when set
    fn lookup_list(&self, items: &[Entity]) -> crate::data::Fields {
        let repository = self.env.repository;
        let query = self.subject.query();
        let option = |key: &str| query.and_then(|query| query.option_str(key));
        key_value_list(
            items,
            option("keyField").unwrap_or(repository.primary_key()),
            option("valueField").unwrap_or(repository.display_field()),
        )
    }

    /// Publish a `key → label` list for each configured association. Variables
    /// that are already set are skipped, and `relatedModel` listeners may rename
    /// the variable through the subject's `view_var`.
    async fn publish_related(&mut self) -> Result<(), CrudError> {
        let repository = self.env.repository;
        let names = self
            .config
            .related_models
            .resolve(repository.associations());

        for name in names {
            if self.view.get(&name).is_some() {
                continue;
            }
            self.subject.set([
                ("association", SubjectValue::from(name.as_str())),
                ("view_var", SubjectValue::from(name.as_str())),
            ]);
            self.fire(Event::RelatedModel)?;

            let view_var = self
                .subject
                .get("view_var")
                .and_then(SubjectValue::as_str)
                .unwrap_or(&name)
                .to_string();
            let Some(list) = repository.related_list(&name).await? else {
                return Err(CrudError::invalid_config(format!(
                    "{} is not associated with {name}",
                    repository.alias()
                )));
            };
            self.view.set(view_var.as_str(), Value::Object(list));
            self.view.serialize(&view_var);
        }

        self.subject.remove("association");
        self.subject.remove("view_var");
        Ok(())
    }

    fn finish_render(&mut self) -> Outcome {
        self.default_serialize();
        Outcome::Render(RenderInstruction {
            view: self.view.view.clone(),
            data: mem::take(&mut self.view),
            flash: mem::take(&mut self.flash),
        })
    }

    /// Unless a listener already put the action's data variable in the
    /// response, serialize `success`, the data variable and the configured
    /// extra keys
    fn default_serialize(&mut self) {
        if !self.config.kind.has_view_var() {
            return;
        }
        let data_var = self.config.data_var();
        let chosen = |view: &ViewData, key: &str, var: bool| {
            view.serialize_keys()
                .iter()
                .any(|(existing, target)| if var { target == key } else { existing == key })
        };
        if chosen(&self.view, data_var, true) {
            return;
        }

        let extra = self.config.serialize.iter().map(String::as_str);
        for key in ["success", data_var].into_iter().chain(extra) {
            if !chosen(&self.view, key, false) {
                self.view.serialize(key);
            }
        }
    }

    /// Save the subject's entity and continue down the success or error path
    async fn save(&mut self, created: bool) -> Result<Outcome, CrudError> {
        // a listener stopping beforeSave decides success on its own
        self.subject.remove("success");
        if self.fire(Event::BeforeSave)?.stopped {
            return self.stopped(created);
        }

        let mut entity = self.subject.entity().cloned().unwrap_or_default();
        let saved = self.repository().save(&mut entity).await?;
        let error =
            (!saved).then(|| ValidationError::from_entity(self.repository().alias(), &entity));
        self.subject.insert("entity", entity);

        match error {
            None => self.saved(created),
            Some(error) => {
                self.subject
                    .set([("success", false.into()), ("created", false.into())]);
                self.fire(Event::AfterSave)?;
                self.set_flash("error")?;
                Err(error.into())
            }
        }
    }

    fn saved(&mut self, created: bool) -> Result<Outcome, CrudError> {
        self.subject
            .set([("success", true.into()), ("created", created.into())]);
        self.fire(Event::AfterSave)?;
        self.set_flash("success")?;
        let url = self.index_url();
        self.redirect(url)
    }

    /// A listener stopped `beforeSave`. It may have declared success itself.
    fn stopped(&mut self, created: bool) -> Result<Outcome, CrudError> {
        if self.subject.success() {
            return self.saved(created);
        }
        self.subject.insert("success", false);
        self.set_flash("error")?;
        let url = self.index_url();
        self.redirect(url)
    }
}

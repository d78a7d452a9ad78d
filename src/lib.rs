//! # crudflow
//!
//! Generic CRUD actions driven through an event pipeline.
//!
//! A [`CrudController`] maps a request to one of five actions (index, add, edit,
//! view, delete). The action runs a fixed lifecycle against a [`Repository`] and
//! fires named [`Event`]s through a [`Dispatcher`] at every step. Registered
//! [`Listener`]s observe and mutate the per-request [`Subject`], and the outcome is
//! turned into a render instruction, a redirect, or a [`CrudError`].
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crudflow::{CrudConfig, CrudController, MemoryRepository, listener::ApiListener};
//!
//! let repository = Arc::new(MemoryRepository::new("Blogs", "blog", "blogs"));
//! let mut controller = CrudController::new(CrudConfig::rest("/blogs"), repository)?;
//! controller.add_listener(Arc::new(ApiListener::default()));
//!
//! let app = crudflow::routing::crud_router(Arc::new(controller));
//! ```

pub mod action;
pub mod config;
pub mod controller;
pub mod data;
pub mod dispatcher;
pub mod errors;
pub mod event;
pub mod listener;
pub mod pagination;
pub mod render;
pub mod routing;
pub mod subject;
pub mod validation;

pub use action::{Action, ActionConfig, ActionKind, ActionState};
pub use config::CrudConfig;
pub use controller::CrudController;
pub use data::{DataError, Entity, Fields, MemoryRepository, Page, Query, Repository};
pub use dispatcher::{Dispatched, Dispatcher, Handler};
pub use errors::{CrudError, ValidationError};
pub use event::{Event, EventContext, Scope};
pub use listener::{Listener, Subscription};
pub use render::{
    CrudRequest, JsonRenderer, Outcome, Redirect, RenderInstruction, Renderer, ViewData,
};
pub use subject::{ProcessMode, Subject, Value};
pub use validation::{FieldError, ValidationRule};

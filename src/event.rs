use std::fmt;
use std::str::FromStr;

use crate::action::ActionConfig;
use crate::errors::CrudError;
use crate::render::{CrudRequest, ViewData};
use crate::subject::Subject;

/// Lifecycle events fired by the CRUD actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Event {
    BeforeHandle,
    BeforeFind,
    AfterFind,
    BeforeSave,
    AfterSave,
    BeforeDelete,
    AfterDelete,
    BeforeRender,
    BeforeRedirect,
    BeforePaginate,
    AfterPaginate,
    RecordNotFound,
    InvalidId,
    SetFlash,
    BeforeBulk,
    AfterBulk,
    BeforeLookup,
    AfterLookup,
    /// One per related list published for rendering
    RelatedModel,
}

impl Event {
    pub const ALL: [Self; 19] = [
        Self::BeforeHandle,
        Self::BeforeFind,
        Self::AfterFind,
        Self::BeforeSave,
        Self::AfterSave,
        Self::BeforeDelete,
        Self::AfterDelete,
        Self::BeforeRender,
        Self::BeforeRedirect,
        Self::BeforePaginate,
        Self::AfterPaginate,
        Self::RecordNotFound,
        Self::InvalidId,
        Self::SetFlash,
        Self::BeforeBulk,
        Self::AfterBulk,
        Self::BeforeLookup,
        Self::AfterLookup,
        Self::RelatedModel,
    ];

    /// Canonical name, without the dispatcher prefix
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::BeforeHandle => "beforeHandle",
            Self::BeforeFind => "beforeFind",
            Self::AfterFind => "afterFind",
            Self::BeforeSave => "beforeSave",
            Self::AfterSave => "afterSave",
            Self::BeforeDelete => "beforeDelete",
            Self::AfterDelete => "afterDelete",
            Self::BeforeRender => "beforeRender",
            Self::BeforeRedirect => "beforeRedirect",
            Self::BeforePaginate => "beforePaginate",
            Self::AfterPaginate => "afterPaginate",
            Self::RecordNotFound => "recordNotFound",
            Self::InvalidId => "invalidId",
            Self::SetFlash => "setFlash",
            Self::BeforeBulk => "beforeBulk",
            Self::AfterBulk => "afterBulk",
            Self::BeforeLookup => "beforeLookup",
            Self::AfterLookup => "afterLookup",
            Self::RelatedModel => "relatedModel",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Event {
    type Err = CrudError;

    /// Accepts the bare name or a prefixed one (`"Crud.beforeRender"`)
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let bare = name.rsplit('.').next().unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|event| event.name() == bare)
            .ok_or_else(|| CrudError::invalid_config(format!("Unknown event: {name}")))
    }
}

/// Read-only request context handed to every handler
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub request: &'a CrudRequest,
    /// Configuration of the running action; `None` when the requested action
    /// isn't configured
    pub action: Option<&'a ActionConfig>,
    /// Path the resource routes are mounted under
    pub base_path: &'a str,
}

/// What a handler sees while an event is being dispatched
pub struct EventContext<'a> {
    event: Event,
    pub subject: &'a mut Subject,
    pub view: &'a mut ViewData,
    pub scope: Scope<'a>,
    stopped: bool,
}

impl<'a> EventContext<'a> {
    pub fn new(
        event: Event,
        subject: &'a mut Subject,
        view: &'a mut ViewData,
        scope: Scope<'a>,
    ) -> Self {
        Self {
            event,
            subject,
            view,
            scope,
            stopped: false,
        }
    }

    #[must_use]
    pub fn event(&self) -> Event {
        self.event
    }

    /// Skip the remaining handlers for this event
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    #[must_use]
    pub fn request(&self) -> &'a CrudRequest {
        self.scope.request
    }

    #[must_use]
    pub fn action(&self) -> Option<&'a ActionConfig> {
        self.scope.action
    }
}

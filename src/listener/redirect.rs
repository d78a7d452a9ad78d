//! Conditional redirects driven by the action's `redirect` rules.
//!
//! Rules are checked in order on `beforeRedirect`. The first one whose reader
//! yields a truthy value rewrites the subject's `url`:
//!
//! ```json
//! {
//!   "name": "post_edit",
//!   "reader": "request.data",
//!   "key": "_edit",
//!   "url": "{base}/{entity.field:id}"
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use super::{ActionFilter, Listener, Subscription, fill_placeholders, options_from, scalar_text};
use crate::errors::CrudError;
use crate::event::{Event, EventContext};
use crate::subject::json_truthy;

/// Where a redirect rule looks up its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reader {
    /// Route parameter
    RequestKey,
    /// Request body field
    RequestData,
    /// Query string parameter
    RequestQuery,
    /// Field of the subject's entity
    EntityField,
    /// Any subject key
    SubjectKey,
}

impl FromStr for Reader {
    type Err = CrudError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "request.key" => Ok(Self::RequestKey),
            "request.data" => Ok(Self::RequestData),
            "request.query" => Ok(Self::RequestQuery),
            "entity.field" => Ok(Self::EntityField),
            "subject.key" => Ok(Self::SubjectKey),
            other => Err(CrudError::InvalidReader {
                reader: other.to_string(),
            }),
        }
    }
}

impl Reader {
    fn read(self, ctx: &EventContext<'_>, key: &str) -> Option<Value> {
        let request = ctx.request();
        match self {
            Self::RequestKey => request.param(key).map(|v| Value::String(v.to_string())),
            Self::RequestData => request.data.get(key).cloned(),
            Self::RequestQuery => request.query_value(key).map(|v| Value::String(v.to_string())),
            Self::EntityField => ctx.subject.entity().and_then(|entity| entity.get(key)).cloned(),
            Self::SubjectKey => ctx.subject.get(key).map(crate::subject::Value::to_json),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectOptions {
    #[serde(flatten)]
    pub filter: ActionFilter,
}

#[derive(Debug, Clone, Default)]
pub struct RedirectListener {
    options: RedirectOptions,
}

impl RedirectListener {
    /// # Errors
    ///
    /// Returns `CrudError::InvalidConfig` when an override has the wrong type.
    pub fn with_options(overrides: &Value) -> Result<Self, CrudError> {
        Ok(Self {
            options: options_from(overrides)?,
        })
    }

    /// Fill `{base}` and `{reader:key}` placeholders
    fn build_url(ctx: &EventContext<'_>, template: &str) -> Result<String, CrudError> {
        fill_placeholders(template, |name| {
            if name == "base" {
                return Ok(Some(ctx.scope.base_path.to_string()));
            }
            let Some((reader, key)) = name.split_once(':') else {
                return Ok(None);
            };
            let reader: Reader = reader.parse()?;
            Ok(Some(
                reader
                    .read(ctx, key)
                    .as_ref()
                    .and_then(scalar_text)
                    .unwrap_or_default(),
            ))
        })
    }
}

impl Listener for RedirectListener {
    fn implemented_events(&self) -> Vec<Subscription> {
        vec![Subscription::with_priority(Event::BeforeRedirect, 90)]
    }

    fn before_redirect(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
        let Some(action) = ctx.action() else {
            return Ok(());
        };
        if !self.options.filter.applies(ctx.subject) {
            return Ok(());
        }

        for rule in &action.redirect {
            let reader: Reader = rule.reader.parse()?;
            if !reader.read(ctx, &rule.key).is_some_and(|value| json_truthy(&value)) {
                continue;
            }
            let url = Self::build_url(ctx, &rule.url)?;
            tracing::debug!(rule = %rule.name, url = %url, "Redirect rule matched");
            ctx.subject.insert("url", url);
            break;
        }
        Ok(())
    }
}

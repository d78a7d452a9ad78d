use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{ActionFilter, Listener, Subscription, options_from};
use crate::errors::CrudError;
use crate::event::{Event, EventContext};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiPaginationOptions {
    #[serde(flatten)]
    pub filter: ActionFilter,
}

/// Adds a `pagination` block to paginated API responses.
///
/// Meant to run alongside [`ApiListener`](super::ApiListener), which adds the
/// `success` and `data` keys next to it.
#[derive(Debug, Clone, Default)]
pub struct ApiPaginationListener {
    options: ApiPaginationOptions,
}

impl ApiPaginationListener {
    /// # Errors
    ///
    /// Returns `CrudError::InvalidConfig` when an override has the wrong type.
    pub fn with_options(overrides: &Value) -> Result<Self, CrudError> {
        Ok(Self {
            options: options_from(overrides)?,
        })
    }
}

impl Listener for ApiPaginationListener {
    fn implemented_events(&self) -> Vec<Subscription> {
        vec![Subscription::with_priority(Event::BeforeRender, 75)]
    }

    fn before_render(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
        if !self.options.filter.applies(ctx.subject) {
            return Ok(());
        }
        let Some(page) = ctx.subject.page() else {
            return Ok(());
        };

        let pagination = json!({
            "page_count": page.page_count(),
            "current_page": page.current_page,
            "has_next_page": page.has_next_page(),
            "has_prev_page": page.has_prev_page(),
            "count": page.count(),
            "total_count": page.total_count,
            "per_page": page.per_page,
        });
        ctx.view.set("pagination", pagination);
        ctx.view.serialize("pagination");
        Ok(())
    }
}

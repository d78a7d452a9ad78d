//! Controller configuration.
//!
//! Everything the pipeline needs is passed to [`CrudController::new`](crate::CrudController::new)
//! through a [`CrudConfig`]; nothing is looked up globally at request time.
//!
//! ```json
//! {
//!   "base_path": "/blogs",
//!   "debug": false,
//!   "actions": {
//!     "index": "index",
//!     "view": { "kind": "view", "id_format": "integer" },
//!     "publish": { "kind": "edit", "methods": ["POST"] }
//!   },
//!   "listeners": { "api": {}, "apiPagination": {}, "redirect": {} },
//!   "messages": { "record_not_found": "Blog {id} not found" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::CrudError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrudConfig {
    /// Prefix of the names recorded in the event log
    pub event_prefix: String,
    /// Log every dispatch at debug level
    pub event_logging: bool,
    /// Include exception details in error responses
    pub debug: bool,
    /// Path the resource routes are mounted under
    pub base_path: String,
    /// Action name to a kind string or an object with `kind` plus overrides
    pub actions: BTreeMap<String, Value>,
    /// Built-in listener name to option overrides
    pub listeners: BTreeMap<String, Value>,
    /// Verbs checked when answering `OPTIONS`
    pub options_verbs: Vec<String>,
    pub messages: Messages,
}

/// Controller-wide message templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    /// `{id}` is replaced with the requested id
    pub record_not_found: String,
    pub invalid_id: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            record_not_found: "Not found".to_string(),
            invalid_id: "Invalid id".to_string(),
        }
    }
}

impl Default for CrudConfig {
    fn default() -> Self {
        Self {
            event_prefix: "Crud".to_string(),
            event_logging: false,
            debug: false,
            base_path: String::new(),
            actions: BTreeMap::new(),
            listeners: BTreeMap::new(),
            options_verbs: ["GET", "POST", "PUT", "DELETE"]
                .into_iter()
                .map(String::from)
                .collect(),
            messages: Messages::default(),
        }
    }
}

impl CrudConfig {
    /// The five standard actions mounted at `base_path`
    #[must_use]
    pub fn rest(base_path: &str) -> Self {
        let actions = ["index", "view", "add", "edit", "delete"]
            .into_iter()
            .map(|name| (name.to_string(), Value::String(name.to_string())))
            .collect();
        Self {
            base_path: base_path.trim_end_matches('/').to_string(),
            actions,
            ..Self::default()
        }
    }

    /// Parse a configuration document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `CrudError::InvalidConfig` when the JSON is malformed or a key has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, CrudError> {
        serde_json::from_str(json).map_err(|e| CrudError::invalid_config(e.to_string()))
    }

    /// Enable a built-in listener with option overrides
    #[must_use]
    pub fn with_listener(mut self, name: &str, overrides: Value) -> Self {
        self.listeners.insert(name.to_string(), overrides);
        self
    }

    /// Add or replace an action entry
    #[must_use]
    pub fn with_action(mut self, name: &str, entry: Value) -> Self {
        self.actions.insert(name.to_string(), entry);
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Deep-merge `overrides` into `base`: objects merge key by key, anything else replaces
pub fn merge_json(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overrides) => *base = overrides.clone(),
    }
}

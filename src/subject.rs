//! The per-request [`Subject`]: an open-ended bag of named [`Value`]s plus the log
//! of every event dispatched while the action ran.

use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::data::{Entity, Page, Query};
use crate::errors::CrudError;

/// Tagged union of everything listeners and actions store on a subject
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    /// A record identifier as it appeared in the route
    Id(String),
    Query(Query),
    Entity(Entity),
    Entities(Vec<Entity>),
    Page(Page),
    Json(serde_json::Value),
}

impl Value {
    /// Loose truthiness: `false`, `0`, empty strings, empty lists and JSON null are falsy
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Str(s) | Self::Id(s) => !s.is_empty() && s != "0",
            Self::Query(_) | Self::Entity(_) | Self::Page(_) => true,
            Self::Entities(items) => !items.is_empty(),
            Self::Json(value) => json_truthy(value),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => json!(b),
            Self::Int(i) => json!(i),
            Self::Str(s) | Self::Id(s) => json!(s),
            Self::Query(query) => query.to_json(),
            Self::Entity(entity) => entity.to_json(),
            Self::Entities(items) => {
                serde_json::Value::Array(items.iter().map(Entity::to_json).collect())
            }
            Self::Page(page) => {
                serde_json::Value::Array(page.items.iter().map(Entity::to_json).collect())
            }
            Self::Json(value) => value.clone(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::Id(s) => Some(s),
            Self::Json(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) | Self::Json(serde_json::Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }
}

pub(crate) fn json_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(s) => !s.is_empty() && s != "0",
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::Object(map) => !map.is_empty(),
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Query> for Value {
    fn from(value: Query) -> Self {
        Self::Query(value)
    }
}

impl From<Entity> for Value {
    fn from(value: Entity) -> Self {
        Self::Entity(value)
    }
}

impl From<Vec<Entity>> for Value {
    fn from(value: Vec<Entity>) -> Self {
        Self::Entities(value)
    }
}

impl From<Page> for Value {
    fn from(value: Page) -> Self {
        Self::Page(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// How [`Subject::should_process`] interprets its action list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    /// Process only for the listed actions
    Only,
    /// Process for every action except the listed ones
    Not,
}

impl FromStr for ProcessMode {
    type Err = CrudError;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode {
            "only" => Ok(Self::Only),
            "not" => Ok(Self::Not),
            other => Err(CrudError::InvalidMode {
                mode: other.to_string(),
            }),
        }
    }
}

/// Mutable state shared by an action and its listeners for one request
#[derive(Debug, Clone, Default)]
pub struct Subject {
    fields: BTreeMap<String, Value>,
    events: Vec<String>,
}

impl Subject {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge fields into the subject, overwriting existing keys
    pub fn set<K, I>(&mut self, fields: I) -> &mut Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        for (key, value) in fields {
            self.fields.insert(key.into(), value);
        }
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Append to the event log. Repeated events are kept.
    pub fn add_event(&mut self, name: impl Into<String>) {
        self.events.push(name.into());
    }

    #[must_use]
    pub fn events(&self) -> &[String] {
        &self.events
    }

    #[must_use]
    pub fn has_event(&self, name: &str) -> bool {
        self.events.iter().any(|event| event == name)
    }

    /// Decide whether a listener should act for the current action.
    ///
    /// # Errors
    ///
    /// Returns `CrudError::InvalidMode` for any mode other than `"only"` or `"not"`.
    pub fn should_process<S: AsRef<str>>(
        &self,
        mode: &str,
        actions: &[S],
    ) -> Result<bool, CrudError> {
        let mode: ProcessMode = mode.parse()?;
        Ok(self.should_process_mode(mode, actions))
    }

    #[must_use]
    pub fn should_process_mode<S: AsRef<str>>(&self, mode: ProcessMode, actions: &[S]) -> bool {
        let current = self.action().unwrap_or_default();
        let listed = actions.iter().any(|action| action.as_ref() == current);
        match mode {
            ProcessMode::Only => listed,
            ProcessMode::Not => !listed,
        }
    }

    // Typed accessors for the keys actions always use

    #[must_use]
    pub fn success(&self) -> bool {
        self.get("success").is_some_and(Value::is_truthy)
    }

    #[must_use]
    pub fn action(&self) -> Option<&str> {
        self.get("action").and_then(Value::as_str)
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    #[must_use]
    pub fn query(&self) -> Option<&Query> {
        match self.get("query") {
            Some(Value::Query(query)) => Some(query),
            _ => None,
        }
    }

    pub fn query_mut(&mut self) -> Option<&mut Query> {
        match self.get_mut("query") {
            Some(Value::Query(query)) => Some(query),
            _ => None,
        }
    }

    #[must_use]
    pub fn entity(&self) -> Option<&Entity> {
        match self.get("entity") {
            Some(Value::Entity(entity)) => Some(entity),
            _ => None,
        }
    }

    pub fn entity_mut(&mut self) -> Option<&mut Entity> {
        match self.get_mut("entity") {
            Some(Value::Entity(entity)) => Some(entity),
            _ => None,
        }
    }

    #[must_use]
    pub fn entities(&self) -> Option<&[Entity]> {
        match self.get("entities") {
            Some(Value::Entities(items)) => Some(items),
            Some(Value::Page(page)) => Some(&page.items),
            _ => None,
        }
    }

    #[must_use]
    pub fn page(&self) -> Option<&Page> {
        match self.get("page") {
            Some(Value::Page(page)) => Some(page),
            _ => None,
        }
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.get("url").and_then(Value::as_str)
    }

    /// Redirect status code, if a listener set one
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self.get("status") {
            Some(Value::Int(code)) => u16::try_from(*code).ok(),
            Some(Value::Json(value)) => value.as_u64().and_then(|code| u16::try_from(code).ok()),
            _ => None,
        }
    }

    #[must_use]
    pub fn created(&self) -> bool {
        self.get("created").is_some_and(Value::is_truthy)
    }
}

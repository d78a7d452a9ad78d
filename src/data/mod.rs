//! # Data layer interface
//!
//! Actions never talk to storage directly. They build a [`Query`], hand it to the
//! controller's [`Repository`], and work with the [`Entity`] values and [`Page`]s it
//! returns. Query execution, persistence and validation all belong to the
//! repository implementation.
//!
//! [`MemoryRepository`] is a complete in-process implementation, handy for tests
//! and prototypes.

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;

use crate::validation::FieldError;

mod memory;

pub use memory::MemoryRepository;

/// Plain field → value record data, as it arrives in request bodies
pub type Fields = serde_json::Map<String, Value>;

/// Error raised by a data layer implementation
#[derive(Debug, Clone, PartialEq)]
pub struct DataError {
    pub message: String,
}

impl DataError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data layer error: {}", self.message)
    }
}

impl std::error::Error for DataError {}

/// A record plus the validation errors the last save attempt left on it.
///
/// Serializes as its plain fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    fields: Fields,
    errors: BTreeMap<String, Vec<FieldError>>,
    new: bool,
}

impl Entity {
    /// A record that hasn't been persisted yet
    #[must_use]
    pub fn new(fields: Fields) -> Self {
        Self {
            fields,
            errors: BTreeMap::new(),
            new: true,
        }
    }

    /// A record loaded from storage
    #[must_use]
    pub fn persisted(fields: Fields) -> Self {
        Self {
            fields,
            errors: BTreeMap::new(),
            new: false,
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Overwrite fields with the given data, keeping everything else
    pub fn patch(&mut self, data: Fields) -> &mut Self {
        for (key, value) in data {
            self.fields.insert(key, value);
        }
        self
    }

    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.new
    }

    pub fn mark_persisted(&mut self) {
        self.new = false;
    }

    #[must_use]
    pub fn errors(&self) -> &BTreeMap<String, Vec<FieldError>> {
        &self.errors
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors.values().any(|errors| !errors.is_empty())
    }

    pub fn add_error(&mut self, field: impl Into<String>, error: FieldError) {
        self.errors.entry(field.into()).or_default().push(error);
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Fields as a JSON object
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// A finder invocation plus conditions listeners can tighten
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Name of the finder, `"all"` by default
    pub finder: String,
    /// Options handed to the finder
    pub options: Fields,
    /// `field = value` conditions, all of which must hold
    pub conditions: Fields,
    /// `field IN (values)` conditions, all of which must hold
    pub one_of: BTreeMap<String, Vec<Value>>,
}

impl Query {
    #[must_use]
    pub fn new(finder: impl Into<String>) -> Self {
        Self {
            finder: finder.into(),
            options: Fields::new(),
            conditions: Fields::new(),
            one_of: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: Fields) -> Self {
        self.options = options;
        self
    }

    /// Add an equality condition
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    /// Add a condition matching any of `values`
    #[must_use]
    pub fn where_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.one_of.insert(field.into(), values);
        self
    }

    /// Option value as a string, e.g. `keyField`
    #[must_use]
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// Whether `entity` satisfies every condition
    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        let equal = self.conditions.iter().all(|(field, expected)| {
            entity
                .get(field)
                .is_some_and(|actual| loosely_equal(actual, expected))
        });
        equal
            && self.one_of.iter().all(|(field, values)| {
                entity.get(field).is_some_and(|actual| {
                    values.iter().any(|expected| loosely_equal(actual, expected))
                })
            })
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "finder": self.finder,
            "options": self.options,
            "conditions": self.conditions,
            "one_of": self.one_of,
        })
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new("all")
    }
}

/// Compare values the way request input compares to stored data: `"1"` equals `1`
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        _ => actual == expected,
    }
}

/// One page of results plus the totals needed to navigate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<Entity>,
    pub current_page: u64,
    pub per_page: u64,
    pub total_count: u64,
}

impl Page {
    /// Number of pages; an empty result still has one (empty) page
    #[must_use]
    pub fn page_count(&self) -> u64 {
        if self.per_page == 0 {
            return 1;
        }
        self.total_count.div_ceil(self.per_page).max(1)
    }

    /// Whether the requested page lies past the last one
    #[must_use]
    pub fn is_out_of_range(&self) -> bool {
        self.current_page > self.page_count()
    }

    #[must_use]
    pub fn has_next_page(&self) -> bool {
        self.current_page < self.page_count()
    }

    #[must_use]
    pub fn has_prev_page(&self) -> bool {
        self.current_page > 1
    }

    /// Items on this page
    #[must_use]
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Zero-based offset of the first item on this page
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.current_page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// A set-based write applied to every record a query matches
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    Delete,
    /// Flip a boolean field
    Toggle { field: String },
    SetValue { field: String, value: Value },
}

impl BulkOperation {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Toggle { .. } => "toggle",
            Self::SetValue { .. } => "set_value",
        }
    }
}

/// One data layer call as a repository's query log records it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedQuery {
    /// `find`, `paginate`, `save`, `delete` or `bulk:<operation>`
    pub operation: String,
    pub query: Value,
    /// Records returned or touched
    pub rows: u64,
}

/// `key → label` pairs built from records, the shape of a `list` find.
/// Records without a scalar key are skipped.
#[must_use]
pub fn key_value_list(entities: &[Entity], key_field: &str, value_field: &str) -> Fields {
    entities
        .iter()
        .filter_map(|entity| {
            let key = match entity.get(key_field)? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            let label = entity.get(value_field).cloned().unwrap_or(Value::Null);
            Some((key, label))
        })
        .collect()
}

/// Turn a route id into the JSON value stored in records: numeric ids become numbers
#[must_use]
pub fn id_value(id: &str) -> Value {
    id.parse::<i64>()
        .map_or_else(|_| Value::String(id.to_string()), Value::from)
}

/// The data access operations the CRUD actions rely on.
///
/// Implementations own query execution, persistence and validation. A failed
/// `save` returns `Ok(false)` and leaves field errors on the entity; `Err` is
/// reserved for infrastructure failures.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Model name used in validation messages, e.g. `"Blogs"`
    fn alias(&self) -> &str;

    /// Human name of one record, e.g. `"blog"`
    fn resource_name_singular(&self) -> &str;

    /// Human name of the collection, e.g. `"blogs"`
    fn resource_name_plural(&self) -> &str;

    fn primary_key(&self) -> &str {
        "id"
    }

    /// Field used as the label in `key → label` lists
    fn display_field(&self) -> &str {
        "name"
    }

    /// Whether records have a field called `name`
    fn has_field(&self, _name: &str) -> bool {
        true
    }

    /// Build the query for a finder
    fn query(&self, finder: &str, options: &Fields) -> Query {
        Query::new(finder).with_options(options.clone())
    }

    /// Every record matching the query
    async fn find(&self, query: &Query) -> Result<Vec<Entity>, DataError>;

    /// The first record matching the query
    async fn first(&self, query: &Query) -> Result<Option<Entity>, DataError> {
        Ok(self.find(query).await?.into_iter().next())
    }

    /// Look up a single record by primary key
    async fn get(&self, id: &str) -> Result<Option<Entity>, DataError> {
        let query = Query::default().where_eq(self.primary_key(), id_value(id));
        self.first(&query).await
    }

    /// One page of records matching the query (pages are 1-based).
    ///
    /// A page past the end comes back empty with `current_page` set to the
    /// requested page, so callers can detect it with [`Page::is_out_of_range`].
    async fn paginate(&self, query: &Query, page: u64, per_page: u64) -> Result<Page, DataError>;

    /// Build an unsaved entity from request data
    fn new_entity(&self, data: Fields) -> Entity {
        Entity::new(data)
    }

    /// Merge request data into a loaded entity
    fn patch_entity(&self, mut entity: Entity, data: Fields) -> Entity {
        entity.patch(data);
        entity
    }

    /// Persist the entity. Returns `Ok(false)` and populates field errors when
    /// validation fails.
    async fn save(&self, entity: &mut Entity) -> Result<bool, DataError>;

    /// Remove the entity. Returns `Ok(false)` when nothing was removed.
    async fn delete(&self, entity: &Entity) -> Result<bool, DataError>;

    /// Apply `operation` to every record the query matches, without
    /// validation. Returns the number of records touched.
    async fn bulk(&self, _query: &Query, operation: &BulkOperation) -> Result<u64, DataError> {
        Err(DataError::new(format!(
            "{} does not support bulk {}",
            self.alias(),
            operation.name()
        )))
    }

    /// Associations whose records can be listed alongside this resource
    fn associations(&self) -> Vec<String> {
        Vec::new()
    }

    /// `key → label` list of an association's records; `None` for an unknown association
    async fn related_list(&self, _association: &str) -> Result<Option<Fields>, DataError> {
        Ok(None)
    }

    /// Data layer calls recorded so far, oldest first
    fn query_log(&self) -> Vec<LoggedQuery> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_entity_serializes_as_fields() {
        let mut entity = Entity::new(fields(json!({"id": 1, "name": "First"})));
        entity.add_error("name", FieldError::new("required", "Required"));
        assert_eq!(serde_json::to_value(&entity).unwrap(), json!({"id": 1, "name": "First"}));
    }

    #[test]
    fn test_entity_patch_keeps_other_fields() {
        let mut entity = Entity::persisted(fields(json!({"id": 1, "name": "First", "body": "x"})));
        entity.patch(fields(json!({"name": "Renamed"})));
        assert_eq!(entity.get("name"), Some(&json!("Renamed")));
        assert_eq!(entity.get("body"), Some(&json!("x")));
        assert!(!entity.is_new());
    }

    #[test]
    fn test_query_matches_route_ids_loosely() {
        let entity = Entity::persisted(fields(json!({"id": 7, "status": "draft"})));
        assert!(Query::default().where_eq("id", "7").matches(&entity));
        assert!(Query::default().where_eq("id", 7).matches(&entity));
        assert!(!Query::default().where_eq("status", "published").matches(&entity));
        assert!(!Query::default().where_eq("missing", 1).matches(&entity));
    }

    #[test]
    fn test_page_navigation() {
        let page = Page {
            items: Vec::new(),
            current_page: 2,
            per_page: 10,
            total_count: 25,
        };
        assert_eq!(page.page_count(), 3);
        assert!(page.has_next_page());
        assert!(page.has_prev_page());
        assert!(!page.is_out_of_range());
        assert_eq!(page.offset(), 10);
    }

    #[test]
    fn test_empty_result_has_one_page() {
        let page = Page {
            items: Vec::new(),
            current_page: 2,
            per_page: 10,
            total_count: 0,
        };
        assert_eq!(page.page_count(), 1);
        assert!(page.is_out_of_range());
    }

    #[test]
    fn test_query_where_in() {
        let entity = Entity::persisted(fields(json!({"id": 2})));
        let query = Query::default().where_in("id", vec![json!("1"), json!("2")]);
        assert!(query.matches(&entity));
        assert!(!Query::default().where_in("id", vec![json!(3)]).matches(&entity));
        assert!(!Query::default().where_in("id", Vec::new()).matches(&entity));
    }

    #[test]
    fn test_key_value_list() {
        let entities = [
            Entity::persisted(fields(json!({"id": 1, "name": "First"}))),
            Entity::persisted(fields(json!({"id": null, "name": "Orphan"}))),
            Entity::persisted(fields(json!({"id": 3}))),
        ];
        assert_eq!(
            Value::Object(key_value_list(&entities, "id", "name")),
            json!({"1": "First", "3": null})
        );
    }

    #[test]
    fn test_id_value() {
        assert_eq!(id_value("42"), json!(42));
        assert_eq!(id_value("abc"), json!("abc"));
    }
}

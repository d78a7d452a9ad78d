use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{
    BulkOperation, DataError, Entity, Fields, LoggedQuery, Page, Query, Repository, id_value,
    key_value_list,
};
use crate::validation::ValidationRule;

type FinderFn = Arc<dyn Fn(&Query, &Entity) -> bool + Send + Sync>;

#[derive(Default)]
struct Store {
    rows: BTreeMap<i64, Fields>,
    next_id: i64,
}

/// In-process repository with integer ids, equality conditions, named finders and
/// validation rules.
///
/// The `all` and `list` finders are always available. Associations are other
/// repositories whose records can be listed for forms.
pub struct MemoryRepository {
    alias: String,
    singular: String,
    plural: String,
    display_field: String,
    store: RwLock<Store>,
    rules: Vec<(String, ValidationRule)>,
    finders: HashMap<String, FinderFn>,
    associations: BTreeMap<String, Arc<dyn Repository>>,
    query_log: Option<RwLock<Vec<LoggedQuery>>>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new(alias: &str, singular: &str, plural: &str) -> Self {
        Self {
            alias: alias.to_string(),
            singular: singular.to_string(),
            plural: plural.to_string(),
            store: RwLock::new(Store {
                rows: BTreeMap::new(),
                next_id: 1,
            }),
            display_field: "name".to_string(),
            rules: Vec::new(),
            finders: HashMap::new(),
            associations: BTreeMap::new(),
            query_log: None,
        }
    }

    /// Field used as the label in `key → label` lists, `name` by default
    #[must_use]
    pub fn with_display_field(mut self, field: &str) -> Self {
        self.display_field = field.to_string();
        self
    }

    /// Make `target`'s records listable under the association `name`
    #[must_use]
    pub fn with_association(mut self, name: &str, target: Arc<dyn Repository>) -> Self {
        self.associations.insert(name.to_string(), target);
        self
    }

    /// Record every data layer call in the query log
    #[must_use]
    pub fn with_query_log(mut self) -> Self {
        self.query_log = Some(RwLock::new(Vec::new()));
        self
    }

    /// Validate `field` with `rule` on every save
    #[must_use]
    pub fn with_rule(mut self, field: &str, rule: ValidationRule) -> Self {
        self.rules.push((field.to_string(), rule));
        self
    }

    /// Register a named finder. `"all"` is always available.
    #[must_use]
    pub fn with_finder<F>(mut self, name: &str, finder: F) -> Self
    where
        F: Fn(&Query, &Entity) -> bool + Send + Sync + 'static,
    {
        self.finders.insert(name.to_string(), Arc::new(finder));
        self
    }

    /// Insert a record without validation and return it with its id
    pub fn seed(&self, mut fields: Fields) -> Entity {
        let mut store = self.store.write();
        let id = store.next_id;
        store.next_id += 1;
        fields.insert("id".to_string(), Value::from(id));
        store.rows.insert(id, fields.clone());
        Entity::persisted(fields)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read().rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn log(&self, operation: &str, query: &Query, rows: u64) {
        if let Some(log) = &self.query_log {
            log.write().push(LoggedQuery {
                operation: operation.to_string(),
                query: query.to_json(),
                rows,
            });
        }
    }

    fn matching(&self, query: &Query) -> Result<Vec<Entity>, DataError> {
        let finder = if matches!(query.finder.as_str(), "all" | "list") {
            None
        } else {
            Some(
                self.finders
                    .get(&query.finder)
                    .ok_or_else(|| DataError::new(format!("Unknown finder: {}", query.finder)))?,
            )
        };

        let store = self.store.read();
        Ok(store
            .rows
            .values()
            .map(|fields| Entity::persisted(fields.clone()))
            .filter(|entity| query.matches(entity))
            .filter(|entity| finder.is_none_or(|finder| finder(query, entity)))
            .collect())
    }

    fn validate(&self, entity: &mut Entity) -> bool {
        entity.clear_errors();
        for (field, rule) in &self.rules {
            if let Err(error) = rule.check(entity.get(field)) {
                entity.add_error(field.clone(), error);
            }
        }
        !entity.has_errors()
    }

    fn row_id(entity: &Entity) -> Option<i64> {
        match entity.get("id")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn resource_name_singular(&self) -> &str {
        &self.singular
    }

    fn resource_name_plural(&self) -> &str {
        &self.plural
    }

    fn display_field(&self) -> &str {
        &self.display_field
    }

    fn has_field(&self, name: &str) -> bool {
        name == self.primary_key()
            || self.rules.iter().any(|(field, _)| field == name)
            || self.store.read().rows.values().any(|row| row.contains_key(name))
    }

    async fn find(&self, query: &Query) -> Result<Vec<Entity>, DataError> {
        let found = self.matching(query)?;
        self.log("find", query, found.len() as u64);
        Ok(found)
    }

    async fn paginate(&self, query: &Query, page: u64, per_page: u64) -> Result<Page, DataError> {
        let all = self.matching(query)?;
        let total_count = all.len() as u64;
        let page = page.max(1);
        let skip = usize::try_from(page.saturating_sub(1).saturating_mul(per_page))
            .unwrap_or(usize::MAX);
        let take = usize::try_from(per_page).unwrap_or(usize::MAX);

        let items: Vec<Entity> = all.into_iter().skip(skip).take(take).collect();
        self.log("paginate", query, items.len() as u64);
        Ok(Page {
            items,
            current_page: page,
            per_page,
            total_count,
        })
    }

    async fn save(&self, entity: &mut Entity) -> Result<bool, DataError> {
        if !self.validate(entity) {
            return Ok(false);
        }

        let mut store = self.store.write();
        let id = match Self::row_id(entity) {
            Some(id) if !entity.is_new() => {
                if !store.rows.contains_key(&id) {
                    return Err(DataError::new(format!("Record {id} vanished before save")));
                }
                id
            }
            _ => {
                let id = store.next_id;
                store.next_id += 1;
                id
            }
        };

        entity.set("id", id_value(&id.to_string()));
        store.rows.insert(id, entity.fields().clone());
        drop(store);
        entity.mark_persisted();
        self.log("save", &Query::default().where_eq("id", id), 1);
        Ok(true)
    }

    async fn delete(&self, entity: &Entity) -> Result<bool, DataError> {
        let Some(id) = Self::row_id(entity) else {
            return Ok(false);
        };
        let removed = self.store.write().rows.remove(&id).is_some();
        self.log("delete", &Query::default().where_eq("id", id), u64::from(removed));
        Ok(removed)
    }

    async fn bulk(&self, query: &Query, operation: &BulkOperation) -> Result<u64, DataError> {
        let ids: Vec<i64> = self
            .matching(query)?
            .iter()
            .filter_map(Self::row_id)
            .collect();

        let mut store = self.store.write();
        let mut touched = 0;
        for id in ids {
            let applied = match operation {
                BulkOperation::Delete => store.rows.remove(&id).is_some(),
                BulkOperation::Toggle { field } => store.rows.get_mut(&id).is_some_and(|row| {
                    let flipped = toggled(row.get(field));
                    row.insert(field.clone(), flipped);
                    true
                }),
                BulkOperation::SetValue { field, value } => {
                    store.rows.get_mut(&id).is_some_and(|row| {
                        row.insert(field.clone(), value.clone());
                        true
                    })
                }
            };
            if applied {
                touched += 1;
            }
        }
        drop(store);

        self.log(&format!("bulk:{}", operation.name()), query, touched);
        Ok(touched)
    }

    fn associations(&self) -> Vec<String> {
        self.associations.keys().cloned().collect()
    }

    async fn related_list(&self, association: &str) -> Result<Option<Fields>, DataError> {
        let Some(target) = self.associations.get(association) else {
            return Ok(None);
        };
        let records = target.find(&target.query("list", &Fields::new())).await?;
        Ok(Some(key_value_list(
            &records,
            target.primary_key(),
            target.display_field(),
        )))
    }

    fn query_log(&self) -> Vec<LoggedQuery> {
        self.query_log
            .as_ref()
            .map(|log| log.read().clone())
            .unwrap_or_default()
    }
}

/// `NOT value`: booleans flip, numbers become 0 or 1, anything else becomes `true`
fn toggled(value: Option<&Value>) -> Value {
    match value {
        Some(Value::Bool(b)) => Value::Bool(!b),
        Some(Value::Number(n)) => Value::from(i64::from(n.as_f64() == Some(0.0))),
        _ => Value::Bool(true),
    }
}

use axum::http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::merge_json;
use crate::data::Fields;
use crate::errors::CrudError;

/// The five CRUD operations, plus lookup lists and bulk writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Index,
    View,
    Add,
    Edit,
    Delete,
    /// `key → label` list of records
    Lookup,
    BulkDelete,
    BulkToggle,
    BulkSetValue,
}

/// Whether an action works on a whole table, a single record, or a set of ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionScope {
    Table,
    Entity,
    Bulk,
}

impl ActionKind {
    #[must_use]
    pub fn scope(self) -> ActionScope {
        match self {
            Self::Index | Self::Lookup => ActionScope::Table,
            Self::View | Self::Add | Self::Edit | Self::Delete => ActionScope::Entity,
            Self::BulkDelete | Self::BulkToggle | Self::BulkSetValue => ActionScope::Bulk,
        }
    }

    /// Verbs the action accepts unless configured otherwise
    #[must_use]
    pub fn default_methods(self) -> Vec<String> {
        let methods: &[&str] = match self {
            Self::Index | Self::View | Self::Lookup => &["GET"],
            Self::Add => &["GET", "POST", "PUT"],
            Self::Edit => &["GET", "PUT", "PATCH", "POST"],
            Self::Delete | Self::BulkDelete => &["POST", "DELETE"],
            Self::BulkToggle | Self::BulkSetValue => &["POST", "PUT"],
        };
        methods.iter().map(|m| (*m).to_string()).collect()
    }

    /// Delete and the bulk actions publish no record data
    #[must_use]
    pub fn has_view_var(self) -> bool {
        !matches!(self, Self::Delete) && self.scope() != ActionScope::Bulk
    }

    /// Whether the action loads a record by id
    #[must_use]
    pub fn needs_id(self) -> bool {
        matches!(self, Self::View | Self::Edit | Self::Delete)
    }

    /// One of the five resource operations that own the standard routes
    #[must_use]
    pub fn is_resource(self) -> bool {
        matches!(
            self,
            Self::Index | Self::View | Self::Add | Self::Edit | Self::Delete
        )
    }
}

/// Associations to list for an action's forms: `true` for all of them, or names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelatedModels {
    All(bool),
    One(String),
    Named(Vec<String>),
}

impl Default for RelatedModels {
    fn default() -> Self {
        Self::All(false)
    }
}

impl RelatedModels {
    /// Association names to publish, picked from what the repository offers
    #[must_use]
    pub fn resolve(&self, available: Vec<String>) -> Vec<String> {
        match self {
            Self::All(true) => available,
            Self::All(false) => Vec::new(),
            Self::One(name) => vec![name.clone()],
            Self::Named(names) => names.clone(),
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = CrudError;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(kind.to_string()))
            .map_err(|_| CrudError::invalid_config(format!("Unknown action kind: {kind}")))
    }
}

/// Accepted shape of record ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdFormat {
    #[default]
    Any,
    Integer,
    Uuid,
}

impl IdFormat {
    #[must_use]
    pub fn accepts(self, id: &str) -> bool {
        match self {
            Self::Any => !id.is_empty(),
            Self::Integer => !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()),
            Self::Uuid => uuid::Uuid::parse_str(id).is_ok(),
        }
    }
}

/// Finder name plus the options passed to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindMethod {
    pub name: String,
    #[serde(default)]
    pub options: Fields,
}

impl Default for FindMethod {
    fn default() -> Self {
        Self {
            name: "all".to_string(),
            options: Fields::new(),
        }
    }
}

/// What the API response carries under the data key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiData {
    /// Entity fields copied into the data
    pub entity: Vec<String>,
    /// Subject keys copied into the data
    pub subject: Vec<String>,
    /// Literal values; string values may use `{key}` subject placeholders
    pub raw: Fields,
}

impl ApiData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entity.is_empty() && self.subject.is_empty() && self.raw.is_empty()
    }
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiResponse {
    /// Status code for the response; the renderer default otherwise
    pub code: Option<u16>,
    pub data: ApiData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Verbs an API client may use; empty means no restriction
    pub methods: Vec<String>,
    pub success: ApiResponse,
    pub error: ApiResponse,
}

/// A conditional redirect: when `reader` yields a truthy value for `key`,
/// redirect to `url`.
///
/// `url` is a template. `{base}` is the resource base path and `{reader:key}`
/// inserts another reader's value, e.g. `"{base}/{entity.field:id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectRule {
    pub name: String,
    pub reader: String,
    pub key: String,
    pub url: String,
}

impl RedirectRule {
    #[must_use]
    pub fn new(name: &str, reader: &str, key: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            reader: reader.to_string(),
            key: key.to_string(),
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionMessages {
    /// `{name}` is replaced with the resource name
    pub success: String,
    pub error: String,
}

fn bulk_messages(success: &str, error: &str) -> ActionMessages {
    ActionMessages {
        success: success.to_string(),
        error: error.to_string(),
    }
}

/// Full configuration of one action
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(skip)]
    pub name: String,
    pub kind: ActionKind,
    pub enabled: bool,
    pub methods: Vec<String>,
    pub view: Option<String>,
    pub view_var: Option<String>,
    pub find_method: FindMethod,
    /// Extra view variables to include in the response
    pub serialize: Vec<String>,
    pub resource_name: Option<String>,
    pub id_format: IdFormat,
    pub api: ApiConfig,
    pub redirect: Vec<RedirectRule>,
    pub messages: ActionMessages,
    /// Page size when the request doesn't set `limit`
    pub limit: u64,
    /// Largest page size a request may ask for
    pub max_limit: u64,
    /// Field a bulk toggle or set-value action writes
    pub field: Option<String>,
    /// Value a bulk set-value action writes
    pub value: Option<Value>,
    pub related_models: RelatedModels,
}

impl ActionConfig {
    /// Defaults for an action of `kind`
    #[must_use]
    pub fn for_kind(name: &str, kind: ActionKind) -> Self {
        let mut config = Self {
            name: name.to_string(),
            kind,
            enabled: true,
            methods: kind.default_methods(),
            view: None,
            view_var: None,
            find_method: FindMethod::default(),
            serialize: Vec::new(),
            resource_name: None,
            id_format: IdFormat::Any,
            api: ApiConfig::default(),
            redirect: Vec::new(),
            messages: ActionMessages::default(),
            limit: 20,
            max_limit: 100,
            field: None,
            value: None,
            related_models: RelatedModels::default(),
        };

        let (verb, noun) = match kind {
            ActionKind::Add => ("create", "created"),
            ActionKind::Edit => ("update", "updated"),
            ActionKind::Delete => ("delete", "deleted"),
            _ => ("", ""),
        };
        if !verb.is_empty() {
            config.messages = ActionMessages {
                success: format!("Successfully {noun} {{name}}"),
                error: format!("Could not {verb} {{name}}"),
            };
        }

        match kind {
            ActionKind::Index => {
                config.api.success.code = Some(200);
                config.api.error.code = Some(400);
            }
            ActionKind::View => {}
            ActionKind::Add => {
                config.related_models = RelatedModels::All(true);
                config.api.methods = vec!["PUT".into(), "POST".into()];
                config.api.success.code = Some(201);
                config.api.success.data.entity = vec!["id".into()];
                config.redirect = vec![
                    RedirectRule::new("post_add", "request.data", "_add", "{base}"),
                    RedirectRule::new(
                        "post_edit",
                        "request.data",
                        "_edit",
                        "{base}/{entity.field:id}",
                    ),
                ];
            }
            ActionKind::Edit => {
                config.related_models = RelatedModels::All(true);
                config.api.methods = vec!["PUT".into(), "POST".into(), "PATCH".into()];
                config.api.success.code = Some(200);
                config.redirect = vec![
                    RedirectRule::new("post_add", "request.data", "_add", "{base}"),
                    RedirectRule::new(
                        "post_edit",
                        "request.data",
                        "_edit",
                        "{base}/{subject.key:id}",
                    ),
                ];
            }
            ActionKind::Delete => {
                config.api.success.code = Some(200);
                config.api.error.code = Some(400);
            }
            ActionKind::Lookup => {
                config.find_method.name = "list".to_string();
            }
            ActionKind::BulkDelete => {
                config.messages = bulk_messages(
                    "Delete completed successfully",
                    "Could not complete deletion",
                );
            }
            ActionKind::BulkToggle => {
                config.messages =
                    bulk_messages("Value toggled successfully", "Could not toggle value");
            }
            ActionKind::BulkSetValue => {
                config.messages = bulk_messages("Set value successfully", "Could not set value");
            }
        }

        config
    }

    /// Build from a configuration entry: either a kind string (`"index"`) or an
    /// object with a `kind` plus overrides merged over that kind's defaults.
    ///
    /// # Errors
    ///
    /// Returns `CrudError::InvalidConfig` for unknown kinds or mistyped overrides.
    pub fn from_entry(name: &str, entry: &Value) -> Result<Self, CrudError> {
        let kind_name = match entry {
            Value::String(kind) => kind.as_str(),
            Value::Object(map) => map
                .get("kind")
                .and_then(Value::as_str)
                .unwrap_or(name),
            _ => {
                return Err(CrudError::invalid_config(format!(
                    "Action {name} must be a kind name or an object"
                )));
            }
        };
        let kind: ActionKind = kind_name.parse()?;
        let defaults = Self::for_kind(name, kind);

        let Value::Object(_) = entry else {
            return Ok(defaults);
        };

        let mut merged = serde_json::to_value(&defaults)
            .map_err(|e| CrudError::invalid_config(format!("Action {name}: {e}")))?;
        merge_json(&mut merged, entry);
        if let Value::Object(map) = &mut merged {
            map.insert("kind".to_string(), json!(kind));
        }

        let mut config: Self = serde_json::from_value(merged)
            .map_err(|e| CrudError::invalid_config(format!("Action {name}: {e}")))?;
        config.name = name.to_string();
        config.methods = config.methods.iter().map(|m| m.to_ascii_uppercase()).collect();
        config.api.methods = config.api.methods.iter().map(|m| m.to_ascii_uppercase()).collect();
        Ok(config)
    }

    /// Fill in names that depend on the repository
    pub fn resolve_names(&mut self, singular: &str, plural: &str) {
        if self.resource_name.is_none() {
            self.resource_name = Some(singular.to_string());
        }
        if self.view_var.is_none() && self.kind.has_view_var() {
            let name = if self.kind.scope() == ActionScope::Entity {
                singular
            } else {
                plural
            };
            self.view_var = Some(name.to_string());
        }
    }

    #[must_use]
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.iter().any(|m| m == method.as_str())
    }

    /// Variable the action's result is published under
    #[must_use]
    pub fn data_var(&self) -> &str {
        self.view_var.as_deref().unwrap_or("data")
    }

    #[must_use]
    pub fn resource_name(&self) -> &str {
        self.resource_name.as_deref().unwrap_or_default()
    }

    /// API response settings for a successful or failed run
    #[must_use]
    pub fn api_response(&self, success: bool) -> &ApiResponse {
        if success {
            &self.api.success
        } else {
            &self.api.error
        }
    }
}

//! # Error Handling for the CRUD pipeline
//!
//! Every failure raised while an action runs ends up as a [`CrudError`]. Errors
//! propagate synchronously to the controller, which turns them into a response
//! with the right status code and a sanitized body:
//!
//! ```json
//! {
//!   "success": false,
//!   "data": { "code": 422, "url": "/blogs", "message": "...", "errorCount": 2, "errors": {...} }
//! }
//! ```
//!
//! ## Logging
//!
//! Internal errors (data layer failures, broken configuration) are logged with
//! `tracing::error!` and never sent to clients. User-facing errors are logged at
//! debug level. Nothing is printed unless the application installs a subscriber:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt()
//!     .with_target(false)
//!     .compact()
//!     .init();
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::collections::BTreeMap;
use std::fmt;

use crate::data::{DataError, Entity};
use crate::validation::FieldError;

/// Error type for everything that can go wrong while dispatching a CRUD action.
#[derive(Debug)]
pub enum CrudError {
    /// 422 (or the rule's own code) - the data layer rejected the entity
    Validation(ValidationError),

    /// 404 Not Found - record, page or resource doesn't exist
    NotFound {
        /// User-facing message
        message: String,
        /// Status code reported to the client
        code: u16,
    },

    /// 400 Bad Request - malformed input such as an invalid id
    BadRequest {
        /// User-facing message
        message: String,
        /// Status code reported to the client
        code: u16,
    },

    /// 404/405 - no enabled action for the verb/name combination
    UnmappedAction {
        /// Requested action name
        action: String,
        /// Requested HTTP verb
        method: String,
        /// Verbs the action accepts; empty when the action doesn't exist
        allowed: Vec<String>,
    },

    /// 500 - `should_process` was called with an unknown mode (programming error)
    InvalidMode {
        /// The rejected mode
        mode: String,
    },

    /// 500 - a redirect rule names a reader that doesn't exist
    InvalidReader {
        /// The rejected reader name
        reader: String,
    },

    /// 500 - configuration could not be parsed or merged
    InvalidConfig {
        /// Internal details (logged, not sent to user)
        message: String,
    },

    /// 500 - the data layer failed (details logged, not exposed)
    Data(DataError),
}

impl CrudError {
    /// Create a 404 Not Found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            code: 404,
        }
    }

    /// Create a 400 Bad Request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            code: 400,
        }
    }

    /// Create an error for a verb/action pair that can't be dispatched
    pub fn unmapped(
        action: impl Into<String>,
        method: impl Into<String>,
        allowed: Vec<String>,
    ) -> Self {
        Self::UnmappedAction {
            action: action.into(),
            method: method.into(),
            allowed,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(err) => err.status_code(),
            Self::NotFound { code, .. } => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::NOT_FOUND)
            }
            Self::BadRequest { code, .. } => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_REQUEST)
            }
            Self::UnmappedAction { allowed, .. } => {
                if allowed.is_empty() {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::METHOD_NOT_ALLOWED
                }
            }
            Self::InvalidMode { .. }
            | Self::InvalidReader { .. }
            | Self::InvalidConfig { .. }
            | Self::Data(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-facing error message (sanitized)
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => err.message().to_string(),
            Self::NotFound { message, .. } | Self::BadRequest { message, .. } => message.clone(),
            Self::UnmappedAction { allowed, .. } if !allowed.is_empty() => format!(
                "Method not allowed. This action permits only {}",
                allowed.join(", ")
            ),
            Self::UnmappedAction { .. } => "Not found".to_string(),
            Self::InvalidMode { .. }
            | Self::InvalidReader { .. }
            | Self::InvalidConfig { .. }
            | Self::Data(_) => "An internal error occurred".to_string(),
        }
    }

    /// Short name of the error kind, used in the debug exception block
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::NotFound { .. } => "NotFoundError",
            Self::BadRequest { .. } => "BadRequestError",
            Self::UnmappedAction { .. } => "UnmappedActionError",
            Self::InvalidMode { .. } => "InvalidModeError",
            Self::InvalidReader { .. } => "InvalidReaderError",
            Self::InvalidConfig { .. } => "InvalidConfigError",
            Self::Data(_) => "DataError",
        }
    }

    /// Log internal error details (not sent to user)
    pub(crate) fn log_internal(&self) {
        match self {
            Self::Data(err) => {
                tracing::error!(error = %err, "Data layer error occurred");
            }
            Self::InvalidMode { mode } => {
                tracing::error!(mode = %mode, "Invalid shouldProcess mode");
            }
            Self::InvalidReader { reader } => {
                tracing::error!(reader = %reader, "Invalid redirect reader");
            }
            Self::InvalidConfig { message } => {
                tracing::error!(details = %message, "Invalid CRUD configuration");
            }
            _ => {
                tracing::debug!(
                    error = %self.user_message(),
                    status = %self.status_code(),
                    "CRUD error"
                );
            }
        }
    }
}

impl fmt::Display for CrudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMode { mode } => write!(f, "Invalid mode: {mode}"),
            Self::InvalidReader { reader } => write!(f, "Invalid reader: {reader}"),
            Self::InvalidConfig { message } => write!(f, "Invalid configuration: {message}"),
            Self::Data(err) => write!(f, "{err}"),
            _ => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for CrudError {}

impl IntoResponse for CrudError {
    fn into_response(self) -> Response {
        crate::render::render_error(&self, "", false)
    }
}

impl From<DataError> for CrudError {
    fn from(err: DataError) -> Self {
        Self::Data(err)
    }
}

impl From<ValidationError> for CrudError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

/// Validation failures reported by the data layer for one entity.
///
/// With exactly one failing rule the message names it precisely
/// (`"Blogs.name : This field is required"`) and the rule's own status code, if it
/// declared one, replaces the default. Otherwise the message only carries the
/// count.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    errors: BTreeMap<String, Vec<FieldError>>,
    count: usize,
    message: String,
    code: u16,
}

impl ValidationError {
    /// Status code used when no rule declares its own
    pub const DEFAULT_CODE: u16 = 422;

    /// Build the error from the field errors a failed save left on `entity`
    #[must_use]
    pub fn from_entity(model: &str, entity: &Entity) -> Self {
        Self::new(model, entity.errors().clone(), Self::DEFAULT_CODE)
    }

    /// Build the error from a field → errors mapping
    #[must_use]
    pub fn new(model: &str, errors: BTreeMap<String, Vec<FieldError>>, code: u16) -> Self {
        let errors: BTreeMap<_, _> = errors
            .into_iter()
            .filter(|(_, field_errors)| !field_errors.is_empty())
            .collect();
        let count = errors.values().map(Vec::len).sum();

        let single = if count == 1 {
            errors
                .iter()
                .next()
                .and_then(|(field, field_errors)| field_errors.first().map(|err| (field, err)))
        } else {
            None
        };

        let (message, code) = match single {
            Some((field, err)) => (
                format!("{model}.{field} : {}", err.message),
                err.code.unwrap_or(code),
            ),
            None => (Self::count_message(count), code),
        };

        Self {
            errors,
            count,
            message,
            code,
        }
    }

    fn count_message(count: usize) -> String {
        if count == 1 {
            "A validation error occurred".to_string()
        } else {
            format!("{count} validation errors occurred")
        }
    }

    /// Field → errors mapping
    #[must_use]
    pub fn validation_errors(&self) -> &BTreeMap<String, Vec<FieldError>> {
        &self.errors
    }

    /// Total number of failed rules across all fields
    #[must_use]
    pub fn validation_error_count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Code reported to the client
    #[must_use]
    pub fn code(&self) -> u16 {
        self.code
    }

    /// HTTP status for the code, falling back to 422 for codes that aren't valid statuses
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.code)
            .ok()
            .filter(|status| status.is_client_error() || status.is_server_error())
            .unwrap_or(StatusCode::UNPROCESSABLE_ENTITY)
    }

    /// Errors as `{ field: { rule: message } }`, the shape sent to clients
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut fields = serde_json::Map::new();
        for (field, errors) in &self.errors {
            let rules: serde_json::Map<String, serde_json::Value> = errors
                .iter()
                .map(|err| (err.rule.clone(), serde_json::Value::String(err.message.clone())))
                .collect();
            fields.insert(field.clone(), serde_json::Value::Object(rules));
        }
        serde_json::Value::Object(fields)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

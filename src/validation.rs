//! Validation Support
//!
//! Field rules a [`Repository`](crate::Repository) evaluates when saving an
//! entity. A failed rule leaves a [`FieldError`] on the entity. The action then
//! turns those errors into a [`ValidationError`](crate::ValidationError).
//!
//! # Example
//!
//! ```rust,ignore
//! use crudflow::{MemoryRepository, ValidationRule};
//!
//! let blogs = MemoryRepository::new("Blogs", "blog", "blogs")
//!     .with_rule("name", ValidationRule::required())
//!     .with_rule("name", ValidationRule::length(Some(3), Some(80)))
//!     .with_rule(
//!         "slug",
//!         ValidationRule::custom("unique", |_| true).message("Slug is taken").code(409),
//!     );
//! ```

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// One failed rule on one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    /// Name of the rule that failed
    pub rule: String,
    /// Human-readable error message
    pub message: String,
    /// Status code the rule wants reported when it's the only failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl FieldError {
    #[must_use]
    pub fn new(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule, self.message)
    }
}

type CustomCheck = Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

#[derive(Clone)]
enum RuleCheck {
    Required,
    Length { min: Option<usize>, max: Option<usize> },
    Range { min: Option<f64>, max: Option<f64> },
    Email,
    Custom(CustomCheck),
}

/// A named check on one field, with an optional message and status code override
#[derive(Clone)]
pub struct ValidationRule {
    name: String,
    message: Option<String>,
    code: Option<u16>,
    check: RuleCheck,
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("name", &self.name)
            .field("message", &self.message)
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

impl ValidationRule {
    fn with_check(name: &str, check: RuleCheck) -> Self {
        Self {
            name: name.to_string(),
            message: None,
            code: None,
            check,
        }
    }

    /// Field must be present, non-null and not blank
    #[must_use]
    pub fn required() -> Self {
        Self::with_check("required", RuleCheck::Required)
    }

    /// String length must fall within the range
    #[must_use]
    pub fn length(min: Option<usize>, max: Option<usize>) -> Self {
        Self::with_check("length", RuleCheck::Length { min, max })
    }

    /// Number must fall within the range
    #[must_use]
    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        Self::with_check("range", RuleCheck::Range { min, max })
    }

    #[must_use]
    pub fn email() -> Self {
        Self::with_check("email", RuleCheck::Email)
    }

    /// Arbitrary check; receives `None` when the field is absent
    #[must_use]
    pub fn custom<F>(name: &str, check: F) -> Self
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        Self::with_check(name, RuleCheck::Custom(Arc::new(check)))
    }

    /// Replace the default message
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Status code reported when this is the only failing rule
    #[must_use]
    pub fn code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the rule against a field value.
    ///
    /// Only `required` and custom rules look at absent or null values, so an
    /// optional field is validated only when it's supplied.
    ///
    /// # Errors
    ///
    /// Returns the `FieldError` describing the failure.
    pub fn check(&self, value: Option<&Value>) -> Result<(), FieldError> {
        let present = value.filter(|v| !v.is_null());
        let outcome = match (&self.check, present) {
            (RuleCheck::Required, _) => validators::validate_required(present),
            (RuleCheck::Custom(check), _) => {
                if check(value) {
                    Ok(())
                } else {
                    Err("The provided value is invalid".to_string())
                }
            }
            (_, None) => Ok(()),
            (RuleCheck::Length { min, max }, Some(v)) => {
                validators::validate_length(&display_value(v), *min, *max)
            }
            (RuleCheck::Range { min, max }, Some(v)) => match v.as_f64() {
                Some(number) => validators::validate_range(number, *min, *max),
                None => Err("Must be a number".to_string()),
            },
            (RuleCheck::Email, Some(v)) => validators::validate_email(&display_value(v)),
        };

        outcome.map_err(|default_message| {
            let error = FieldError::new(
                self.name.clone(),
                self.message.clone().unwrap_or(default_message),
            );
            match self.code {
                Some(code) => error.with_code(code),
                None => error,
            }
        })
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Helper validators for common patterns
pub mod validators {
    use serde_json::Value;
    use std::fmt;

    /// Validate string length is within range
    ///
    /// # Errors
    ///
    /// Returns the failure message.
    pub fn validate_length(
        value: &str,
        min: Option<usize>,
        max: Option<usize>,
    ) -> Result<(), String> {
        let len = value.chars().count();

        if let Some(min_len) = min {
            if len < min_len {
                return Err(format!("Must be at least {min_len} characters"));
            }
        }

        if let Some(max_len) = max {
            if len > max_len {
                return Err(format!("Must be at most {max_len} characters"));
            }
        }

        Ok(())
    }

    /// Validate number is within range
    ///
    /// # Errors
    ///
    /// Returns the failure message.
    pub fn validate_range<T: PartialOrd + fmt::Display>(
        value: T,
        min: Option<T>,
        max: Option<T>,
    ) -> Result<(), String> {
        if let Some(min_val) = min {
            if value < min_val {
                return Err(format!("Must be at least {min_val}"));
            }
        }

        if let Some(max_val) = max {
            if value > max_val {
                return Err(format!("Must be at most {max_val}"));
            }
        }

        Ok(())
    }

    /// Basic email validation
    ///
    /// # Errors
    ///
    /// Returns the failure message.
    pub fn validate_email(value: &str) -> Result<(), String> {
        if !value.contains('@') || !value.contains('.') {
            return Err("Invalid email format".to_string());
        }

        if value.len() > 255 {
            return Err("Email must be at most 255 characters".to_string());
        }

        Ok(())
    }

    /// Validate value is present and not blank
    ///
    /// # Errors
    ///
    /// Returns the failure message.
    pub fn validate_required(value: Option<&Value>) -> Result<(), String> {
        match value {
            None | Some(Value::Null) => Err("This field is required".to_string()),
            Some(Value::String(s)) if s.trim().is_empty() => {
                Err("This field is required".to_string())
            }
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_rule() {
        let rule = ValidationRule::required();
        assert!(rule.check(None).is_err());
        assert!(rule.check(Some(&json!(null))).is_err());
        assert!(rule.check(Some(&json!("   "))).is_err());
        assert!(rule.check(Some(&json!("John"))).is_ok());

        let err = rule.check(None).unwrap_err();
        assert_eq!(err.rule, "required");
        assert_eq!(err.message, "This field is required");
        assert_eq!(err.code, None);
    }

    #[test]
    fn test_length_rule_skips_absent_values() {
        let rule = ValidationRule::length(Some(3), Some(5));
        assert!(rule.check(None).is_ok());
        assert!(rule.check(Some(&json!("ab"))).is_err());
        assert!(rule.check(Some(&json!("abcdef"))).is_err());
        assert!(rule.check(Some(&json!("abc"))).is_ok());
    }

    #[test]
    fn test_range_rule() {
        let rule = ValidationRule::range(Some(0.0), Some(120.0));
        assert!(rule.check(Some(&json!(-1))).is_err());
        assert!(rule.check(Some(&json!(150))).is_err());
        assert!(rule.check(Some(&json!(25))).is_ok());
        assert_eq!(
            rule.check(Some(&json!("old"))).unwrap_err().message,
            "Must be a number"
        );
    }

    #[test]
    fn test_email_rule() {
        let rule = ValidationRule::email();
        assert!(rule.check(Some(&json!("invalid"))).is_err());
        assert!(rule.check(Some(&json!("test@example.com"))).is_ok());
    }

    #[test]
    fn test_custom_rule_with_message_and_code() {
        let rule = ValidationRule::custom("unique", |value| value != Some(&json!("taken")))
            .message("Slug is taken")
            .code(409);
        let err = rule.check(Some(&json!("taken"))).unwrap_err();
        assert_eq!(err, FieldError::new("unique", "Slug is taken").with_code(409));
        assert!(rule.check(Some(&json!("free"))).is_ok());
    }

    #[test]
    fn test_validators_work_on_values_alone() {
        assert!(validators::validate_length("abc", Some(3), None).is_ok());
        assert_eq!(
            validators::validate_length("ab", Some(3), None).unwrap_err(),
            "Must be at least 3 characters"
        );
        assert!(validators::validate_range(5, Some(1), Some(10)).is_ok());
        assert!(validators::validate_email("a@b.io").is_ok());
        assert!(validators::validate_required(Some(&json!(""))).is_err());
    }
}

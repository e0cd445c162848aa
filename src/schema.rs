//! Entity schemas: field rules, record parsing and form validation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::ValidationError;
use crate::types::Resource;

/// Working draft of an entity's attributes (field → raw value).
pub type Form = BTreeMap<String, Value>;

/// Field → error message.
pub type Errors = BTreeMap<String, String>;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text { max_len: usize },
    /// ISO calendar date, `YYYY-MM-DD`.
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    /// Wire / form key (camelCase).
    pub name: &'static str,
    pub required: bool,
    pub kind: FieldKind,
}

impl FieldRule {
    pub const fn text(name: &'static str, required: bool, max_len: usize) -> Self {
        Self {
            name,
            required,
            kind: FieldKind::Text { max_len },
        }
    }

    pub const fn date(name: &'static str, required: bool) -> Self {
        Self {
            name,
            required,
            kind: FieldKind::Date,
        }
    }

    /// Check a single value; `None` means the key is absent.
    pub fn check(&self, value: Option<&Value>) -> Option<String> {
        let text = match value {
            None | Some(Value::Null) => "",
            Some(Value::String(s)) => s.as_str(),
            Some(_) => return Some("must be text".into()),
        };

        if text.trim().is_empty() {
            return self.required.then(|| "is required".to_string());
        }

        match self.kind {
            FieldKind::Text { max_len } if text.chars().count() > max_len => {
                Some(format!("must be at most {} characters", max_len))
            }
            FieldKind::Date if NaiveDate::parse_from_str(text, DATE_FORMAT).is_err() => {
                Some("must be a date (YYYY-MM-DD)".into())
            }
            _ => None,
        }
    }
}

fn rule_for<R: Resource>(field: &str) -> Option<&'static FieldRule> {
    R::FIELDS.iter().find(|rule| rule.name == field)
}

/// Validate one field of `form`, or the whole form when `field` is `""`.
pub fn validate_field<R: Resource>(form: &Form, field: &str) -> Result<(), ValidationError> {
    if field.is_empty() {
        return validate_form::<R>(form);
    }
    let Some(rule) = rule_for::<R>(field) else {
        return Err(ValidationError::field(field, "is not a known field"));
    };
    match rule.check(form.get(field)) {
        Some(message) => Err(ValidationError::field(field, message)),
        None => Ok(()),
    }
}

pub fn validate_form<R: Resource>(form: &Form) -> Result<(), ValidationError> {
    let errors: Errors = R::FIELDS
        .iter()
        .filter_map(|rule| {
            rule.check(form.get(rule.name))
                .map(|message| (rule.name.to_string(), message))
        })
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(errors))
    }
}

/// Parse a raw wire record into a validated entity.
pub fn parse_as<R: Resource>(raw: Value) -> Result<R, ValidationError> {
    let Value::Object(map) = &raw else {
        return Err(ValidationError::field("", "record is not an object"));
    };
    match map.get("id") {
        Some(Value::String(id)) if !id.is_empty() => {}
        _ => return Err(ValidationError::field("id", "is required")),
    }

    let form: Form = map
        .iter()
        .filter(|(k, _)| k.as_str() != "id")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    validate_form::<R>(&form)?;

    serde_json::from_value(raw).map_err(|e| ValidationError::field("", e.to_string()))
}

/// Shallow copy of an entity's attributes, ready for editing.
///
/// Every schema field is present; absent optional values become `""`.
pub fn to_form<R: Resource>(entity: &R) -> Form {
    let record = serde_json::to_value(entity).unwrap_or(Value::Null);
    R::FIELDS
        .iter()
        .map(|rule| {
            let value = match record.get(rule.name) {
                None | Some(Value::Null) => Value::String(String::new()),
                Some(v) => v.clone(),
            };
            (rule.name.to_string(), value)
        })
        .collect()
}

/// Blank draft for the add form.
pub fn empty_form<R: Resource>() -> Form {
    R::FIELDS
        .iter()
        .map(|rule| (rule.name.to_string(), Value::String(String::new())))
        .collect()
}

/// Wire body for a form: blank optional fields are sent as `null`,
/// unknown keys are dropped.
pub fn form_to_attributes<R: Resource>(form: &Form) -> serde_json::Map<String, Value> {
    R::FIELDS
        .iter()
        .map(|rule| {
            let value = match form.get(rule.name) {
                None => Value::Null,
                Some(Value::String(s)) if s.trim().is_empty() && !rule.required => Value::Null,
                Some(v) => v.clone(),
            };
            (rule.name.to_string(), value)
        })
        .collect()
}

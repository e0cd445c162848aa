//! Error taxonomy for the admin store.
//!
//! | Error              | Raised by                          | Handling                          |
//! |--------------------|------------------------------------|-----------------------------------|
//! | `ValidationError`  | record parse, form validation      | recovered into field error state  |
//! | `TransportError`   | transport rejection                | propagated, surfaced as alert     |
//! | `ConsistencyError` | `full_load` projection             | logged, treated as corrupt state  |
//! | `HttpError`        | non-2xx response                   | logged, surfaced as alert         |

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::protocol::Method;

/// One or more fields failed validation.
///
/// The empty key `""` holds record-level failures (wrong JSON shape).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    pub errors: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn new(errors: BTreeMap<String, String>) -> Self {
        Self { errors }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.into(), message.into());
        Self { errors }
    }

    /// Message for `field`, if it failed.
    pub fn message(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.errors {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            if field.is_empty() {
                write!(f, "{}", message)?;
            } else {
                write!(f, "{}: {}", field, message)?;
            }
        }
        Ok(())
    }
}

/// The transport rejected the request (connection refused, timeout, …).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("network error on {method} {url}: {reason}")]
pub struct TransportError {
    pub method: Method,
    pub url: String,
    pub reason: String,
}

/// More ids are loaded than the server reported in total.
///
/// Indicates broken offset bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid total {total}: {loaded} ids loaded")]
pub struct ConsistencyError {
    pub loaded: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{method} {url} returned HTTP {status}")]
pub struct HttpError {
    pub method: Method,
    pub url: String,
    pub status: u16,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Network(#[from] TransportError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Submit attempted while the form still carries field errors.
    #[error("submit blocked: form has {0} field error(s)")]
    SubmitBlocked(usize),

    /// An item action ran with no item selected.
    #[error("no item selected")]
    NoSelection,
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_lists_fields() {
        let mut errors = BTreeMap::new();
        errors.insert("name".to_string(), "is required".to_string());
        errors.insert("".to_string(), "bad shape".to_string());
        let err = ValidationError::new(errors);
        assert_eq!(err.to_string(), "bad shape; name: is required");
        assert_eq!(err.message("name"), Some("is required"));
    }

    #[test]
    fn consistency_display() {
        let err = ConsistencyError { loaded: 3, total: 2 };
        assert_eq!(err.to_string(), "invalid total 2: 3 ids loaded");
    }
}

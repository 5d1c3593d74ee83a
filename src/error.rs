use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::Serialize;
use warp::http::StatusCode;

pub use crate::database::error::{CacheError, QueryError};

/// Field-scoped validation failures, rendered as `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), Error> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(" ")))
            .collect();
        write!(f, "{}", fields.join("; "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("{0}")]
    DuplicateRelation(String),
    #[error("You cannot subscribe to yourself")]
    SelfReference,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    RelationNotFound(String),
    #[error("{0}")]
    ResourceExhausted(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("query error: {0}")]
    Query(#[from] QueryError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_)
            | Error::DuplicateRelation(_)
            | Error::SelfReference
            | Error::RelationNotFound(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::ResourceExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Storage(_) | Error::Query(_) | Error::Cache(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn not_found(entity: &str) -> Self {
        Error::NotFound(format!("{entity} not found"))
    }
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        Error::Query(QueryError::from(value))
    }
}

impl From<redis::RedisError> for Error {
    fn from(value: redis::RedisError) -> Self {
        Error::Cache(CacheError::from(value))
    }
}

impl warp::reject::Reject for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_group_messages_per_field() {
        let mut errors = ValidationErrors::new();
        errors.add("tags", "first");
        errors.add("tags", "second");
        errors.add("name", "blank");

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": ["blank"], "tags": ["first", "second"]})
        );
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn statuses_follow_the_http_contract() {
        assert_eq!(Error::SelfReference.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::RelationNotFound("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::not_found("Recipe").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::ResourceExhausted("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

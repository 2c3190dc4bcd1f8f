use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use potion::Error;
use serde::Serialize;
use serde_json::{json, Value};
use warp::reject::Rejection;

/// Storage fault that the caller can't do anything about.
#[derive(Debug, thiserror::Error)]
#[error("{info}")]
pub struct QueryError {
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => Self::new(String::from("RowNotFound")),
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(String::from("Worker crashed")),
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("Column not found: {e}")),
            sqlx::Error::Migrate(e) => Self::new(format!("Migration failed: {e}")),
            e => Self::new(format!("{e}")),
        }
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        Error {
            code: 500,
            info: Some(value.info),
            redirect: None,
        }
    }
}

/// Validation messages keyed by the offending field.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ServiceError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(self))
        }
    }
}

impl Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(FieldErrors),
    /// A storage constraint fired although the application check passed.
    #[error("{0}")]
    IntegrityViolation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Database(#[from] QueryError),
}

impl ServiceError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    pub fn status(&self) -> u16 {
        match self {
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 400,
            ServiceError::Validation(_) => 400,
            ServiceError::IntegrityViolation(_) => 400,
            ServiceError::Forbidden(_) => 403,
            ServiceError::Database(_) => 500,
        }
    }

    /// JSON body for the HTTP layer.
    pub fn body(&self) -> Value {
        match self {
            ServiceError::Validation(errors) => json!(errors),
            ServiceError::Database(_) => json!({ "error": "Internal server error" }),
            e => json!({ "error": e.to_string() }),
        }
    }

    /// Reports a fired storage constraint with a caller-facing message instead.
    pub fn integrity_as_conflict(self, message: &str) -> Self {
        match self {
            ServiceError::IntegrityViolation(info) => {
                log::warn!("Constraint fired behind application check: {info}");
                ServiceError::Conflict(message.to_owned())
            }
            e => e,
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(ref e)
                if e.is_unique_violation()
                    || e.is_foreign_key_violation()
                    || e.is_check_violation() =>
            {
                log::debug!("Integrity violation: {}", e.message());
                ServiceError::IntegrityViolation(e.message().to_owned())
            }
            e => ServiceError::Database(QueryError::from(e)),
        }
    }
}

impl From<ServiceError> for Error {
    fn from(value: ServiceError) -> Self {
        Error {
            code: value.status().into(),
            info: Some(value.to_string()),
            redirect: None,
        }
    }
}

impl From<ServiceError> for Rejection {
    fn from(value: ServiceError) -> Self {
        let error: Error = value.into();
        error.into()
    }
}

//! Core error types shared by all repositories.

use thiserror::Error;

/// Errors surfaced by the domiciliation core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// One or more fields failed validation. All failures for the
    /// attempted operation are collected before the error is returned.
    #[error("validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    /// A unique field collided with an existing row.
    #[error("duplicate {entity}: {field} '{value}' already exists")]
    Duplicate {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    /// Deletion refused because dependent records exist.
    #[error("cannot delete {entity} {id}: {dependents}")]
    DependencyBlocked {
        entity: &'static str,
        id: i64,
        dependents: String,
    },

    /// The addressed entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A record field could not be coerced to its expected type.
    #[error("invalid {field}: {reason}")]
    Coercion { field: &'static str, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CoreError {
    pub fn validation(errors: Vec<String>) -> Self {
        Self::Validation { errors }
    }

    pub fn single_validation(message: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![message.into()],
        }
    }

    pub fn duplicate(entity: &'static str, field: &'static str, value: impl Into<String>) -> Self {
        Self::Duplicate {
            entity,
            field,
            value: value.into(),
        }
    }

    pub fn dependency_blocked(
        entity: &'static str,
        id: i64,
        dependents: impl Into<String>,
    ) -> Self {
        Self::DependencyBlocked {
            entity,
            id,
            dependents: dependents.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn coercion(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Coercion {
            field,
            reason: reason.into(),
        }
    }

    /// True when the error is a client-side input problem rather than
    /// a storage failure.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::Duplicate { .. } | Self::Coercion { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

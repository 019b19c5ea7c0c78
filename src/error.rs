//! Error taxonomy shared by every backend and workflow.
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected a read or write.
    #[error("persistence error: {0}")]
    Persistence(String),
    /// A required field is missing or malformed.
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("authentication error: {0}")]
    Auth(String),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        error!(?err, "database error");
        StoreError::Persistence(format!("database error: {}", err))
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Persistence(format!("migration failed: {}", err))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        error!(?err, "backend transport error");
        StoreError::Persistence(format!("failed to reach backend: {}", err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Persistence(format!("invalid backend payload: {}", err))
    }
}

impl From<uuid::Error> for StoreError {
    fn from(err: uuid::Error) -> Self {
        StoreError::Persistence(format!("invalid identifier: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_entity() {
        let err = StoreError::not_found("product", "p1");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "product p1 not found");
    }
}

use domain::error::DispatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Unique(#[from] UniqueViolation),

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error(transparent)]
    Other(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
#[error("unique violation on {constraint}")]
pub struct UniqueViolation {
    pub constraint: String,
}

/// Maps a raw `sqlx::Error` from a guarded insert/update into a
/// distinguishable unique-violation result instead of letting a SQL error
/// string leak to callers ("unique constraints as concurrency
/// primitives"). Callers pass the constraint names they expect to see so the
/// same database error can be attributed correctly regardless of backend
/// error-message phrasing.
pub fn classify_sql_error(err: sqlx::Error, known_constraints: &[&str]) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        let message = db_err.message();
        for constraint in known_constraints {
            if message.contains(constraint) {
                return StoreError::Unique(UniqueViolation {
                    constraint: constraint.to_string(),
                });
            }
        }
        if db_err.is_unique_violation() {
            return StoreError::Unique(UniqueViolation {
                constraint: "unknown".to_string(),
            });
        }
    }
    StoreError::Other(err)
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => DispatchError::NotFound(what),
            StoreError::Unique(UniqueViolation { constraint }) => {
                DispatchError::UniqueViolation { constraint }
            }
            StoreError::Transient(reason) => DispatchError::TransientStore(reason),
            StoreError::Other(e) => DispatchError::TransientStore(e.to_string()),
        }
    }
}

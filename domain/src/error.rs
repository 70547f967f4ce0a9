use thiserror::Error;

/// The closed error taxonomy every component boundary converts into. Mirrors
/// this codebase's `AppError` shape, generalized to the kinds distinguished
/// across the dispatch core rather than one crate's reservation/commit pair.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("state changed: {0}")]
    StateChanged(String),

    #[error("unique violation on {constraint}")]
    UniqueViolation { constraint: String },

    #[error("transient store error: {0}")]
    TransientStore(String),

    #[error("external effect failed (best-effort, non-fatal): {0}")]
    ExternalBestEffort(String),

    #[error("policy rejection: {0}")]
    PolicyRejection(String),
}

/// The two load-bearing unique constraints, used as first-class control
/// flow rather than exceptional failures.
pub mod constraints {
    pub const OPEN_BID_WINDOW_PER_ASSIGNMENT: &str = "uq_bid_windows_open_assignment";
    pub const ACTIVE_ASSIGNMENT_PER_USER_DATE: &str = "uq_assignments_active_user_date";
}

/// The small stable tag set a caller needs, reduced from the full error.
/// Never leaks a SQL error string or a Display of an internal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Forbidden,
    StateChanged,
    UniqueViolation,
    TransientStore,
    ExternalBestEffort,
    PolicyRejection,
}

pub fn classify(err: &DispatchError) -> ErrorClass {
    match err {
        DispatchError::NotFound(_) => ErrorClass::NotFound,
        DispatchError::Forbidden(_) => ErrorClass::Forbidden,
        DispatchError::StateChanged(_) => ErrorClass::StateChanged,
        DispatchError::UniqueViolation { .. } => ErrorClass::UniqueViolation,
        DispatchError::TransientStore(_) => ErrorClass::TransientStore,
        DispatchError::ExternalBestEffort(_) => ErrorClass::ExternalBestEffort,
        DispatchError::PolicyRejection(_) => ErrorClass::PolicyRejection,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_unique_violation() {
        let err = DispatchError::UniqueViolation {
            constraint: constraints::ACTIVE_ASSIGNMENT_PER_USER_DATE.to_string(),
        };
        assert_eq!(classify(&err), ErrorClass::UniqueViolation);
    }
}

/// The query-time error taxonomy: unlike [`registry_model::ModelError`],
/// every variant here maps to a single request and never invalidates the
/// catalog as a whole.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("not found: {detail}")]
    NotFound { detail: String },
    #[error("request cancelled")]
    Cancelled,
    #[error("internal error: {detail}")]
    Internal { detail: String },
}

impl QueryError {
    pub fn not_found(detail: impl Into<String>) -> QueryError {
        QueryError::NotFound {
            detail: detail.into(),
        }
    }
}

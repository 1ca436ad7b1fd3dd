use sea_orm::error::DbErr;
use serde::Serialize;
use uuid::Uuid;

/// Engine-wide error type.
///
/// Variants map onto the failure taxonomy the services rely on: referential
/// failures (`NotFound`) are hard errors, while data insufficiency is not an
/// error at all and is represented as `Ok(None)` by the callers concerned.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum EngineError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Solver error: {0}")]
    SolverError(String),

    #[error("Surrogate model error: {0}")]
    SurrogateError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Serialization error: {0}")]
    SerializationError(
        #[from]
        #[serde(skip)]
        serde_json::Error,
    ),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(err: validator::ValidationErrors) -> Self {
        EngineError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl EngineError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        EngineError::DatabaseError(error.into_db_err())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        EngineError::InvalidOperation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::InternalError(msg.into())
    }

    /// True when retrying the same call cannot succeed without an upstream fix.
    ///
    /// The coordinator uses this to distinguish contract breaches from
    /// transient database trouble when reporting a failed phase.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::ValidationError(_) | Self::InvalidOperation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_error_normalizes_strings() {
        let err = EngineError::db_error("constraint violated");
        assert!(matches!(err, EngineError::DatabaseError(DbErr::Custom(_))));
        assert!(err.to_string().contains("constraint violated"));
    }

    #[test]
    fn not_found_is_contract_violation() {
        assert!(EngineError::not_found("product 42").is_contract_violation());
        assert!(!EngineError::SolverError("infeasible".into()).is_contract_violation());
    }

    #[test]
    fn validation_errors_convert() {
        use validator::Validate;

        #[derive(Validate)]
        struct Probe {
            #[validate(range(min = 1))]
            qty: i32,
        }

        let err: EngineError = Probe { qty: 0 }.validate().unwrap_err().into();
        assert!(matches!(err, EngineError::ValidationError(_)));
    }
}

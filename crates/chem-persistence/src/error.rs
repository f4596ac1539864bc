//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a variantes semánticas y, hacia el core,
//! a `RepositoryError`.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

use chem_core::RepositoryError;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("configuration: {0}")]
    Config(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::InvalidData(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::RollbackErrorOnCommit { rollback_error, commit_error } => {
                Self::Unknown(format!("rollback={rollback_error}; commit={commit_error}"))
            }
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<PersistenceError> for RepositoryError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Repository(inner) => inner,
            PersistenceError::NotFound => RepositoryError::NotFound("row".into()),
            PersistenceError::UniqueViolation(m) | PersistenceError::CheckViolation(m) | PersistenceError::ForeignKeyViolation(m) => {
                RepositoryError::Conflict(m)
            }
            PersistenceError::SerializationConflict => RepositoryError::Serialization("could not serialize access".into()),
            PersistenceError::TransientIo(m) | PersistenceError::Config(m) => RepositoryError::Unavailable(m),
            other => RepositoryError::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_repository_errors() {
        assert!(matches!(RepositoryError::from(PersistenceError::SerializationConflict), RepositoryError::Serialization(_)));
        assert_eq!(RepositoryError::from(PersistenceError::TransientIo("pool".into())), RepositoryError::Unavailable("pool".into()));
        let inner = RepositoryError::NotFound("substance 9".into());
        assert_eq!(RepositoryError::from(PersistenceError::Repository(inner.clone())), inner);
        assert!(matches!(RepositoryError::from(PersistenceError::from(DieselError::NotFound)), RepositoryError::NotFound(_)));
    }
}

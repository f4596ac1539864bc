use thiserror::Error;

use chem_domain::DomainError;

/// Fallos de construcción de documento y de grafo molecular. Ninguno produce
/// un documento parcial.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("value '{value}' for '{label}' is not a valid {datatype}")]
    TypeMismatch { label: String, value: String, datatype: &'static str },
    #[error("unknown element symbol '{0}'")]
    UnknownElement(String),
    #[error("bond {index}: {details}")]
    InvalidBond { index: usize, details: String },
    #[error("template does not fit document: {0}")]
    Template(String),
    #[error("unresolved placeholder left at {0}")]
    UnresolvedPlaceholder(String),
    #[error("element reference lookup failed: {0}")]
    Reference(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<serde_json::Error> for DocumentError {
    fn from(e: serde_json::Error) -> Self {
        DocumentError::Domain(DomainError::from(e))
    }
}

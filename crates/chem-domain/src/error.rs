use thiserror::Error;

/// Errores del modelo de dominio (validación de plantillas, tablas de
/// conexión y tabla de elementos).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("{0}")]
    ValidationError(String),
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
    #[error("failed to parse molfile: {details} (at line ~{line})")]
    Molfile { line: usize, details: String },
    #[error("element table: {0}")]
    ElementTable(String),
    #[error("serialization: {0}")]
    SerializationError(String),
}

impl DomainError {
    pub fn molfile(line: usize, details: impl Into<String>) -> Self {
        Self::Molfile { line, details: details.into() }
    }
}

// Conversión desde serde_json::Error a DomainError
impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::SerializationError(e.to_string())
    }
}

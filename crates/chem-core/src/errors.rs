//! Errores del core: taxonomía de fallos de resolución.
//!
//! Los fallos por proveedor (`ProviderError`) nunca llegan aquí: se registran
//! como `SourceReport` y la agregación continúa.

use thiserror::Error;

use chem_domain::DomainError;

/// Errores del colaborador de persistencia.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum RepositoryError {
    #[error("not found: {0}")] NotFound(String),
    #[error("conflict: {0}")] Conflict(String),
    /// Conflicto de serialización transaccional; el llamador puede repetir la unidad.
    #[error("serialization conflict: {0}")] Serialization(String),
    #[error("storage unavailable: {0}")] Unavailable(String),
    #[error("storage backend: {0}")] Backend(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// No se pudo obtener una clave canónica para el identificador.
    #[error("normalization failed for '{identifier}': {reason}")] NormalizationFailure { identifier: String, reason: String },
    /// Faltan campos requeridos tras la agregación; no se persiste nada.
    #[error("resolution failed for '{key}': {reason}")] ResolutionFailed { key: String, reason: String },
    #[error("configuration: {0}")] Configuration(String),
    #[error(transparent)] Repository(#[from] RepositoryError),
    #[error(transparent)] Domain(#[from] DomainError),
}

impl CoreError {
    pub fn resolution(key: &str, reason: impl Into<String>) -> Self {
        CoreError::ResolutionFailed { key: key.to_string(), reason: reason.into() }
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use chem_core::{CoreError, ProviderError, RepositoryError, ResolutionStatus};
use chem_scidata::DocumentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Resolution,
    Normalization,
    Document,
    Storage,
    Configuration,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("no structure available for '{key}': {source}")]
    Structure { key: String, source: ProviderError },
    #[error("document sink: {0}")]
    Sink(String),
    #[error("configuration: {0}")]
    Configuration(String),
}

impl From<RepositoryError> for IngestError {
    fn from(err: RepositoryError) -> Self {
        IngestError::Core(CoreError::Repository(err))
    }
}

impl IngestError {
    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::Core(CoreError::NormalizationFailure { .. }) => FailureKind::Normalization,
            IngestError::Core(CoreError::ResolutionFailed { .. }) | IngestError::Core(CoreError::Domain(_)) => FailureKind::Resolution,
            IngestError::Core(CoreError::Repository(_)) | IngestError::Sink(_) => FailureKind::Storage,
            IngestError::Core(CoreError::Configuration(_)) | IngestError::Configuration(_) => FailureKind::Configuration,
            IngestError::Document(_) | IngestError::Structure { .. } => FailureKind::Document,
        }
    }

    /// Texto accionable para el usuario final.
    pub fn user_message(&self) -> String {
        match self.kind() {
            FailureKind::Normalization => format!("The identifier could not be translated to an InChIKey ({self})."),
            FailureKind::Resolution => format!("The substance could not be resolved; the primary source lacks required data ({self})."),
            FailureKind::Document => format!("The substance was resolved but its document could not be built ({self})."),
            FailureKind::Storage => format!("The substance store is unavailable or rejected the write ({self})."),
            FailureKind::Configuration => format!("SciFlow is misconfigured ({self})."),
        }
    }
}

/// Resultado sin error de una ingesta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Existing,
    Created,
}

impl IngestStatus {
    pub fn user_message(&self) -> &'static str {
        match self {
            IngestStatus::Existing => "Substance already existed; no sources were queried.",
            IngestStatus::Created => "Substance created from aggregated sources.",
        }
    }
}

impl From<ResolutionStatus> for IngestStatus {
    fn from(status: ResolutionStatus) -> Self {
        match status {
            ResolutionStatus::Existing => IngestStatus::Existing,
            ResolutionStatus::Created => IngestStatus::Created,
        }
    }
}

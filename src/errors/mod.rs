//! Errores de la capa de aplicación.
//!
//! `IngestError` agrupa los fallos de todas las etapas; `FailureKind` los
//! clasifica para elegir el mensaje al usuario. "Ya existía" no es un error:
//! se informa con `IngestStatus`.
pub mod ingest_error;

pub use ingest_error::{FailureKind, IngestError, IngestStatus};

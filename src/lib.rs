//! SciFlow Rust Library
//!
//! Orquestación de alto nivel sobre los crates `chem-*`:
//! - `config`: `AppConfig` desde variables de entorno (.env).
//! - `errors`: `IngestError` y su clasificación para mensajes al usuario.
//! - `pipeline`: `CompoundPipeline` (resolver -> documento -> grafo molecular).
//!
//! Puede usarse desde `chem-cli` o por otros crates/clientes.

pub mod config;
pub mod errors;
pub mod pipeline;

pub use config::AppConfig;
pub use errors::{FailureKind, IngestError, IngestStatus};
pub use pipeline::{CompoundPipeline, DocumentSink, FileSink, IngestReport};

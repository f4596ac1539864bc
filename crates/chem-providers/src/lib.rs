//! chem-providers: proveedores sin red respaldados por un directorio de
//! fixtures.
//!
//! Estructura esperada:
//!
//! ```text
//! <dir>/synonyms.json          {"ethanol": "LFQSCWFLJHTTHZ-UHFFFAOYSA-N", ...}
//! <dir>/molfiles/<key>.mol     tabla de conexiones V2000
//! <dir>/<fuente>/<key>.json    ProviderFragment de cada fuente
//! ```

pub mod fixture;
pub mod normalizer;
pub mod structure;

pub use fixture::{discover_providers, FixtureProvider};
pub use normalizer::FixtureNormalizer;
pub use structure::FixtureStructureSource;

use chem_core::ProviderError;
use std::io;
use std::path::Path;

/// Nombre del archivo de sinónimos en la raíz de fixtures.
pub const SYNONYMS_FILE: &str = "synonyms.json";
/// Subdirectorio de molfiles; no es una fuente de metadatos.
pub const MOLFILE_DIR: &str = "molfiles";

/// Lee un archivo de fixtures; un archivo ausente es `NotFound(key)`.
pub(crate) async fn read_fixture(path: &Path, key: &str) -> Result<String, ProviderError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(raw),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ProviderError::NotFound(key.to_string())),
        Err(e) => Err(ProviderError::Transport(format!("{}: {e}", path.display()))),
    }
}

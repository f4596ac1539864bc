//! Proveedor de metadatos leído de `<dir>/<fuente>/<key>.json`.
use async_trait::async_trait;
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chem_core::{ProviderError, ProviderFragment, SubstanceProvider};

use crate::{read_fixture, MOLFILE_DIR};

#[derive(Debug, Clone)]
pub struct FixtureProvider {
    name: String,
    description: String,
    dir: PathBuf,
}

impl FixtureProvider {
    pub fn new(name: &str, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let description = format!("Fixture provider reading {}", dir.display());
        Self { name: name.to_string(), description, dir }
    }

    fn path_for(&self, canonical_key: &str) -> PathBuf {
        self.dir.join(format!("{canonical_key}.json"))
    }
}

#[async_trait]
impl SubstanceProvider for FixtureProvider {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn get_version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn get_description(&self) -> &str {
        &self.description
    }

    async fn fetch(&self, canonical_key: &str) -> Result<ProviderFragment, ProviderError> {
        let path = self.path_for(canonical_key);
        let raw = read_fixture(&path, canonical_key).await?;
        let fragment: ProviderFragment =
            serde_json::from_str(&raw).map_err(|e| ProviderError::Malformed(format!("{}: {e}", path.display())))?;
        debug!("fixture fetch source={} key={} identifiers={}", self.name, canonical_key, fragment.identifiers.len());
        Ok(fragment)
    }
}

/// Un proveedor por subdirectorio de `dir` (salvo `molfiles`), en orden
/// alfabético.
pub fn discover_providers(dir: &Path) -> Result<Vec<Arc<dyn SubstanceProvider>>, ProviderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ProviderError::Transport(format!("{}: {e}", dir.display())))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ProviderError::Transport(e.to_string()))?;
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_dir && name != MOLFILE_DIR && !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names.into_iter()
            .map(|name| {
                let path = dir.join(&name);
                Arc::new(FixtureProvider::new(&name, path)) as Arc<dyn SubstanceProvider>
            })
            .collect())
}

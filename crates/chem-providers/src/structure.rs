use async_trait::async_trait;
use std::path::PathBuf;

use chem_core::{ProviderError, StructureSource};
use chem_domain::{ConnectionTable, Identifier};

use crate::{read_fixture, MOLFILE_DIR};

/// Molfiles en `<dir>/molfiles/<key>.mol`.
#[derive(Debug, Clone)]
pub struct FixtureStructureSource {
    dir: PathBuf,
}

impl FixtureStructureSource {
    pub fn new(fixtures: impl Into<PathBuf>) -> Self {
        Self { dir: fixtures.into().join(MOLFILE_DIR) }
    }
}

#[async_trait]
impl StructureSource for FixtureStructureSource {
    async fn connection_table(&self, canonical_key: &str, _identifiers: &[Identifier]) -> Result<ConnectionTable, ProviderError> {
        let path = self.dir.join(format!("{canonical_key}.mol"));
        let raw = read_fixture(&path, canonical_key).await?;
        ConnectionTable::from_molfile(&raw).map_err(|e| ProviderError::Malformed(format!("{}: {e}", path.display())))
    }
}

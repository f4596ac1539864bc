use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

use chem_core::{Normalizer, ProviderError};

use crate::SYNONYMS_FILE;

/// Normalizador basado en una tabla de sinónimos (sin distinguir mayúsculas).
#[derive(Debug, Clone, Default)]
pub struct FixtureNormalizer {
    synonyms: HashMap<String, String>,
}

impl FixtureNormalizer {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self { synonyms: pairs.into_iter().map(|(k, v)| (k.trim().to_lowercase(), v)).collect() }
    }

    /// Carga `<dir>/synonyms.json`; si no existe, el normalizador queda vacío.
    pub fn load(dir: &Path) -> Result<Self, ProviderError> {
        let path = dir.join(SYNONYMS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| ProviderError::Transport(format!("{}: {e}", path.display())))?;
        let map: HashMap<String, String> =
            serde_json::from_str(&raw).map_err(|e| ProviderError::Malformed(format!("{}: {e}", path.display())))?;
        Ok(Self::new(map))
    }

    pub fn len(&self) -> usize {
        self.synonyms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synonyms.is_empty()
    }
}

#[async_trait]
impl Normalizer for FixtureNormalizer {
    async fn normalize(&self, identifier: &str) -> Result<String, ProviderError> {
        self.synonyms
            .get(&identifier.trim().to_lowercase())
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(identifier.to_string()))
    }
}

//! Contrato para proveedores externos de metadatos de sustancias.
//!
//! Cada proveedor (base química masiva, servicio de clasificación, almacén de
//! datos enlazados, base de bioactividad...) se consulta por la clave
//! canónica y devuelve fragmentos parciales: metadatos sueltos,
//! identificadores y descriptores. El agregador los trata de forma polimórfica.
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

use chem_domain::FragmentRow;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;
#[cfg(any(test, feature = "test-support"))]
pub use mock::{MockProvider, MockResponse};

/// Valor de un fragmento: un único string o una lista (una fila por elemento).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FragmentValue {
    One(String),
    Many(Vec<String>),
}

impl FragmentValue {
    pub fn values(&self) -> Vec<&str> {
        match self {
            FragmentValue::One(v) => vec![v.as_str()],
            FragmentValue::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    pub fn first(&self) -> Option<&str> {
        self.values().into_iter().next()
    }
}

impl From<&str> for FragmentValue {
    fn from(v: &str) -> Self {
        FragmentValue::One(v.to_string())
    }
}

impl From<Vec<&str>> for FragmentValue {
    fn from(vs: Vec<&str>) -> Self {
        FragmentValue::Many(vs.into_iter().map(String::from).collect())
    }
}

/// Tipo -> valor(es), en el orden devuelto por la fuente.
pub type FragmentMap = IndexMap<String, FragmentValue>;

/// Respuesta de un proveedor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderFragment {
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub identifiers: FragmentMap,
    #[serde(default)]
    pub descriptors: FragmentMap,
}

impl ProviderFragment {
    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }

    pub fn with_identifier(mut self, kind: &str, value: impl Into<FragmentValue>) -> Self {
        self.identifiers.insert(kind.to_string(), value.into());
        self
    }

    pub fn with_descriptor(mut self, kind: &str, value: impl Into<FragmentValue>) -> Self {
        self.descriptors.insert(kind.to_string(), value.into());
        self
    }
}

/// Aplana un mapa de fragmentos a filas (una por valor).
pub fn flatten_rows(source: &str, fragments: &FragmentMap) -> Vec<FragmentRow> {
    fragments.iter()
             .flat_map(|(kind, value)| value.values().into_iter().map(move |v| FragmentRow::new(kind.as_str(), v, source)))
             .collect()
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("timed out after {0:?}")] Timeout(Duration),
    #[error("transport error: {0}")] Transport(String),
    #[error("malformed response: {0}")] Malformed(String),
    #[error("no record for '{0}'")] NotFound(String),
    #[error("provider error: {0}")] Other(String),
}

#[async_trait]
pub trait SubstanceProvider: Send + Sync {
    fn get_name(&self) -> &str;
    fn get_version(&self) -> &str;
    fn get_description(&self) -> &str;

    /// Consulta la fuente por clave canónica (InChIKey).
    async fn fetch(&self, canonical_key: &str) -> Result<ProviderFragment, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    struct EchoProvider;

    #[async_trait]
    impl SubstanceProvider for EchoProvider {
        fn get_name(&self) -> &str { "echo" }
        fn get_version(&self) -> &str { "0.1.0" }
        fn get_description(&self) -> &str { "Returns the key as an identifier" }
        async fn fetch(&self, canonical_key: &str) -> Result<ProviderFragment, ProviderError> {
            if canonical_key.is_empty() {
                return Err(ProviderError::NotFound(String::new()));
            }
            Ok(ProviderFragment::default().with_identifier("inchikey", canonical_key))
        }
    }

    #[tokio::test]
    async fn provider_contract() {
        let p = EchoProvider;
        assert_eq!(p.get_name(), "echo");
        let _ = p.get_version();
        let _ = p.get_description();
        let frag = p.fetch("LFQSCWFLJHTTHZ-UHFFFAOYSA-N").await.unwrap();
        assert_eq!(frag.identifiers["inchikey"].first(), Some("LFQSCWFLJHTTHZ-UHFFFAOYSA-N"));
        assert!(matches!(p.fetch("").await, Err(ProviderError::NotFound(_))));
    }

    #[test]
    fn list_values_flatten_to_one_row_each() {
        let frag = ProviderFragment::default().with_identifier("synonym", vec!["ethanol", "ethyl alcohol"])
                                              .with_identifier("inchikey", "LFQSCWFLJHTTHZ-UHFFFAOYSA-N");
        let rows = flatten_rows("pubchem", &frag.identifiers);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], FragmentRow::new("synonym", "ethanol", "pubchem"));
        assert_eq!(rows[2].kind, "inchikey");
    }

    #[test]
    fn fragment_deserializes_scalars_and_lists() {
        let frag: ProviderFragment = serde_json::from_value(json!({
            "meta": {"formula": "C2H6O", "mw": 46.07},
            "identifiers": {"iupacname": "ethanol", "synonym": ["alcohol", "ethyl alcohol"]}
        })).unwrap();
        assert_eq!(frag.meta["formula"], "C2H6O");
        assert_eq!(frag.identifiers["synonym"].values(), vec!["alcohol", "ethyl alcohol"]);
        assert!(frag.descriptors.is_empty());
    }

    proptest! {
        #[test]
        fn one_row_per_value(lists in proptest::collection::vec(proptest::collection::vec("[a-z]{1,6}", 1..4), 0..5)) {
            let mut fragments = FragmentMap::new();
            for (i, values) in lists.iter().enumerate() {
                fragments.insert(format!("kind{i}"), FragmentValue::Many(values.clone()));
            }
            let rows = flatten_rows("src", &fragments);
            prop_assert_eq!(rows.len(), lists.iter().map(Vec::len).sum::<usize>());
            prop_assert!(rows.iter().all(|r| r.source == "src"));
        }
    }
}

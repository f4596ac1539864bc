//! Resolución de identificadores a sustancias canónicas.
//!
//! Flujo: coincidencia exacta -> clasificación -> normalización a InChIKey
//! (si hace falta) -> coincidencia por clave canónica -> agregación ->
//! extracción de campos requeridos -> escritura atómica. Una sustancia ya
//! conocida nunca vuelve a consultar proveedores.
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use chem_domain::{classify, Descriptor, FragmentRow, Identifier, IdentifierKind, NewSubstance, SourceOutcome, Substance, SubstanceId,
                  CANONICAL_KEY_LABEL};

use crate::aggregate::{Aggregation, SourceAggregator};
use crate::constants::{DEFAULT_PRIMARY_SOURCE, DEFAULT_SECONDARY_SOURCE, IDENT_CASRN, IDENT_IUPAC_NAME, META_FORMULA, META_MOLWEIGHT,
                       META_MONOMASS, META_NAME, REQUEST_SOURCE};
use crate::errors::{CoreError, RepositoryError};
use crate::provider::{FragmentValue, ProviderError};
use crate::repo::SubstanceRepository;

/// Servicio externo que traduce un identificador arbitrario a InChIKey.
#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(&self, identifier: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub primary_source: String,
    pub secondary_source: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { primary_source: DEFAULT_PRIMARY_SOURCE.to_string(),
               secondary_source: DEFAULT_SECONDARY_SOURCE.to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    /// Ya estaba persistida; no se consultó ningún proveedor.
    Existing,
    Created,
}

/// Sustancia canónica junto con todas sus filas asociadas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSubstance {
    pub status: ResolutionStatus,
    pub substance: Substance,
    pub identifiers: Vec<Identifier>,
    pub descriptors: Vec<Descriptor>,
    pub sources: Vec<SourceOutcome>,
}

impl ResolvedSubstance {
    pub fn id(&self) -> SubstanceId {
        self.substance.id
    }

    pub fn canonical_key(&self) -> Option<&str> {
        self.identifiers.iter().find(|i| i.kind == CANONICAL_KEY_LABEL).map(|i| i.value.as_str())
    }
}

pub struct SubstanceResolver<R: SubstanceRepository + ?Sized> {
    repo: Arc<R>,
    normalizer: Arc<dyn Normalizer>,
    aggregator: SourceAggregator,
    config: ResolverConfig,
}

impl<R: SubstanceRepository + ?Sized> SubstanceResolver<R> {
    pub fn new(repo: Arc<R>, normalizer: Arc<dyn Normalizer>, aggregator: SourceAggregator, config: ResolverConfig) -> Self {
        Self { repo, normalizer, aggregator, config }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn aggregator(&self) -> &SourceAggregator {
        &self.aggregator
    }

    /// Resuelve `identifier` a su sustancia canónica, creándola si no existe.
    pub async fn resolve(&self, identifier: &str) -> Result<ResolvedSubstance, CoreError> {
        if let Some(found) = self.repo.find_substance_by_identifier_value(identifier)? {
            debug!("resolve exact_match identifier={} substance_id={}", identifier, found.id);
            return self.load(found.id, ResolutionStatus::Existing);
        }

        let kind = classify(identifier);
        let key = if kind.is_canonical() { identifier.to_string() } else { self.normalize(identifier).await? };

        if key != identifier {
            if let Some(found) = self.repo.find_substance_by_identifier_value(&key)? {
                debug!("resolve canonical_match identifier={} key={} substance_id={}", identifier, key, found.id);
                return self.load(found.id, ResolutionStatus::Existing);
            }
        }

        let aggregation = self.aggregator.aggregate(&key).await;
        let fields = self.required_fields(&key, &aggregation)?;
        let identifiers = with_request_rows(aggregation.identifier_rows(), identifier, kind, &key);
        let descriptors = aggregation.descriptor_rows();
        let outcomes = aggregation.outcomes.clone();

        let mut reused = false;
        let id = self.repo.write_atomically(&mut |w| {
                             reused = false;
                             if let Some(id) = w.find_substance_id(&key)? {
                                 reused = true;
                                 return Ok(id);
                             }
                             let id = w.create_substance(&fields)?;
                             w.append_identifiers(id, &identifiers)?;
                             w.append_descriptors(id, &descriptors)?;
                             w.append_source_outcomes(id, &outcomes)?;
                             Ok(id)
                         })?;

        if reused {
            warn!("resolve concurrent_create run_id={} key={} substance_id={}", aggregation.run_id, key, id);
            return self.load(id, ResolutionStatus::Existing);
        }
        info!("resolve created run_id={} key={} substance_id={} sources_ok={} sources_failed={}",
              aggregation.run_id,
              key,
              id,
              aggregation.succeeded(),
              aggregation.failed());
        self.load(id, ResolutionStatus::Created)
    }

    async fn normalize(&self, identifier: &str) -> Result<String, CoreError> {
        let failure = |reason: String| CoreError::NormalizationFailure { identifier: identifier.to_string(), reason };
        let key = self.normalizer.normalize(identifier).await.map_err(|e| failure(e.to_string()))?;
        let key = key.trim().to_string();
        if classify(&key) != IdentifierKind::InChIKey {
            return Err(failure(format!("normalizer returned '{key}', which is not an InChIKey")));
        }
        Ok(key)
    }

    fn required_fields(&self, key: &str, aggregation: &Aggregation) -> Result<NewSubstance, CoreError> {
        let primary = self.config.primary_source.as_str();
        let meta = aggregation.meta_of(primary)
                              .ok_or_else(|| CoreError::resolution(key, format!("no metadata from primary source '{primary}'")))?;
        let name = aggregation.identifiers_of(primary)
                              .and_then(|ids| ids.get(IDENT_IUPAC_NAME))
                              .and_then(FragmentValue::first)
                              .or_else(|| meta.get(META_NAME).and_then(Value::as_str))
                              .ok_or_else(|| CoreError::resolution(key, "primary source returned no name"))?;
        let formula = meta.get(META_FORMULA)
                          .and_then(Value::as_str)
                          .ok_or_else(|| CoreError::resolution(key, "primary source returned no formula"))?;
        let molweight = number(meta, META_MOLWEIGHT).ok_or_else(|| CoreError::resolution(key, "primary source returned no molecular weight"))?;
        let monomass = number(meta, META_MONOMASS).ok_or_else(|| CoreError::resolution(key, "primary source returned no monoisotopic mass"))?;
        let casrn = aggregation.identifiers_of(&self.config.secondary_source)
                               .and_then(|ids| ids.get(IDENT_CASRN))
                               .and_then(FragmentValue::first)
                               .map(str::to_string);
        NewSubstance::new(name, formula, molweight, monomass, casrn).map_err(|e| CoreError::resolution(key, e.to_string()))
    }

    fn load(&self, id: SubstanceId, status: ResolutionStatus) -> Result<ResolvedSubstance, CoreError> {
        let substance = self.repo
                            .get_substance(id)?
                            .ok_or_else(|| RepositoryError::NotFound(format!("substance {id}")))?;
        Ok(ResolvedSubstance { status,
                               substance,
                               identifiers: self.repo.identifiers_for(id)?,
                               descriptors: self.repo.descriptors_for(id)?,
                               sources: self.repo.source_outcomes_for(id)? })
    }
}

/// Números JSON o strings numéricos.
fn number(meta: &Map<String, Value>, field: &str) -> Option<f64> {
    match meta.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Garantiza que la sustancia quede localizable por la clave canónica y por
/// el identificador de entrada aunque ningún proveedor los haya devuelto.
fn with_request_rows(mut rows: Vec<FragmentRow>, identifier: &str, kind: IdentifierKind, key: &str) -> Vec<FragmentRow> {
    if !rows.iter().any(|r| r.kind == CANONICAL_KEY_LABEL && r.value == key) {
        rows.push(FragmentRow::new(CANONICAL_KEY_LABEL, key, REQUEST_SOURCE));
    }
    if !rows.iter().any(|r| r.value == identifier) {
        rows.push(FragmentRow::new(kind.label(), identifier, REQUEST_SOURCE));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregatorConfig;
    use crate::provider::{MockProvider, ProviderFragment, SubstanceProvider};
    use crate::repo::InMemorySubstanceRepository;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const ETHANOL_KEY: &str = "LFQSCWFLJHTTHZ-UHFFFAOYSA-N";

    struct MapNormalizer {
        known: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl MapNormalizer {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self { known: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                   calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl Normalizer for MapNormalizer {
        async fn normalize(&self, identifier: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.known.get(identifier).cloned().ok_or_else(|| ProviderError::NotFound(identifier.to_string()))
        }
    }

    fn pubchem_ethanol() -> ProviderFragment {
        ProviderFragment::default().with_meta("formula", json!("C2H6O"))
                                   .with_meta("mw", json!("46.07"))
                                   .with_meta("mim", json!(46.041864811))
                                   .with_identifier("iupacname", "ethanol")
                                   .with_identifier("inchikey", ETHANOL_KEY)
                                   .with_identifier("synonym", vec!["alcohol", "ethyl alcohol"])
                                   .with_descriptor("smiles", "CCO")
    }

    fn wikidata_ethanol() -> ProviderFragment {
        ProviderFragment::default().with_identifier("casrn", "64-17-5")
    }

    struct Fixture {
        resolver: SubstanceResolver<InMemorySubstanceRepository>,
        pubchem: MockProvider,
        chembl: MockProvider,
        normalizer: Arc<MapNormalizer>,
    }

    fn fixture(pubchem: MockProvider) -> Fixture {
        let chembl = MockProvider::failing("chembl", ProviderError::Transport("503".into()));
        let providers: Vec<Arc<dyn SubstanceProvider>> =
            vec![Arc::new(pubchem.clone()), Arc::new(MockProvider::ok("wikidata", wikidata_ethanol())), Arc::new(chembl.clone())];
        let aggregator = SourceAggregator::new(providers, AggregatorConfig::default()).unwrap();
        let normalizer = Arc::new(MapNormalizer::new(&[("ethanol", ETHANOL_KEY), ("bogus", "not-a-key")]));
        let repo = Arc::new(InMemorySubstanceRepository::with_bundled_elements().unwrap());
        let resolver = SubstanceResolver::new(repo, normalizer.clone(), aggregator, ResolverConfig::default());
        Fixture { resolver, pubchem, chembl, normalizer }
    }

    #[tokio::test]
    async fn creates_substance_with_all_rows() {
        let f = fixture(MockProvider::ok("pubchem", pubchem_ethanol()));
        let r = f.resolver.resolve(ETHANOL_KEY).await.unwrap();
        assert_eq!(r.status, ResolutionStatus::Created);
        assert_eq!(r.substance.name, "ethanol");
        assert_eq!(r.substance.formula, "C2H6O");
        assert!((r.substance.molweight - 46.07).abs() < 1e-9);
        assert_eq!(r.substance.casrn.as_deref(), Some("64-17-5"));
        assert_eq!(r.canonical_key(), Some(ETHANOL_KEY));
        assert_eq!(r.sources.len(), 3);
        assert!(r.sources.iter().any(|s| s.source == "chembl" && s.notes.as_deref().unwrap_or("").contains("503")));
        assert_eq!(r.descriptors.len(), 1);
        // las filas de la petición no se duplican cuando un proveedor ya las trae
        assert!(r.identifiers.iter().all(|i| i.source != REQUEST_SOURCE));
        assert_eq!(f.normalizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_resolution_skips_providers() {
        let f = fixture(MockProvider::ok("pubchem", pubchem_ethanol()));
        let first = f.resolver.resolve("ethanol").await.unwrap();
        let second = f.resolver.resolve("ethanol").await.unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(second.status, ResolutionStatus::Existing);
        assert_eq!(f.pubchem.calls(), 1);
        assert_eq!(f.chembl.calls(), 1);
        // un sinónimo devuelto por el proveedor también resuelve por coincidencia exacta
        let third = f.resolver.resolve("ethyl alcohol").await.unwrap();
        assert_eq!(third.id(), first.id());
        assert_eq!(f.pubchem.calls(), 1);
    }

    #[tokio::test]
    async fn canonical_key_match_after_normalization() {
        let f = fixture(MockProvider::ok("pubchem", pubchem_ethanol()));
        let created = f.resolver.resolve(ETHANOL_KEY).await.unwrap();
        let normalizer = MapNormalizer::new(&[("EtOH", ETHANOL_KEY)]);
        let resolver = SubstanceResolver::new(Arc::clone(f.resolver.repository()),
                                              Arc::new(normalizer),
                                              SourceAggregator::new(vec![Arc::new(f.pubchem.clone())], AggregatorConfig::default()).unwrap(),
                                              ResolverConfig::default());
        let again = resolver.resolve("EtOH").await.unwrap();
        assert_eq!(again.status, ResolutionStatus::Existing);
        assert_eq!(again.id(), created.id());
        assert_eq!(f.pubchem.calls(), 1);
    }

    #[tokio::test]
    async fn normalization_failures() {
        let f = fixture(MockProvider::ok("pubchem", pubchem_ethanol()));
        let err = f.resolver.resolve("unobtainium").await.unwrap_err();
        assert!(matches!(err, CoreError::NormalizationFailure { ref identifier, .. } if identifier == "unobtainium"));
        let err = f.resolver.resolve("bogus").await.unwrap_err();
        assert!(matches!(err, CoreError::NormalizationFailure { .. }));
        assert_eq!(f.pubchem.calls(), 0);
    }

    #[tokio::test]
    async fn missing_required_field_persists_nothing() {
        let partial = ProviderFragment::default().with_meta("formula", json!("C2H6O")).with_identifier("iupacname", "ethanol");
        let f = fixture(MockProvider::ok("pubchem", partial));
        let err = f.resolver.resolve(ETHANOL_KEY).await.unwrap_err();
        assert!(matches!(err, CoreError::ResolutionFailed { .. }), "{err:?}");
        assert_eq!(f.resolver.repository().substance_count(), 0);
        assert!(f.resolver.repository().find_substance_id(ETHANOL_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn primary_source_failure_is_resolution_failure() {
        let f = fixture(MockProvider::failing("pubchem", ProviderError::Timeout(Duration::from_millis(5))));
        let err = f.resolver.resolve(ETHANOL_KEY).await.unwrap_err();
        assert!(err.to_string().contains("primary source"), "{err}");
    }

    #[tokio::test]
    async fn name_falls_back_to_meta_and_request_rows_are_added() {
        let frag = ProviderFragment::default().with_meta("name", json!("ethanol"))
                                              .with_meta("formula", json!("C2H6O"))
                                              .with_meta("mw", json!(46.07))
                                              .with_meta("mim", json!(46.04));
        let f = fixture(MockProvider::ok("pubchem", frag));
        let r = f.resolver.resolve("ethanol").await.unwrap();
        assert_eq!(r.substance.name, "ethanol");
        let request: Vec<(&str, &str)> =
            r.identifiers.iter().filter(|i| i.source == REQUEST_SOURCE).map(|i| (i.kind.as_str(), i.value.as_str())).collect();
        assert_eq!(request, vec![("inchikey", ETHANOL_KEY), ("other", "ethanol")]);
    }

    #[tokio::test]
    async fn concurrent_resolutions_converge() {
        let f = fixture(MockProvider::ok("pubchem", pubchem_ethanol()).with_delay(Duration::from_millis(20)));
        let resolver = Arc::new(f.resolver);
        let a = tokio::spawn({
            let r = Arc::clone(&resolver);
            async move { r.resolve(ETHANOL_KEY).await }
        });
        let b = tokio::spawn({
            let r = Arc::clone(&resolver);
            async move { r.resolve(ETHANOL_KEY).await }
        });
        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(a.id(), b.id());
        assert_eq!(resolver.repository().substance_count(), 1);
        let created = [a.status, b.status].iter().filter(|s| **s == ResolutionStatus::Created).count();
        assert_eq!(created, 1);
    }
}

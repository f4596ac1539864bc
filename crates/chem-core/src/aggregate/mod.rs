//! Agregación multi-fuente.
//!
//! Fan-out de la clave canónica a N proveedores independientes (tareas tokio
//! con un pool acotado por semáforo y timeout por proveedor) y fan-in en un
//! único colector que hace el merge. Un fallo, timeout o pánico de un
//! proveedor nunca aborta la corrida: se registra como `SourceReport` de fallo
//! y su fragmento queda ausente.
//!
//! Garantías:
//! - `outcomes.len()` == número de proveedores invocados, siempre.
//! - Los resultados se ordenan por orden de registro del proveedor, así que
//!   la salida es determinista si las respuestas lo son.
//! - Al vencer el deadline global se cancelan las tareas pendientes.
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use chem_domain::{FragmentRow, SourceReport};

use crate::errors::CoreError;
use crate::provider::{flatten_rows, FragmentMap, ProviderError, ProviderFragment, SubstanceProvider};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Timeout individual por proveedor.
    pub provider_timeout: Duration,
    /// Deadline global de la corrida.
    pub deadline: Duration,
    /// Tamaño del pool de llamadas concurrentes.
    pub max_concurrency: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { provider_timeout: Duration::from_secs(10),
               deadline: Duration::from_secs(30),
               max_concurrency: 4 }
    }
}

/// Resultado de una corrida de agregación (acumuladores por nombre de fuente).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub run_id: Uuid,
    pub canonical_key: String,
    pub meta: IndexMap<String, Map<String, Value>>,
    pub identifiers: IndexMap<String, FragmentMap>,
    pub descriptors: IndexMap<String, FragmentMap>,
    pub outcomes: Vec<SourceReport>,
}

impl Aggregation {
    pub fn meta_of(&self, source: &str) -> Option<&Map<String, Value>> {
        self.meta.get(source)
    }

    pub fn identifiers_of(&self, source: &str) -> Option<&FragmentMap> {
        self.identifiers.get(source)
    }

    pub fn identifier_rows(&self) -> Vec<FragmentRow> {
        self.identifiers.iter().flat_map(|(src, frags)| flatten_rows(src, frags)).collect()
    }

    pub fn descriptor_rows(&self) -> Vec<FragmentRow> {
        self.descriptors.iter().flat_map(|(src, frags)| flatten_rows(src, frags)).collect()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    fn merge(&mut self, source: &str, fragment: ProviderFragment) {
        self.meta.insert(source.to_string(), fragment.meta);
        self.identifiers.insert(source.to_string(), fragment.identifiers);
        self.descriptors.insert(source.to_string(), fragment.descriptors);
        self.outcomes.push(SourceReport::success(source));
    }
}

enum Slot {
    Pending,
    Done(Result<ProviderFragment, ProviderError>),
}

pub struct SourceAggregator {
    providers: Vec<Arc<dyn SubstanceProvider>>,
    config: AggregatorConfig,
}

impl SourceAggregator {
    /// Valida nombres únicos y un pool no vacío.
    pub fn new(providers: Vec<Arc<dyn SubstanceProvider>>, config: AggregatorConfig) -> Result<Self, CoreError> {
        if config.max_concurrency == 0 {
            return Err(CoreError::Configuration("max_concurrency must be at least 1".into()));
        }
        let mut seen = HashSet::new();
        for p in &providers {
            if !seen.insert(p.get_name().to_string()) {
                return Err(CoreError::Configuration(format!("duplicate provider name '{}'", p.get_name())));
            }
        }
        Ok(Self { providers, config })
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.get_name()).collect()
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub async fn aggregate(&self, canonical_key: &str) -> Aggregation {
        let run_id = Uuid::new_v4();
        info!("aggregate:start run_id={run_id} key={canonical_key} providers={}", self.providers.len());

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut set = JoinSet::new();
        for (idx, provider) in self.providers.iter().enumerate() {
            let provider = Arc::clone(provider);
            let semaphore = Arc::clone(&semaphore);
            let key = canonical_key.to_string();
            let timeout = self.config.provider_timeout;
            set.spawn(async move {
                // El permiso vive hasta el final de la tarea.
                let _permit = semaphore.acquire_owned().await.ok();
                let result = match tokio::time::timeout(timeout, provider.fetch(&key)).await {
                    Ok(r) => r,
                    Err(_) => Err(ProviderError::Timeout(timeout)),
                };
                (idx, result)
            });
        }

        let mut slots: Vec<Slot> = self.providers.iter().map(|_| Slot::Pending).collect();
        let deadline = tokio::time::Instant::now() + self.config.deadline;
        let mut deadline_hit = false;
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((idx, result)))) => slots[idx] = Slot::Done(result),
                Ok(Some(Err(join_err))) => warn!("aggregate:task_failed run_id={run_id} err={join_err}"),
                Ok(None) => break,
                Err(_) => {
                    warn!("aggregate:deadline run_id={run_id} pending={} -> cancelling", set.len());
                    set.abort_all();
                    deadline_hit = true;
                    break;
                }
            }
        }

        let mut out = Aggregation { run_id, canonical_key: canonical_key.to_string(), ..Default::default() };
        for (provider, slot) in self.providers.iter().zip(slots) {
            let name = provider.get_name();
            match slot {
                Slot::Done(Ok(fragment)) => {
                    debug!("aggregate:source_ok run_id={run_id} source={name}");
                    out.merge(name, fragment);
                }
                Slot::Done(Err(e)) => {
                    warn!("aggregate:source_failed run_id={run_id} source={name} err={e}");
                    out.outcomes.push(SourceReport::failure(name, e.to_string()));
                }
                Slot::Pending => {
                    let notes = if deadline_hit { "aggregation deadline elapsed" } else { "provider task did not complete" };
                    warn!("aggregate:source_failed run_id={run_id} source={name} err={notes}");
                    out.outcomes.push(SourceReport::failure(name, notes));
                }
            }
        }
        info!("aggregate:done run_id={run_id} ok={} failed={}", out.succeeded(), out.failed());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockProvider, MockResponse};
    use chem_domain::SourceResult;
    use serde_json::json;

    const KEY: &str = "LFQSCWFLJHTTHZ-UHFFFAOYSA-N";

    fn frag(tag: &str) -> ProviderFragment {
        ProviderFragment::default().with_meta("tag", json!(tag))
                                   .with_identifier("inchikey", KEY)
                                   .with_descriptor(&format!("{tag}_desc"), vec!["a", "b"])
    }

    fn arcs(ps: &[MockProvider]) -> Vec<Arc<dyn SubstanceProvider>> {
        ps.iter().cloned().map(|p| Arc::new(p) as Arc<dyn SubstanceProvider>).collect()
    }

    #[tokio::test]
    async fn one_failing_source_is_isolated() {
        let ps = [MockProvider::ok("pubchem", frag("pubchem")),
                  MockProvider::ok("classyfire", frag("classyfire")),
                  MockProvider::failing("wikidata", ProviderError::Malformed("bad json".into())),
                  MockProvider::ok("chembl", frag("chembl"))];
        let agg = SourceAggregator::new(arcs(&ps), AggregatorConfig::default()).unwrap();
        let out = agg.aggregate(KEY).await;

        assert_eq!(out.outcomes.len(), 4);
        assert_eq!(out.succeeded(), 3);
        assert!(out.meta_of("wikidata").is_none());
        assert!(out.identifiers_of("wikidata").is_none());
        for src in ["pubchem", "classyfire", "chembl"] {
            assert_eq!(out.meta_of(src).unwrap()["tag"], json!(src));
        }
        let failed = &out.outcomes[2];
        assert_eq!(failed.source, "wikidata");
        assert_eq!(failed.result, SourceResult::Failure);
        assert_eq!(failed.notes.as_deref(), Some("malformed response: bad json"));
    }

    #[tokio::test]
    async fn outcomes_follow_registration_order() {
        let ps = [MockProvider::ok("slow", frag("slow")).with_delay(Duration::from_millis(60)),
                  MockProvider::ok("fast", frag("fast"))];
        let agg = SourceAggregator::new(arcs(&ps), AggregatorConfig::default()).unwrap();
        let out = agg.aggregate(KEY).await;
        let names: Vec<_> = out.outcomes.iter().map(|o| o.source.as_str()).collect();
        assert_eq!(names, vec!["slow", "fast"]);
        assert_eq!(out.meta.keys().collect::<Vec<_>>(), vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn timeout_is_recorded_as_failure() {
        let ps = [MockProvider::ok("hanging", frag("hanging")).with_delay(Duration::from_secs(30)),
                  MockProvider::ok("pubchem", frag("pubchem"))];
        let cfg = AggregatorConfig { provider_timeout: Duration::from_millis(50), ..Default::default() };
        let agg = SourceAggregator::new(arcs(&ps), cfg).unwrap();
        let out = agg.aggregate(KEY).await;
        assert_eq!(out.outcomes.len(), 2);
        assert_eq!(out.outcomes[0].result, SourceResult::Failure);
        assert!(out.outcomes[0].notes.as_deref().unwrap().starts_with("timed out"));
        assert!(out.outcomes[1].is_success());
    }

    #[tokio::test]
    async fn deadline_cancels_pending_sources() {
        let ps = [MockProvider::ok("hanging", frag("hanging")).with_delay(Duration::from_secs(30)),
                  MockProvider::ok("pubchem", frag("pubchem"))];
        let cfg = AggregatorConfig { provider_timeout: Duration::from_secs(60),
                                     deadline: Duration::from_millis(80),
                                     max_concurrency: 2 };
        let agg = SourceAggregator::new(arcs(&ps), cfg).unwrap();
        let out = agg.aggregate(KEY).await;
        assert_eq!(out.outcomes.len(), 2);
        assert_eq!(out.outcomes[0].notes.as_deref(), Some("aggregation deadline elapsed"));
        assert!(out.outcomes[1].is_success());
    }

    #[tokio::test]
    async fn panicking_source_does_not_abort_run() {
        let ps = [MockProvider::new("broken", MockResponse::Panic("boom".into())),
                  MockProvider::ok("pubchem", frag("pubchem"))];
        let agg = SourceAggregator::new(arcs(&ps), AggregatorConfig::default()).unwrap();
        let out = agg.aggregate(KEY).await;
        assert_eq!(out.outcomes.len(), 2);
        assert_eq!(out.outcomes[0].notes.as_deref(), Some("provider task did not complete"));
        assert!(out.outcomes[1].is_success());
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let first = MockProvider::ok("p0", frag("p0")).with_delay(Duration::from_millis(30));
        let mut ps = vec![first.clone()];
        for i in 1..6 {
            let name = format!("p{i}");
            ps.push(MockProvider::ok(&name, frag(&name)).with_delay(Duration::from_millis(30)).sharing_counters_with(&first));
        }
        let cfg = AggregatorConfig { max_concurrency: 2, ..Default::default() };
        let agg = SourceAggregator::new(arcs(&ps), cfg).unwrap();
        let out = agg.aggregate(KEY).await;
        assert_eq!(out.succeeded(), 6);
        assert!(first.max_in_flight() <= 2, "observed {}", first.max_in_flight());
    }

    #[test]
    fn rejects_duplicate_names_and_empty_pool() {
        let ps = [MockProvider::ok("pubchem", frag("a")), MockProvider::ok("pubchem", frag("b"))];
        assert!(matches!(SourceAggregator::new(arcs(&ps), AggregatorConfig::default()), Err(CoreError::Configuration(_))));
        let cfg = AggregatorConfig { max_concurrency: 0, ..Default::default() };
        assert!(SourceAggregator::new(vec![], cfg).is_err());
    }

    #[tokio::test]
    async fn rows_flatten_per_source() {
        let ps = [MockProvider::ok("pubchem", frag("pubchem")), MockProvider::ok("chembl", frag("chembl"))];
        let agg = SourceAggregator::new(arcs(&ps), AggregatorConfig::default()).unwrap();
        let out = agg.aggregate(KEY).await;
        let ids = out.identifier_rows();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1], FragmentRow::new("inchikey", KEY, "chembl"));
        assert_eq!(out.descriptor_rows().len(), 4);
    }
}

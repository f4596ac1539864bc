//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) una sola vez y construye las
//! configuraciones de agregación y resolución del core.
use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

use chem_core::{AggregatorConfig, ResolverConfig};

use crate::errors::IngestError;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
});

pub const DEFAULT_TEMPLATE_CATEGORY: &str = "compound";

/// Configuración de la aplicación (sin la base de datos, que vive en
/// `chem_persistence::DbConfig`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub aggregator: AggregatorConfig,
    pub resolver: ResolverConfig,
    /// Categoría de plantilla usada para los documentos.
    pub template_category: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { aggregator: AggregatorConfig::default(),
               resolver: ResolverConfig::default(),
               template_category: DEFAULT_TEMPLATE_CATEGORY.to_string() }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, IngestError> {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IngestError> {
        let defaults = AppConfig::default();
        let millis = |var: &str, default: Duration| -> Result<Duration, IngestError> {
            match lookup(var) {
                Some(raw) => raw.trim()
                                .parse::<u64>()
                                .ok()
                                .filter(|ms| *ms > 0)
                                .map(Duration::from_millis)
                                .ok_or_else(|| IngestError::Configuration(format!("{var} must be a positive number of milliseconds, got '{raw}'"))),
                None => Ok(default),
            }
        };
        let text = |var: &str, default: &str| -> Result<String, IngestError> {
            match lookup(var) {
                Some(raw) if raw.trim().is_empty() => Err(IngestError::Configuration(format!("{var} must not be empty"))),
                Some(raw) => Ok(raw.trim().to_string()),
                None => Ok(default.to_string()),
            }
        };

        let max_concurrency = match lookup("SCIFLOW_MAX_CONCURRENT_PROVIDERS") {
            Some(raw) => raw.trim()
                            .parse::<usize>()
                            .ok()
                            .filter(|n| *n > 0)
                            .ok_or_else(|| IngestError::Configuration(format!("SCIFLOW_MAX_CONCURRENT_PROVIDERS must be at least 1, got '{raw}'")))?,
            None => defaults.aggregator.max_concurrency,
        };
        let aggregator = AggregatorConfig { provider_timeout: millis("SCIFLOW_PROVIDER_TIMEOUT_MS", defaults.aggregator.provider_timeout)?,
                                            deadline: millis("SCIFLOW_AGGREGATION_DEADLINE_MS", defaults.aggregator.deadline)?,
                                            max_concurrency };
        let resolver = ResolverConfig { primary_source: text("SCIFLOW_PRIMARY_SOURCE", &defaults.resolver.primary_source)?,
                                        secondary_source: text("SCIFLOW_SECONDARY_SOURCE", &defaults.resolver.secondary_source)? };
        Ok(Self { aggregator,
                  resolver,
                  template_category: text("SCIFLOW_TEMPLATE_CATEGORY", DEFAULT_TEMPLATE_CATEGORY)? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.resolver.primary_source, "pubchem");
        assert_eq!(cfg.aggregator.provider_timeout, Duration::from_secs(10));
    }

    #[test]
    fn reads_overrides() {
        let cfg = AppConfig::from_lookup(lookup(&[("SCIFLOW_PROVIDER_TIMEOUT_MS", "250"),
                                                  ("SCIFLOW_MAX_CONCURRENT_PROVIDERS", "8"),
                                                  ("SCIFLOW_SECONDARY_SOURCE", " wikidata2 "),
                                                  ("SCIFLOW_TEMPLATE_CATEGORY", "mixture")])).unwrap();
        assert_eq!(cfg.aggregator.provider_timeout, Duration::from_millis(250));
        assert_eq!(cfg.aggregator.max_concurrency, 8);
        assert_eq!(cfg.resolver.secondary_source, "wikidata2");
        assert_eq!(cfg.template_category, "mixture");
    }

    #[test]
    fn rejects_malformed_values() {
        for (var, raw) in [("SCIFLOW_PROVIDER_TIMEOUT_MS", "soon"),
                           ("SCIFLOW_AGGREGATION_DEADLINE_MS", "0"),
                           ("SCIFLOW_MAX_CONCURRENT_PROVIDERS", "0"),
                           ("SCIFLOW_PRIMARY_SOURCE", "  ")]
        {
            let err = AppConfig::from_lookup(lookup(&[(var, raw)])).unwrap_err();
            assert!(err.to_string().contains(var), "{err}");
        }
    }
}

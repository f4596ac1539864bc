use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{ProviderError, ProviderFragment, SubstanceProvider};

/// Respuesta programada del proveedor simulado.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Fragment(ProviderFragment),
    Fail(ProviderError),
    Panic(String),
}

/// Proveedor simulado para pruebas: respuesta fija, retraso opcional y conteo
/// de llamadas (compartible entre clones vía `Arc`).
#[derive(Debug, Clone)]
pub struct MockProvider {
    pub name: String,
    pub version: String,
    response: MockResponse,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(name: &str, response: MockResponse) -> Self {
        Self { name: name.to_string(),
               version: "1.0.0".to_string(),
               response,
               delay: None,
               calls: Arc::new(AtomicUsize::new(0)),
               in_flight: Arc::new(AtomicUsize::new(0)),
               max_in_flight: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn ok(name: &str, fragment: ProviderFragment) -> Self {
        Self::new(name, MockResponse::Fragment(fragment))
    }

    pub fn failing(name: &str, error: ProviderError) -> Self {
        Self::new(name, MockResponse::Fail(error))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Máximo de llamadas simultáneas observado.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Comparte contadores con otro proveedor (para medir concurrencia global).
    pub fn sharing_counters_with(mut self, other: &MockProvider) -> Self {
        self.in_flight = Arc::clone(&other.in_flight);
        self.max_in_flight = Arc::clone(&other.max_in_flight);
        self
    }
}

#[async_trait]
impl SubstanceProvider for MockProvider {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn get_version(&self) -> &str {
        &self.version
    }

    fn get_description(&self) -> &str {
        "Mock substance provider for testing purposes"
    }

    async fn fetch(&self, _canonical_key: &str) -> Result<ProviderFragment, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match &self.response {
            MockResponse::Fragment(f) => Ok(f.clone()),
            MockResponse::Fail(e) => Err(e.clone()),
            MockResponse::Panic(msg) => panic!("{msg}"),
        }
    }
}

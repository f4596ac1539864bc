//! chem-core: resolución de sustancias canónicas y agregación multi-fuente.
pub mod aggregate;
pub mod constants;
pub mod errors;
pub mod provider;
pub mod repo;
pub mod resolve;
pub mod structure;

pub use aggregate::{Aggregation, AggregatorConfig, SourceAggregator};
pub use errors::{CoreError, RepositoryError};
pub use provider::{flatten_rows, FragmentMap, FragmentValue, ProviderError, ProviderFragment, SubstanceProvider};
#[cfg(any(test, feature = "test-support"))]
pub use provider::{MockProvider, MockResponse};
pub use repo::{InMemorySubstanceRepository, ReferenceData, SubstanceRepository, SubstanceWriter, WriteUnit};
pub use resolve::{Normalizer, ResolutionStatus, ResolvedSubstance, ResolverConfig, SubstanceResolver};
pub use structure::StructureSource;

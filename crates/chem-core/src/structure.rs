//! Recuperación de la estructura (tabla de conexión) de una sustancia ya
//! resuelta, p. ej. el molfile de su registro en la base química principal.
use async_trait::async_trait;

use chem_domain::{ConnectionTable, Identifier};

use crate::provider::ProviderError;

#[async_trait]
pub trait StructureSource: Send + Sync {
    async fn connection_table(&self, canonical_key: &str, identifiers: &[Identifier]) -> Result<ConnectionTable, ProviderError>;
}

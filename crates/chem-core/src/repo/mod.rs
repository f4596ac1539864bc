//! Contrato de persistencia de sustancias.
//!
//! Las lecturas son directas; toda escritura de una resolución pasa por
//! `write_atomically`, que ejecuta la unidad de trabajo dentro de una única
//! transacción: si la unidad devuelve error no queda ninguna fila escrita.
use chem_domain::{Descriptor, ElementField, FragmentRow, Identifier, NewSubstance, SourceOutcome, SourceReport, Substance, SubstanceId,
                  Template, CANONICAL_KEY_LABEL};

use crate::errors::RepositoryError;

pub mod memory;
pub use memory::InMemorySubstanceRepository;

/// Unidad de trabajo ejecutada por `SubstanceRepository::write_atomically`.
pub type WriteUnit<'a> = dyn FnMut(&mut dyn SubstanceWriter) -> Result<SubstanceId, RepositoryError> + 'a;

/// Operaciones disponibles dentro de una transacción.
pub trait SubstanceWriter {
    /// Re-comprobación dentro de la transacción (dos resoluciones concurrentes
    /// de la misma clave deben converger en una única sustancia).
    fn find_substance_id(&mut self, value: &str) -> Result<Option<SubstanceId>, RepositoryError>;
    fn create_substance(&mut self, fields: &NewSubstance) -> Result<SubstanceId, RepositoryError>;
    fn append_identifiers(&mut self, id: SubstanceId, rows: &[FragmentRow]) -> Result<(), RepositoryError>;
    fn append_descriptors(&mut self, id: SubstanceId, rows: &[FragmentRow]) -> Result<(), RepositoryError>;
    fn append_source_outcomes(&mut self, id: SubstanceId, reports: &[SourceReport]) -> Result<(), RepositoryError>;
}

/// Datos de referencia: plantillas por categoría y tabla de elementos.
pub trait ReferenceData {
    /// `NotFound` si no hay plantilla para la categoría.
    fn get_template(&self, category: &str) -> Result<Template, RepositoryError>;
    fn get_element_reference(&self, value: &str, from: ElementField, to: ElementField) -> Result<Option<String>, RepositoryError>;
}

pub trait SubstanceRepository: ReferenceData + Send + Sync {
    /// Coincidencia exacta contra cualquier valor de identificador.
    fn find_substance_by_identifier_value(&self, value: &str) -> Result<Option<Substance>, RepositoryError>;
    fn get_substance(&self, id: SubstanceId) -> Result<Option<Substance>, RepositoryError>;
    fn identifiers_for(&self, id: SubstanceId) -> Result<Vec<Identifier>, RepositoryError>;
    fn descriptors_for(&self, id: SubstanceId) -> Result<Vec<Descriptor>, RepositoryError>;
    fn source_outcomes_for(&self, id: SubstanceId) -> Result<Vec<SourceOutcome>, RepositoryError>;
    /// Sustancias con algún identificador que contiene `query` (sin distinguir
    /// mayúsculas), sin duplicados y ordenadas por id de sustancia (orden de creación).
    fn search(&self, query: &str) -> Result<Vec<Substance>, RepositoryError>;
    /// Única mutación permitida sobre una sustancia ya creada.
    fn attach_graph_location(&self, id: SubstanceId, location: &str) -> Result<(), RepositoryError>;
    fn write_atomically(&self, unit: &mut WriteUnit<'_>) -> Result<SubstanceId, RepositoryError>;

    fn find_substance_id(&self, value: &str) -> Result<Option<SubstanceId>, RepositoryError> {
        Ok(self.find_substance_by_identifier_value(value)?.map(|s| s.id))
    }

    /// Primer identificador de tipo `inchikey`.
    fn canonical_key(&self, id: SubstanceId) -> Result<Option<String>, RepositoryError> {
        Ok(self.identifiers_for(id)?.into_iter().find(|i| i.kind == CANONICAL_KEY_LABEL).map(|i| i.value))
    }

    fn graph_location(&self, id: SubstanceId) -> Result<Option<String>, RepositoryError> {
        self.get_substance(id)?
            .map(|s| s.graphdb)
            .ok_or_else(|| RepositoryError::NotFound(format!("substance {id}")))
    }
}

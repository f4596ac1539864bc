use chrono::Utc;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chem_domain::{Descriptor, ElementField, ElementTable, FragmentRow, Identifier, NewSubstance, SourceOutcome, SourceReport, Substance,
                  SubstanceId, Template};

use super::{ReferenceData, SubstanceRepository, SubstanceWriter, WriteUnit};
use crate::errors::RepositoryError;

#[derive(Debug, Clone, Default)]
struct State {
    substances: Vec<Substance>,
    identifiers: Vec<Identifier>,
    descriptors: Vec<Descriptor>,
    outcomes: Vec<SourceOutcome>,
    next_id: i64,
}

impl State {
    fn find_by_value(&self, value: &str) -> Option<SubstanceId> {
        self.identifiers.iter().find(|i| i.value == value).map(|i| i.substance_id)
    }

    fn require(&self, id: SubstanceId) -> Result<(), RepositoryError> {
        if self.substances.iter().any(|s| s.id == id) {
            Ok(())
        } else {
            Err(RepositoryError::NotFound(format!("substance {id}")))
        }
    }
}

/// Repositorio en memoria (tests, CLI sin base de datos).
///
/// `write_atomically` trabaja sobre una copia del estado bajo el lock de
/// escritura y sólo la publica si la unidad termina bien.
#[derive(Debug)]
pub struct InMemorySubstanceRepository {
    state: RwLock<State>,
    templates: RwLock<HashMap<String, Template>>,
    elements: ElementTable,
}

impl InMemorySubstanceRepository {
    pub fn new(elements: ElementTable) -> Self {
        Self { state: RwLock::new(State { next_id: 1, ..State::default() }),
               templates: RwLock::new(HashMap::new()),
               elements }
    }

    /// Repositorio con la tabla de elementos incluida en `chem-domain`.
    pub fn with_bundled_elements() -> Result<Self, RepositoryError> {
        let table = ElementTable::bundled().map_err(|e| RepositoryError::Backend(e.to_string()))?;
        Ok(Self::new(table.clone()))
    }

    pub fn insert_template(&self, template: Template) -> Result<(), RepositoryError> {
        self.templates
            .write()
            .map_err(|_| poisoned())?
            .insert(template.category().to_string(), template);
        Ok(())
    }

    pub fn substance_count(&self) -> usize {
        self.read().map(|s| s.substances.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, RepositoryError> {
        self.state.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, RepositoryError> {
        self.state.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Backend("in-memory store lock poisoned".into())
}

struct StagedWriter<'a> {
    state: &'a mut State,
}

impl SubstanceWriter for StagedWriter<'_> {
    fn find_substance_id(&mut self, value: &str) -> Result<Option<SubstanceId>, RepositoryError> {
        Ok(self.state.find_by_value(value))
    }

    fn create_substance(&mut self, fields: &NewSubstance) -> Result<SubstanceId, RepositoryError> {
        let id = SubstanceId(self.state.next_id);
        self.state.next_id += 1;
        self.state.substances.push(fields.clone().into_substance(id, Utc::now()));
        Ok(id)
    }

    fn append_identifiers(&mut self, id: SubstanceId, rows: &[FragmentRow]) -> Result<(), RepositoryError> {
        self.state.require(id)?;
        self.state.identifiers.extend(rows.iter().cloned().map(|r| Identifier::from_row(id, r)));
        Ok(())
    }

    fn append_descriptors(&mut self, id: SubstanceId, rows: &[FragmentRow]) -> Result<(), RepositoryError> {
        self.state.require(id)?;
        self.state.descriptors.extend(rows.iter().cloned().map(|r| Descriptor::from_row(id, r)));
        Ok(())
    }

    fn append_source_outcomes(&mut self, id: SubstanceId, reports: &[SourceReport]) -> Result<(), RepositoryError> {
        self.state.require(id)?;
        self.state.outcomes.extend(reports.iter().cloned().map(|r| SourceOutcome::from_report(id, r)));
        Ok(())
    }
}

impl ReferenceData for InMemorySubstanceRepository {
    fn get_template(&self, category: &str) -> Result<Template, RepositoryError> {
        self.templates
            .read()
            .map_err(|_| poisoned())?
            .get(category)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("template for category '{category}'")))
    }

    fn get_element_reference(&self, value: &str, from: ElementField, to: ElementField) -> Result<Option<String>, RepositoryError> {
        self.elements.lookup(value, from, to).map_err(|e| RepositoryError::Backend(e.to_string()))
    }
}

impl SubstanceRepository for InMemorySubstanceRepository {
    fn find_substance_by_identifier_value(&self, value: &str) -> Result<Option<Substance>, RepositoryError> {
        let state = self.read()?;
        Ok(state.find_by_value(value).and_then(|id| state.substances.iter().find(|s| s.id == id).cloned()))
    }

    fn get_substance(&self, id: SubstanceId) -> Result<Option<Substance>, RepositoryError> {
        Ok(self.read()?.substances.iter().find(|s| s.id == id).cloned())
    }

    fn identifiers_for(&self, id: SubstanceId) -> Result<Vec<Identifier>, RepositoryError> {
        Ok(self.read()?.identifiers.iter().filter(|i| i.substance_id == id).cloned().collect())
    }

    fn descriptors_for(&self, id: SubstanceId) -> Result<Vec<Descriptor>, RepositoryError> {
        Ok(self.read()?.descriptors.iter().filter(|d| d.substance_id == id).cloned().collect())
    }

    fn source_outcomes_for(&self, id: SubstanceId) -> Result<Vec<SourceOutcome>, RepositoryError> {
        Ok(self.read()?.outcomes.iter().filter(|o| o.substance_id == id).cloned().collect())
    }

    fn search(&self, query: &str) -> Result<Vec<Substance>, RepositoryError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.read()?;
        Ok(state.substances
                .iter()
                .filter(|s| state.identifiers.iter().any(|i| i.substance_id == s.id && i.value.to_lowercase().contains(&needle)))
                .cloned()
                .collect())
    }

    fn attach_graph_location(&self, id: SubstanceId, location: &str) -> Result<(), RepositoryError> {
        let mut state = self.write()?;
        let substance = state.substances
                             .iter_mut()
                             .find(|s| s.id == id)
                             .ok_or_else(|| RepositoryError::NotFound(format!("substance {id}")))?;
        substance.graphdb = Some(location.to_string());
        Ok(())
    }

    fn write_atomically(&self, unit: &mut WriteUnit<'_>) -> Result<SubstanceId, RepositoryError> {
        let mut state = self.write()?;
        let mut staged = state.clone();
        let id = unit(&mut StagedWriter { state: &mut staged })?;
        *state = staged;
        Ok(id)
    }
}

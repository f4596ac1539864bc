//! Tabla de referencia de elementos con la forma de la tabla periódica de
//! PubChem (`Table.Columns.Column` + `Table.Row[].Cell`) y una columna extra
//! `ChEBI`.
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::DomainError;

static BUNDLED: Lazy<Result<ElementTable, DomainError>> =
    Lazy::new(|| ElementTable::from_json(include_str!("../data/elements.json")));

/// Columnas conocidas de la tabla.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementField {
    AtomicNumber,
    Symbol,
    Name,
    Chebi,
}

impl ElementField {
    pub fn column(&self) -> &'static str {
        match self {
            ElementField::AtomicNumber => "AtomicNumber",
            ElementField::Symbol => "Symbol",
            ElementField::Name => "Name",
            ElementField::Chebi => "ChEBI",
        }
    }
}

#[derive(Deserialize)]
struct RawTable {
    #[serde(rename = "Table")]
    table: RawInner,
}

#[derive(Deserialize)]
struct RawInner {
    #[serde(rename = "Columns")]
    columns: RawColumns,
    #[serde(rename = "Row")]
    rows: Vec<RawRow>,
}

#[derive(Deserialize)]
struct RawColumns {
    #[serde(rename = "Column")]
    column: Vec<String>,
}

#[derive(Deserialize)]
struct RawRow {
    #[serde(rename = "Cell")]
    cell: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ElementTable {
    pub fn from_json(raw: &str) -> Result<Self, DomainError> {
        let parsed: RawTable = serde_json::from_str(raw)?;
        let columns = parsed.table.columns.column;
        let rows: Vec<Vec<String>> = parsed.table.rows.into_iter().map(|r| r.cell).collect();
        if let Some(pos) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(DomainError::ElementTable(format!("row {} has {} cells, expected {}", pos + 1, rows[pos].len(), columns.len())));
        }
        Ok(Self { columns, rows })
    }

    /// Tabla incluida en el crate.
    pub fn bundled() -> Result<&'static ElementTable, DomainError> {
        Lazy::force(&BUNDLED).as_ref().map_err(Clone::clone)
    }

    fn column_index(&self, field: ElementField) -> Result<usize, DomainError> {
        self.columns
            .iter()
            .position(|c| c == field.column())
            .ok_or_else(|| DomainError::ElementTable(format!("missing column '{}'", field.column())))
    }

    /// Busca la fila cuyo `from` es igual a `value` y devuelve su columna `to`.
    pub fn lookup(&self, value: &str, from: ElementField, to: ElementField) -> Result<Option<String>, DomainError> {
        let src = self.column_index(from)?;
        let dst = self.column_index(to)?;
        Ok(self.rows.iter().find(|row| row[src] == value).map(|row| row[dst].clone()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_table_resolves_common_elements() {
        let table = ElementTable::bundled().unwrap();
        assert!(!table.is_empty());
        assert_eq!(table.lookup("C", ElementField::Symbol, ElementField::Name).unwrap().as_deref(), Some("Carbon"));
        assert_eq!(table.lookup("H", ElementField::Symbol, ElementField::Chebi).unwrap().as_deref(), Some("obo:CHEBI_49637"));
        assert_eq!(table.lookup("Xx", ElementField::Symbol, ElementField::Name).unwrap(), None);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let table = ElementTable::bundled().unwrap();
        assert_eq!(table.lookup("CL", ElementField::Symbol, ElementField::Name).unwrap(), None);
        assert_eq!(table.lookup("Cl", ElementField::Symbol, ElementField::Name).unwrap().as_deref(), Some("Chlorine"));
    }

    #[test]
    fn rejects_ragged_rows_and_missing_columns() {
        let ragged = r#"{"Table": {"Columns": {"Column": ["Symbol", "Name"]}, "Row": [{"Cell": ["C"]}]}}"#;
        assert!(ElementTable::from_json(ragged).is_err());
        let narrow = r#"{"Table": {"Columns": {"Column": ["Symbol"]}, "Row": [{"Cell": ["C"]}]}}"#;
        let t = ElementTable::from_json(narrow).unwrap();
        assert!(t.lookup("C", ElementField::Symbol, ElementField::Chebi).is_err());
    }
}

//! Entidades canónicas: sustancia y sus filas asociadas (identificadores,
//! descriptores y resultados por fuente).
//!
//! La identidad de una sustancia es su clave canónica (InChIKey), no el id
//! sustituto. Una sustancia se crea una sola vez y sólo se modifica para
//! asociarle una ubicación en la base de grafos.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DomainError;

/// Id sustituto asignado por el repositorio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubstanceId(pub i64);

impl fmt::Display for SubstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substance {
    pub id: SubstanceId,
    pub name: String,
    pub formula: String,
    pub molweight: f64,
    pub monomass: f64,
    pub casrn: Option<String>,
    /// Ubicación (named graph) en la base de grafos, si ya fue cargada.
    pub graphdb: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Campos requeridos para crear una sustancia.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubstance {
    pub name: String,
    pub formula: String,
    pub molweight: f64,
    pub monomass: f64,
    pub casrn: Option<String>,
}

impl NewSubstance {
    pub fn new(name: &str, formula: &str, molweight: f64, monomass: f64, casrn: Option<String>) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::ValidationError("substance name must not be empty".into()));
        }
        if formula.trim().is_empty() {
            return Err(DomainError::ValidationError("substance formula must not be empty".into()));
        }
        if !molweight.is_finite() || molweight <= 0.0 {
            return Err(DomainError::ValidationError(format!("invalid molecular weight {molweight}")));
        }
        if !monomass.is_finite() || monomass <= 0.0 {
            return Err(DomainError::ValidationError(format!("invalid monoisotopic mass {monomass}")));
        }
        Ok(Self { name: name.to_string(),
                  formula: formula.to_string(),
                  molweight,
                  monomass,
                  casrn: casrn.filter(|c| !c.trim().is_empty()) })
    }

    pub fn into_substance(self, id: SubstanceId, created_at: DateTime<Utc>) -> Substance {
        Substance { id,
                    name: self.name,
                    formula: self.formula,
                    molweight: self.molweight,
                    monomass: self.monomass,
                    casrn: self.casrn,
                    graphdb: None,
                    created_at }
    }
}

/// Fila (tipo, valor, fuente) todavía sin sustancia asociada. Comparte forma
/// entre identificadores y descriptores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentRow {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    pub source: String,
}

impl FragmentRow {
    pub fn new(kind: impl Into<String>, value: impl Into<String>, source: impl Into<String>) -> Self {
        Self { kind: kind.into(), value: value.into(), source: source.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub substance_id: SubstanceId,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub substance_id: SubstanceId,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    pub source: String,
}

impl Identifier {
    pub fn from_row(substance_id: SubstanceId, row: FragmentRow) -> Self {
        Self { substance_id, kind: row.kind, value: row.value, source: row.source }
    }
}

impl Descriptor {
    pub fn from_row(substance_id: SubstanceId, row: FragmentRow) -> Self {
        Self { substance_id, kind: row.kind, value: row.value, source: row.source }
    }
}

/// Resultado de consultar una fuente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceResult {
    Success,
    Failure,
}

impl SourceResult {
    /// Representación numérica almacenada (1 éxito, 0 fallo).
    pub fn as_flag(&self) -> i16 {
        match self {
            SourceResult::Success => 1,
            SourceResult::Failure => 0,
        }
    }

    pub fn from_flag(flag: i16) -> Self {
        if flag == 0 { SourceResult::Failure } else { SourceResult::Success }
    }
}

/// Resultado de una fuente durante una agregación, antes de persistir.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    pub result: SourceResult,
    pub notes: Option<String>,
}

impl SourceReport {
    pub fn success(source: impl Into<String>) -> Self {
        Self { source: source.into(), result: SourceResult::Success, notes: None }
    }

    pub fn failure(source: impl Into<String>, notes: impl Into<String>) -> Self {
        Self { source: source.into(), result: SourceResult::Failure, notes: Some(notes.into()) }
    }

    pub fn is_success(&self) -> bool {
        self.result == SourceResult::Success
    }
}

/// Registro auditable persistido de una fuente.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub substance_id: SubstanceId,
    pub source: String,
    pub result: SourceResult,
    pub notes: Option<String>,
}

impl SourceOutcome {
    pub fn from_report(substance_id: SubstanceId, report: SourceReport) -> Self {
        Self { substance_id, source: report.source, result: report.result, notes: report.notes }
    }
}

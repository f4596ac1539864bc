//! Clasificación de identificadores químicos.
//!
//! Reglas estructurales (sensibles a mayúsculas), evaluadas en orden; la
//! primera coincidencia gana. Los patrones son mutuamente excluyentes, así que
//! el orden sólo documenta la prioridad.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static INCHIKEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{14}-[A-Z]{10}-[A-Z]$").expect("inchikey pattern"));
static INCHI: Lazy<Regex> = Lazy::new(|| Regex::new(r"^InChI=1S?/").expect("inchi pattern"));
static CASRN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{2,7}-[0-9]{2}-[0-9]$").expect("casrn pattern"));
static CHEMBL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^CHEMBL[0-9]+$").expect("chembl pattern"));
static DSSTOX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^DTXSID[0-9]+$").expect("dsstox pattern"));

/// Tipo de identificador reconocido.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    InChIKey,
    InChI,
    CasRn,
    ChemblId,
    Dsstox,
    Other,
}

impl IdentifierKind {
    /// Etiqueta usada como `type` en la tabla de identificadores.
    pub fn label(&self) -> &'static str {
        match self {
            IdentifierKind::InChIKey => "inchikey",
            IdentifierKind::InChI => "inchi",
            IdentifierKind::CasRn => "casrn",
            IdentifierKind::ChemblId => "chemblid",
            IdentifierKind::Dsstox => "dsstox",
            IdentifierKind::Other => "other",
        }
    }

    pub fn is_canonical(&self) -> bool {
        matches!(self, IdentifierKind::InChIKey)
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Clasifica un identificador. Total: lo que no coincide con ningún patrón es
/// `Other`.
pub fn classify(identifier: &str) -> IdentifierKind {
    let rules: [(&Lazy<Regex>, IdentifierKind); 5] = [(&INCHIKEY, IdentifierKind::InChIKey),
                                                       (&INCHI, IdentifierKind::InChI),
                                                       (&CASRN, IdentifierKind::CasRn),
                                                       (&CHEMBL, IdentifierKind::ChemblId),
                                                       (&DSSTOX, IdentifierKind::Dsstox)];
    rules.iter()
         .find(|(re, _)| re.is_match(identifier))
         .map(|(_, kind)| *kind)
         .unwrap_or(IdentifierKind::Other)
}

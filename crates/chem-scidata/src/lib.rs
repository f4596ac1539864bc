//! chem-scidata: documento SciData JSON-LD de una sustancia.
//!
//! - `DocumentBuilder`: plantilla + sustancia + filas -> `Document`.
//! - `MolecularGraphBuilder`: tabla de conexión -> sección `molgraph`.
//!
//! Ambos son puros y pueden usarse en paralelo sobre entradas independientes.
pub mod document;
pub mod error;
pub mod molgraph;

pub use document::{Document, DocumentBuilder, KEY_PLACEHOLDER, TITLE_PREFIX};
pub use error::DocumentError;
pub use molgraph::{AtomEntry, BondEntry, ElementEntry, ElementLookup, MolecularGraph, MolecularGraphBuilder, ReferenceLookup};

use chem_domain::Template;

const BUNDLED_COMPOUND_TEMPLATE: &str = include_str!("../templates/compound.json");

/// Plantilla `compound` incluida en el crate.
pub fn bundled_compound_template() -> Result<Template, DocumentError> {
    Ok(Template::from_json(BUNDLED_COMPOUND_TEMPLATE)?)
}

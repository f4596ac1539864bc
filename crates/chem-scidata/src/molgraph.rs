//! Grafo molecular (elementos, átomos, enlaces) a partir de una tabla de
//! conexión.
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use chem_core::ReferenceData;
use chem_domain::{ConnectionTable, ElementField, ElementTable};

use crate::{Document, DocumentError};

pub const ELEMENT_TYPE: &str = "obo:NCIT_C1940";
pub const ATOM_TYPE: &str = "obo:CHEBI_33250";
pub const BOND_TYPE: &str = "ss:SIO_011118";

/// Origen de nombres e ids cruzados (ChEBI) por símbolo.
pub trait ElementLookup {
    fn lookup_element(&self, symbol: &str, to: ElementField) -> Result<Option<String>, DocumentError>;
}

impl ElementLookup for ElementTable {
    fn lookup_element(&self, symbol: &str, to: ElementField) -> Result<Option<String>, DocumentError> {
        Ok(self.lookup(symbol, ElementField::Symbol, to)?)
    }
}

/// Adapta cualquier `ReferenceData` (p. ej. un repositorio) como `ElementLookup`.
pub struct ReferenceLookup<'a, R: ReferenceData + ?Sized>(pub &'a R);

impl<R: ReferenceData + ?Sized> ElementLookup for ReferenceLookup<'_, R> {
    fn lookup_element(&self, symbol: &str, to: ElementField) -> Result<Option<String>, DocumentError> {
        self.0
            .get_element_reference(symbol, ElementField::Symbol, to)
            .map_err(|e| DocumentError::Reference(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementEntry {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub kind: &'static str,
    pub name: String,
    /// Id ChEBI del elemento.
    pub element: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtomEntry {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub kind: &'static str,
    pub element: String,
    pub xcoord: f64,
    pub ycoord: f64,
    pub zcoord: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub singlebonds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doublebonds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triplebonds: Option<u32>,
}

impl AtomEntry {
    pub fn bond_count(&self) -> u32 {
        self.singlebonds.unwrap_or(0) + self.doublebonds.unwrap_or(0) + self.triplebonds.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BondEntry {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub kind: &'static str,
    pub order: u8,
    pub atoms: [String; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MolecularGraph {
    pub elements: Vec<ElementEntry>,
    pub atoms: Vec<AtomEntry>,
    pub bonds: Vec<BondEntry>,
}

impl MolecularGraph {
    /// Ids ChEBI de los elementos, en orden de índice.
    pub fn element_ids(&self) -> Vec<&str> {
        self.elements.iter().map(|e| e.element.as_str()).collect()
    }

    /// Escribe `molgraph` en la faceta de `section` y añade los ids de
    /// elementos a `@graph.ids`.
    pub fn apply_to(&self, doc: &mut Document, section: &str) -> Result<(), DocumentError> {
        let value = serde_json::to_value(self)?;
        doc.facet_mut(section)?.insert("molgraph".into(), value);
        let graph = doc.graph_mut()?;
        let ids = graph.entry("ids")
                       .or_insert_with(|| Value::Array(Vec::new()))
                       .as_array_mut()
                       .ok_or_else(|| DocumentError::Template("@graph.ids must be an array".into()))?;
        ids.extend(self.element_ids().into_iter().map(|id| Value::String(id.to_string())));
        Ok(())
    }
}

fn element_ref(idx: usize) -> String {
    format!("element/{idx}/")
}

fn atom_ref(idx: usize) -> String {
    format!("atom/{idx}/")
}

pub struct MolecularGraphBuilder<'a, L: ElementLookup + ?Sized> {
    lookup: &'a L,
}

impl<'a, L: ElementLookup + ?Sized> MolecularGraphBuilder<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self { lookup }
    }

    pub fn build(&self, table: &ConnectionTable) -> Result<MolecularGraph, DocumentError> {
        // Símbolos distintos en orden de primera aparición -> índice 1-based.
        let mut symbols: Vec<&str> = Vec::new();
        for atom in &table.atoms {
            if !symbols.contains(&atom.symbol.as_str()) {
                symbols.push(&atom.symbol);
            }
        }

        let mut elements = Vec::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            let unknown = || DocumentError::UnknownElement(symbol.to_string());
            let name = self.lookup.lookup_element(symbol, ElementField::Name)?.ok_or_else(unknown)?;
            let chebi = self.lookup.lookup_element(symbol, ElementField::Chebi)?.ok_or_else(unknown)?;
            elements.push(ElementEntry { id: element_ref(i + 1), kind: ELEMENT_TYPE, name, element: chebi });
        }

        // (átomo 1-based, orden) -> número de enlaces.
        let mut stats: HashMap<(usize, u8), u32> = HashMap::new();
        for (i, bond) in table.bonds.iter().enumerate() {
            let invalid = |details: String| DocumentError::InvalidBond { index: i + 1, details };
            if !(1..=3).contains(&bond.order) {
                return Err(invalid(format!("unsupported bond order {}", bond.order)));
            }
            for atom in [bond.atom1, bond.atom2] {
                if atom == 0 || atom > table.atoms.len() {
                    return Err(invalid(format!("atom {atom} is outside 1..={}", table.atoms.len())));
                }
            }
            if bond.atom1 == bond.atom2 {
                return Err(invalid(format!("atom {} is bonded to itself", bond.atom1)));
            }
            *stats.entry((bond.atom1, bond.order)).or_insert(0) += 1;
            *stats.entry((bond.atom2, bond.order)).or_insert(0) += 1;
        }

        let atoms = table.atoms
                         .iter()
                         .enumerate()
                         .map(|(i, atom)| {
                             let idx = i + 1;
                             let element = symbols.iter().position(|s| *s == atom.symbol).map(|e| e + 1).unwrap_or_default();
                             AtomEntry { id: atom_ref(idx),
                                         kind: ATOM_TYPE,
                                         element: element_ref(element),
                                         xcoord: atom.x,
                                         ycoord: atom.y,
                                         zcoord: atom.z,
                                         singlebonds: stats.get(&(idx, 1)).copied(),
                                         doublebonds: stats.get(&(idx, 2)).copied(),
                                         triplebonds: stats.get(&(idx, 3)).copied() }
                         })
                         .collect();

        let bonds = table.bonds
                         .iter()
                         .enumerate()
                         .map(|(i, bond)| BondEntry { id: format!("bond/{}/", i + 1),
                                                      kind: BOND_TYPE,
                                                      order: bond.order,
                                                      atoms: [atom_ref(bond.atom1), atom_ref(bond.atom2)] })
                         .collect();

        Ok(MolecularGraph { elements, atoms, bonds })
    }
}

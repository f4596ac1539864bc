//! Tabla de conexión: átomos (coordenadas + símbolo) y enlaces (índices de
//! átomo 1-based + orden), análoga a un molfile.
use serde::{Deserialize, Serialize};

use crate::DomainError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub symbol: String,
}

impl AtomRecord {
    pub fn new(x: f64, y: f64, z: f64, symbol: &str) -> Self {
        Self { x, y, z, symbol: symbol.to_string() }
    }
}

/// Enlace entre dos átomos, con índices 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondRecord {
    pub atom1: usize,
    pub atom2: usize,
    pub order: u8,
}

impl BondRecord {
    pub fn new(atom1: usize, atom2: usize, order: u8) -> Self {
        Self { atom1, atom2, order }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTable {
    pub atoms: Vec<AtomRecord>,
    pub bonds: Vec<BondRecord>,
}

impl ConnectionTable {
    pub fn new(atoms: Vec<AtomRecord>, bonds: Vec<BondRecord>) -> Self {
        Self { atoms, bonds }
    }

    /// Lee el primer bloque de un molfile/SDF V2000.
    pub fn from_molfile(text: &str) -> Result<Self, DomainError> {
        let lines: Vec<(usize, &str)> = text.lines()
                                            .enumerate()
                                            .map(|(i, l)| (i + 1, l))
                                            .take_while(|(_, l)| l.trim() != "$$$$")
                                            .collect();
        if lines.len() < 4 {
            return Err(DomainError::molfile(1, "molfile must contain a header block and a counts line"));
        }
        let (counts_no, counts_line) = lines[3];
        if counts_line.contains("V3000") {
            return Err(DomainError::molfile(counts_no, "V3000 is not supported"));
        }
        let (atom_count, bond_count) = parse_counts(counts_line, counts_no)?;
        let atom_start = 4;
        let bond_start = atom_start + atom_count;
        if lines.len() < bond_start + bond_count {
            let last = lines.last().map(|(ln, _)| *ln).unwrap_or(counts_no);
            return Err(DomainError::molfile(last, "molfile ended before atoms/bonds were fully specified"));
        }
        let atoms = lines[atom_start..bond_start].iter()
                                                 .map(|(ln, raw)| parse_atom(raw, *ln))
                                                 .collect::<Result<Vec<_>, _>>()?;
        let bonds = lines[bond_start..bond_start + bond_count].iter()
                                                              .map(|(ln, raw)| parse_bond(raw, *ln, atom_count))
                                                              .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { atoms, bonds })
    }
}

/// Límite de V2000: los contadores ocupan tres columnas.
const MAX_V2000_COUNT: usize = 999;

fn parse_counts(line: &str, line_no: usize) -> Result<(usize, usize), DomainError> {
    // Formato fijo aaabbb...; con respaldo por espacios para archivos mal alineados.
    let fixed = line.get(0..3).zip(line.get(3..6))
                    .and_then(|(a, b)| Some((a.trim().parse::<usize>().ok()?, b.trim().parse::<usize>().ok()?)));
    let (atoms, bonds) = match fixed {
        Some(counts) => counts,
        None => {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 2 {
                return Err(DomainError::molfile(line_no, "counts line must contain atom and bond counts"));
            }
            let atoms = tokens[0].parse::<usize>().map_err(|_| DomainError::molfile(line_no, "invalid atom count"))?;
            let bonds = tokens[1].parse::<usize>().map_err(|_| DomainError::molfile(line_no, "invalid bond count"))?;
            (atoms, bonds)
        }
    };
    if atoms > MAX_V2000_COUNT || bonds > MAX_V2000_COUNT {
        return Err(DomainError::molfile(line_no, format!("atom and bond counts must not exceed {MAX_V2000_COUNT}")));
    }
    Ok((atoms, bonds))
}

fn parse_atom(raw: &str, line_no: usize) -> Result<AtomRecord, DomainError> {
    let padded = format!("{raw:<40}");
    let coord = |range: std::ops::Range<usize>, axis: &str| {
        padded.get(range)
              .and_then(|s| s.trim().parse::<f64>().ok())
              .ok_or_else(|| DomainError::molfile(line_no, format!("invalid {axis} coordinate in atom line")))
    };
    let x = coord(0..10, "x")?;
    let y = coord(10..20, "y")?;
    let z = coord(20..30, "z")?;
    let symbol = padded.get(31..34).map(str::trim).unwrap_or_default();
    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DomainError::molfile(line_no, "invalid element symbol in atom line"));
    }
    Ok(AtomRecord::new(x, y, z, symbol))
}

fn parse_bond(raw: &str, line_no: usize, atom_count: usize) -> Result<BondRecord, DomainError> {
    let field = |range: std::ops::Range<usize>| raw.get(range).map(str::trim).filter(|s| !s.is_empty());
    let tokens: Vec<&str> = match (field(0..3), field(3..6), field(6..9)) {
        (Some(a), Some(b), Some(c)) => vec![a, b, c],
        _ => raw.split_whitespace().take(3).collect(),
    };
    if tokens.len() < 3 {
        return Err(DomainError::molfile(line_no, "invalid bond line"));
    }
    let a1 = tokens[0].parse::<usize>().map_err(|_| DomainError::molfile(line_no, "invalid first atom index"))?;
    let a2 = tokens[1].parse::<usize>().map_err(|_| DomainError::molfile(line_no, "invalid second atom index"))?;
    let order = tokens[2].parse::<u8>().map_err(|_| DomainError::molfile(line_no, "invalid bond order value"))?;
    if a1 == 0 || a2 == 0 || a1 > atom_count || a2 > atom_count {
        return Err(DomainError::molfile(line_no, "bond references atom outside declared range"));
    }
    Ok(BondRecord::new(a1, a2, order))
}

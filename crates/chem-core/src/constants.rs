//! Nombres de campos y fuentes por defecto usados al extraer los datos
//! requeridos de una agregación.

/// Fuente principal: metadatos de la sustancia (fórmula, masas, nombre).
pub const DEFAULT_PRIMARY_SOURCE: &str = "pubchem";
/// Fuente secundaria: número CAS.
pub const DEFAULT_SECONDARY_SOURCE: &str = "wikidata";

pub const META_NAME: &str = "name";
pub const META_FORMULA: &str = "formula";
pub const META_MOLWEIGHT: &str = "mw";
pub const META_MONOMASS: &str = "mim";

pub const IDENT_IUPAC_NAME: &str = "iupacname";
pub const IDENT_CASRN: &str = "casrn";

/// Fuente registrada para las filas que aporta la propia petición (identificador
/// de entrada y clave canónica) cuando ningún proveedor las devolvió.
pub const REQUEST_SOURCE: &str = "request";

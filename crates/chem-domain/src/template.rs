//! Plantillas de documento: esqueleto JSON-LD estático por categoría más la
//! lista de campos (`FieldSpec`) a poblar.
//!
//! Las filas crudas (`FieldSpecRow`, tal como se almacenan) se validan una sola
//! vez al construir el `Template`; el builder sólo ve variantes tipadas.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DomainError;

/// Subsección de una faceta a la que apunta un campo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsection {
    Identifiers,
    Descriptors,
}

impl Subsection {
    pub fn key(&self) -> &'static str {
        match self {
            Subsection::Identifiers => "identifiers",
            Subsection::Descriptors => "descriptors",
        }
    }

    fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw.trim() {
            "identifiers" => Ok(Subsection::Identifiers),
            "descriptors" => Ok(Subsection::Descriptors),
            other => Err(DomainError::InvalidTemplate(format!("unknown subsection '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datatype {
    #[serde(rename = "xsd:string")]
    String,
    #[serde(rename = "xsd:integer")]
    Integer,
    #[serde(rename = "xsd:nonNegativeInteger")]
    NonNegativeInteger,
}

impl Datatype {
    pub fn tag(&self) -> &'static str {
        match self {
            Datatype::String => "xsd:string",
            Datatype::Integer => "xsd:integer",
            Datatype::NonNegativeInteger => "xsd:nonNegativeInteger",
        }
    }

    fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw.trim() {
            "xsd:string" => Ok(Datatype::String),
            "xsd:integer" => Ok(Datatype::Integer),
            "xsd:nonNegativeInteger" => Ok(Datatype::NonNegativeInteger),
            other => Err(DomainError::InvalidTemplate(format!("unknown datatype '{other}'"))),
        }
    }
}

/// Modo de escritura en la subsección destino.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Fusiona una entrada con clave en la subsección.
    Datum,
    /// Reemplaza por completo el valor de la clave.
    Array,
}

/// Fila cruda de metadatos de campo (forma de almacenamiento).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpecRow {
    pub label: String,
    pub section: String,
    pub subsection: String,
    pub datatype: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

/// Campo validado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub label: String,
    /// Faceta destino (p. ej. `compound`).
    pub section: String,
    pub subsection: Subsection,
    pub datatype: Datatype,
    pub output: Option<OutputMode>,
    /// Etiquetas a fusionar en un único arreglo.
    pub group: Option<Vec<String>>,
}

impl TryFrom<FieldSpecRow> for FieldSpec {
    type Error = DomainError;

    fn try_from(row: FieldSpecRow) -> Result<Self, Self::Error> {
        let label = row.label.trim().to_string();
        if label.is_empty() {
            return Err(DomainError::InvalidTemplate("field label must not be empty".into()));
        }
        let section = row.section.trim().to_string();
        if section.is_empty() {
            return Err(DomainError::InvalidTemplate(format!("field '{label}' has no section")));
        }
        let subsection = Subsection::parse(&row.subsection)?;
        let datatype = Datatype::parse(&row.datatype)?;
        let output = match row.output.as_deref().map(str::trim) {
            None | Some("") => None,
            Some("datum") => Some(OutputMode::Datum),
            Some("array") => Some(OutputMode::Array),
            Some(other) => return Err(DomainError::InvalidTemplate(format!("field '{label}': unknown output '{other}'"))),
        };
        let group = match row.group.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let labels: Vec<String> = raw.split(',').map(|s| s.trim().to_string()).collect();
                if labels.iter().any(|l| l.is_empty()) {
                    return Err(DomainError::InvalidTemplate(format!("field '{label}': empty label in group '{raw}'")));
                }
                Some(labels)
            }
        };
        if group.is_some() && subsection != Subsection::Descriptors {
            return Err(DomainError::InvalidTemplate(format!("field '{label}': groups are only valid for descriptors")));
        }
        Ok(FieldSpec { label, section, subsection, datatype, output, group })
    }
}

impl From<&FieldSpec> for FieldSpecRow {
    fn from(field: &FieldSpec) -> Self {
        FieldSpecRow { label: field.label.clone(),
                       section: field.section.clone(),
                       subsection: field.subsection.key().to_string(),
                       datatype: field.datatype.tag().to_string(),
                       output: field.output.map(|o| match o {
                                                   OutputMode::Datum => "datum".to_string(),
                                                   OutputMode::Array => "array".to_string(),
                                               }),
                       group: field.group.as_ref().map(|g| g.join(",")) }
    }
}

/// Plantilla validada para una categoría de sustancia.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    category: String,
    skeleton: Value,
    fields: Vec<FieldSpec>,
}

/// Forma serializada de una plantilla (archivo o columna JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateFile {
    pub category: String,
    pub skeleton: Value,
    #[serde(default)]
    pub fields: Vec<FieldSpecRow>,
}

impl Template {
    pub fn new(category: &str, skeleton: Value, rows: Vec<FieldSpecRow>) -> Result<Self, DomainError> {
        let fields = rows.into_iter().map(FieldSpec::try_from).collect::<Result<Vec<_>, _>>()?;
        let facets = skeleton.pointer("/@graph/scidata/system/facets")
                             .and_then(Value::as_array)
                             .ok_or_else(|| DomainError::InvalidTemplate("skeleton lacks @graph.scidata.system.facets".into()))?;
        if !skeleton.pointer("/@graph").map(Value::is_object).unwrap_or(false) {
            return Err(DomainError::InvalidTemplate("skeleton @graph must be an object".into()));
        }
        for field in &fields {
            let prefix = format!("{}/", field.section);
            let found = facets.iter()
                              .any(|f| f.get("@id").and_then(Value::as_str).map(|id| id.starts_with(&prefix)).unwrap_or(false));
            if !found {
                return Err(DomainError::InvalidTemplate(format!("field '{}' targets missing facet '{}'", field.label, field.section)));
            }
        }
        Ok(Self { category: category.to_string(), skeleton, fields })
    }

    pub fn from_file(file: TemplateFile) -> Result<Self, DomainError> {
        Self::new(&file.category, file.skeleton, file.fields)
    }

    pub fn from_json(raw: &str) -> Result<Self, DomainError> {
        let file: TemplateFile = serde_json::from_str(raw)?;
        Self::from_file(file)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn skeleton(&self) -> &Value {
        &self.skeleton
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

//! Construcción del documento SciData (JSON-LD) de una sustancia a partir de
//! una plantilla declarativa.
//!
//! El esqueleto se copia tal cual; luego se fijan la procedencia, los escalares
//! de la faceta de la categoría y cada `FieldSpec` en orden de plantilla. El
//! campo de clave canónica desbloquea la sustitución de `<inchikey>` en todos
//! sus sitios; al terminar no puede quedar ningún marcador en el documento.
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use serde::Serialize;
use serde_json::{Map, Value};

use chem_domain::{Datatype, Descriptor, FieldSpec, Identifier, OutputMode, Subsection, Substance, Template, CANONICAL_KEY_LABEL};

use crate::DocumentError;

/// Marcador reservado que se sustituye por la clave canónica.
pub const KEY_PLACEHOLDER: &str = "<inchikey>";
pub const TITLE_PREFIX: &str = "Chemical Substance SciData JSON-LD file for ";
const FACETS_POINTER: &str = "/@graph/scidata/system/facets";

/// Documento terminado; carga opaca para el consumidor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Document(Value);

impl Document {
    pub(crate) fn from_value(value: Value) -> Self {
        Document(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Primer `@base` de `@context`.
    pub fn base(&self) -> Option<&str> {
        let ctx = self.0.get("@context")?;
        let entries: Vec<&Value> = match ctx {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        entries.into_iter().find_map(|e| e.get("@base").and_then(Value::as_str))
    }

    pub fn permalink(&self) -> Option<&str> {
        self.0.pointer("/@graph/permalink").and_then(Value::as_str)
    }

    pub fn uid(&self) -> Option<&str> {
        self.0.pointer("/@graph/uid").and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.0.pointer("/@graph/title").and_then(Value::as_str)
    }

    /// Lista global `@graph.ids`.
    pub fn graph_ids(&self) -> Vec<&str> {
        self.0
            .pointer("/@graph/ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Primera faceta cuyo `@id` empieza por `<section>/`.
    pub fn facet(&self, section: &str) -> Option<&Value> {
        let idx = facet_index(&self.0, section)?;
        self.0.pointer(FACETS_POINTER)?.as_array()?.get(idx)
    }

    pub fn to_pretty_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(&self.0)?)
    }

    pub(crate) fn facet_mut(&mut self, section: &str) -> Result<&mut Map<String, Value>, DocumentError> {
        let idx = facet_index(&self.0, section).ok_or_else(|| DocumentError::Template(format!("no facet for section '{section}'")))?;
        self.0
            .pointer_mut(FACETS_POINTER)
            .and_then(Value::as_array_mut)
            .and_then(|facets| facets.get_mut(idx))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| DocumentError::Template(format!("facet for section '{section}' is not an object")))
    }

    pub(crate) fn graph_mut(&mut self) -> Result<&mut Map<String, Value>, DocumentError> {
        self.0
            .get_mut("@graph")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| DocumentError::Template("@graph must be an object".into()))
    }
}

fn facet_index(doc: &Value, section: &str) -> Option<usize> {
    let prefix = format!("{section}/");
    doc.pointer(FACETS_POINTER)?
       .as_array()?
       .iter()
       .position(|f| f.get("@id").and_then(Value::as_str).map(|id| id.starts_with(&prefix)).unwrap_or(false))
}

/// Constructor puro: no guarda estado entre llamadas.
#[derive(Debug, Clone, Copy)]
pub struct DocumentBuilder<'t> {
    template: &'t Template,
}

impl<'t> DocumentBuilder<'t> {
    pub fn new(template: &'t Template) -> Self {
        Self { template }
    }

    pub fn build(&self, substance: &Substance, identifiers: &[Identifier], descriptors: &[Descriptor]) -> Result<Document, DocumentError> {
        self.build_at(substance, identifiers, descriptors, Utc::now())
    }

    /// Igual que `build` con la marca de generación fijada.
    pub fn build_at(&self,
                    substance: &Substance,
                    identifiers: &[Identifier],
                    descriptors: &[Descriptor],
                    generated_at: DateTime<Utc>)
                    -> Result<Document, DocumentError> {
        let mut doc = Document::from_value(self.template.skeleton().clone());
        let root = doc.0
                      .as_object_mut()
                      .ok_or_else(|| DocumentError::Template("skeleton must be a JSON object".into()))?;
        root.insert("generatedAt".into(), Value::String(generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)));
        doc.graph_mut()?.insert("title".into(), Value::String(format!("{TITLE_PREFIX}{}", substance.name)));

        let facet = doc.facet_mut(self.template.category())?;
        facet.insert("name".into(), Value::String(substance.name.clone()));
        facet.insert("formula".into(), Value::String(substance.formula.clone()));
        facet.insert("molweight".into(), Value::from(substance.molweight));
        facet.insert("monoisotopicmass".into(), Value::from(substance.monomass));

        for field in self.template.fields() {
            let value = match field.subsection {
                Subsection::Identifiers => match stored_identifier(identifiers, &field.label) {
                    Some(v) => {
                        if field.label == CANONICAL_KEY_LABEL {
                            substitute_key(&mut doc, v)?;
                        }
                        Some(Value::String(v.to_string()))
                    }
                    None => {
                        debug!("document:field_missing substance_id={} label={}", substance.id, field.label);
                        None
                    }
                },
                Subsection::Descriptors => Some(match &field.group {
                    None => descriptor_value(descriptors, &field.label),
                    Some(group) => grouped_value(field, group, descriptors)?,
                }),
            };
            if let (Some(value), Some(mode)) = (value, field.output) {
                write_field(&mut doc, field, mode, value)?;
            }
        }

        ensure_resolved(&doc.0, "$")?;
        Ok(doc)
    }
}

/// Con varios identificadores del mismo tipo gana el último almacenado.
fn stored_identifier<'a>(identifiers: &'a [Identifier], label: &str) -> Option<&'a str> {
    identifiers.iter().rev().find(|i| i.kind == label).map(|i| i.value.as_str())
}

/// Un único valor se emite como escalar; cualquier otro número como lista completa, con repetidos.
fn descriptor_value(descriptors: &[Descriptor], label: &str) -> Value {
    let values: Vec<&str> = descriptors.iter().filter(|d| d.kind == label).map(|d| d.value.as_str()).collect();
    match values.as_slice() {
        [single] => Value::String(single.to_string()),
        many => Value::Array(many.iter().map(|v| Value::String(v.to_string())).collect()),
    }
}

fn grouped_value(field: &FieldSpec, group: &[String], descriptors: &[Descriptor]) -> Result<Value, DocumentError> {
    let mut out = Vec::new();
    for label in group {
        for d in descriptors.iter().filter(|d| &d.kind == label) {
            out.push(coerce(label, &d.value, field.datatype)?);
        }
    }
    Ok(Value::Array(out))
}

fn coerce(label: &str, raw: &str, datatype: Datatype) -> Result<Value, DocumentError> {
    let mismatch = || DocumentError::TypeMismatch { label: label.to_string(), value: raw.to_string(), datatype: datatype.tag() };
    match datatype {
        Datatype::String => Ok(Value::String(raw.to_string())),
        Datatype::Integer => raw.trim().parse::<i64>().map(Value::from).map_err(|_| mismatch()),
        Datatype::NonNegativeInteger => raw.trim().parse::<u64>().map(Value::from).map_err(|_| mismatch()),
    }
}

fn write_field(doc: &mut Document, field: &FieldSpec, mode: OutputMode, value: Value) -> Result<(), DocumentError> {
    let facet = doc.facet_mut(&field.section)?;
    let key = field.subsection.key();
    let target = facet.entry(key)
                      .or_insert_with(|| Value::Object(Map::new()))
                      .as_object_mut()
                      .ok_or_else(|| DocumentError::Template(format!("'{}' in facet '{}' is not an object", key, field.section)))?;
    let value = match (mode, value) {
        (OutputMode::Datum, v) => v,
        (OutputMode::Array, Value::Array(items)) => Value::Array(items),
        (OutputMode::Array, v) => Value::Array(vec![v]),
    };
    target.insert(field.label.clone(), value);
    Ok(())
}

/// Sustituye el marcador en cada `@base` de `@context`, fija `@graph.@id` y
/// `@graph.permalink` a la base resuelta y reescribe `@graph.uid`.
fn substitute_key(doc: &mut Document, key: &str) -> Result<(), DocumentError> {
    let mut base: Option<String> = None;
    if let Some(ctx) = doc.0.get_mut("@context") {
        let entries: Vec<&mut Map<String, Value>> = match ctx {
            Value::Array(items) => items.iter_mut().filter_map(Value::as_object_mut).collect(),
            Value::Object(map) => vec![map],
            _ => Vec::new(),
        };
        for entry in entries {
            if let Some(Value::String(b)) = entry.get_mut("@base") {
                *b = b.replace(KEY_PLACEHOLDER, key);
                base.get_or_insert_with(|| b.clone());
            }
        }
    }
    let base = base.ok_or_else(|| DocumentError::Template("@context has no @base entry".into()))?;

    let graph = doc.graph_mut()?;
    graph.insert("@id".into(), Value::String(base.clone()));
    graph.insert("permalink".into(), Value::String(base));
    let uid = match graph.get("uid").and_then(Value::as_str) {
        Some(uid) => uid.replace(KEY_PLACEHOLDER, key),
        None => key.to_string(),
    };
    graph.insert("uid".into(), Value::String(uid));
    Ok(())
}

fn ensure_resolved(value: &Value, path: &str) -> Result<(), DocumentError> {
    match value {
        Value::String(s) if s.contains(KEY_PLACEHOLDER) => Err(DocumentError::UnresolvedPlaceholder(path.to_string())),
        Value::Array(items) => items.iter().enumerate().try_for_each(|(i, v)| ensure_resolved(v, &format!("{path}[{i}]"))),
        Value::Object(map) => map.iter().try_for_each(|(k, v)| ensure_resolved(v, &format!("{path}.{k}"))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chem_domain::{FieldSpecRow, SubstanceId};
    use chrono::TimeZone;
    use serde_json::json;

    const KEY: &str = "LFQSCWFLJHTTHZ-UHFFFAOYSA-N";

    fn skeleton() -> Value {
        json!({
            "@context": ["https://example.org/scidata.jsonld", {"sci": "https://example.org/sci#"}, {"@base": "https://example.org/substance/<inchikey>/"}],
            "@id": "",
            "generatedAt": "",
            "@graph": {
                "@id": "",
                "uid": "scidata:substance:<inchikey>",
                "title": "",
                "permalink": "",
                "ids": [],
                "scidata": {"system": {"facets": [
                    {"@id": "measurement/1/"},
                    {"@id": "compound/1/", "identifiers": {}, "descriptors": {}}
                ]}}
            }
        })
    }

    fn row(label: &str, subsection: &str, datatype: &str, output: Option<&str>, group: Option<&str>) -> FieldSpecRow {
        FieldSpecRow { label: label.into(),
                       section: "compound".into(),
                       subsection: subsection.into(),
                       datatype: datatype.into(),
                       output: output.map(String::from),
                       group: group.map(String::from) }
    }

    fn template(rows: Vec<FieldSpecRow>) -> Template {
        Template::new("compound", skeleton(), rows).unwrap()
    }

    fn ethanol() -> Substance {
        Substance { id: SubstanceId(1),
                    name: "ethanol".into(),
                    formula: "C2H6O".into(),
                    molweight: 46.07,
                    monomass: 46.041864811,
                    casrn: Some("64-17-5".into()),
                    graphdb: None,
                    created_at: Utc::now() }
    }

    fn ident(kind: &str, value: &str) -> Identifier {
        Identifier { substance_id: SubstanceId(1), kind: kind.into(), value: value.into(), source: "pubchem".into() }
    }

    fn desc(kind: &str, value: &str, source: &str) -> Descriptor {
        Descriptor { substance_id: SubstanceId(1), kind: kind.into(), value: value.into(), source: source.into() }
    }

    fn key_row() -> FieldSpecRow {
        row("inchikey", "identifiers", "xsd:string", Some("datum"), None)
    }

    #[test]
    fn key_substitution_is_consistent_across_sites() {
        let t = template(vec![key_row()]);
        let doc = DocumentBuilder::new(&t).build(&ethanol(), &[ident("inchikey", KEY)], &[]).unwrap();
        let base = format!("https://example.org/substance/{KEY}/");
        assert_eq!(doc.base(), Some(base.as_str()));
        assert_eq!(doc.permalink(), Some(base.as_str()));
        assert_eq!(doc.as_value()["@graph"]["@id"], json!(base));
        assert_eq!(doc.uid(), Some(format!("scidata:substance:{KEY}").as_str()));
        assert!(!doc.to_pretty_json().unwrap().contains(KEY_PLACEHOLDER));
        assert_eq!(doc.facet("compound").unwrap()["identifiers"]["inchikey"], json!(KEY));
    }

    #[test]
    fn missing_key_leaves_placeholder_error() {
        let t = template(vec![key_row()]);
        let err = DocumentBuilder::new(&t).build(&ethanol(), &[ident("inchi", "InChI=1S/C2H6O")], &[]).unwrap_err();
        assert!(matches!(err, DocumentError::UnresolvedPlaceholder(ref path) if path.starts_with("$.@context")), "{err:?}");
    }

    #[test]
    fn provenance_and_scalars() {
        let t = template(vec![key_row()]);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let doc = DocumentBuilder::new(&t).build_at(&ethanol(), &[ident("inchikey", KEY)], &[], at).unwrap();
        assert_eq!(doc.as_value()["generatedAt"], json!("2024-05-01T12:00:00Z"));
        assert_eq!(doc.title(), Some("Chemical Substance SciData JSON-LD file for ethanol"));
        let facet = doc.facet("compound").unwrap();
        assert_eq!(facet["formula"], json!("C2H6O"));
        assert_eq!(facet["molweight"], json!(46.07));
        assert_eq!(facet["monoisotopicmass"], json!(46.041864811));
        // la faceta de otra sección no se toca
        assert_eq!(doc.facet("measurement").unwrap(), &json!({"@id": "measurement/1/"}));
    }

    #[test]
    fn descriptor_scalar_versus_list() {
        let t = template(vec![key_row(),
                              row("smiles", "descriptors", "xsd:string", Some("datum"), None),
                              row("inchi", "descriptors", "xsd:string", Some("datum"), None),
                              row("tautomer", "descriptors", "xsd:string", Some("datum"), None)]);
        let descs = [desc("smiles", "CCO", "pubchem"),
                     desc("smiles", "CCO", "chembl"),
                     desc("inchi", "InChI=1S/C2H6O/c1-2-3/h3H,2H2,1H3", "pubchem"),
                     desc("inchi", "InChI=1/C2H6O/c1-2-3/h3H,2H2,1H3", "chembl")];
        let doc = DocumentBuilder::new(&t).build(&ethanol(), &[ident("inchikey", KEY)], &descs).unwrap();
        let d = &doc.facet("compound").unwrap()["descriptors"];
        assert_eq!(d["smiles"], json!(["CCO", "CCO"]));
        assert_eq!(d["inchi"].as_array().map(Vec::len), Some(2));
        assert_eq!(d["tautomer"], json!([]));
    }

    #[test]
    fn single_descriptor_value_is_scalar() {
        let t = template(vec![key_row(), row("smiles", "descriptors", "xsd:string", Some("datum"), None)]);
        let doc = DocumentBuilder::new(&t).build(&ethanol(), &[ident("inchikey", KEY)], &[desc("smiles", "CCO", "pubchem")]).unwrap();
        assert_eq!(doc.facet("compound").unwrap()["descriptors"]["smiles"], json!("CCO"));
    }

    #[test]
    fn groups_coerce_declared_datatype() {
        let t = template(vec![key_row(), row("hbonds", "descriptors", "xsd:nonNegativeInteger", Some("array"), Some("hbd,hba"))]);
        let descs = [desc("hba", "1", "pubchem"), desc("hbd", " 1 ", "pubchem"), desc("hba", "2", "chembl")];
        let doc = DocumentBuilder::new(&t).build(&ethanol(), &[ident("inchikey", KEY)], &descs).unwrap();
        assert_eq!(doc.facet("compound").unwrap()["descriptors"]["hbonds"], json!([1, 1, 2]));
    }

    #[test]
    fn non_numeric_group_value_is_type_mismatch() {
        let t = template(vec![key_row(), row("charges", "descriptors", "xsd:integer", Some("array"), Some("charge"))]);
        let err = DocumentBuilder::new(&t).build(&ethanol(), &[ident("inchikey", KEY)], &[desc("charge", "n/a", "pubchem")]).unwrap_err();
        assert_eq!(err,
                   DocumentError::TypeMismatch { label: "charge".into(), value: "n/a".into(), datatype: "xsd:integer" });

        let t = template(vec![key_row(), row("rings", "descriptors", "xsd:nonNegativeInteger", Some("array"), Some("rings"))]);
        let err = DocumentBuilder::new(&t).build(&ethanol(), &[ident("inchikey", KEY)], &[desc("rings", "-1", "pubchem")]).unwrap_err();
        assert!(matches!(err, DocumentError::TypeMismatch { .. }));
    }

    #[test]
    fn output_modes() {
        let t = template(vec![key_row(),
                              row("casrn", "identifiers", "xsd:string", Some("array"), None),
                              row("inchi", "identifiers", "xsd:string", None, None)]);
        let ids = [ident("inchikey", KEY), ident("casrn", "64-17-5"), ident("inchi", "InChI=1S/C2H6O")];
        let doc = DocumentBuilder::new(&t).build(&ethanol(), &ids, &[]).unwrap();
        let i = &doc.facet("compound").unwrap()["identifiers"];
        assert_eq!(i["casrn"], json!(["64-17-5"]));
        assert!(i.get("inchi").is_none(), "fields without output are not written");
    }

    #[test]
    fn last_stored_identifier_of_a_kind_wins() {
        let t = template(vec![key_row(), row("casrn", "identifiers", "xsd:string", Some("datum"), None)]);
        let ids = [ident("inchikey", KEY), ident("casrn", "64-17-5"), ident("casrn", "00064-17-5")];
        let doc = DocumentBuilder::new(&t).build(&ethanol(), &ids, &[]).unwrap();
        assert_eq!(doc.facet("compound").unwrap()["identifiers"]["casrn"], json!("00064-17-5"));
    }
}

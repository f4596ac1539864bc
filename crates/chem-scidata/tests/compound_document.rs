use chem_core::{InMemorySubstanceRepository, ReferenceData, SubstanceRepository};
use chem_domain::{ConnectionTable, FragmentRow, NewSubstance, SourceReport};
use chem_scidata::{bundled_compound_template, DocumentBuilder, MolecularGraphBuilder, ReferenceLookup, KEY_PLACEHOLDER};
use serde_json::json;

const KEY: &str = "LFQSCWFLJHTTHZ-UHFFFAOYSA-N";

const ETHANOL_MOL: &str = "702
  -OEChem-

  3  2  0     0  0  0  0  0  0999 V2000
    2.5369   -0.1550    0.0000 O   0  0  0  0  0  0  0  0  0  0  0  0
    3.4030    0.3450    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    4.2690   -0.1550    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0  0  0  0
  2  3  1  0  0  0  0
M  END
$$$$
";

fn seeded_repo() -> InMemorySubstanceRepository {
    let repo = InMemorySubstanceRepository::with_bundled_elements().unwrap();
    repo.insert_template(bundled_compound_template().unwrap()).unwrap();
    let fields = NewSubstance::new("ethanol", "C2H6O", 46.07, 46.041864811, Some("64-17-5".into())).unwrap();
    let ids = vec![FragmentRow::new("inchikey", KEY, "pubchem"),
                   FragmentRow::new("iupacname", "ethanol", "pubchem"),
                   FragmentRow::new("pubchem", "702", "pubchem"),
                   FragmentRow::new("casrn", "64-17-5", "wikidata")];
    let descs = vec![FragmentRow::new("csmiles", "CCO", "pubchem"),
                     FragmentRow::new("hba", "1", "pubchem"),
                     FragmentRow::new("hbd", "1", "pubchem"),
                     FragmentRow::new("kingdom", "Organic compounds", "classyfire"),
                     FragmentRow::new("class", "Alcohols and polyols", "classyfire")];
    repo.write_atomically(&mut |w| {
            let id = w.create_substance(&fields)?;
            w.append_identifiers(id, &ids)?;
            w.append_descriptors(id, &descs)?;
            w.append_source_outcomes(id, &[SourceReport::success("pubchem")])?;
            Ok(id)
        })
        .unwrap();
    repo
}

#[test]
fn ethanol_document_end_to_end() {
    let repo = seeded_repo();
    let id = repo.find_substance_id(KEY).unwrap().unwrap();
    let substance = repo.get_substance(id).unwrap().unwrap();
    let template = repo.get_template("compound").unwrap();

    let mut doc = DocumentBuilder::new(&template).build(&substance,
                                                           &repo.identifiers_for(id).unwrap(),
                                                           &repo.descriptors_for(id).unwrap())
                                                    .unwrap();
    let ct = ConnectionTable::from_molfile(ETHANOL_MOL).unwrap();
    let lookup = ReferenceLookup(&repo);
    let graph = MolecularGraphBuilder::new(&lookup).build(&ct).unwrap();
    graph.apply_to(&mut doc, template.category()).unwrap();

    let base = format!("https://scidata.unf.edu/substance/{KEY}/");
    assert_eq!(doc.permalink(), Some(base.as_str()));
    assert_eq!(doc.base(), Some(base.as_str()));
    assert!(!doc.to_pretty_json().unwrap().contains(KEY_PLACEHOLDER));

    let facet = doc.facet("compound").unwrap();
    assert_eq!(facet["name"], json!("ethanol"));
    assert_eq!(facet["identifiers"]["casrn"], json!("64-17-5"));
    assert_eq!(facet["descriptors"]["csmiles"], json!("CCO"));
    assert_eq!(facet["descriptors"]["hbonds"], json!([1, 1]));
    assert_eq!(facet["descriptors"]["classes"], json!(["Organic compounds", "Alcohols and polyols"]));
    assert!(facet["identifiers"].get("chembl").is_none());

    let molgraph = &facet["molgraph"];
    assert_eq!(molgraph["elements"].as_array().unwrap().len(), 2);
    assert_eq!(molgraph["atoms"][1]["singlebonds"], json!(2));
    assert_eq!(molgraph["bonds"][1]["atoms"], json!(["atom/2/", "atom/3/"]));
    assert!(doc.graph_ids().contains(&"obo:CHEBI_25805"));
    assert!(doc.graph_ids().contains(&"obo:CHEBI_27594"));
}

#[test]
fn repository_lookup_reports_unknown_elements() {
    let repo = seeded_repo();
    let ct = ConnectionTable::from_molfile(&ETHANOL_MOL.replace(" O   0", " Qq  0")).unwrap();
    let lookup = ReferenceLookup(&repo);
    let err = MolecularGraphBuilder::new(&lookup).build(&ct).unwrap_err();
    assert_eq!(err.to_string(), "unknown element symbol 'Qq'");
    assert!(repo.get_element_reference("Qq", chem_domain::ElementField::Symbol, chem_domain::ElementField::Name).unwrap().is_none());
}

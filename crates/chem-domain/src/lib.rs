// chem-domain library entry point
pub mod connection_table;
pub mod element;
pub mod error;
pub mod identifier;
pub mod substance;
pub mod template;
pub use connection_table::{AtomRecord, BondRecord, ConnectionTable};
pub use element::{ElementField, ElementTable};
pub use error::DomainError;
pub use identifier::{classify, IdentifierKind};
pub use substance::{Descriptor, FragmentRow, Identifier, NewSubstance, SourceOutcome, SourceReport, SourceResult, Substance, SubstanceId};
pub use template::{Datatype, FieldSpec, FieldSpecRow, OutputMode, Subsection, Template, TemplateFile};

/// Etiqueta del identificador canónico (InChIKey).
pub const CANONICAL_KEY_LABEL: &str = "inchikey";

//! Pipeline de ingesta de un compuesto.
//!
//! resolver -> plantilla -> documento -> (estructura -> grafo molecular) ->
//! sink opcional. Si el sink devuelve una ubicación, se registra como
//! ubicación en el grafo de la sustancia.
use async_trait::async_trait;
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;

use chem_core::{ResolvedSubstance, StructureSource, SubstanceRepository, SubstanceResolver};
use chem_domain::Substance;
use chem_scidata::{Document, DocumentBuilder, MolecularGraphBuilder, ReferenceLookup};

use crate::errors::{IngestError, IngestStatus};

/// Destino de los documentos terminados.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Guarda el documento; devuelve su ubicación si la hay.
    async fn accept(&self, substance: &Substance, document: &Document) -> Result<Option<String>, IngestError>;
}

/// Escribe el documento como JSON indentado en una ruta fija.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DocumentSink for FileSink {
    async fn accept(&self, _substance: &Substance, document: &Document) -> Result<Option<String>, IngestError> {
        let json = document.to_pretty_json()?;
        tokio::fs::write(&self.path, json).await
                                          .map_err(|e| IngestError::Sink(format!("{}: {e}", self.path.display())))?;
        Ok(Some(self.path.display().to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub status: IngestStatus,
    pub substance: Substance,
    pub document: Document,
}

pub struct CompoundPipeline<R: SubstanceRepository + ?Sized> {
    resolver: SubstanceResolver<R>,
    category: String,
    structures: Option<Arc<dyn StructureSource>>,
    sink: Option<Arc<dyn DocumentSink>>,
}

impl<R: SubstanceRepository + ?Sized> CompoundPipeline<R> {
    pub fn new(resolver: SubstanceResolver<R>, category: &str) -> Self {
        Self { resolver, category: category.to_string(), structures: None, sink: None }
    }

    pub fn with_structures(mut self, structures: Arc<dyn StructureSource>) -> Self {
        self.structures = Some(structures);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DocumentSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn resolver(&self) -> &SubstanceResolver<R> {
        &self.resolver
    }

    pub async fn ingest(&self, identifier: &str) -> Result<IngestReport, IngestError> {
        let resolved = self.resolver.resolve(identifier).await?;
        let document = self.document_for(&resolved).await?;
        let mut substance = resolved.substance;

        if let Some(sink) = &self.sink {
            if let Some(location) = sink.accept(&substance, &document).await? {
                self.resolver.repository().attach_graph_location(substance.id, &location)?;
                debug!("ingest stored substance_id={} location={}", substance.id, location);
                substance.graphdb = Some(location);
            }
        }

        let status = IngestStatus::from(resolved.status);
        info!("ingest done identifier={} substance_id={} status={:?}", identifier, substance.id, status);
        Ok(IngestReport { status, substance, document })
    }

    async fn document_for(&self, resolved: &ResolvedSubstance) -> Result<Document, IngestError> {
        let repo = self.resolver.repository();
        let template = repo.get_template(&self.category)?;
        let mut document = DocumentBuilder::new(&template).build(&resolved.substance, &resolved.identifiers, &resolved.descriptors)?;

        if let (Some(structures), Some(key)) = (&self.structures, resolved.canonical_key()) {
            let table = structures.connection_table(key, &resolved.identifiers)
                                  .await
                                  .map_err(|source| IngestError::Structure { key: key.to_string(), source })?;
            let lookup = ReferenceLookup(repo.as_ref());
            let graph = MolecularGraphBuilder::new(&lookup).build(&table)?;
            graph.apply_to(&mut document, template.category())?;
        }
        Ok(document)
    }
}

//! Implementación Postgres (Diesel) de `SubstanceRepository`.
//!
//! - Lecturas directas con reintento ante errores transitorios.
//! - `write_atomically` ejecuta la unidad de trabajo del core dentro de una
//!   transacción `SERIALIZABLE`: dos resoluciones concurrentes de la misma
//!   clave no pueden crear dos sustancias; la perdedora falla con conflicto de
//!   serialización, se reintenta y encuentra la sustancia ya creada.
//! - La tabla de elementos es estática y vive en memoria.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, warn};
use serde_json::Value;

use chem_core::{ReferenceData, RepositoryError, SubstanceRepository, SubstanceWriter, WriteUnit};
use chem_domain::{Descriptor, ElementField, ElementTable, FieldSpecRow, FragmentRow, Identifier, NewSubstance, SourceOutcome, SourceReport,
                  SourceResult, Substance, SubstanceId, Template};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{descriptors, identifiers, metadata, sources, substances, templates};

/// Pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;
type PooledConn = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones (pool real o sustituto en tests).
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PooledConn, PersistenceError>;
}

pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PooledConn, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

#[derive(Queryable, Debug)]
pub struct SubstanceRow {
    pub id: i64,
    pub name: String,
    pub formula: String,
    pub molweight: f64,
    pub monomass: f64,
    pub casrn: Option<String>,
    pub graphdb: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<SubstanceRow> for Substance {
    fn from(row: SubstanceRow) -> Self {
        Substance { id: SubstanceId(row.id),
                    name: row.name,
                    formula: row.formula,
                    molweight: row.molweight,
                    monomass: row.monomass,
                    casrn: row.casrn,
                    graphdb: row.graphdb,
                    created_at: row.created_at }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = substances)]
struct NewSubstanceRow<'a> {
    name: &'a str,
    formula: &'a str,
    molweight: f64,
    monomass: f64,
    casrn: Option<&'a str>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = identifiers)]
struct NewIdentifierRow<'a> {
    substance_id: i64,
    kind: &'a str,
    value: &'a str,
    source: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = descriptors)]
struct NewDescriptorRow<'a> {
    substance_id: i64,
    kind: &'a str,
    value: &'a str,
    source: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = sources)]
struct NewSourceRow<'a> {
    substance_id: i64,
    source: &'a str,
    result: i16,
    notes: Option<&'a str>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = metadata)]
struct NewFieldRow<'a> {
    category: &'a str,
    position: i32,
    label: &'a str,
    section: &'a str,
    subsection: &'a str,
    datatype: &'a str,
    output: Option<&'a str>,
    grp: Option<&'a str>,
}

/// Errores transitorios: reintentar con backoff.
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        PersistenceError::Repository(RepositoryError::Unavailable(_) | RepositoryError::Serialization(_)) => true,
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Reintento con backoff lineal corto (hasta 3 reintentos: 15, 30, 45 ms).
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

fn db<T>(result: QueryResult<T>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::from(PersistenceError::from(e)))
}

/// Escritor ligado a la conexión de una transacción abierta.
struct PgWriter<'c> {
    conn: &'c mut PgConnection,
}

impl SubstanceWriter for PgWriter<'_> {
    fn find_substance_id(&mut self, value: &str) -> Result<Option<SubstanceId>, RepositoryError> {
        let id: Option<i64> = db(identifiers::table.filter(identifiers::value.eq(value))
                                                   .select(identifiers::substance_id)
                                                   .order(identifiers::id.asc())
                                                   .first(self.conn)
                                                   .optional())?;
        Ok(id.map(SubstanceId))
    }

    fn create_substance(&mut self, fields: &NewSubstance) -> Result<SubstanceId, RepositoryError> {
        let row = NewSubstanceRow { name: &fields.name,
                                    formula: &fields.formula,
                                    molweight: fields.molweight,
                                    monomass: fields.monomass,
                                    casrn: fields.casrn.as_deref() };
        let id: i64 = db(diesel::insert_into(substances::table).values(&row)
                                                                .returning(substances::id)
                                                                .get_result(self.conn))?;
        debug!("create_substance id={id} name={}", fields.name);
        Ok(SubstanceId(id))
    }

    fn append_identifiers(&mut self, id: SubstanceId, rows: &[FragmentRow]) -> Result<(), RepositoryError> {
        if rows.is_empty() {
            return Ok(());
        }
        let values: Vec<NewIdentifierRow> = rows.iter()
                                                .map(|r| NewIdentifierRow { substance_id: id.0, kind: &r.kind, value: &r.value, source: &r.source })
                                                .collect();
        db(diesel::insert_into(identifiers::table).values(&values).execute(self.conn))?;
        Ok(())
    }

    fn append_descriptors(&mut self, id: SubstanceId, rows: &[FragmentRow]) -> Result<(), RepositoryError> {
        if rows.is_empty() {
            return Ok(());
        }
        let values: Vec<NewDescriptorRow> = rows.iter()
                                                .map(|r| NewDescriptorRow { substance_id: id.0, kind: &r.kind, value: &r.value, source: &r.source })
                                                .collect();
        db(diesel::insert_into(descriptors::table).values(&values).execute(self.conn))?;
        Ok(())
    }

    fn append_source_outcomes(&mut self, id: SubstanceId, reports: &[SourceReport]) -> Result<(), RepositoryError> {
        if reports.is_empty() {
            return Ok(());
        }
        let values: Vec<NewSourceRow> = reports.iter()
                                               .map(|r| NewSourceRow { substance_id: id.0,
                                                                       source: &r.source,
                                                                       result: r.result.as_flag(),
                                                                       notes: r.notes.as_deref() })
                                               .collect();
        db(diesel::insert_into(sources::table).values(&values).execute(self.conn))?;
        Ok(())
    }
}

/// Repositorio de sustancias sobre Postgres.
pub struct PgSubstanceRepository<P: ConnectionProvider> {
    provider: P,
    elements: ElementTable,
}

impl<P: ConnectionProvider> PgSubstanceRepository<P> {
    pub fn new(provider: P, elements: ElementTable) -> Self {
        Self { provider, elements }
    }

    pub fn with_bundled_elements(provider: P) -> Result<Self, PersistenceError> {
        let table = ElementTable::bundled().map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
        Ok(Self::new(provider, table.clone()))
    }

    fn read<T>(&self, mut f: impl FnMut(&mut PgConnection) -> QueryResult<T>) -> Result<T, RepositoryError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            f(&mut *conn).map_err(PersistenceError::from)
        }).map_err(RepositoryError::from)
    }

    /// Inserta o reemplaza la plantilla de una categoría y sus campos.
    pub fn save_template(&self, template: &Template) -> Result<(), RepositoryError> {
        let rows: Vec<FieldSpecRow> = template.fields().iter().map(FieldSpecRow::from).collect();
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| {
                    diesel::insert_into(templates::table).values((templates::category.eq(template.category()),
                                                                  templates::skeleton.eq(template.skeleton())))
                                                         .on_conflict(templates::category)
                                                         .do_update()
                                                         .set((templates::skeleton.eq(template.skeleton()), templates::updated.eq(diesel::dsl::now)))
                                                         .execute(tx)?;
                    diesel::delete(metadata::table.filter(metadata::category.eq(template.category()))).execute(tx)?;
                    let fields: Vec<NewFieldRow> = rows.iter()
                                                       .enumerate()
                                                       .map(|(i, r)| NewFieldRow { category: template.category(),
                                                                                   position: i as i32,
                                                                                   label: &r.label,
                                                                                   section: &r.section,
                                                                                   subsection: &r.subsection,
                                                                                   datatype: &r.datatype,
                                                                                   output: r.output.as_deref(),
                                                                                   grp: r.group.as_deref() })
                                                       .collect();
                    if !fields.is_empty() {
                        diesel::insert_into(metadata::table).values(&fields).execute(tx)?;
                    }
                    Ok::<(), diesel::result::Error>(())
                })
                .map_err(PersistenceError::from)
        }).map_err(RepositoryError::from)?;
        debug!("save_template category={} fields={}", template.category(), rows.len());
        Ok(())
    }
}

type FieldTuple = (String, String, String, String, Option<String>, Option<String>);

impl<P: ConnectionProvider> ReferenceData for PgSubstanceRepository<P> {
    fn get_template(&self, category: &str) -> Result<Template, RepositoryError> {
        let skeleton: Option<Value> = self.read(|c| {
                                               templates::table.filter(templates::category.eq(category))
                                                               .select(templates::skeleton)
                                                               .first(c)
                                                               .optional()
                                           })?;
        let skeleton = skeleton.ok_or_else(|| RepositoryError::NotFound(format!("template for category '{category}'")))?;
        let fields: Vec<FieldTuple> = self.read(|c| {
                                              metadata::table.filter(metadata::category.eq(category))
                                                             .order(metadata::position.asc())
                                                             .select((metadata::label,
                                                                      metadata::section,
                                                                      metadata::subsection,
                                                                      metadata::datatype,
                                                                      metadata::output,
                                                                      metadata::grp))
                                                             .load(c)
                                          })?;
        let rows = fields.into_iter()
                         .map(|(label, section, subsection, datatype, output, group)| FieldSpecRow { label,
                                                                                                     section,
                                                                                                     subsection,
                                                                                                     datatype,
                                                                                                     output,
                                                                                                     group })
                         .collect();
        Template::new(category, skeleton, rows).map_err(|e| RepositoryError::Backend(e.to_string()))
    }

    fn get_element_reference(&self, value: &str, from: ElementField, to: ElementField) -> Result<Option<String>, RepositoryError> {
        self.elements.lookup(value, from, to).map_err(|e| RepositoryError::Backend(e.to_string()))
    }
}

fn like_pattern(query: &str) -> String {
    let escaped = query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

impl<P: ConnectionProvider> SubstanceRepository for PgSubstanceRepository<P> {
    fn find_substance_by_identifier_value(&self, value: &str) -> Result<Option<Substance>, RepositoryError> {
        let row: Option<SubstanceRow> = self.read(|c| {
                                                substances::table.inner_join(identifiers::table)
                                                                 .filter(identifiers::value.eq(value))
                                                                 .order(identifiers::id.asc())
                                                                 .select(substances::all_columns)
                                                                 .first(c)
                                                                 .optional()
                                            })?;
        Ok(row.map(Substance::from))
    }

    fn get_substance(&self, id: SubstanceId) -> Result<Option<Substance>, RepositoryError> {
        let row: Option<SubstanceRow> = self.read(|c| substances::table.find(id.0).first(c).optional())?;
        Ok(row.map(Substance::from))
    }

    fn identifiers_for(&self, id: SubstanceId) -> Result<Vec<Identifier>, RepositoryError> {
        let rows: Vec<(String, String, String)> = self.read(|c| {
                                                          identifiers::table.filter(identifiers::substance_id.eq(id.0))
                                                                            .order(identifiers::id.asc())
                                                                            .select((identifiers::kind, identifiers::value, identifiers::source))
                                                                            .load(c)
                                                      })?;
        Ok(rows.into_iter()
               .map(|(kind, value, source)| Identifier::from_row(id, FragmentRow { kind, value, source }))
               .collect())
    }

    fn descriptors_for(&self, id: SubstanceId) -> Result<Vec<Descriptor>, RepositoryError> {
        let rows: Vec<(String, String, String)> = self.read(|c| {
                                                          descriptors::table.filter(descriptors::substance_id.eq(id.0))
                                                                            .order(descriptors::id.asc())
                                                                            .select((descriptors::kind, descriptors::value, descriptors::source))
                                                                            .load(c)
                                                      })?;
        Ok(rows.into_iter()
               .map(|(kind, value, source)| Descriptor::from_row(id, FragmentRow { kind, value, source }))
               .collect())
    }

    fn source_outcomes_for(&self, id: SubstanceId) -> Result<Vec<SourceOutcome>, RepositoryError> {
        let rows: Vec<(String, i16, Option<String>)> = self.read(|c| {
                                                               sources::table.filter(sources::substance_id.eq(id.0))
                                                                             .order(sources::id.asc())
                                                                             .select((sources::source, sources::result, sources::notes))
                                                                             .load(c)
                                                           })?;
        Ok(rows.into_iter()
               .map(|(source, flag, notes)| SourceOutcome { substance_id: id, source, result: SourceResult::from_flag(flag), notes })
               .collect())
    }

    fn search(&self, query: &str) -> Result<Vec<Substance>, RepositoryError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = like_pattern(query);
        let rows: Vec<SubstanceRow> = self.read(|c| {
                                                let matching = identifiers::table.filter(identifiers::value.ilike(pattern.as_str()))
                                                                                 .select(identifiers::substance_id);
                                                substances::table.filter(substances::id.eq_any(matching))
                                                                 .order(substances::id.asc())
                                                                 .load(c)
                                            })?;
        debug!("search query={query} hits={}", rows.len());
        Ok(rows.into_iter().map(Substance::from).collect())
    }

    fn attach_graph_location(&self, id: SubstanceId, location: &str) -> Result<(), RepositoryError> {
        let updated = self.read(|c| {
                              diesel::update(substances::table.find(id.0)).set(substances::graphdb.eq(location))
                                                                          .execute(c)
                          })?;
        if updated == 0 {
            return Err(RepositoryError::NotFound(format!("substance {id}")));
        }
        Ok(())
    }

    fn write_atomically(&self, unit: &mut WriteUnit<'_>) -> Result<SubstanceId, RepositoryError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .serializable()
                .read_write()
                .run(|tx| unit(&mut PgWriter { conn: tx }).map_err(PersistenceError::from))
        }).map_err(RepositoryError::from)
    }
}

/// Construye un pool Postgres r2d2 y aplica las migraciones pendientes.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let max = max_size.max(1);
    let min = min_size.max(1);
    if min > max {
        warn!("build_pool: min_size > max_size ({min} > {max}), using min=max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(min.min(max)))
                                    .max_size(max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Carga `.env`, lee `DbConfig` y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

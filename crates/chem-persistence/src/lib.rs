//! chem-persistence
//!
//! Implementación Postgres (Diesel + r2d2) de `SubstanceRepository`, con
//! paridad de comportamiento respecto al repositorio en memoria del core.
//!
//! Módulos:
//! - `pg`: repositorio, pool y unidad de escritura transaccional.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgPool, PgSubstanceRepository, PoolProvider};

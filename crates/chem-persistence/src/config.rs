//! Configuración de conexión desde variables de entorno (`DATABASE_URL` y
//! tamaños opcionales del pool).

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;

use crate::error::PersistenceError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

pub const DEFAULT_MIN_CONNECTIONS: u32 = 2;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, PersistenceError> {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL").map_err(|_| PersistenceError::Config("DATABASE_URL is not set".into()))?;
        let min_connections = pool_size("DATABASE_MIN_CONNECTIONS", DEFAULT_MIN_CONNECTIONS)?;
        let max_connections = pool_size("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        Ok(Self { url, min_connections, max_connections })
    }

    /// `Some` sólo si `DATABASE_URL` está definido.
    pub fn from_env_opt() -> Result<Option<Self>, PersistenceError> {
        Lazy::force(&DOTENV_LOADED);
        if env::var("DATABASE_URL").is_err() {
            return Ok(None);
        }
        Self::from_env().map(Some)
    }
}

fn pool_size(var: &str, default: u32) -> Result<u32, PersistenceError> {
    match env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| PersistenceError::Config(format!("{var} must be a positive integer, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

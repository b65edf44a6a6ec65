use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

// -----------------------------------------------------------------------------
// ----- PoolsConfig -----------------------------------------------------------

/// The dbkey table: every server pool a session may be assigned to.
#[derive(Debug, Clone, Default)]
pub struct PoolsConfig {
    by_dbkey: HashMap<String, PoolRecord>,
}

// -----------------------------------------------------------------------------
// ----- PoolsConfig: Static ---------------------------------------------------

impl PoolsConfig {
    pub(crate) fn from_entries(mut entries: Vec<PoolFileEntry>) -> Result<Self, PoolsError> {
        if entries.is_empty() {
            return Err(PoolsError::EmptyConfig);
        }

        let mut by_dbkey = HashMap::with_capacity(entries.len());

        for entry in entries.drain(..) {
            validate(&entry)?;

            let max_connections = entry.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS).max(1);
            let record = PoolRecord {
                dbname: entry.dbname.unwrap_or_else(|| entry.dbkey.clone()),
                dbkey: entry.dbkey.clone(),
                host: entry.host,
                port: entry.port,
                user: entry.user,
                password: SecretString::new(entry.password.into_boxed_str()),
                min_connections: entry.min_connections.min(max_connections),
                max_connections,
            };

            if by_dbkey.insert(entry.dbkey.clone(), record).is_some() {
                return Err(PoolsError::DuplicatePool { dbkey: entry.dbkey });
            }
        }

        Ok(Self { by_dbkey })
    }
}

// -----------------------------------------------------------------------------
// ----- PoolsConfig: Public ---------------------------------------------------

impl PoolsConfig {
    pub fn get(&self, dbkey: &str) -> Option<&PoolRecord> {
        self.by_dbkey.get(dbkey)
    }

    pub fn contains(&self, dbkey: &str) -> bool {
        self.by_dbkey.contains_key(dbkey)
    }

    pub fn records(&self) -> impl Iterator<Item = &PoolRecord> {
        self.by_dbkey.values()
    }

    pub fn len(&self) -> usize {
        self.by_dbkey.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_dbkey.is_empty()
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PoolFileEntry {
    #[serde(alias = "name")]
    dbkey: String,
    host: String,
    port: u16,
    user: String,
    password: String,

    // Backend database name; defaults to the dbkey.
    #[serde(default)]
    dbname: Option<String>,

    #[serde(default)]
    min_connections: u32,

    #[serde(default)]
    max_connections: Option<u32>,
}

// -----------------------------------------------------------------------------
// ----- PoolRecord ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PoolRecord {
    pub dbkey: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub dbname: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl PoolRecord {
    pub fn password_exposed(&self) -> &str {
        self.password.expose_secret()
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn validate(entry: &PoolFileEntry) -> Result<(), PoolsError> {
    if entry.dbkey.trim().is_empty() {
        return Err(PoolsError::InvalidField("dbkey".into()));
    }
    if entry.host.trim().is_empty() {
        return Err(PoolsError::InvalidField(format!("{}.host", entry.dbkey)));
    }
    if entry.user.trim().is_empty() {
        return Err(PoolsError::InvalidField(format!("{}.user", entry.dbkey)));
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PoolsError {
    #[error("no [[pools]] configured")]
    EmptyConfig,

    #[error("duplicate [[pools]] entry for dbkey '{dbkey}'")]
    DuplicatePool { dbkey: String },

    #[error("invalid or missing field '{0}'")]
    InvalidField(String),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------

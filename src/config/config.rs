use serde::Deserialize;
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::fs;

use super::{
    cli::CliConfig,
    intercept::{
        CapabilityFileSection, InterceptConfig, InterceptConfigError, InterceptFileSection,
        RewriteRuleEntry, RouteRuleEntry,
    },
    pools::{PoolFileEntry, PoolsConfig, PoolsError},
    types::LogLevel,
    users::{UsersConfig, UsersError},
};

// -----------------------------------------------------------------------------
// ----- Config ----------------------------------------------------------------

/// Process-wide configuration. Built once at startup and shared read-only
/// (behind an `Arc`) with every session.
#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: LogLevel,
    pub pools: PoolsConfig,
    pub users: UsersConfig,
    pub intercept: InterceptConfig,
}

// -----------------------------------------------------------------------------
// ----- Config: Static --------------------------------------------------------

impl Config {
    /// Reads CLI/ENV and both files. Panics on any error: do not start with a
    /// half-valid configuration.
    pub async fn init() -> Arc<Config> {
        let cli = CliConfig::from_args();

        let config = Self::load(&cli)
            .await
            .unwrap_or_else(|e| panic!("failed to load configuration: {e}"));

        Arc::new(config)
    }

    pub async fn load(cli: &CliConfig) -> Result<Config, ConfigError> {
        let config_raw = read_file(&cli.config_file_location).await?;
        let users_raw = read_file(&cli.users_file_location).await?;

        Self::from_toml(cli.listen_addr, cli.log_level, &config_raw, &users_raw)
    }

    pub fn from_toml(
        listen_addr: SocketAddr,
        log_level: LogLevel,
        config_raw: &str,
        users_raw: &str,
    ) -> Result<Config, ConfigError> {
        let doc: ConfigFile = toml::from_str(config_raw)?;

        let pools = PoolsConfig::from_entries(doc.pools)?;
        let users = UsersConfig::parse(users_raw)?;
        let intercept =
            InterceptConfig::from_sections(doc.intercept, doc.routing, doc.rewrite, &pools)?;

        Ok(Config {
            listen_addr,
            log_level,
            pools,
            users,
            intercept,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    pools: Vec<PoolFileEntry>,

    #[serde(default)]
    intercept: InterceptFileSection,

    #[serde(default)]
    routing: CapabilityFileSection<RouteRuleEntry>,

    #[serde(default)]
    rewrite: CapabilityFileSection<RewriteRuleEntry>,
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

async fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).await.map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read error for {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("pools: {0}")]
    Pools(#[from] PoolsError),

    #[error("users: {0}")]
    Users(#[from] UsersError),

    #[error("intercept: {0}")]
    Intercept(#[from] InterceptConfigError),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
